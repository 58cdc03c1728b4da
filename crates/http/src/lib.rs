// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

//! Response writer and handler abstractions for HTTP services.
//!
//! A [`Handler`] receives a [`Request`](http::Request) and produces its
//! response by driving a [`ResponseWriter`]: set headers, commit a status,
//! then write body bytes. Writers can optionally expose extra capabilities,
//! like flushing buffered bytes ([`Flusher`]) or taking over the underlying
//! connection ([`Hijacker`]).

#![deny(rustdoc::missing_crate_level_docs)]
#![allow(clippy::module_name_repetitions)]

mod handler;
mod recorder;
mod writer;

pub use self::{
    handler::{Handler, HandlerFn, handler_fn},
    recorder::ResponseRecorder,
    writer::{
        BoxConnection, Connection, Flusher, HijackError, HijackFuture, Hijacker, ResponseWriter,
    },
};
