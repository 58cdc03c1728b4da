// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

#![deny(rustdoc::missing_crate_level_docs)]
#![allow(clippy::module_name_repetitions)]

//! A [`hyper`] host for [`traceware_http::Handler`]s.
//!
//! [`HandlerService`] turns a handler into a [`tower::Service`], streaming
//! the response body as the handler writes it, and supporting HTTP upgrades
//! through connection takeover. [`Server`] serves it on a TCP listener with
//! graceful shutdown.

mod body;
mod server;
mod service;
mod writer;

pub use self::{
    body::ResponseBody,
    server::{ServeError, Server},
    service::HandlerService,
};
