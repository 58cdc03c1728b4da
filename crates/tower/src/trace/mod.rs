// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

mod guard;
mod handler;
mod layer;

pub use self::{handler::TracedHandler, layer::TraceLayer};
