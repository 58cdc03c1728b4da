// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use http::{Request, request::Parts};
use opentelemetry::Context;

/// Access the OpenTelemetry context the tracing middleware attached to a
/// request
pub trait RequestContextExt {
    /// The context carrying the request span, if the request was traced
    fn otel_context(&self) -> Option<&Context>;
}

impl<B> RequestContextExt for Request<B> {
    fn otel_context(&self) -> Option<&Context> {
        self.extensions().get()
    }
}

impl RequestContextExt for Parts {
    fn otel_context(&self) -> Option<&Context> {
        self.extensions.get()
    }
}
