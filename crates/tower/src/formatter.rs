// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use std::sync::Arc;

use http::request::Parts;

/// Computes the display name of a request span.
///
/// It is given the operation label (`HTTP <METHOD>`) and the request, and is
/// evaluated once, before the span starts.
#[derive(Clone)]
pub struct SpanNameFormatter(Arc<dyn Fn(&str, &Parts) -> String + Send + Sync>);

impl std::fmt::Debug for SpanNameFormatter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpanNameFormatter").finish_non_exhaustive()
    }
}

impl Default for SpanNameFormatter {
    /// `<METHOD> <path>`, without the query string
    fn default() -> Self {
        Self::new(|_operation, request| format!("{} {}", request.method, request.uri.path()))
    }
}

impl SpanNameFormatter {
    pub fn new<F>(format: F) -> Self
    where
        F: Fn(&str, &Parts) -> String + Send + Sync + 'static,
    {
        Self(Arc::new(format))
    }

    #[must_use]
    pub fn format(&self, operation: &str, request: &Parts) -> String {
        (self.0)(operation, request)
    }
}
