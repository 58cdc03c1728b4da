// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use std::{panic::AssertUnwindSafe, sync::Arc};

use futures_util::{FutureExt as _, future::BoxFuture};
use http::Request;
use opentelemetry::context::FutureExt as _;
use traceware_http::{Handler, ResponseWriter};

use super::layer::Shared;

/// A [`Handler`] wrapped by a [`TraceLayer`](crate::TraceLayer)
pub struct TracedHandler<H> {
    inner: H,
    shared: Arc<Shared>,
}

impl<H> Clone for TracedHandler<H>
where
    H: Clone,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<H> std::fmt::Debug for TracedHandler<H>
where
    H: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TracedHandler")
            .field("inner", &self.inner)
            .field("service_name", &self.shared.service_name())
            .finish_non_exhaustive()
    }
}

impl<H> TracedHandler<H> {
    pub(super) fn new(inner: H, shared: Arc<Shared>) -> Self {
        Self { inner, shared }
    }

    pub fn get_ref(&self) -> &H {
        &self.inner
    }

    pub fn into_inner(self) -> H {
        self.inner
    }
}

impl<B, H> Handler<B> for TracedHandler<H>
where
    H: Handler<B>,
    B: Send + 'static,
{
    fn serve<'a>(
        &'a self,
        writer: &'a mut dyn ResponseWriter,
        request: Request<B>,
    ) -> BoxFuture<'a, ()> {
        let (mut parts, body) = request.into_parts();

        if !self.shared.should_trace(&parts) {
            tracing::debug!(
                http.request.method = %parts.method,
                url.path = parts.uri.path(),
                "Request filtered out, not tracing",
            );
            return self.inner.serve(writer, Request::from_parts(parts, body));
        }

        // The guard is created before the future, so that the span still ends
        // if the future is dropped without being polled
        let mut guard = self.shared.start_span(&mut parts);
        let request = Request::from_parts(parts, body);

        Box::pin(async move {
            let cx = guard.context().clone();
            let mut observer = guard.observe(writer);

            let result = AssertUnwindSafe(self.inner.serve(&mut observer, request))
                .catch_unwind()
                .with_context(cx)
                .await;
            drop(observer);

            if let Err(payload) = result {
                tracing::error!("Request handler panicked");
                guard.mark_panicked();
                drop(guard);
                std::panic::resume_unwind(payload);
            }
        })
    }
}
