// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use http::Request;

use crate::ResponseWriter;

/// A unit of request processing.
///
/// The handler receives the request and writes its response through the
/// given [`ResponseWriter`]. It has no way to return an error: failures are
/// reported to the client through the response status.
pub trait Handler<B>: Send + Sync {
    fn serve<'a>(
        &'a self,
        writer: &'a mut dyn ResponseWriter,
        request: Request<B>,
    ) -> BoxFuture<'a, ()>;
}

impl<B, H> Handler<B> for Arc<H>
where
    H: Handler<B> + ?Sized,
{
    fn serve<'a>(
        &'a self,
        writer: &'a mut dyn ResponseWriter,
        request: Request<B>,
    ) -> BoxFuture<'a, ()> {
        (**self).serve(writer, request)
    }
}

/// A [`Handler`] backed by a function, see [`handler_fn`].
#[derive(Clone, Copy, Debug)]
pub struct HandlerFn<F>(F);

/// Make a [`Handler`] from a function.
///
/// ```
/// use traceware_http::{handler_fn, ResponseWriter};
///
/// let handler = handler_fn(|writer: &mut dyn ResponseWriter, _request: http::Request<()>| {
///     Box::pin(async move {
///         writer.write_header(http::StatusCode::NO_CONTENT);
///     })
/// });
/// # let _ = handler;
/// ```
pub fn handler_fn<B, F>(f: F) -> HandlerFn<F>
where
    F: for<'a> Fn(&'a mut dyn ResponseWriter, Request<B>) -> BoxFuture<'a, ()> + Send + Sync,
{
    HandlerFn(f)
}

impl<B, F> Handler<B> for HandlerFn<F>
where
    F: for<'a> Fn(&'a mut dyn ResponseWriter, Request<B>) -> BoxFuture<'a, ()> + Send + Sync,
{
    fn serve<'a>(
        &'a self,
        writer: &'a mut dyn ResponseWriter,
        request: Request<B>,
    ) -> BoxFuture<'a, ()> {
        (self.0)(writer, request)
    }
}
