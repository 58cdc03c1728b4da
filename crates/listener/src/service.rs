// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use std::{
    any::Any,
    convert::Infallible,
    panic::AssertUnwindSafe,
    sync::Arc,
    task::{Context, Poll},
};

use futures_util::{FutureExt as _, future::BoxFuture};
use http::{Request, Response, StatusCode};
use hyper::upgrade::OnUpgrade;
use tower::Service;
use traceware_http::Handler;

use crate::{ResponseBody, writer::ChannelWriter};

/// A [`tower::Service`] running a [`Handler`].
///
/// Each request is handled in its own task. The response resolves as soon as
/// the handler commits a status, and its body is streamed from what the
/// handler writes afterwards.
pub struct HandlerService<H> {
    handler: Arc<H>,
}

impl<H> Clone for HandlerService<H> {
    fn clone(&self) -> Self {
        Self {
            handler: Arc::clone(&self.handler),
        }
    }
}

impl<H> std::fmt::Debug for HandlerService<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerService").finish_non_exhaustive()
    }
}

impl<H> HandlerService<H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler: Arc::new(handler),
        }
    }

    pub fn from_arc(handler: Arc<H>) -> Self {
        Self { handler }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic payload"
    }
}

fn internal_server_error() -> Response<ResponseBody> {
    let mut response = Response::new(ResponseBody::empty());
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
}

impl<H, B> Service<Request<B>> for HandlerService<H>
where
    H: Handler<B> + 'static,
    B: Send + 'static,
{
    type Response = Response<ResponseBody>;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, mut request: Request<B>) -> Self::Future {
        let on_upgrade = request.extensions_mut().remove::<OnUpgrade>();
        let (mut writer, head) = ChannelWriter::new(on_upgrade);
        let handler = Arc::clone(&self.handler);

        tokio::spawn(async move {
            let result = AssertUnwindSafe(handler.serve(&mut writer, request))
                .catch_unwind()
                .await;

            match result {
                Ok(()) => writer.finish(),
                Err(payload) => {
                    tracing::error!(
                        panic.message = panic_message(&*payload),
                        "Request handler panicked"
                    );
                    writer.abort();
                }
            }
        });

        Box::pin(async move {
            // The head is only lost if the handler panicked before committing
            Ok(head.await.unwrap_or_else(|_| internal_server_error()))
        })
    }
}
