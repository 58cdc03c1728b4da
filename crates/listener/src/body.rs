// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use std::{
    io,
    pin::Pin,
    task::{Context, Poll},
};

use bytes::Bytes;
use http_body::{Body, Frame};
use tokio::sync::mpsc;

/// The body of a response produced by a [`HandlerService`](crate::HandlerService).
///
/// Chunks are streamed as the handler flushes them. An error is yielded when
/// the handler panicked in the middle of the body, so that the response does
/// not look complete to the client.
#[derive(Debug)]
pub struct ResponseBody {
    chunks: Option<mpsc::UnboundedReceiver<io::Result<Bytes>>>,
}

impl ResponseBody {
    pub(crate) fn channel(chunks: mpsc::UnboundedReceiver<io::Result<Bytes>>) -> Self {
        Self {
            chunks: Some(chunks),
        }
    }

    #[must_use]
    pub fn empty() -> Self {
        Self { chunks: None }
    }
}

impl Body for ResponseBody {
    type Data = Bytes;
    type Error = io::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        let Some(chunks) = this.chunks.as_mut() else {
            return Poll::Ready(None);
        };

        match chunks.poll_recv(cx) {
            Poll::Ready(Some(chunk)) => Poll::Ready(Some(chunk.map(Frame::data))),
            Poll::Ready(None) => {
                this.chunks = None;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }

    fn is_end_stream(&self) -> bool {
        self.chunks.is_none()
    }
}
