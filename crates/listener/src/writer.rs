// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use std::io;

use bytes::{Bytes, BytesMut};
use http::{HeaderMap, Response, StatusCode};
use hyper::upgrade::OnUpgrade;
use hyper_util::rt::TokioIo;
use tokio::sync::{mpsc, oneshot};
use traceware_http::{
    BoxConnection, Flusher, HijackError, HijackFuture, Hijacker, ResponseWriter,
};

use crate::ResponseBody;

/// Buffered body bytes are sent once they reach this size, even without an
/// explicit flush
const CHUNK_SIZE: usize = 8 * 1024;

enum State {
    /// Nothing was committed, the head can still be sent
    Pending {
        head: oneshot::Sender<Response<ResponseBody>>,
    },

    /// The head was sent, body chunks go through the channel
    Streaming {
        chunks: mpsc::UnboundedSender<io::Result<Bytes>>,
    },

    /// The connection was taken over
    Hijacked,

    /// The response is complete, or the client went away
    Closed,
}

/// A [`ResponseWriter`] sending the response back to a
/// [`HandlerService`](crate::HandlerService) future through channels
pub(crate) struct ChannelWriter {
    headers: HeaderMap,
    state: State,
    buffer: BytesMut,
    on_upgrade: Option<OnUpgrade>,
    upgradable: bool,
}

impl ChannelWriter {
    /// Create a writer, along with the receiver of the response head
    pub(crate) fn new(
        on_upgrade: Option<OnUpgrade>,
    ) -> (Self, oneshot::Receiver<Response<ResponseBody>>) {
        let (head, receiver) = oneshot::channel();
        let writer = Self {
            headers: HeaderMap::new(),
            state: State::Pending { head },
            buffer: BytesMut::new(),
            upgradable: on_upgrade.is_some(),
            on_upgrade,
        };
        (writer, receiver)
    }

    fn send_head(&mut self, status: StatusCode, body: ResponseBody) -> bool {
        let State::Pending { head } = std::mem::replace(&mut self.state, State::Closed) else {
            return false;
        };

        let mut response = Response::new(body);
        *response.status_mut() = status;
        *response.headers_mut() = self.headers.clone();

        if head.send(response).is_err() {
            tracing::debug!(%status, "Client went away before the response was sent");
            return false;
        }

        true
    }

    fn send_buffer(&mut self) -> io::Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let State::Streaming { chunks } = &self.state else {
            return Err(broken_pipe());
        };

        let chunk = self.buffer.split().freeze();
        if chunks.send(Ok(chunk)).is_err() {
            self.state = State::Closed;
            return Err(broken_pipe());
        }

        Ok(())
    }

    /// Complete the response, committing a `200 OK` if nothing was committed
    pub(crate) fn finish(&mut self) {
        if matches!(self.state, State::Pending { .. }) {
            self.write_header(StatusCode::OK);
        }

        if let Err(e) = self.send_buffer() {
            tracing::debug!(
                error = &e as &dyn std::error::Error,
                "Failed to send the end of the response body"
            );
        }

        if matches!(self.state, State::Streaming { .. }) {
            self.state = State::Closed;
        }
    }

    /// Abort the response after the handler panicked.
    ///
    /// If nothing was committed, the service answers with a `500`. Otherwise
    /// the body stream ends with an error.
    pub(crate) fn abort(&mut self) {
        self.buffer.clear();
        if let State::Streaming { chunks } = std::mem::replace(&mut self.state, State::Closed) {
            let _ = chunks.send(Err(io::Error::other("the request handler panicked")));
        }
    }
}

impl Drop for ChannelWriter {
    fn drop(&mut self) {
        self.finish();
    }
}

fn broken_pipe() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "the client went away")
}

impl ResponseWriter for ChannelWriter {
    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_header(&mut self, status: StatusCode) {
        if !matches!(self.state, State::Pending { .. }) {
            tracing::warn!(%status, "Response status was already committed");
            return;
        }

        let (chunks, receiver) = mpsc::unbounded_channel();
        if self.send_head(status, ResponseBody::channel(receiver)) {
            self.state = State::Streaming { chunks };
        }
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if matches!(self.state, State::Pending { .. }) {
            self.write_header(StatusCode::OK);
        }

        match self.state {
            State::Streaming { .. } => {}
            State::Hijacked => {
                return Err(io::Error::other("the connection was taken over"));
            }
            State::Pending { .. } | State::Closed => return Err(broken_pipe()),
        }

        self.buffer.extend_from_slice(buf);
        if self.buffer.len() >= CHUNK_SIZE {
            self.send_buffer()?;
        }

        Ok(buf.len())
    }

    fn as_flusher(&mut self) -> Option<&mut dyn Flusher> {
        Some(self)
    }

    fn as_hijacker(&mut self) -> Option<&mut dyn Hijacker> {
        if self.upgradable { Some(self) } else { None }
    }
}

impl Flusher for ChannelWriter {
    fn flush(&mut self) -> io::Result<()> {
        if matches!(self.state, State::Pending { .. }) {
            self.write_header(StatusCode::OK);
        }

        match self.state {
            State::Streaming { .. } => self.send_buffer(),
            State::Hijacked => Err(io::Error::other("the connection was taken over")),
            State::Pending { .. } | State::Closed => Err(broken_pipe()),
        }
    }
}

impl Hijacker for ChannelWriter {
    fn hijack(&mut self) -> Result<HijackFuture, HijackError> {
        let on_upgrade = self
            .on_upgrade
            .take()
            .ok_or(HijackError::AlreadyHijacked)?;

        if matches!(self.state, State::Pending { .. }) {
            self.send_head(StatusCode::SWITCHING_PROTOCOLS, ResponseBody::empty());
        }
        self.buffer.clear();
        self.state = State::Hijacked;

        Ok(Box::pin(async move {
            let upgraded = on_upgrade.await.map_err(HijackError::upgrade)?;
            let connection: BoxConnection = Box::new(TokioIo::new(upgraded));
            Ok(connection)
        }))
    }
}
