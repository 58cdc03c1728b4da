// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use std::io;

use bytes::{Bytes, BytesMut};
use http::{HeaderMap, Response, StatusCode};

use crate::{Flusher, ResponseWriter};

/// A [`ResponseWriter`] which records the response in memory.
///
/// Useful to call a [`Handler`](crate::Handler) without a server, mostly in
/// tests.
#[derive(Debug, Default)]
pub struct ResponseRecorder {
    status: Option<StatusCode>,
    headers: HeaderMap,
    committed_headers: Option<HeaderMap>,
    body: BytesMut,
    flushes: usize,
}

impl ResponseRecorder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The committed status, or `200 OK` if nothing was committed
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::OK)
    }

    /// Whether the status was committed, explicitly or by a write
    #[must_use]
    pub fn is_committed(&self) -> bool {
        self.status.is_some()
    }

    /// The headers as they were when the status was committed, or the current
    /// headers if nothing was committed yet
    #[must_use]
    pub fn sent_headers(&self) -> &HeaderMap {
        self.committed_headers.as_ref().unwrap_or(&self.headers)
    }

    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// How many times the writer was flushed
    #[must_use]
    pub fn flushes(&self) -> usize {
        self.flushes
    }

    /// Turn the recorded response into a [`Response`]
    #[must_use]
    pub fn into_response(self) -> Response<Bytes> {
        let status = self.status();
        let headers = self.committed_headers.unwrap_or(self.headers);
        let mut response = Response::new(self.body.freeze());
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        response
    }
}

impl ResponseWriter for ResponseRecorder {
    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_header(&mut self, status: StatusCode) {
        if self.status.is_some() {
            tracing::debug!(%status, "Response status was already committed");
            return;
        }

        self.status = Some(status);
        self.committed_headers = Some(self.headers.clone());
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.status.is_none() {
            self.write_header(StatusCode::OK);
        }

        self.body.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn as_flusher(&mut self) -> Option<&mut dyn Flusher> {
        Some(self)
    }
}

impl Flusher for ResponseRecorder {
    fn flush(&mut self) -> io::Result<()> {
        if self.status.is_none() {
            self.write_header(StatusCode::OK);
        }

        self.flushes += 1;
        Ok(())
    }
}
