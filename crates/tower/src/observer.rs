// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use std::io;

use http::{HeaderMap, StatusCode};
use traceware_http::{Flusher, HijackError, HijackFuture, Hijacker, ResponseWriter};

/// What a [`ResponseObserver`] saw of a response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseOutcome {
    status: StatusCode,
    bytes_written: u64,
    committed: bool,
}

impl Default for ResponseOutcome {
    fn default() -> Self {
        Self {
            status: StatusCode::OK,
            bytes_written: 0,
            committed: false,
        }
    }
}

impl ResponseOutcome {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The committed status, `200 OK` if none was
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// How many body bytes the underlying writer accepted
    #[must_use]
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    #[must_use]
    pub fn is_committed(&self) -> bool {
        self.committed
    }

    fn commit(&mut self, status: StatusCode) -> bool {
        if self.committed {
            return false;
        }

        self.status = status;
        self.committed = true;
        true
    }
}

/// A [`ResponseWriter`] recording the status and size of the response going
/// through it.
///
/// Flushing and connection takeover are forwarded to the wrapped writer. The
/// observer always advertises takeover, and reports
/// [`HijackError::Unsupported`] when the wrapped writer can't do it.
pub struct ResponseObserver<'a> {
    inner: &'a mut dyn ResponseWriter,
    outcome: &'a mut ResponseOutcome,
}

impl std::fmt::Debug for ResponseObserver<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseObserver")
            .field("outcome", &self.outcome)
            .finish_non_exhaustive()
    }
}

impl<'a> ResponseObserver<'a> {
    pub fn new(inner: &'a mut dyn ResponseWriter, outcome: &'a mut ResponseOutcome) -> Self {
        Self { inner, outcome }
    }

    #[must_use]
    pub fn outcome(&self) -> &ResponseOutcome {
        self.outcome
    }
}

impl ResponseWriter for ResponseObserver<'_> {
    fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    fn write_header(&mut self, status: StatusCode) {
        if self.outcome.commit(status) {
            self.inner.write_header(status);
        }
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.outcome.is_committed() {
            self.write_header(StatusCode::OK);
        }

        let written = self.inner.write(buf)?;
        let counted = u64::try_from(written).unwrap_or(u64::MAX);
        self.outcome.bytes_written = self.outcome.bytes_written.saturating_add(counted);
        Ok(written)
    }

    fn as_flusher(&mut self) -> Option<&mut dyn Flusher> {
        if self.inner.as_flusher().is_some() {
            Some(self)
        } else {
            None
        }
    }

    fn as_hijacker(&mut self) -> Option<&mut dyn Hijacker> {
        Some(self)
    }
}

impl Flusher for ResponseObserver<'_> {
    fn flush(&mut self) -> io::Result<()> {
        if !self.outcome.is_committed() {
            self.write_header(StatusCode::OK);
        }

        match self.inner.as_flusher() {
            Some(flusher) => flusher.flush(),
            None => Ok(()),
        }
    }
}

impl Hijacker for ResponseObserver<'_> {
    fn hijack(&mut self) -> Result<HijackFuture, HijackError> {
        self.inner
            .as_hijacker()
            .ok_or(HijackError::Unsupported)?
            .hijack()
    }
}
