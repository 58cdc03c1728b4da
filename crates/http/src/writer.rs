// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use std::{io, pin::Pin};

use http::{HeaderMap, StatusCode};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};

/// The sink a [`Handler`](crate::Handler) writes its response into.
///
/// Headers can be changed until the status is committed, either explicitly
/// with [`ResponseWriter::write_header`] or implicitly by the first call to
/// [`ResponseWriter::write`], which commits a `200 OK`.
pub trait ResponseWriter: Send {
    /// The headers which will be sent with the response
    fn headers(&self) -> &HeaderMap;

    /// Mutable access to the headers which will be sent with the response.
    ///
    /// Changes made after the status was committed have no effect.
    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// Commit the response status and headers.
    ///
    /// Only the first call has an effect.
    fn write_header(&mut self, status: StatusCode);

    /// Write some bytes of the response body, returning how many bytes were
    /// accepted.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying sink can't accept more data, for
    /// example because the client went away.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Write the whole buffer, looping over [`ResponseWriter::write`].
    ///
    /// # Errors
    ///
    /// Returns the first error returned by [`ResponseWriter::write`], or an
    /// [`io::ErrorKind::WriteZero`] error if the sink stopped accepting bytes.
    fn write_all(&mut self, mut buf: &[u8]) -> io::Result<()> {
        while !buf.is_empty() {
            match self.write(buf) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "failed to write the whole response body",
                    ));
                }
                Ok(n) => buf = &buf[n..],
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }

        Ok(())
    }

    /// Get the flushing capability of this writer, if it has one
    fn as_flusher(&mut self) -> Option<&mut dyn Flusher> {
        None
    }

    /// Get the connection takeover capability of this writer, if it has one
    fn as_hijacker(&mut self) -> Option<&mut dyn Hijacker> {
        None
    }
}

impl<W: ResponseWriter + ?Sized> ResponseWriter for &mut W {
    fn headers(&self) -> &HeaderMap {
        (**self).headers()
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        (**self).headers_mut()
    }

    fn write_header(&mut self, status: StatusCode) {
        (**self).write_header(status);
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        (**self).write(buf)
    }

    fn as_flusher(&mut self) -> Option<&mut dyn Flusher> {
        (**self).as_flusher()
    }

    fn as_hijacker(&mut self) -> Option<&mut dyn Hijacker> {
        (**self).as_hijacker()
    }
}

/// A writer which can send the bytes buffered so far to the client.
pub trait Flusher {
    /// Send the buffered response bytes to the client.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffered bytes could not be handed over.
    fn flush(&mut self) -> io::Result<()>;
}

/// A raw, bidirectional connection taken over from the HTTP server
pub trait Connection: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> Connection for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

pub type BoxConnection = Box<dyn Connection>;

/// Resolves to the raw connection once the server handed it over
pub type HijackFuture =
    Pin<Box<dyn Future<Output = Result<BoxConnection, HijackError>> + Send + 'static>>;

/// A writer which can give up HTTP framing and hand the underlying connection
/// to the handler.
pub trait Hijacker {
    /// Take over the connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection can't be taken over, for example
    /// because it was already taken.
    fn hijack(&mut self) -> Result<HijackFuture, HijackError>;
}

#[derive(Debug, Error)]
pub enum HijackError {
    #[error("the response writer does not support taking over the connection")]
    Unsupported,

    #[error("the connection was already taken over")]
    AlreadyHijacked,

    #[error("failed to upgrade the connection")]
    Upgrade {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },
}

impl HijackError {
    pub fn upgrade(source: impl Into<Box<dyn std::error::Error + Send + Sync + 'static>>) -> Self {
        Self::Upgrade {
            source: source.into(),
        }
    }
}
