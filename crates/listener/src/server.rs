// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use std::{
    net::SocketAddr,
    pin::Pin,
    task::{Context, Poll},
};

use hyper::{Request, Response};
use hyper_util::{
    rt::{TokioExecutor, TokioIo},
    server::conn::auto::{Builder, UpgradeableConnection},
    service::TowerToHyperService,
};
use pin_project_lite::pin_project;
use thiserror::Error;
use tokio::{
    net::{TcpListener, TcpStream, ToSocketAddrs},
    task::JoinError,
};
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};
use tower::Service;
use tracing::Instrument;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ServeError {
    #[error("failed to bind the listener")]
    Bind {
        #[source]
        source: std::io::Error,
    },

    #[error("failed to get the local address of the listener")]
    LocalAddr {
        #[source]
        source: std::io::Error,
    },
}

/// An HTTP/1 and HTTP/2 server on a TCP listener
pub struct Server<S> {
    listener: TcpListener,
    service: S,
}

impl<S> std::fmt::Debug for Server<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("listener", &self.listener)
            .finish_non_exhaustive()
    }
}

impl<S> Server<S> {
    #[must_use]
    pub fn new(listener: TcpListener, service: S) -> Self {
        Self { listener, service }
    }

    /// # Errors
    ///
    /// Returns an error if the listener couldn't be bound
    pub async fn bind(addr: impl ToSocketAddrs, service: S) -> Result<Self, ServeError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServeError::Bind { source })?;
        Ok(Self::new(listener, service))
    }

    /// # Errors
    ///
    /// Returns an error if the address of the listener couldn't be queried
    pub fn local_addr(&self) -> Result<SocketAddr, ServeError> {
        self.listener
            .local_addr()
            .map_err(|source| ServeError::LocalAddr { source })
    }

    /// Serve connections until the soft shutdown token is cancelled, then wait
    /// for the open connections to finish, unless the hard shutdown token is
    /// cancelled too
    pub async fn run<B>(
        self,
        soft_shutdown_token: CancellationToken,
        hard_shutdown_token: CancellationToken,
    ) where
        S: Service<Request<hyper::body::Incoming>, Response = Response<B>> + Clone + Send + 'static,
        S::Future: Send + 'static,
        S::Error: std::error::Error + Send + Sync + 'static,
        B: http_body::Body + Send + 'static,
        B::Data: Send,
        B::Error: std::error::Error + Send + Sync + 'static,
    {
        // If this task crashes for any reason, the server shuts down
        let _guard = soft_shutdown_token.clone().drop_guard();

        let mut builder = Builder::new(TokioExecutor::new());
        builder.http1().keep_alive(true);

        // A JoinSet which collects connections that are being served
        let mut connection_tasks = tokio::task::JoinSet::new();

        loop {
            tokio::select! {
                biased;

                // First look for the shutdown signal
                () = soft_shutdown_token.cancelled() => {
                    tracing::debug!("Shutting down listener");
                    break;
                },

                // Reap finished connections
                res = connection_tasks.join_next(), if !connection_tasks.is_empty() => {
                    reap_connection(res);
                },

                // Look for connections to accept
                res = self.listener.accept() => {
                    let (stream, peer_addr) = match res {
                        Ok(res) => res,
                        Err(e) => {
                            tracing::warn!(error = &e as &dyn std::error::Error, "Failed to accept connection from the underlying socket");
                            continue;
                        }
                    };

                    let connection = serve(&builder, stream, self.service.clone());
                    let token = soft_shutdown_token.child_token();
                    let span = tracing::debug_span!(
                        "http-serve",
                        network.protocol.name = "http",
                        network.peer.address = %peer_addr.ip(),
                        network.peer.port = peer_addr.port(),
                    );

                    connection_tasks.spawn(async move {
                        tracing::debug!("Accepted connection");
                        if let Err(e) = AbortableConnection::new(connection, token).await {
                            tracing::warn!(error = &*e as &dyn std::error::Error, "Failed to serve connection");
                        }
                    }.instrument(span));
                },
            };
        }

        // Wait for connections to cleanup
        if !connection_tasks.is_empty() {
            tracing::info!(
                "There are {active} active connections, performing a graceful shutdown. Send the shutdown signal again to force.",
                active = connection_tasks.len(),
            );

            while !connection_tasks.is_empty() {
                tokio::select! {
                    biased;

                    res = connection_tasks.join_next() => {
                        reap_connection(res);
                    },

                    // Handle when we are asked to hard shutdown
                    () = hard_shutdown_token.cancelled() => {
                        tracing::warn!(
                            "Forcing shutdown ({active} active connections)",
                            active = connection_tasks.len(),
                        );
                        break;
                    },
                }
            }
        }

        connection_tasks.shutdown().await;
    }
}

/// Log the outcome of a connection task. Serving errors are logged by the
/// task itself, so only join failures show up here.
fn reap_connection(res: Option<Result<(), JoinError>>) {
    match res {
        Some(Ok(())) => {}
        Some(Err(e)) if e.is_panic() => {
            tracing::error!(error = &e as &dyn std::error::Error, "Connection task panicked");
        }
        Some(Err(e)) => {
            tracing::debug!(error = &e as &dyn std::error::Error, "Connection task was cancelled");
        }
        None => tracing::error!("Connection set was polled even though it was empty"),
    }
}

type Connection<S> =
    UpgradeableConnection<'static, TokioIo<TcpStream>, TowerToHyperService<S>, TokioExecutor>;

/// Start serving a connection, with support for HTTP upgrades
fn serve<S, B>(builder: &Builder<TokioExecutor>, stream: TcpStream, service: S) -> Connection<S>
where
    S: Service<Request<hyper::body::Incoming>, Response = Response<B>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: std::error::Error + Send + Sync + 'static,
    B: http_body::Body + Send + 'static,
    B::Data: Send,
    B::Error: std::error::Error + Send + Sync + 'static,
{
    builder
        .serve_connection_with_upgrades(TokioIo::new(stream), TowerToHyperService::new(service))
        .into_owned()
}

pin_project! {
    /// A wrapper around a connection that starts a graceful shutdown of the
    /// connection once the cancellation token is cancelled.
    ///
    /// The connection needs to be polled again to start the graceful shutdown,
    /// so the cancellation future is polled alongside it to get woken up.
    struct AbortableConnection<C> {
        #[pin]
        connection: C,
        #[pin]
        cancellation_future: WaitForCancellationFutureOwned,
        did_start_shutdown: bool,
    }
}

impl<C> AbortableConnection<C> {
    fn new(connection: C, cancellation_token: CancellationToken) -> Self {
        Self {
            connection,
            cancellation_future: cancellation_token.cancelled_owned(),
            did_start_shutdown: false,
        }
    }
}

impl<S, B> Future for AbortableConnection<Connection<S>>
where
    Connection<S>: Future,
    S: Service<Request<hyper::body::Incoming>, Response = Response<B>> + Send + Clone + 'static,
    S::Future: Send + 'static,
    S::Error: std::error::Error + Send + Sync,
    B: http_body::Body + Send + 'static,
    B::Data: Send,
    B::Error: std::error::Error + Send + Sync + 'static,
{
    type Output = <Connection<S> as Future>::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut this = self.project();

        if let Poll::Ready(()) = this.cancellation_future.poll(cx)
            && !*this.did_start_shutdown
        {
            *this.did_start_shutdown = true;
            this.connection.as_mut().graceful_shutdown();
        }

        this.connection.poll(cx)
    }
}
