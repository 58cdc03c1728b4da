// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

//! Serve a small traced application.
//!
//! Configuration is read from the YAML files given as arguments and from the
//! `TRACEWARE_` environment variables. The W3C `traceparent` header is
//! extracted unless `TRACEWARE_TELEMETRY__PROPAGATORS` says otherwise. Try it
//! with:
//!
//! ```sh
//! TRACEWARE_TELEMETRY__EXPORTER=stdout cargo run -p traceware-listener --example demo
//! curl -H 'traceparent: 00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01' http://127.0.0.1:3000/hello
//! ```

mod telemetry;

use std::net::Ipv4Addr;

use anyhow::Context as _;
use http::{Request, StatusCode, header::CONTENT_TYPE};
use hyper::body::Incoming;
use opentelemetry::trace::TracerProvider as _;
use tokio_util::sync::CancellationToken;
use tower::Layer;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt as _, util::SubscriberInitExt as _};
use traceware_config::{ConfigurationSectionExt, HttpTracingConfig, TelemetryConfig};
use traceware_http::{ResponseWriter, handler_fn};
use traceware_listener::{HandlerService, Server};

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let figment = traceware_config::figment(std::env::args_os().skip(1));
    let http_tracing = HttpTracingConfig::extract_or_default(&figment)
        .map_err(anyhow::Error::from_boxed)
        .context("Failed to load the HTTP tracing configuration")?;
    let telemetry_config = TelemetryConfig::extract_or_default(&figment)
        .map_err(anyhow::Error::from_boxed)
        .context("Failed to load the telemetry configuration")?;

    let tracer_provider = telemetry::setup(&telemetry_config, &http_tracing.service_name)?;

    // Handler-level `tracing` spans end up as children of the request spans
    let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer_provider.tracer("demo"));
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .with(otel_layer)
        .init();

    let handler = handler_fn(|writer: &mut dyn ResponseWriter, request: Request<Incoming>| {
        Box::pin(async move {
            let span = tracing::info_span!("render", path = request.uri().path());
            let body = span.in_scope(|| {
                tracing::info!("Rendering the response");
                format!("Hello from {}\n", request.uri().path())
            });

            writer
                .headers_mut()
                .insert(CONTENT_TYPE, http::HeaderValue::from_static("text/plain"));
            writer.write_header(StatusCode::OK);
            if let Err(e) = writer.write_all(body.as_bytes()) {
                tracing::warn!(
                    error = &e as &dyn std::error::Error,
                    "Failed to write the response"
                );
            }
        })
    });

    let traced = http_tracing.layer([]).layer(handler);
    let server = Server::bind((Ipv4Addr::LOCALHOST, 3000), HandlerService::new(traced)).await?;
    tracing::info!(
        service.name = %http_tracing.service_name,
        "Listening on http://{}",
        server.local_addr()?
    );

    let hard_shutdown = CancellationToken::new();
    let soft_shutdown = hard_shutdown.child_token();

    {
        let hard_shutdown = hard_shutdown.clone();
        let soft_shutdown = soft_shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_err() {
                return;
            }
            tracing::info!("Ctrl-C received, performing soft-shutdown");
            soft_shutdown.cancel();
            if tokio::signal::ctrl_c().await.is_err() {
                return;
            }
            tracing::info!("Ctrl-C received again, shutting down");
            hard_shutdown.cancel();
        });
    }

    server.run(soft_shutdown, hard_shutdown).await;

    telemetry::shutdown()
}
