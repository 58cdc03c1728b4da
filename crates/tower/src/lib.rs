// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

//! OpenTelemetry tracing for [`Handler`](traceware_http::Handler)s.
//!
//! [`TraceLayer`] decorates a handler so that every request it serves gets a
//! server span, parented to the trace context propagated in the request
//! headers, annotated with the request metadata, and finalized with the
//! status code and body size the handler produced.
//!
//! ```
//! use traceware_tower::{Filter, TraceLayer, with_filter};
//! use tower_layer::Layer;
//! # use traceware_http::{handler_fn, ResponseWriter};
//! # let handler = handler_fn(|writer: &mut dyn ResponseWriter, _request: http::Request<()>| {
//! #     Box::pin(async move { writer.write_header(http::StatusCode::OK) })
//! # });
//!
//! let layer = TraceLayer::new("my-service", [with_filter(Filter::health_check())]);
//! let traced = layer.layer(handler);
//! # let _ = traced;
//! ```

#![deny(rustdoc::missing_crate_level_docs)]
#![allow(clippy::module_name_repetitions)]

mod config;
mod context;
mod filter;
mod formatter;
mod observer;
mod trace;
mod tracer;

pub use self::{
    config::{
        Config, TraceOption, with_filter, with_propagator, with_span_name_formatter,
        with_tracer_provider,
    },
    context::RequestContextExt,
    filter::{Filter, HEALTH_CHECK_PATHS},
    formatter::SpanNameFormatter,
    observer::{ResponseObserver, ResponseOutcome},
    trace::{TraceLayer, TracedHandler},
    tracer::{INSTRUMENTATION_NAME, INSTRUMENTATION_VERSION},
};
