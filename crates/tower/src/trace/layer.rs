// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use std::sync::Arc;

use http::{header::USER_AGENT, request::Parts};
use opentelemetry::{
    Context, KeyValue,
    propagation::TextMapPropagator,
    trace::{SpanBuilder, SpanKind, TraceContextExt, Tracer, TracerProvider},
};
use opentelemetry_semantic_conventions::{
    resource::SERVICE_NAME,
    trace::{HTTP_REQUEST_METHOD, HTTP_ROUTE, URL_PATH, URL_QUERY, USER_AGENT_ORIGINAL},
};
use tower_layer::Layer;

use super::{TracedHandler, guard::SpanGuard};
use crate::{
    Config, Filter, SpanNameFormatter, TraceOption,
    tracer::{Propagation, StartSpan, resolve_tracer},
};

/// A [`Layer`] tracing every request of the handler it wraps.
///
/// The tracer is resolved when the layer is applied to a handler, from the
/// configured provider or from the global one.
#[derive(Debug, Clone)]
pub struct TraceLayer {
    service_name: String,
    config: Config,
}

impl TraceLayer {
    /// Create a layer tagging spans with `service_name`, configured by the
    /// given options
    #[must_use]
    pub fn new(
        service_name: impl Into<String>,
        options: impl IntoIterator<Item = TraceOption>,
    ) -> Self {
        Self::from_config(service_name, Config::new(options))
    }

    #[must_use]
    pub fn from_config(service_name: impl Into<String>, config: Config) -> Self {
        Self {
            service_name: service_name.into(),
            config,
        }
    }

    #[must_use]
    pub fn with_option(mut self, option: TraceOption) -> Self {
        option.apply(&mut self.config);
        self
    }

    #[must_use]
    pub fn with_tracer_provider<P>(self, provider: P) -> Self
    where
        P: TracerProvider + Send + Sync + 'static,
        P::Tracer: Send + Sync + 'static,
        <P::Tracer as Tracer>::Span: Send + Sync + 'static,
    {
        self.with_option(crate::with_tracer_provider(provider))
    }

    #[must_use]
    pub fn with_propagator<P>(self, propagator: P) -> Self
    where
        P: TextMapPropagator + Send + Sync + 'static,
    {
        self.with_option(crate::with_propagator(propagator))
    }

    #[must_use]
    pub fn with_filter(self, filter: Filter) -> Self {
        self.with_option(crate::with_filter(filter))
    }

    #[must_use]
    pub fn with_span_name_formatter(self, formatter: SpanNameFormatter) -> Self {
        self.with_option(crate::with_span_name_formatter(formatter))
    }

    #[must_use]
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl<H> Layer<H> for TraceLayer {
    type Service = TracedHandler<H>;

    fn layer(&self, inner: H) -> Self::Service {
        let shared = Shared {
            service_name: self.service_name.clone(),
            tracer: resolve_tracer(self.config.tracer_provider.as_ref()),
            propagation: Propagation::new(self.config.propagator.as_ref()),
            filter: self.config.filter.clone(),
            span_name_formatter: self.config.span_name_formatter.clone(),
        };

        TracedHandler::new(inner, Arc::new(shared))
    }
}

/// State shared by all the requests going through one [`TracedHandler`]
pub(super) struct Shared {
    service_name: String,
    tracer: Arc<dyn StartSpan>,
    propagation: Propagation,
    filter: Option<Filter>,
    span_name_formatter: SpanNameFormatter,
}

impl Shared {
    pub(super) fn service_name(&self) -> &str {
        &self.service_name
    }

    pub(super) fn should_trace(&self, request: &Parts) -> bool {
        self.filter
            .as_ref()
            .is_none_or(|filter| filter.should_trace(request))
    }

    /// Start the request span and attach its context to the request
    pub(super) fn start_span(&self, request: &mut Parts) -> SpanGuard {
        let base = request
            .extensions
            .get::<Context>()
            .cloned()
            .unwrap_or_else(Context::current);
        let parent = self.propagation.extract(&base, &request.headers);

        let operation = format!("HTTP {}", request.method);
        let name = self.span_name_formatter.format(&operation, request);

        let user_agent = request
            .headers
            .get(USER_AGENT)
            .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
            .unwrap_or_default();
        let path = request.uri.path().to_owned();
        let query = request.uri.query().unwrap_or_default().to_owned();

        tracing::trace!(span.name = %name, %path, "Starting request span");

        let builder = SpanBuilder::from_name(name)
            .with_kind(SpanKind::Server)
            .with_attributes([
                KeyValue::new(HTTP_REQUEST_METHOD, request.method.as_str().to_owned()),
                KeyValue::new(HTTP_ROUTE, path.clone()),
                KeyValue::new(USER_AGENT_ORIGINAL, user_agent),
                KeyValue::new(URL_PATH, path),
                KeyValue::new(URL_QUERY, query),
            ]);

        let cx = self.tracer.start(builder, &parent);
        cx.span()
            .set_attribute(KeyValue::new(SERVICE_NAME, self.service_name.clone()));

        request.extensions.insert(cx.clone());
        SpanGuard::new(cx)
    }
}
