// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use std::sync::{Arc, LazyLock};

use http::HeaderMap;
use opentelemetry::{
    Context, InstrumentationScope,
    propagation::TextMapPropagator,
    trace::{SpanBuilder, TraceContextExt, Tracer, TracerProvider},
};
use opentelemetry_http::HeaderExtractor;
use opentelemetry_semantic_conventions as semcov;

/// The instrumentation name under which spans are produced
pub const INSTRUMENTATION_NAME: &str = env!("CARGO_PKG_NAME");

/// The instrumentation version under which spans are produced
pub const INSTRUMENTATION_VERSION: &str = env!("CARGO_PKG_VERSION");

static SCOPE: LazyLock<InstrumentationScope> = LazyLock::new(|| {
    InstrumentationScope::builder(INSTRUMENTATION_NAME)
        .with_version(INSTRUMENTATION_VERSION)
        .with_schema_url(semcov::SCHEMA_URL)
        .build()
});

/// Object-safe view of a [`Tracer`], starting spans as children of a context
/// and returning the context carrying the new span
pub(crate) trait StartSpan: Send + Sync {
    fn start(&self, builder: SpanBuilder, parent: &Context) -> Context;
}

impl<T> StartSpan for T
where
    T: Tracer + Send + Sync,
    T::Span: Send + Sync + 'static,
{
    fn start(&self, builder: SpanBuilder, parent: &Context) -> Context {
        let span = self.build_with_context(builder, parent);
        parent.with_span(span)
    }
}

/// Object-safe view of a [`TracerProvider`]
pub(crate) trait ProvideTracer: Send + Sync {
    fn scoped_tracer(&self) -> Arc<dyn StartSpan>;
}

impl<P> ProvideTracer for P
where
    P: TracerProvider + Send + Sync,
    P::Tracer: Send + Sync + 'static,
    <P::Tracer as Tracer>::Span: Send + Sync + 'static,
{
    fn scoped_tracer(&self) -> Arc<dyn StartSpan> {
        Arc::new(self.tracer_with_scope(SCOPE.clone()))
    }
}

/// Resolve the tracer from the given provider, or from the global one
pub(crate) fn resolve_tracer(provider: Option<&Arc<dyn ProvideTracer>>) -> Arc<dyn StartSpan> {
    match provider {
        Some(provider) => provider.scoped_tracer(),
        None => opentelemetry::global::tracer_provider().scoped_tracer(),
    }
}

/// Where the propagator comes from.
///
/// The global propagator is looked up on every request, so that it can be
/// installed after the middleware.
#[derive(Clone)]
pub(crate) enum Propagation {
    Configured(Arc<dyn TextMapPropagator + Send + Sync>),
    Global,
}

impl Propagation {
    pub(crate) fn new(propagator: Option<&Arc<dyn TextMapPropagator + Send + Sync>>) -> Self {
        propagator.map_or(Self::Global, |propagator| {
            Self::Configured(Arc::clone(propagator))
        })
    }

    /// Extract the upstream trace context from the headers, on top of `base`
    pub(crate) fn extract(&self, base: &Context, headers: &HeaderMap) -> Context {
        let extractor = HeaderExtractor(headers);
        match self {
            Self::Configured(propagator) => propagator.extract_with_context(base, &extractor),
            Self::Global => opentelemetry::global::get_text_map_propagator(|propagator| {
                propagator.extract_with_context(base, &extractor)
            }),
        }
    }
}
