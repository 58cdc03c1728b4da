// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use std::sync::Arc;

use opentelemetry::{
    propagation::TextMapPropagator,
    trace::{Tracer, TracerProvider},
};

use crate::{Filter, SpanNameFormatter, tracer::ProvideTracer};

/// The collaborators of the tracing middleware.
///
/// Unset collaborators fall back to the global OpenTelemetry ones. The span
/// name formatter always has a value.
#[derive(Clone, Default)]
pub struct Config {
    pub(crate) tracer_provider: Option<Arc<dyn ProvideTracer>>,
    pub(crate) propagator: Option<Arc<dyn TextMapPropagator + Send + Sync>>,
    pub(crate) filter: Option<Filter>,
    pub(crate) span_name_formatter: SpanNameFormatter,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("tracer_provider", &self.tracer_provider.is_some())
            .field("propagator", &self.propagator.is_some())
            .field("filter", &self.filter)
            .field("span_name_formatter", &self.span_name_formatter)
            .finish()
    }
}

impl Config {
    /// Build a configuration by applying the options in order, on top of the
    /// defaults
    #[must_use]
    pub fn new(options: impl IntoIterator<Item = TraceOption>) -> Self {
        let mut config = Self::default();
        for option in options {
            option.apply(&mut config);
        }
        config
    }

    #[must_use]
    pub fn has_tracer_provider(&self) -> bool {
        self.tracer_provider.is_some()
    }

    #[must_use]
    pub fn has_propagator(&self) -> bool {
        self.propagator.is_some()
    }

    #[must_use]
    pub fn filter(&self) -> Option<&Filter> {
        self.filter.as_ref()
    }

    #[must_use]
    pub fn span_name_formatter(&self) -> &SpanNameFormatter {
        &self.span_name_formatter
    }
}

/// A change to a [`Config`].
///
/// When two options set the same collaborator, the last one applied wins.
pub struct TraceOption(Box<dyn FnOnce(&mut Config) + Send>);

impl std::fmt::Debug for TraceOption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceOption").finish_non_exhaustive()
    }
}

impl TraceOption {
    pub fn new<F>(apply: F) -> Self
    where
        F: FnOnce(&mut Config) + Send + 'static,
    {
        Self(Box::new(apply))
    }

    pub fn apply(self, config: &mut Config) {
        (self.0)(config);
    }
}

/// Use this tracer provider instead of the global one
pub fn with_tracer_provider<P>(provider: P) -> TraceOption
where
    P: TracerProvider + Send + Sync + 'static,
    P::Tracer: Send + Sync + 'static,
    <P::Tracer as Tracer>::Span: Send + Sync + 'static,
{
    let provider: Arc<dyn ProvideTracer> = Arc::new(provider);
    TraceOption::new(move |config| config.tracer_provider = Some(provider))
}

/// Use this propagator instead of the global one
pub fn with_propagator<P>(propagator: P) -> TraceOption
where
    P: TextMapPropagator + Send + Sync + 'static,
{
    let propagator: Arc<dyn TextMapPropagator + Send + Sync> = Arc::new(propagator);
    TraceOption::new(move |config| config.propagator = Some(propagator))
}

/// Only trace the requests this filter accepts
#[must_use]
pub fn with_filter(filter: Filter) -> TraceOption {
    TraceOption::new(move |config| config.filter = Some(filter))
}

/// Name the spans with this formatter
#[must_use]
pub fn with_span_name_formatter(formatter: SpanNameFormatter) -> TraceOption {
    TraceOption::new(move |config| config.span_name_formatter = formatter)
}
