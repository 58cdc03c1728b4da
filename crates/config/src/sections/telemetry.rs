// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize, de::Error as _};
use serde_with::skip_serializing_none;

use super::ConfigurationSection;
use crate::ConfigError;

fn sample_rate_example() -> f64 {
    0.5
}

fn default_propagators() -> Vec<Propagator> {
    vec![Propagator::TraceContext]
}

/// Propagation format for incoming requests
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Propagator {
    /// Propagate according to the W3C Trace Context specification
    TraceContext,

    /// Propagate according to the W3C Baggage specification
    Baggage,
}

/// Exporter to use when exporting traces
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TracingExporterKind {
    /// Don't export traces
    #[default]
    None,

    /// Export traces to the standard output. Only useful for debugging
    Stdout,
}

/// Configuration related to exporting traces
#[skip_serializing_none]
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct TelemetryConfig {
    /// Exporter to use when exporting traces
    #[serde(default)]
    pub exporter: TracingExporterKind,

    /// List of propagation formats to use for incoming requests
    ///
    /// Defaults to `[tracecontext]`. An empty list disables extraction.
    #[serde(default = "default_propagators")]
    pub propagators: Vec<Propagator>,

    /// Sample rate for traces
    ///
    /// Defaults to `1.0` if not set.
    #[schemars(example = "sample_rate_example", range(min = 0.0, max = 1.0))]
    pub sample_rate: Option<f64>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            exporter: TracingExporterKind::default(),
            propagators: default_propagators(),
            sample_rate: None,
        }
    }
}

impl TelemetryConfig {
    /// Returns true if all fields are at their default values
    pub(crate) fn is_default(&self) -> bool {
        self.exporter == TracingExporterKind::None
            && self.propagators == default_propagators()
            && self.sample_rate.is_none()
    }

    /// The sample rate, `1.0` if not set
    #[must_use]
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate.unwrap_or(1.0)
    }
}

impl ConfigurationSection for TelemetryConfig {
    const PATH: Option<&'static str> = Some("telemetry");

    fn validate(&self, _figment: &figment::Figment) -> Result<(), ConfigError> {
        if let Some(sample_rate) = self.sample_rate
            && !(0.0..=1.0).contains(&sample_rate)
        {
            return Err(figment::error::Error::custom(
                "Tracing sample rate must be between 0.0 and 1.0",
            )
            .with_path("sample_rate")
            .into());
        }

        Ok(())
    }
}
