// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

mod http_tracing;
mod telemetry;

pub use self::{
    http_tracing::HttpTracingConfig,
    telemetry::{Propagator, TelemetryConfig, TracingExporterKind},
};
use crate::{ConfigError, util::ConfigurationSection};

/// Configuration root
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct RootConfig {
    /// Configuration of the HTTP request tracing middleware
    #[serde(default, skip_serializing_if = "HttpTracingConfig::is_default")]
    pub http_tracing: HttpTracingConfig,

    /// Configuration related to exporting traces
    #[serde(default, skip_serializing_if = "TelemetryConfig::is_default")]
    pub telemetry: TelemetryConfig,
}

impl ConfigurationSection for RootConfig {
    fn validate(&self, figment: &figment::Figment) -> Result<(), ConfigError> {
        self.http_tracing.validate(figment)?;
        self.telemetry.validate(figment)?;

        Ok(())
    }
}
