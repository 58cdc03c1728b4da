// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use figment::error::Error as FigmentError;
use http::Method;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize, de::Error as _};
use traceware_tower::{Filter, TraceLayer, TraceOption, with_filter};

use super::ConfigurationSection;
use crate::ConfigError;

fn default_service_name() -> String {
    "traceware".to_owned()
}

fn service_name_example() -> &'static str {
    "user-api"
}

fn default_true() -> bool {
    true
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_default_true(value: &bool) -> bool {
    *value
}

fn ignored_path_prefixes_example() -> Vec<&'static str> {
    vec!["/static/", "/assets/"]
}

fn ignored_path_suffixes_example() -> Vec<&'static str> {
    vec![".css", ".js", ".ico"]
}

fn ignored_methods_example() -> Vec<&'static str> {
    vec!["OPTIONS", "HEAD"]
}

/// Configuration of the HTTP request tracing middleware
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct HttpTracingConfig {
    /// Name of the service, attached to every request span
    #[serde(default = "default_service_name")]
    #[schemars(example = "service_name_example")]
    pub service_name: String,

    /// Whether requests to the usual health check endpoints (`/health`,
    /// `/healthz`, `/ping`, `/ready`, `/live` and `/metrics`) are left
    /// untraced
    #[serde(default = "default_true", skip_serializing_if = "is_default_true")]
    pub skip_health_checks: bool,

    /// Requests whose path starts with one of those prefixes are not traced
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    #[schemars(example = "ignored_path_prefixes_example")]
    pub ignored_path_prefixes: Vec<String>,

    /// Requests whose path ends with one of those suffixes are not traced
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    #[schemars(example = "ignored_path_suffixes_example")]
    pub ignored_path_suffixes: Vec<String>,

    /// Requests using one of those methods are not traced
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    #[schemars(example = "ignored_methods_example")]
    pub ignored_methods: Vec<String>,
}

impl Default for HttpTracingConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            skip_health_checks: true,
            ignored_path_prefixes: Vec::new(),
            ignored_path_suffixes: Vec::new(),
            ignored_methods: Vec::new(),
        }
    }
}

impl HttpTracingConfig {
    /// Returns true if all fields are at their default values
    pub(crate) fn is_default(&self) -> bool {
        self.service_name == default_service_name()
            && self.skip_health_checks
            && self.ignored_path_prefixes.is_empty()
            && self.ignored_path_suffixes.is_empty()
            && self.ignored_methods.is_empty()
    }

    /// Build the request filter described by this configuration.
    ///
    /// Returns [`None`] if every request should be traced.
    #[must_use]
    pub fn filter(&self) -> Option<Filter> {
        let mut filters = Vec::new();

        if self.skip_health_checks {
            filters.push(Filter::health_check());
        }

        filters.extend(self.ignored_path_prefixes.iter().cloned().map(Filter::path_prefix));
        filters.extend(self.ignored_path_suffixes.iter().cloned().map(Filter::path_suffix));

        // Invalid methods are reported by the validation, so they can be skipped here
        let methods: Vec<Method> = self
            .ignored_methods
            .iter()
            .filter_map(|method| Method::from_bytes(method.as_bytes()).ok())
            .collect();
        if !methods.is_empty() {
            filters.push(Filter::new(move |request| {
                !methods.contains(&request.method)
            }));
        }

        match filters.len() {
            0 => None,
            1 => filters.pop(),
            _ => Some(Filter::all(filters)),
        }
    }

    /// The middleware options described by this configuration
    #[must_use]
    pub fn options(&self) -> Vec<TraceOption> {
        self.filter().map(with_filter).into_iter().collect()
    }

    /// Build a tracing layer from this configuration, with additional options
    /// applied after the configured ones
    #[must_use]
    pub fn layer(&self, extra: impl IntoIterator<Item = TraceOption>) -> TraceLayer {
        let options = self.options().into_iter().chain(extra);
        TraceLayer::new(self.service_name.clone(), options)
    }
}

impl ConfigurationSection for HttpTracingConfig {
    const PATH: Option<&'static str> = Some("http_tracing");

    fn validate(&self, _figment: &figment::Figment) -> Result<(), ConfigError> {
        if self.service_name.trim().is_empty() {
            return Err(FigmentError::custom("The service name must not be empty")
                .with_path("service_name")
                .into());
        }

        for prefix in &self.ignored_path_prefixes {
            if !prefix.starts_with('/') {
                return Err(FigmentError::custom(format!(
                    "Ignored path prefix {prefix:?} must start with a '/'"
                ))
                .with_path("ignored_path_prefixes")
                .into());
            }
        }

        for method in &self.ignored_methods {
            if Method::from_bytes(method.as_bytes()).is_err() {
                return Err(
                    FigmentError::custom(format!("Invalid HTTP method {method:?}"))
                        .with_path("ignored_methods")
                        .into(),
                );
            }
        }

        Ok(())
    }
}
