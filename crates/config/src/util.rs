// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::de::DeserializeOwned;

/// Prefix of the environment variables overriding the configuration files
pub const ENV_PREFIX: &str = "TRACEWARE_";

/// Error returned when a configuration section fails to load or validate
pub type ConfigError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Trait implemented by all configuration sections, to load them from a
/// [`Figment`] and check them once loaded.
pub trait ConfigurationSection: Sized + DeserializeOwned {
    /// Where this section lives relative to the root.
    const PATH: Option<&'static str> = None;

    /// Validate the configuration section
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid
    fn validate(&self, _figment: &Figment) -> Result<(), ConfigError> {
        Ok(())
    }

    /// Extract the section from a Figment instance and validate it.
    ///
    /// # Errors
    ///
    /// Returns an error if the section could not be loaded, or is invalid
    fn extract(figment: &Figment) -> Result<Self, ConfigError> {
        let this: Self = if let Some(path) = Self::PATH {
            figment.extract_inner(path)?
        } else {
            figment.extract()?
        };

        this.validate(figment)?;
        Ok(this)
    }
}

/// Extension trait for [`ConfigurationSection`] falling back to the default
/// value when the section is absent.
pub trait ConfigurationSectionExt: ConfigurationSection + Default {
    /// Extract the section from the given [`Figment`], or return the default
    /// value if it is not present.
    ///
    /// # Errors
    ///
    /// Returns an error if the section is present but invalid.
    fn extract_or_default(figment: &Figment) -> Result<Self, ConfigError> {
        let this: Self = if let Some(path) = Self::PATH {
            if !figment.contains(path) {
                return Ok(Self::default());
            }

            figment.extract_inner(path)?
        } else {
            figment.extract()?
        };

        this.validate(figment)?;
        Ok(this)
    }
}

impl<T: ConfigurationSection + Default> ConfigurationSectionExt for T {}

/// Build the configuration sources: the given YAML files, merged in order,
/// then the `TRACEWARE_`-prefixed environment variables.
///
/// Nested keys are separated by a double underscore in environment variables,
/// e.g. `TRACEWARE_HTTP_TRACING__SERVICE_NAME`.
pub fn figment<P: AsRef<Path>>(files: impl IntoIterator<Item = P>) -> Figment {
    files
        .into_iter()
        .fold(Figment::new(), |figment, file| {
            figment.merge(Yaml::file(file.as_ref()))
        })
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
}
