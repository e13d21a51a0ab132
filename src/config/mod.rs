//! Configuration parsing for the store connection and index mapping.
//!
//! Handles loading connection settings from YAML files (with environment
//! variable interpolation) and the opaque index mapping JSON consumed at
//! destination creation time.

mod vars;

use serde::Deserialize;
use snafu::prelude::*;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use url::Url;

use crate::error::{
    ConfigError, EnvInterpolationSnafu, InvalidEndpointSnafu, MappingNotObjectSnafu,
    MappingParseSnafu, MissingEndpointSnafu, ReadFileSnafu, ReadMappingSnafu, YamlParseSnafu,
};

/// Connection settings for the external search store.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreSettings {
    /// Base endpoint URL, e.g. "https://localhost:9200".
    pub endpoint: String,

    /// Extra headers sent with every request.
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Basic auth user name.
    #[serde(default)]
    pub user: Option<String>,

    /// Basic auth password.
    #[serde(default)]
    pub password: Option<String>,

    /// API key; takes precedence over basic auth when set.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Whether to verify TLS certificates (default: true).
    #[serde(default = "default_ssl_verify")]
    pub ssl_verify: bool,

    /// Optional PEM file with an additional trusted root certificate.
    #[serde(default)]
    pub ca_file: Option<PathBuf>,
}

fn default_ssl_verify() -> bool {
    true
}

impl StoreSettings {
    /// Load settings from a YAML file, interpolating environment variables.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).context(ReadFileSnafu {
            path: path.display().to_string(),
        })?;

        let result = vars::interpolate(&content);
        if !result.is_ok() {
            let message = result.errors.join("\n");
            return EnvInterpolationSnafu { message }.fail();
        }

        let mut settings: StoreSettings =
            serde_yaml::from_str(&result.text).context(YamlParseSnafu)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate and normalize the settings.
    fn validate(&mut self) -> Result<(), ConfigError> {
        self.endpoint = self.endpoint.trim().to_string();
        ensure!(!self.endpoint.is_empty(), MissingEndpointSnafu);
        Url::parse(&self.endpoint).context(InvalidEndpointSnafu {
            endpoint: self.endpoint.clone(),
        })?;

        self.user = normalize(self.user.take());
        self.password = normalize(self.password.take());
        self.api_key = normalize(self.api_key.take());
        Ok(())
    }
}

/// Blank-after-trim optional strings become `None`.
fn normalize(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Load the index mapping definition. The contents are opaque to the
/// pipeline; they are handed to the store verbatim at index creation.
pub fn load_mapping(path: impl AsRef<Path>) -> Result<serde_json::Value, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).context(ReadMappingSnafu {
        path: path.display().to_string(),
    })?;
    let mapping: serde_json::Value = serde_json::from_str(&content).context(MappingParseSnafu)?;
    ensure!(mapping.is_object(), MappingNotObjectSnafu);
    Ok(mapping)
}
