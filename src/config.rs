//! YAML configuration for the batch load run.
//!
//! ## Example YAML Configuration
//!
//! ```yaml
//! version: "1.0"
//! name: "nightly gcn results"
//!
//! index_template: "pred-result-{dt}"
//! input: "predictions.jsonl"
//!
//! backend: "opensearch"
//! opensearch:
//!   host: "localhost"
//!   port: 9200
//!
//! readiness:
//!   max_attempts: 30
//!   interval: 2000
//!
//! bulk:
//!   chunk_size: 50
//!   max_failure_ratio: 0.01
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use index::{
    BackendConfig, BackendKind, BulkOptions, OpenSearchConfig, ReadinessConfig,
    DEFAULT_INDEX_TEMPLATE,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when loading YAML configuration files
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("unsupported config version: {0}")]
    UnsupportedVersion(String),
}

/// Settings for one load run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadConfig {
    /// Configuration format version
    #[serde(default = "default_config_version")]
    pub version: String,

    /// Optional configuration name/description
    #[serde(default)]
    pub name: Option<String>,

    /// Index name; `{dt}` becomes the generation timestamp
    #[serde(default = "default_index_template")]
    pub index_template: String,

    /// JSON-lines file of prediction records
    #[serde(default)]
    pub input: Option<PathBuf>,

    #[serde(default)]
    pub backend: BackendKind,

    #[serde(default)]
    pub opensearch: OpenSearchConfig,

    #[serde(default)]
    pub readiness: ReadinessConfig,

    #[serde(default)]
    pub bulk: BulkOptions,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl LoadConfig {
    /// Load a YAML configuration file from the given path
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse YAML configuration from a string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigLoadError> {
        let config: LoadConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `OPENSEARCH_HOST` / `OPENSEARCH_PORT` style overrides.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigLoadError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("OPENSEARCH_HOST") {
            self.opensearch.host = host;
        }
        if let Some(port) = lookup("OPENSEARCH_PORT") {
            self.opensearch.port = port.parse().map_err(|_| {
                ConfigLoadError::Validation(format!("OPENSEARCH_PORT is not a port: {port}"))
            })?;
        }
        Ok(self)
    }

    pub fn backend_config(&self) -> BackendConfig {
        BackendConfig::from_kind(self.backend, &self.opensearch)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        match self.version.as_str() {
            "1.0" | "1" => Ok(()),
            v => Err(ConfigLoadError::UnsupportedVersion(v.to_string())),
        }?;

        if self.index_template.trim().is_empty() {
            return Err(ConfigLoadError::Validation(
                "index_template must not be empty".to_string(),
            ));
        }
        if self.bulk.chunk_size == 0 {
            return Err(ConfigLoadError::Validation(
                "bulk.chunk_size must be >= 1".to_string(),
            ));
        }
        if let Some(ratio) = self.bulk.max_failure_ratio {
            if !(0.0..=1.0).contains(&ratio) {
                return Err(ConfigLoadError::Validation(format!(
                    "bulk.max_failure_ratio must be within [0, 1], got {ratio}"
                )));
            }
        }
        if self.readiness.max_attempts == 0 {
            return Err(ConfigLoadError::Validation(
                "readiness.max_attempts must be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            version: default_config_version(),
            name: None,
            index_template: default_index_template(),
            input: None,
            backend: BackendKind::default(),
            opensearch: OpenSearchConfig::default(),
            readiness: ReadinessConfig::default(),
            bulk: BulkOptions::default(),
            log_level: default_log_level(),
        }
    }
}

fn default_config_version() -> String {
    "1.0".to_string()
}

fn default_index_template() -> String {
    DEFAULT_INDEX_TEMPLATE.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}
