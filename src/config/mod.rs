//! Configuration module for Wave Uploadr
//!
//! Handles loading and parsing of YAML configuration files with support for
//! environment variable expansion and validation. Storage credentials live
//! here as plain fields and are handed to the adapters explicitly; nothing
//! below the config layer reads the process environment.

use crate::upload::form::DEFAULT_MEMORY_LIMIT;
use crate::upload::UploadRules;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Config {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        ConfigLoader::load(path)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.server.upload_path.starts_with('/') {
            return Err(ConfigError::ValidationError(format!(
                "upload_path '{}' must start with '/'",
                self.server.upload_path
            )));
        }

        match self.storage.backend {
            StorageBackend::S3 => {
                let s3 = self.storage.s3.as_ref().ok_or_else(|| {
                    ConfigError::ValidationError(
                        "storage.s3 section is required for the s3 backend".into(),
                    )
                })?;
                if s3.bucket.trim().is_empty() {
                    return Err(ConfigError::ValidationError(
                        "storage.s3.bucket cannot be empty".into(),
                    ));
                }
                if s3.access_key.is_some() != s3.secret_key.is_some() {
                    return Err(ConfigError::ValidationError(
                        "storage.s3.access_key and secret_key must be set together".into(),
                    ));
                }
                if let Some(ref endpoint) = s3.endpoint {
                    if !is_valid_http_url(endpoint) {
                        return Err(ConfigError::ValidationError(format!(
                            "Invalid S3 endpoint '{}': must start with http:// or https://",
                            endpoint
                        )));
                    }
                }
            }
            StorageBackend::Local => {
                if self.storage.local.is_none() {
                    return Err(ConfigError::ValidationError(
                        "storage.local section is required for the local backend".into(),
                    ));
                }
            }
        }

        if self.upload.field_name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "upload.field_name cannot be empty".into(),
            ));
        }

        if self.upload.memory_limit == 0 {
            return Err(ConfigError::ValidationError(
                "upload.memory_limit must be greater than zero".into(),
            ));
        }

        if self.upload.rules.max_size == Some(0) {
            return Err(ConfigError::ValidationError(
                "upload.rules.max_size must be greater than zero".into(),
            ));
        }

        Ok(())
    }
}

/// Validate that a URL starts with http:// or https://
fn is_valid_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub address: String,
    #[serde(default = "default_upload_path")]
    pub upload_path: String,
}

fn default_upload_path() -> String {
    "/upload".to_string()
}

/// Which adapter receives uploads
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    S3,
    Local,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    #[serde(default)]
    pub s3: Option<S3Config>,
    #[serde(default)]
    pub local: Option<LocalConfig>,
}

/// S3 backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    pub bucket: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub access_key: Option<String>,
    #[serde(default)]
    pub secret_key: Option<String>,
    /// Create the bucket (public-read) when it does not exist
    #[serde(default = "default_create_bucket")]
    pub create_bucket: bool,
}

impl S3Config {
    /// Drop keys still holding an unexpanded `${VAR}` placeholder, so an
    /// unset variable falls back to the SDK's default credential chain
    pub fn clear_unexpanded_credentials(&mut self) {
        for key in [&mut self.access_key, &mut self.secret_key] {
            if key.as_deref().is_some_and(|value| value.contains("${")) {
                *key = None;
            }
        }
    }
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_create_bucket() -> bool {
    true
}

/// Local directory backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalConfig {
    pub root: PathBuf,
}

/// Upload pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    #[serde(default = "default_field_name")]
    pub field_name: String,
    #[serde(default = "default_memory_limit")]
    pub memory_limit: usize,
    #[serde(default)]
    pub rules: UploadRules,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            field_name: default_field_name(),
            memory_limit: default_memory_limit(),
            rules: UploadRules::default(),
        }
    }
}

fn default_field_name() -> String {
    "File".to_string()
}

fn default_memory_limit() -> usize {
    DEFAULT_MEMORY_LIMIT
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
        }
    }
}

fn default_metrics_enabled() -> bool {
    true
}
