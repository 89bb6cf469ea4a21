pub mod validation;

use serde::{Deserialize, Serialize};
use std::fmt;

use self::validation::validate_config;
use crate::normalize::{StreamOptions, DEFAULT_TEXT_BLOCK_ID};

/// Error type for configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Chunk family of the upstream stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    Chat,
    Completion,
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dialect::Chat => write!(f, "chat"),
            Dialect::Completion => write!(f, "completion"),
        }
    }
}

/// Normalizer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    #[serde(default)]
    pub dialect: Dialect,
    /// Key for provider metadata on `finish`.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub include_raw_chunks: bool,
    #[serde(default = "default_text_block_id")]
    pub text_block_id: String,
    /// Read size used when replaying a capture file.
    #[serde(default = "default_read_chunk_size")]
    pub read_chunk_size: usize,
}

fn default_provider() -> String {
    "openai".to_string()
}
fn default_text_block_id() -> String {
    DEFAULT_TEXT_BLOCK_ID.to_string()
}
fn default_read_chunk_size() -> usize {
    8192
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            dialect: Dialect::default(),
            provider: default_provider(),
            include_raw_chunks: false,
            text_block_id: default_text_block_id(),
            read_chunk_size: default_read_chunk_size(),
        }
    }
}

impl StreamConfig {
    /// Normalizer options for one call. Warnings and cancellation are per
    /// call and start empty.
    #[must_use]
    pub fn to_options(&self) -> StreamOptions {
        StreamOptions {
            include_raw_chunks: self.include_raw_chunks,
            text_block_id: self.text_block_id.clone(),
            ..StreamOptions::default()
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "INFO".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Parse configuration from YAML text and validate it.
///
/// # Errors
///
/// Returns [`ConfigError::Yaml`] when parsing fails, or
/// [`ConfigError::Validation`] when semantic validation fails.
pub fn parse_config(contents: &str) -> Result<AppConfig, ConfigError> {
    let config: AppConfig = serde_yaml::from_str(contents)?;
    validate_config(&config)?;
    Ok(config)
}

/// Load configuration from a YAML file and validate it.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when reading the file fails, [`ConfigError::Yaml`]
/// when parsing fails, or [`ConfigError::Validation`] when semantic validation fails.
pub fn load_config(path: &str) -> Result<AppConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    parse_config(&contents)
}
