//! Runtime configuration parsing.

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

pub use crate::contract::IntegrityConfig;

/// Runtime configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Load-time integrity checks.
    pub integrity: IntegrityConfig,
    /// Log subscriber settings, used by `subscriber::init`.
    pub logging: LoggingConfig,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive (e.g. "info" or "ffi_contract=trace").
    pub level: String,
    pub format: LogFormat,
    /// "stdout", "stderr", or a file path opened in append mode.
    pub output: String,
    pub timestamps: bool,
    /// Include the event target.
    pub target: bool,
    /// ANSI colors, only when writing to a terminal.
    pub color: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
            output: "stderr".to_string(),
            timestamps: true,
            target: true,
            color: true,
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|source| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            source,
        })?;
        Self::from_str(&content)
    }

    /// Parse configuration from a TOML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(ConfigError::Parse)
    }
}

/// Configuration error.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// IO error reading config file.
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// TOML parse error.
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}
