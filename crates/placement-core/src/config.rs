//! Application configuration for the placement engine.
//!
//! Supports:
//! - Loading from YAML files
//! - Environment variable overrides (`PLACEMENT__<SECTION>__<KEY>`)
//! - Validation of all settings

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::Level;

/// Main application configuration.
///
/// # Examples
///
/// ```
/// use placement_core::config::AppConfig;
///
/// let config = AppConfig::from_yaml(r#"
/// placement:
///   definitions: '10:country("us")'
/// "#).unwrap();
/// assert!(config.validate().is_ok());
/// assert!(config.placement.legacy_defaults);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Where placement rules come from
    #[serde(default)]
    pub placement: PlacementSettings,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Creates a new default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::file_not_found(path.display().to_string()).into());
        }
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::LoadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        Self::from_yaml(&contents)
    }

    /// Loads configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML cannot be parsed.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| {
            ConfigError::InvalidFormat {
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// Loads configuration using the `config` crate, layering
    /// `PLACEMENT__*` environment variables over the file.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded or merged.
    pub fn from_config_builder<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let config = config::Config::builder()
            .add_source(config::File::from(path).required(true))
            .add_source(
                config::Environment::with_prefix("PLACEMENT")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigError::LoadFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        config.try_deserialize().map_err(|e| {
            ConfigError::InvalidFormat {
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails.
    pub fn validate(&self) -> Result<()> {
        self.logging.parse_level()?;
        self.placement.validate()?;
        Ok(())
    }
}

/// Sources of placement rules.
///
/// Rules are applied in this order: built-in default, legacy rules (when
/// enabled), the placement file, then the inline definition string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacementSettings {
    /// Inline `id:expression;...` definitions
    #[serde(default)]
    pub definitions: Option<String>,

    /// YAML placement file
    #[serde(default)]
    pub file: Option<PathBuf>,

    /// Whether to register the legacy built-in rules (EU, EEA, US, DE, NR)
    #[serde(default = "default_true")]
    pub legacy_defaults: bool,
}

fn default_true() -> bool {
    true
}

impl Default for PlacementSettings {
    fn default() -> Self {
        Self {
            definitions: None,
            file: None,
            legacy_defaults: true,
        }
    }
}

impl PlacementSettings {
    /// Validates the placement settings.
    pub fn validate(&self) -> Result<()> {
        if let Some(ref file) = self.file {
            if file.as_os_str().is_empty() {
                return Err(ConfigError::invalid_value(
                    "placement.file",
                    "Path cannot be empty",
                )
                .into());
            }
        }
        Ok(())
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "text" or "json"
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> LogFormat {
    LogFormat::Text
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl LoggingConfig {
    /// Parses the log level string to a tracing Level.
    pub fn parse_level(&self) -> Result<Level> {
        self.level.parse().map_err(|_| {
            ConfigError::InvalidValue {
                field: "logging.level".to_string(),
                reason: format!("Invalid log level: {}", self.level),
            }
            .into()
        })
    }
}

/// Log format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format
    Text,
    /// JSON format for structured logging
    Json,
}
