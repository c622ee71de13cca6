//! Configuration for the redub dubbing pipeline.
//!
//! Supports loading from:
//! - TOML/YAML files
//! - Environment variables (`REDUB_` prefix, `__` section separator)
//! - Defaults baked into every section

pub mod settings;

pub use settings::{
    FitConfig, OutputConfig, QaConfig, RebalanceConfig, Settings, SubtitleEmbed, TtsBackendKind,
    TtsConfig,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    #[error("failed to parse configuration: {0}")]
    ParseError(String),

    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

impl From<ConfigError> for redub_core::Error {
    fn from(err: ConfigError) -> Self {
        redub_core::Error::InvalidInput(err.to_string())
    }
}
