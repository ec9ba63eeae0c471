//! Configuration management for the voice front-end
//!
//! Supports loading configuration from:
//! - TOML/YAML files under `config/`
//! - Environment variables (`SKYVOICE__` prefix, `__` separator)
//! - Programmatic overrides via the public structs

pub mod pipeline;
pub mod session;
pub mod settings;
pub mod telemetry;

pub use pipeline::{AudioConfig, InterruptionConfig, LanguageConfig, SequencerConfig};
pub use session::{SessionConfig, ToolConfig};
pub use settings::{load_settings, ObservabilityConfig, Settings};
pub use telemetry::init_tracing;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Tracing initialization failed: {0}")]
    Telemetry(String),
}

impl ConfigError {
    pub(crate) fn invalid(field: &str, message: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}
