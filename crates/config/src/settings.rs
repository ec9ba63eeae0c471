//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::{
    AudioConfig, ConfigError, InterruptionConfig, LanguageConfig, SequencerConfig, SessionConfig,
    ToolConfig,
};

/// Main application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub audio: AudioConfig,

    #[serde(default)]
    pub interruption: InterruptionConfig,

    #[serde(default)]
    pub sequencer: SequencerConfig,

    #[serde(default)]
    pub language: LanguageConfig,

    #[serde(default)]
    pub tool: ToolConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

const SUPPORTED_RATES: [u32; 6] = [8000, 16000, 22050, 24000, 44100, 48000];

impl Settings {
    /// Create default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, rate) in [
            ("audio.transport_sample_rate", self.audio.transport_sample_rate),
            ("audio.tts_sample_rate", self.audio.tts_sample_rate),
            ("audio.stt_sample_rate", self.audio.stt_sample_rate),
        ] {
            if !SUPPORTED_RATES.contains(&rate) {
                return Err(ConfigError::invalid(
                    field,
                    format!("unsupported sample rate {}", rate),
                ));
            }
        }

        let language = &self.language;
        if !(0.0..=1.0).contains(&language.switch_threshold) {
            return Err(ConfigError::invalid(
                "language.switch_threshold",
                "must be within 0.0..=1.0",
            ));
        }
        if !(0.0..=1.0).contains(&language.low_threshold) || language.low_threshold > language.switch_threshold {
            return Err(ConfigError::invalid(
                "language.low_threshold",
                "must be within 0.0..=switch_threshold",
            ));
        }
        if language.entity_window == 0 {
            return Err(ConfigError::invalid("language.entity_window", "must be at least 1"));
        }

        if self.tool.timeout_ms == 0 {
            return Err(ConfigError::invalid("tool.timeout_ms", "must be positive"));
        }
        if self.tool.failure_threshold == 0 {
            return Err(ConfigError::invalid("tool.failure_threshold", "must be at least 1"));
        }

        if self.session.channel_capacity == 0 {
            return Err(ConfigError::invalid("session.channel_capacity", "must be at least 1"));
        }

        if self.sequencer.hold_timeout_ms > 1000 {
            tracing::warn!(
                hold_timeout_ms = self.sequencer.hold_timeout_ms,
                "Hold timeout above one second will delay silent assistant turns noticeably"
            );
        }

        Ok(())
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub log_json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
        }
    }
}

/// Load settings from files and environment
///
/// Priority (highest to lowest):
/// 1. Environment variables (`SKYVOICE__SECTION__FIELD`)
/// 2. config/{env}.{toml,yaml} (if env specified)
/// 3. config/default.{toml,yaml}
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::with_name("config/default").required(false));

    if let Some(env_name) = env {
        builder = builder.add_source(File::with_name(&format!("config/{}", env_name)).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("SKYVOICE")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    Ok(settings)
}
