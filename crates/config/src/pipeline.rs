//! Conversation pipeline configuration
//!
//! Audio rates, interruption handling, turn sequencing and language switching.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Audio format configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Sample rate required by the transport/room (Hz)
    #[serde(default = "default_transport_rate")]
    pub transport_sample_rate: u32,

    /// Sample rate produced by the TTS collaborator (Hz)
    #[serde(default = "default_tts_rate")]
    pub tts_sample_rate: u32,

    /// Sample rate the STT collaborator expects (Hz)
    #[serde(default = "default_stt_rate")]
    pub stt_sample_rate: u32,
}

fn default_transport_rate() -> u32 {
    48000
}
fn default_tts_rate() -> u32 {
    24000
}
fn default_stt_rate() -> u32 {
    16000
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            transport_sample_rate: default_transport_rate(),
            tts_sample_rate: default_tts_rate(),
            stt_sample_rate: default_stt_rate(),
        }
    }
}

/// Interruption (barge-in) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterruptionConfig {
    /// Ignore speech-start within this interval of the last handled interruption
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Audio allowed to be outstanding at the transport; the rest is buffered locally
    #[serde(default = "default_max_in_flight_ms")]
    pub max_in_flight_ms: u32,

    /// Extra attempts when the cancel instruction fails
    #[serde(default = "default_cancel_retries")]
    pub cancel_retries: u32,
}

fn default_debounce_ms() -> u64 {
    100
}
fn default_max_in_flight_ms() -> u32 {
    200
}
fn default_cancel_retries() -> u32 {
    1
}

impl InterruptionConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Default for InterruptionConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            max_in_flight_ms: default_max_in_flight_ms(),
            cancel_retries: default_cancel_retries(),
        }
    }
}

/// Conversation sequencer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequencerConfig {
    /// How long a final assistant turn waits for its causal user turn
    /// before flushing anyway
    #[serde(default = "default_hold_timeout_ms")]
    pub hold_timeout_ms: u64,

    /// Maximum out-of-order fragments buffered per role
    #[serde(default = "default_max_buffered")]
    pub max_buffered_fragments: usize,
}

fn default_hold_timeout_ms() -> u64 {
    100
}
fn default_max_buffered() -> usize {
    256
}

impl SequencerConfig {
    pub fn hold_timeout(&self) -> Duration {
        Duration::from_millis(self.hold_timeout_ms)
    }
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            hold_timeout_ms: default_hold_timeout_ms(),
            max_buffered_fragments: default_max_buffered(),
        }
    }
}

/// Language context configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageConfig {
    /// Language a new session starts in (ISO 639-1)
    #[serde(default = "default_language")]
    pub default_language: String,

    /// Minimum confidence to switch to a different language
    #[serde(default = "default_switch_threshold")]
    pub switch_threshold: f32,

    /// Below this, even a same-language detection asks for clarification
    #[serde(default = "default_low_threshold")]
    pub low_threshold: f32,

    /// Number of recent user fragments scanned for entities on a switch
    #[serde(default = "default_entity_window")]
    pub entity_window: usize,
}

fn default_language() -> String {
    "en".to_string()
}
fn default_switch_threshold() -> f32 {
    0.8
}
fn default_low_threshold() -> f32 {
    0.5
}
fn default_entity_window() -> usize {
    5
}

impl Default for LanguageConfig {
    fn default() -> Self {
        Self {
            default_language: default_language(),
            switch_threshold: default_switch_threshold(),
            low_threshold: default_low_threshold(),
            entity_window: default_entity_window(),
        }
    }
}
