//! Conversation pipeline
//!
//! The STT/LLM/TTS engines are external collaborators reached through the
//! `SpeechPipeline` trait. This crate holds the pure, synchronous pieces the
//! session actor drives with their events:
//! - Interruption (barge-in) control over the local playout buffer
//! - Turn sequencing for the visible conversation log
//! - Language context tracking and entity preservation across switches

pub mod channel;
pub mod entities;
pub mod interruption;
pub mod language;
pub mod sequencer;
pub mod traits;

pub use channel::{ChannelPipeline, PipelineCommand};
pub use entities::EntityExtractor;
pub use interruption::{
    ms_to_samples, samples_to_ms, Interruption, InterruptionController, PlaybackProgress,
    PlaybackState,
};
pub use language::{LanguageContext, LanguageContextManager, LanguageDecision};
pub use sequencer::{Sequencer, SequencerDiagnostic, SequencerOutput};
pub use traits::{GenerateRequest, PipelineEvent, SpeechPipeline};

use thiserror::Error;

/// Pipeline errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error("STT error: {0}")]
    Stt(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("TTS error: {0}")]
    Tts(String),

    #[error("Channel closed")]
    ChannelClosed,

    #[error("Timeout")]
    Timeout,
}

impl From<PipelineError> for skyvoice_core::Error {
    fn from(err: PipelineError) -> Self {
        skyvoice_core::Error::Pipeline(err.to_string())
    }
}
