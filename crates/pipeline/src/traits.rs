//! Speech pipeline collaborator interface

use async_trait::async_trait;

use skyvoice_core::{AudioFrame, Language, TurnFragment, TurnId};

use crate::PipelineError;

/// What the pipeline should say next
#[derive(Debug, Clone, PartialEq)]
pub enum GenerateRequest {
    /// Speak this text verbatim
    Text { text: String, language: Language },
    /// Let the language model respond following these instructions
    Instructions {
        instructions: String,
        language: Language,
    },
}

impl GenerateRequest {
    pub fn text(text: impl Into<String>, language: Language) -> Self {
        GenerateRequest::Text {
            text: text.into(),
            language,
        }
    }

    pub fn instructions(instructions: impl Into<String>, language: Language) -> Self {
        GenerateRequest::Instructions {
            instructions: instructions.into(),
            language,
        }
    }

    pub fn language(&self) -> &Language {
        match self {
            GenerateRequest::Text { language, .. } | GenerateRequest::Instructions { language, .. } => language,
        }
    }
}

/// Events delivered by the STT/LLM/TTS pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// Transcript or response text fragment
    Fragment(TurnFragment),
    /// Detected language of a finalized user utterance
    UtteranceLanguage {
        turn_id: TurnId,
        language: Language,
        confidence: f32,
    },
    /// TTS started producing audio for an assistant item
    SynthesisStarted { item_id: TurnId },
    /// Synthesized audio at the TTS rate
    SynthesisChunk { item_id: TurnId, frame: AudioFrame },
    /// TTS finished the item
    SynthesisComplete { item_id: TurnId },
    /// The language model wants the flight-search tool
    ToolCallRequested {
        call_id: String,
        arguments: serde_json::Value,
    },
    /// STT/LLM/TTS failure
    Error(PipelineError),
}

/// Control side of the STT/LLM/TTS pipeline
#[async_trait]
pub trait SpeechPipeline: Send + Sync {
    /// Start a new assistant response
    async fn generate(&self, request: GenerateRequest) -> Result<(), PipelineError>;

    /// Stop the active response (LLM and TTS)
    async fn cancel(&self) -> Result<(), PipelineError>;

    /// Feed participant audio (at the STT rate) to speech recognition
    async fn push_audio(&self, frame: AudioFrame) -> Result<(), PipelineError>;
}
