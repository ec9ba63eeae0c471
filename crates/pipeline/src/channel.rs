//! Channel-backed pipeline handle

use async_trait::async_trait;
use tokio::sync::mpsc;

use skyvoice_core::AudioFrame;

use crate::traits::{GenerateRequest, SpeechPipeline};
use crate::PipelineError;

/// Instruction sent to the pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineCommand {
    Generate(GenerateRequest),
    Cancel,
    Audio(AudioFrame),
}

/// `SpeechPipeline` that forwards requests over an mpsc channel
#[derive(Clone)]
pub struct ChannelPipeline {
    tx: mpsc::Sender<PipelineCommand>,
}

impl ChannelPipeline {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<PipelineCommand>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl SpeechPipeline for ChannelPipeline {
    async fn generate(&self, request: GenerateRequest) -> Result<(), PipelineError> {
        self.tx
            .send(PipelineCommand::Generate(request))
            .await
            .map_err(|_| PipelineError::ChannelClosed)
    }

    async fn cancel(&self) -> Result<(), PipelineError> {
        self.tx
            .send(PipelineCommand::Cancel)
            .await
            .map_err(|_| PipelineError::ChannelClosed)
    }

    async fn push_audio(&self, frame: AudioFrame) -> Result<(), PipelineError> {
        self.tx
            .send(PipelineCommand::Audio(frame))
            .await
            .map_err(|_| PipelineError::ChannelClosed)
    }
}
