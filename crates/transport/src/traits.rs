//! Transport Traits
//!
//! Abstract interface for the room/transport collaborator.

use async_trait::async_trait;

use skyvoice_core::{AudioFrame, SampleRate, TurnId};

use crate::{DataMessage, TransportError};

/// Event delivered by the transport (room + VAD)
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Participant joined
    Connected {
        participant: String,
    },
    /// VAD detected the participant starting to speak
    SpeechStarted,
    /// VAD detected the participant stopping
    SpeechEnded,
    /// The transport finished playing out this many samples of assistant audio
    FramePlayed {
        samples: u64,
    },
    /// Inbound participant audio
    ParticipantAudio(AudioFrame),
    /// Participant left or the connection dropped
    Disconnected {
        reason: String,
    },
}

/// Outbound side of the transport
///
/// Implementations must be cheap to call from the session loop; anything
/// slow belongs behind a channel (see `ChannelTransport`).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Publish one frame of assistant audio (already at `sample_rate()`)
    async fn publish_audio(&self, frame: AudioFrame) -> Result<(), TransportError>;

    /// Cancel the active generation
    async fn cancel_generation(&self, item_id: &TurnId) -> Result<(), TransportError>;

    /// Truncate an item's committed audio at `audio_end_ms`
    async fn truncate_item(&self, item_id: &TurnId, audio_end_ms: f64) -> Result<(), TransportError>;

    /// Send a JSON message on the UI data channel
    async fn send_data(&self, message: &DataMessage) -> Result<(), TransportError>;

    /// Sample rate the transport requires
    fn sample_rate(&self) -> SampleRate;
}
