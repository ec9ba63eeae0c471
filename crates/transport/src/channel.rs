//! Channel-backed transport
//!
//! Forwards every outbound call as a `TransportCommand` on an mpsc channel.
//! The receiving end is whatever actually talks to the room; tests read it
//! directly.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use skyvoice_core::{AudioFrame, SampleRate, TurnId};

use crate::traits::Transport;
use crate::{DataMessage, TransportError};

/// Outbound instruction for the room
#[derive(Debug, Clone, PartialEq)]
pub enum TransportCommand {
    PublishAudio(AudioFrame),
    CancelGeneration { item_id: TurnId },
    TruncateItem { item_id: TurnId, audio_end_ms: f64 },
    SendData(DataMessage),
}

/// Transport that writes commands to a channel
#[derive(Clone)]
pub struct ChannelTransport {
    tx: mpsc::Sender<TransportCommand>,
    sample_rate: SampleRate,
    /// Remaining cancel calls that should fail
    failing_cancels: Arc<Mutex<u32>>,
}

impl ChannelTransport {
    /// Create a transport and the receiver for its commands
    pub fn new(sample_rate: SampleRate, capacity: usize) -> (Self, mpsc::Receiver<TransportCommand>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let transport = Self {
            tx,
            sample_rate,
            failing_cancels: Arc::new(Mutex::new(0)),
        };
        (transport, rx)
    }

    /// Make the next `count` cancel calls fail
    pub fn fail_next_cancels(&self, count: u32) {
        *self.failing_cancels.lock() = count;
    }

    async fn forward(&self, command: TransportCommand) -> Result<(), TransportError> {
        self.tx
            .send(command)
            .await
            .map_err(|_| TransportError::SessionClosed)
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn publish_audio(&self, frame: AudioFrame) -> Result<(), TransportError> {
        if frame.sample_rate != self.sample_rate {
            return Err(TransportError::Publish(format!(
                "frame at {} Hz, transport requires {} Hz",
                frame.sample_rate.as_hz(),
                self.sample_rate.as_hz()
            )));
        }
        self.forward(TransportCommand::PublishAudio(frame)).await
    }

    async fn cancel_generation(&self, item_id: &TurnId) -> Result<(), TransportError> {
        {
            let mut failing = self.failing_cancels.lock();
            if *failing > 0 {
                *failing -= 1;
                return Err(TransportError::Cancel(format!("cancel of {} rejected", item_id)));
            }
        }
        self.forward(TransportCommand::CancelGeneration {
            item_id: item_id.clone(),
        })
        .await
    }

    async fn truncate_item(&self, item_id: &TurnId, audio_end_ms: f64) -> Result<(), TransportError> {
        self.forward(TransportCommand::TruncateItem {
            item_id: item_id.clone(),
            audio_end_ms,
        })
        .await
    }

    async fn send_data(&self, message: &DataMessage) -> Result<(), TransportError> {
        tracing::trace!(sequence = message.sequence, kind = message.payload.type_name(), "data message");
        self.forward(TransportCommand::SendData(message.clone())).await
    }

    fn sample_rate(&self) -> SampleRate {
        self.sample_rate
    }
}
