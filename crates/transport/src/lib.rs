//! Transport Layer
//!
//! The room/transport itself is an external collaborator. This crate holds
//! the seam the orchestrator talks through:
//! - `Transport` trait and inbound `TransportEvent`s
//! - UI data channel messages
//! - A channel-backed transport for embedding and tests
//! - The audio frame adapter (sample-rate normalization)

pub mod channel;
pub mod codec;
pub mod messages;
pub mod traits;

pub use channel::{ChannelTransport, TransportCommand};
pub use codec::FrameAdapter;
pub use messages::{DataMessage, DataPayload, FlightSummary};
pub use traits::{Transport, TransportEvent};

use thiserror::Error;

/// Transport errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Cancel failed: {0}")]
    Cancel(String),

    #[error("Truncate failed: {0}")]
    Truncate(String),

    #[error("Data channel send failed: {0}")]
    Data(String),

    #[error("Session closed")]
    SessionClosed,
}

impl From<TransportError> for skyvoice_core::Error {
    fn from(err: TransportError) -> Self {
        skyvoice_core::Error::Transport(err.to_string())
    }
}
