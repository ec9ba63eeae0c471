//! Session orchestration for the voice front-end
//!
//! One actor per participant owns the conversation state and drives the
//! pipeline components with transport, pipeline and tool events. The
//! `SessionManager` creates actors, tracks their handles and reaps them.

pub mod manager;
pub mod metrics;
pub mod prompts;
pub mod session;

pub use manager::SessionManager;
pub use session::{
    ConversationState, SessionActor, SessionCommand, SessionEnd, SessionHandle, SessionSnapshot,
};

use thiserror::Error;

/// Agent errors
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Session error: {0}")]
    Session(String),

    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("Maximum sessions reached ({0})")]
    Capacity(usize),

    #[error("Session closed")]
    Closed,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<AgentError> for skyvoice_core::Error {
    fn from(err: AgentError) -> Self {
        match err {
            AgentError::Closed => skyvoice_core::Error::SessionClosed("actor stopped".to_string()),
            AgentError::Config(message) => skyvoice_core::Error::Config(message),
            other => skyvoice_core::Error::Other(other.to_string()),
        }
    }
}
