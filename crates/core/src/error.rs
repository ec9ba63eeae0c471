//! Error types for the voice front-end

use thiserror::Error;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
///
/// Component crates define their own enums and convert into this one at the
/// orchestrator boundary.
#[derive(Error, Debug)]
pub enum Error {
    // Audio errors
    #[error("Audio processing error: {0}")]
    Audio(#[from] AudioError),

    // Transport errors (publish/cancel/truncate/send)
    #[error("Transport error: {0}")]
    Transport(String),

    // STT/LLM/TTS errors
    #[error("Pipeline error: {0}")]
    Pipeline(String),

    // Tool errors
    #[error("Tool error: {0}")]
    Tool(String),

    #[error("Tool timed out after {0}ms")]
    ToolTimeout(u64),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Session closed: {0}")]
    SessionClosed(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Audio-specific errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AudioError {
    #[error("Invalid audio format: {0}")]
    InvalidFormat(String),

    #[error("Unsupported sample rate: {0}")]
    UnsupportedSampleRate(u32),

    #[error("Resampling error: {0}")]
    Resampling(String),
}

impl Error {
    /// Create a generic error from a string
    pub fn other<S: Into<String>>(msg: S) -> Self {
        Error::Other(msg.into())
    }

    /// Create a config error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Other(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Other(s.to_string())
    }
}
