//! Conversation turn types
//!
//! Fragments are produced upstream by the STT/LLM pipeline; committed turns
//! are what the sequencer flushes into the visible log.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Language;

/// Session identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Turn identifier; assistant turn ids double as synthesis item ids
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TurnId(pub String);

impl TurnId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TurnId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TurnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TurnId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Speaker role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// An incremental piece of a conversational turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnFragment {
    /// Turn this fragment belongs to
    pub turn_id: TurnId,
    /// Speaker
    pub role: Role,
    /// Per-role, per-session sequence number (starts at 0)
    pub sequence: u64,
    /// Text content to append
    pub content: String,
    /// Last fragment of the turn
    pub is_final: bool,
    /// For assistant fragments: user sequence number this response answers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<u64>,
}

impl TurnFragment {
    pub fn new(turn_id: impl Into<TurnId>, role: Role, sequence: u64, content: impl Into<String>) -> Self {
        Self {
            turn_id: turn_id.into(),
            role,
            sequence,
            content: content.into(),
            is_final: false,
            reply_to: None,
        }
    }

    /// Shorthand for a user fragment
    pub fn user(turn_id: impl Into<TurnId>, sequence: u64, content: impl Into<String>) -> Self {
        Self::new(turn_id, Role::User, sequence, content)
    }

    /// Shorthand for an assistant fragment
    pub fn assistant(turn_id: impl Into<TurnId>, sequence: u64, content: impl Into<String>) -> Self {
        Self::new(turn_id, Role::Assistant, sequence, content)
    }

    /// Mark as the final fragment of its turn
    pub fn finalized(mut self) -> Self {
        self.is_final = true;
        self
    }

    /// Link an assistant fragment to the user fragment it answers
    pub fn replying_to(mut self, user_sequence: u64) -> Self {
        self.reply_to = Some(user_sequence);
        self
    }
}

impl From<String> for TurnId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A finalized, ordered entry in the visible conversation log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommittedTurn {
    pub turn_id: TurnId,
    pub role: Role,
    pub text: String,
    pub language: Language,
    pub display_timestamp: DateTime<Utc>,
    /// First fragment sequence number in this turn
    pub first_sequence: u64,
    /// Last fragment sequence number in this turn
    pub last_sequence: u64,
    /// Flushed by the hold-queue timeout before its causal user turn
    #[serde(default)]
    pub hold_escaped: bool,
    /// Playback was interrupted at this offset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub truncated_at_ms: Option<f64>,
}

impl CommittedTurn {
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}
