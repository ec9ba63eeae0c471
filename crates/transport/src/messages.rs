//! UI data channel messages
//!
//! Wire format: `{"type": "...", "sequence": n, ...}`. `sequence` increases
//! by one per message per session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use skyvoice_core::{CommittedTurn, Language, PreservedEntities, TurnId};

/// A sequenced data channel message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataMessage {
    pub sequence: u64,
    #[serde(flatten)]
    pub payload: DataPayload,
}

/// Message variants, tagged by `type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DataPayload {
    /// Assistant text, shown as soon as the turn is committed
    PreSpeechText {
        turn_id: TurnId,
        text: String,
        language: Language,
        display_timestamp: DateTime<Utc>,
        #[serde(default)]
        hold_escaped: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        truncated_at_ms: Option<f64>,
    },
    /// Committed user utterance
    Transcript {
        turn_id: TurnId,
        text: String,
        language: Language,
        display_timestamp: DateTime<Utc>,
    },
    /// Conversation state change
    StateUpdate {
        state: String,
        language: Language,
        #[serde(default)]
        language_switched: bool,
        #[serde(default)]
        low_confidence: bool,
        #[serde(default)]
        preserved_entities: PreservedEntities,
    },
    /// Flight search outcome
    FlightResults {
        #[serde(flatten)]
        summary: FlightSummary,
    },
}

/// Summary of a flight search as shown in the UI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightSummary {
    pub summary: String,
    /// True when the results are a fallback (timeout, open circuit)
    pub approximate: bool,
    #[serde(default)]
    pub results: Vec<serde_json::Value>,
}

impl DataPayload {
    /// Payload for a committed turn
    pub fn from_turn(turn: &CommittedTurn) -> Self {
        match turn.role {
            skyvoice_core::Role::Assistant => DataPayload::PreSpeechText {
                turn_id: turn.turn_id.clone(),
                text: turn.text.clone(),
                language: turn.language.clone(),
                display_timestamp: turn.display_timestamp,
                hold_escaped: turn.hold_escaped,
                truncated_at_ms: turn.truncated_at_ms,
            },
            skyvoice_core::Role::User => DataPayload::Transcript {
                turn_id: turn.turn_id.clone(),
                text: turn.text.clone(),
                language: turn.language.clone(),
                display_timestamp: turn.display_timestamp,
            },
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            DataPayload::PreSpeechText { .. } => "pre_speech_text",
            DataPayload::Transcript { .. } => "transcript",
            DataPayload::StateUpdate { .. } => "state_update",
            DataPayload::FlightResults { .. } => "flight_results",
        }
    }
}
