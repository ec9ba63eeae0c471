//! Core types for the SkyVoice voice front-end
//!
//! This crate provides foundational types used across all other crates:
//! - Audio frame types
//! - Error taxonomy
//! - Conversation turn types (fragments and committed turns)
//! - Language codes and preserved travel entities

pub mod audio;
pub mod conversation;
pub mod entities;
pub mod error;
pub mod language;

pub use audio::{AudioFrame, Channels, SampleRate};
pub use conversation::{CommittedTurn, Role, SessionId, TurnFragment, TurnId};
pub use entities::{EntityKind, PreservedEntities};
pub use error::{AudioError, Error, Result};
pub use language::Language;
