//! Conversation sequencer
//!
//! Turns out-of-order transcript and response fragments into the ordered,
//! visible conversation log.
//!
//! Each role has its own expected-sequence counter. In-order fragments are
//! appended to the role's open turn; early fragments wait in a bounded
//! buffer; late ones are duplicates.
//!
//! A final assistant turn is held until its causal user turn is visible.
//! When the fragments carry `reply_to`, that is the user turn containing the
//! referenced sequence. Otherwise any pending user turn (accepted but
//! unflushed, or buffered behind a gap) blocks it. A held turn escapes after
//! `hold_timeout`, flagged `hold_escaped`.
//!
//! An interrupted assistant turn is closed at the interruption: it flushes
//! (or joins the hold queue) right away, and fragments of it that arrive
//! afterwards were never played and are dropped.

use std::collections::{BTreeMap, VecDeque};
use std::time::Instant;

use chrono::{DateTime, Duration as ChronoDuration, Utc};

use skyvoice_config::SequencerConfig;
use skyvoice_core::{CommittedTurn, Language, Role, TurnFragment, TurnId};

/// Non-fatal sequencing events
#[derive(Debug, Clone, PartialEq)]
pub enum SequencerDiagnostic {
    /// Sequence number already consumed
    Duplicate { role: Role, sequence: u64 },
    /// Arrived early, waiting for `expected`
    Buffered { role: Role, sequence: u64, expected: u64 },
    /// Out-of-order buffer full, fragment dropped
    BufferOverflow { role: Role, sequence: u64 },
    /// Belongs to an assistant turn already closed by an interruption
    AfterTruncation { turn_id: TurnId, sequence: u64 },
}

/// Everything one sequencer call produced
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SequencerOutput {
    /// Fragments applied to the log, in sequence order
    pub accepted: Vec<TurnFragment>,
    /// Turns that became visible, in display order
    pub flushed: Vec<CommittedTurn>,
    pub diagnostics: Vec<SequencerDiagnostic>,
}

impl SequencerOutput {
    pub fn is_empty(&self) -> bool {
        self.accepted.is_empty() && self.flushed.is_empty() && self.diagnostics.is_empty()
    }
}

#[derive(Debug)]
struct OpenTurn {
    turn_id: TurnId,
    text: String,
    language: Language,
    first_sequence: u64,
    last_sequence: u64,
    reply_to: Option<u64>,
    truncated_at_ms: Option<f64>,
}

impl OpenTurn {
    fn start(fragment: &TurnFragment, language: Language) -> Self {
        Self {
            turn_id: fragment.turn_id.clone(),
            text: String::new(),
            language,
            first_sequence: fragment.sequence,
            last_sequence: fragment.sequence,
            reply_to: None,
            truncated_at_ms: None,
        }
    }
}

#[derive(Debug, Default)]
struct Lane {
    expected: u64,
    buffer: BTreeMap<u64, TurnFragment>,
    open: Option<OpenTurn>,
}

#[derive(Debug)]
struct HeldTurn {
    turn: OpenTurn,
    deadline: Instant,
}

/// Per-session fragment sequencer
#[derive(Debug)]
pub struct Sequencer {
    config: SequencerConfig,
    language: Language,
    user: Lane,
    assistant: Lane,
    held: VecDeque<HeldTurn>,
    /// Last user sequence that is visible in the log
    user_flushed_through: Option<u64>,
    /// Assistant turn closed by the last interruption
    truncated_turn: Option<TurnId>,
    last_timestamp: Option<DateTime<Utc>>,
}

impl Sequencer {
    pub fn new(config: SequencerConfig, language: Language) -> Self {
        Self {
            config,
            language,
            user: Lane::default(),
            assistant: Lane::default(),
            held: VecDeque::new(),
            user_flushed_through: None,
            truncated_turn: None,
            last_timestamp: None,
        }
    }

    /// Language stamped onto turns started from now on
    pub fn set_language(&mut self, language: Language) {
        self.language = language;
    }

    /// Next expected sequence number for `role`
    pub fn expected(&self, role: Role) -> u64 {
        self.lane(role).expected
    }

    /// Assistant turns waiting on a pending user turn
    pub fn held_count(&self) -> usize {
        self.held.len()
    }

    /// Earliest hold deadline
    pub fn next_deadline(&self) -> Option<Instant> {
        self.held.front().map(|h| h.deadline)
    }

    /// Feed one fragment
    pub fn receive(&mut self, fragment: TurnFragment, now: Instant) -> SequencerOutput {
        let mut out = SequencerOutput::default();
        let role = fragment.role;
        let sequence = fragment.sequence;
        let max_buffered = self.config.max_buffered_fragments;

        let lane = self.lane_mut(role);
        let expected = lane.expected;

        if sequence < expected {
            tracing::debug!(role = role.as_str(), sequence, expected, "Duplicate fragment");
            out.diagnostics.push(SequencerDiagnostic::Duplicate { role, sequence });
            return out;
        }

        if sequence > expected {
            if lane.buffer.contains_key(&sequence) {
                out.diagnostics.push(SequencerDiagnostic::Duplicate { role, sequence });
            } else if lane.buffer.len() >= max_buffered {
                tracing::warn!(role = role.as_str(), sequence, "Fragment buffer full, dropping");
                out.diagnostics.push(SequencerDiagnostic::BufferOverflow { role, sequence });
            } else {
                lane.buffer.insert(sequence, fragment);
                out.diagnostics.push(SequencerDiagnostic::Buffered {
                    role,
                    sequence,
                    expected,
                });
            }
            return out;
        }

        self.apply(fragment, now, &mut out);
        loop {
            let lane = self.lane_mut(role);
            let next = lane.expected;
            match lane.buffer.remove(&next) {
                Some(ready) => self.apply(ready, now, &mut out),
                None => break,
            }
        }

        out
    }

    /// Flush held assistant turns whose deadline passed
    pub fn poll_expired(&mut self, now: Instant) -> SequencerOutput {
        let mut out = SequencerOutput::default();
        while let Some(front) = self.held.front() {
            let blocked = self.is_blocked(&front.turn);
            if blocked && front.deadline > now {
                break;
            }
            if let Some(held) = self.held.pop_front() {
                if blocked {
                    tracing::debug!(turn_id = %held.turn.turn_id, "Hold timeout, flushing assistant turn");
                }
                let turn = self.commit(held.turn, Role::Assistant, blocked);
                out.flushed.push(turn);
            }
        }
        out
    }

    /// Close an interrupted assistant turn that is still open or held
    ///
    /// An open turn is finished at once with the text received so far.
    /// Returns `None` when the turn is neither open nor held (already in the
    /// log, or unknown).
    pub fn mark_truncated(
        &mut self,
        turn_id: &TurnId,
        audio_end_ms: f64,
        now: Instant,
    ) -> Option<SequencerOutput> {
        let is_open = self
            .assistant
            .open
            .as_ref()
            .is_some_and(|t| &t.turn_id == turn_id);
        if is_open {
            let mut out = SequencerOutput::default();
            if let Some(mut turn) = self.assistant.open.take() {
                turn.truncated_at_ms = Some(audio_end_ms);
                self.truncated_turn = Some(turn.turn_id.clone());
                self.finish(turn, Role::Assistant, now, &mut out);
            }
            return Some(out);
        }

        let held = self.held.iter_mut().find(|h| &h.turn.turn_id == turn_id)?;
        held.turn.truncated_at_ms = Some(audio_end_ms);
        Some(SequencerOutput::default())
    }

    fn lane(&self, role: Role) -> &Lane {
        match role {
            Role::User => &self.user,
            Role::Assistant => &self.assistant,
        }
    }

    fn lane_mut(&mut self, role: Role) -> &mut Lane {
        match role {
            Role::User => &mut self.user,
            Role::Assistant => &mut self.assistant,
        }
    }

    fn user_pending(&self) -> bool {
        self.user.open.is_some() || !self.user.buffer.is_empty()
    }

    /// Whether the causal user turn of `turn` is not yet visible
    fn is_blocked(&self, turn: &OpenTurn) -> bool {
        match turn.reply_to {
            Some(user_sequence) => self
                .user_flushed_through
                .map_or(true, |flushed| flushed < user_sequence),
            None => self.user_pending(),
        }
    }

    /// Flush held turns from the front until one is still blocked
    fn release_held(&mut self, out: &mut SequencerOutput) {
        while self.held.front().is_some_and(|h| !self.is_blocked(&h.turn)) {
            if let Some(held) = self.held.pop_front() {
                let committed = self.commit(held.turn, Role::Assistant, false);
                out.flushed.push(committed);
            }
        }
    }

    /// Append an in-order fragment and flush if it completes a turn
    fn apply(&mut self, fragment: TurnFragment, now: Instant, out: &mut SequencerOutput) {
        let role = fragment.role;
        if role == Role::Assistant && self.truncated_turn.as_ref() == Some(&fragment.turn_id) {
            self.assistant.expected = fragment.sequence + 1;
            tracing::debug!(
                turn_id = %fragment.turn_id,
                sequence = fragment.sequence,
                "Fragment after truncation dropped"
            );
            out.diagnostics.push(SequencerDiagnostic::AfterTruncation {
                turn_id: fragment.turn_id,
                sequence: fragment.sequence,
            });
            return;
        }
        let language = self.language.clone();
        let lane = self.lane_mut(role);
        lane.expected = fragment.sequence + 1;

        // A new turn id while another is open closes the previous one
        let superseded = lane
            .open
            .as_ref()
            .is_some_and(|open| open.turn_id != fragment.turn_id);
        let stale = if superseded { lane.open.take() } else { None };

        let open = lane
            .open
            .get_or_insert_with(|| OpenTurn::start(&fragment, language));
        open.text.push_str(&fragment.content);
        open.last_sequence = fragment.sequence;
        if fragment.reply_to > open.reply_to {
            open.reply_to = fragment.reply_to;
        }

        let finished = if fragment.is_final { lane.open.take() } else { None };

        if let Some(stale) = stale {
            tracing::debug!(turn_id = %stale.turn_id, "Turn superseded before its final fragment");
            self.finish(stale, role, now, out);
        }
        out.accepted.push(fragment);
        if let Some(turn) = finished {
            self.finish(turn, role, now, out);
        }
    }

    fn finish(&mut self, turn: OpenTurn, role: Role, now: Instant, out: &mut SequencerOutput) {
        match role {
            Role::User => {
                self.user_flushed_through = Some(turn.last_sequence);
                let committed = self.commit(turn, Role::User, false);
                out.flushed.push(committed);
                self.release_held(out);
            }
            Role::Assistant => {
                if !self.held.is_empty() || self.is_blocked(&turn) {
                    tracing::debug!(turn_id = %turn.turn_id, "Holding assistant turn for its user turn");
                    self.held.push_back(HeldTurn {
                        turn,
                        deadline: now + self.config.hold_timeout(),
                    });
                } else {
                    let committed = self.commit(turn, Role::Assistant, false);
                    out.flushed.push(committed);
                }
            }
        }
    }

    fn commit(&mut self, turn: OpenTurn, role: Role, hold_escaped: bool) -> CommittedTurn {
        let mut timestamp = Utc::now();
        if let Some(last) = self.last_timestamp {
            if timestamp <= last {
                timestamp = last + ChronoDuration::microseconds(1);
            }
        }
        self.last_timestamp = Some(timestamp);

        CommittedTurn {
            turn_id: turn.turn_id,
            role,
            text: turn.text.trim().to_string(),
            language: turn.language,
            display_timestamp: timestamp,
            first_sequence: turn.first_sequence,
            last_sequence: turn.last_sequence,
            hold_escaped,
            truncated_at_ms: turn.truncated_at_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn sequencer() -> Sequencer {
        Sequencer::new(SequencerConfig::default(), Language::english())
    }

    fn user(turn: &str, seq: u64, text: &str) -> TurnFragment {
        TurnFragment::user(turn, seq, text)
    }

    fn assistant(turn: &str, seq: u64, text: &str) -> TurnFragment {
        TurnFragment::assistant(turn, seq, text)
    }

    /// Check per-role sequence continuity and timestamp order of a log
    fn assert_log_ordered(log: &[CommittedTurn]) {
        for role in [Role::User, Role::Assistant] {
            let mut next = 0;
            for turn in log.iter().filter(|t| t.role == role) {
                assert_eq!(turn.first_sequence, next, "gap in {:?} log", role);
                next = turn.last_sequence + 1;
            }
        }
        for pair in log.windows(2) {
            assert!(pair[0].display_timestamp < pair[1].display_timestamp);
        }
    }

    #[test]
    fn test_in_order_turn() {
        let mut seq = sequencer();
        let now = Instant::now();

        assert!(seq.receive(user("u1", 0, "flights "), now).flushed.is_empty());
        let out = seq.receive(user("u1", 1, "to Paris").finalized(), now);

        assert_eq!(out.accepted.len(), 1);
        assert_eq!(out.flushed.len(), 1);
        assert_eq!(out.flushed[0].text, "flights to Paris");
        assert_eq!(out.flushed[0].first_sequence, 0);
        assert_eq!(out.flushed[0].last_sequence, 1);
        assert_eq!(seq.expected(Role::User), 2);
    }

    #[test]
    fn test_reordered_fragments_drain() {
        let mut seq = sequencer();
        let now = Instant::now();

        let out = seq.receive(user("u1", 2, "LAX").finalized(), now);
        assert!(matches!(out.diagnostics[0], SequencerDiagnostic::Buffered { expected: 0, .. }));
        seq.receive(user("u1", 1, "to "), now);

        let out = seq.receive(user("u1", 0, "JFK "), now);
        let accepted: Vec<u64> = out.accepted.iter().map(|f| f.sequence).collect();
        assert_eq!(accepted, vec![0, 1, 2]);
        assert_eq!(out.flushed[0].text, "JFK to LAX");
    }

    #[test]
    fn test_duplicate_discarded() {
        let mut seq = sequencer();
        let now = Instant::now();
        seq.receive(user("u1", 0, "hi"), now);

        let out = seq.receive(user("u1", 0, "hi"), now);
        assert!(out.accepted.is_empty());
        assert_eq!(
            out.diagnostics,
            vec![SequencerDiagnostic::Duplicate {
                role: Role::User,
                sequence: 0
            }]
        );
    }

    #[test]
    fn test_buffer_overflow() {
        let config = SequencerConfig {
            max_buffered_fragments: 2,
            ..SequencerConfig::default()
        };
        let mut seq = Sequencer::new(config, Language::english());
        let now = Instant::now();

        seq.receive(user("u1", 5, "a"), now);
        seq.receive(user("u1", 6, "b"), now);
        let out = seq.receive(user("u1", 7, "c"), now);
        assert!(matches!(out.diagnostics[0], SequencerDiagnostic::BufferOverflow { sequence: 7, .. }));
    }

    #[test]
    fn test_assistant_held_until_user_flushes() {
        let mut seq = sequencer();
        let now = Instant::now();

        // User turn still open when the assistant answer completes
        seq.receive(user("u1", 0, "to Madrid "), now);
        let out = seq.receive(assistant("a1", 0, "Searching.").finalized(), now);
        assert!(out.flushed.is_empty());
        assert_eq!(seq.held_count(), 1);
        assert!(seq.next_deadline().is_some());

        let out = seq.receive(user("u1", 1, "please").finalized(), now);
        let roles: Vec<Role> = out.flushed.iter().map(|t| t.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant]);
        assert!(!out.flushed[1].hold_escaped);
        assert!(out.flushed[0].display_timestamp < out.flushed[1].display_timestamp);
        assert!(seq.next_deadline().is_none());
    }

    #[test]
    fn test_hold_timeout_escape() {
        let mut seq = sequencer();
        let now = Instant::now();

        seq.receive(user("u1", 1, "late").finalized(), now);
        seq.receive(assistant("a1", 0, "Hello!").finalized(), now);

        assert!(seq.poll_expired(now + Duration::from_millis(50)).flushed.is_empty());
        let out = seq.poll_expired(now + Duration::from_millis(100));
        assert_eq!(out.flushed.len(), 1);
        assert!(out.flushed[0].hold_escaped);
        assert_eq!(seq.held_count(), 0);
    }

    #[test]
    fn test_truncation_flushes_open_turn() {
        let mut seq = sequencer();
        let now = Instant::now();
        let id = TurnId::from("a1");

        seq.receive(assistant("a1", 0, "Let me "), now);
        seq.receive(assistant("a1", 1, "check that"), now);
        let out = seq.mark_truncated(&id, 812.5, now).unwrap();
        assert_eq!(out.flushed.len(), 1);
        assert_eq!(out.flushed[0].text, "Let me check that");
        assert_eq!(out.flushed[0].truncated_at_ms, Some(812.5));
        assert_eq!(out.flushed[0].last_sequence, 1);

        // Already in the log
        assert!(seq.mark_truncated(&id, 900.0, now).is_none());
        assert!(seq.mark_truncated(&TurnId::from("other"), 1.0, now).is_none());

        // The unplayed remainder is dropped; the next turn carries on
        let out = seq.receive(assistant("a1", 2, " for you").finalized(), now);
        assert!(out.flushed.is_empty());
        assert!(matches!(
            out.diagnostics[0],
            SequencerDiagnostic::AfterTruncation { sequence: 2, .. }
        ));
        let out = seq.receive(assistant("a2", 3, "Sure.").finalized(), now);
        assert_eq!(out.flushed[0].turn_id, TurnId::from("a2"));
        assert_eq!(out.flushed[0].first_sequence, 3);
    }

    #[test]
    fn test_truncated_turn_waits_for_user_turn() {
        let mut seq = sequencer();
        let now = Instant::now();

        seq.receive(user("u1", 0, "to Madrid "), now);
        seq.receive(assistant("a1", 0, "Searching"), now);
        let out = seq.mark_truncated(&TurnId::from("a1"), 120.0, now).unwrap();
        assert!(out.flushed.is_empty());
        assert_eq!(seq.held_count(), 1);

        let out = seq.receive(user("u1", 1, "please").finalized(), now);
        assert_eq!(out.flushed.len(), 2);
        assert_eq!(out.flushed[1].truncated_at_ms, Some(120.0));
    }

    #[test]
    fn test_held_turn_annotated() {
        let mut seq = sequencer();
        let now = Instant::now();

        seq.receive(user("u1", 0, "hi "), now);
        seq.receive(assistant("a1", 0, "Hello!").finalized(), now);
        let out = seq.mark_truncated(&TurnId::from("a1"), 40.0, now).unwrap();
        assert!(out.is_empty());

        let out = seq.poll_expired(now + Duration::from_secs(1));
        assert_eq!(out.flushed[0].truncated_at_ms, Some(40.0));
    }

    #[test]
    fn test_language_applies_to_new_turns() {
        let mut seq = sequencer();
        let now = Instant::now();

        seq.receive(user("u1", 0, "hello "), now);
        seq.set_language(Language::new("es"));
        let out = seq.receive(user("u1", 1, "there").finalized(), now);
        assert_eq!(out.flushed[0].language.code(), "en");

        let out = seq.receive(user("u2", 2, "hola").finalized(), now);
        assert_eq!(out.flushed[0].language.code(), "es");
    }

    #[test]
    fn test_causal_order_under_reordering() {
        // Two exchanges delivered in several interleavings
        let fragments = vec![
            user("u1", 0, "from JFK ").finalized(),
            assistant("a1", 0, "Where to? ").replying_to(0).finalized(),
            user("u2", 1, "to LAX ").finalized(),
            assistant("a2", 1, "Searching ").replying_to(1).finalized(),
        ];
        let orders: [[usize; 4]; 6] = [
            [0, 1, 2, 3],
            [1, 0, 3, 2],
            [3, 2, 1, 0],
            [2, 3, 0, 1],
            [1, 3, 0, 2],
            [3, 1, 2, 0],
        ];

        for order in orders {
            let mut seq = sequencer();
            let now = Instant::now();
            let mut log = Vec::new();

            for &i in &order {
                log.extend(seq.receive(fragments[i].clone(), now).flushed);
            }
            log.extend(seq.poll_expired(now + Duration::from_secs(1)).flushed);

            assert_eq!(log.len(), 4, "order {:?}", order);
            assert_log_ordered(&log);

            for (index, turn) in log.iter().enumerate() {
                if turn.role == Role::Assistant {
                    assert!(!turn.hold_escaped, "order {:?}", order);
                    let users_before = log[..index].iter().filter(|t| t.role == Role::User).count() as u64;
                    assert!(users_before > turn.first_sequence, "order {:?}", order);
                }
            }
        }
    }
}
