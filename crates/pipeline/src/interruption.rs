//! Interruption (barge-in) controller
//!
//! Owns the playback state of the active assistant item and the local
//! playout buffer in front of the transport. Only `max_in_flight_ms` of audio
//! is handed to the transport at a time, so a barge-in can discard everything
//! the participant has not heard yet and report exactly what was played.
//!
//! Pure and synchronous: the caller injects time and performs the emitted
//! cancel/truncate instructions.

use std::collections::VecDeque;
use std::time::Instant;

use skyvoice_config::InterruptionConfig;
use skyvoice_core::{AudioFrame, SampleRate, TurnId};

/// Convert a sample count to milliseconds at `rate`
pub fn samples_to_ms(samples: u64, rate: SampleRate) -> f64 {
    samples as f64 * 1000.0 / rate.as_hz() as f64
}

/// Convert milliseconds back to a sample count at `rate`
///
/// Inverse of [`samples_to_ms`] for every integer sample count.
pub fn ms_to_samples(ms: f64, rate: SampleRate) -> u64 {
    (ms * rate.as_hz() as f64 / 1000.0).round() as u64
}

/// Playback state of the active assistant item
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaybackState {
    pub current_item_id: Option<TurnId>,
    pub samples_played: u64,
    pub samples_total: u64,
    pub cancellable: bool,
}

/// A handled barge-in
#[derive(Debug, Clone, PartialEq)]
pub struct Interruption {
    pub item_id: TurnId,
    pub samples_played: u64,
    pub samples_total: u64,
    /// Played audio in ms at the transport rate
    pub audio_end_ms: f64,
    /// Synthesized samples the participant never heard
    pub discarded_samples: u64,
}

/// Result of a playout report
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaybackProgress {
    /// Frames that may be published now
    pub released: Vec<AudioFrame>,
    /// Item whose playout finished naturally
    pub completed: Option<TurnId>,
}

/// Barge-in state machine
#[derive(Debug)]
pub struct InterruptionController {
    config: InterruptionConfig,
    sample_rate: SampleRate,
    playback: PlaybackState,
    /// Frames not yet handed to the transport
    pending: VecDeque<AudioFrame>,
    /// Samples handed to the transport but not reported played
    in_flight_samples: u64,
    synthesis_complete: bool,
    last_interruption: Option<Instant>,
    user_speaking: bool,
}

impl InterruptionController {
    /// `sample_rate` is the transport rate all enqueued frames are at
    pub fn new(config: InterruptionConfig, sample_rate: SampleRate) -> Self {
        Self {
            config,
            sample_rate,
            playback: PlaybackState::default(),
            pending: VecDeque::new(),
            in_flight_samples: 0,
            synthesis_complete: false,
            last_interruption: None,
            user_speaking: false,
        }
    }

    pub fn playback(&self) -> &PlaybackState {
        &self.playback
    }

    pub fn is_cancellable(&self) -> bool {
        self.playback.cancellable
    }

    pub fn is_user_speaking(&self) -> bool {
        self.user_speaking
    }

    /// Samples buffered locally for the active item
    pub fn buffered_samples(&self) -> u64 {
        self.pending.iter().map(|f| f.frame_len() as u64).sum()
    }

    /// A new assistant item started synthesizing
    pub fn synthesis_started(&mut self, item_id: TurnId) {
        if !self.pending.is_empty() {
            tracing::debug!(
                previous = ?self.playback.current_item_id,
                dropped = self.pending.len(),
                "Replacing active item with unplayed audio"
            );
        }
        self.pending.clear();
        self.in_flight_samples = 0;
        self.synthesis_complete = false;
        self.playback = PlaybackState {
            current_item_id: Some(item_id),
            samples_played: 0,
            samples_total: 0,
            cancellable: true,
        };
    }

    /// Buffer a synthesized frame and return what may be published now
    pub fn enqueue(&mut self, item_id: &TurnId, frame: AudioFrame) -> Vec<AudioFrame> {
        if self.playback.current_item_id.as_ref() != Some(item_id) {
            tracing::debug!(item_id = %item_id, "Dropping audio for inactive item");
            return Vec::new();
        }

        self.playback.samples_total += frame.frame_len() as u64;
        self.pending.push_back(frame);
        self.release()
    }

    /// The transport played out `samples` more samples
    pub fn frame_played(&mut self, samples: u64) -> PlaybackProgress {
        if self.playback.current_item_id.is_none() {
            return PlaybackProgress::default();
        }

        self.playback.samples_played =
            (self.playback.samples_played + samples).min(self.playback.samples_total);
        self.in_flight_samples = self.in_flight_samples.saturating_sub(samples);

        let released = self.release();
        let completed = self.take_completion();
        PlaybackProgress { released, completed }
    }

    /// The pipeline finished synthesizing `item_id`
    ///
    /// Returns the item if everything was already played out.
    pub fn synthesis_complete(&mut self, item_id: &TurnId) -> Option<TurnId> {
        if self.playback.current_item_id.as_ref() != Some(item_id) {
            return None;
        }
        self.synthesis_complete = true;
        self.take_completion()
    }

    /// VAD reported the participant started speaking
    pub fn speech_started(&mut self, now: Instant) -> Option<Interruption> {
        self.user_speaking = true;

        if !self.playback.cancellable {
            return None;
        }

        if let Some(last) = self.last_interruption {
            if now.saturating_duration_since(last) < self.config.debounce() {
                tracing::debug!("Speech start within debounce window, ignoring");
                return None;
            }
        }

        let item_id = self.playback.current_item_id.clone()?;
        let samples_played = self.playback.samples_played;
        let samples_total = self.playback.samples_total;

        self.pending.clear();
        self.in_flight_samples = 0;
        self.synthesis_complete = false;
        self.playback = PlaybackState::default();
        self.last_interruption = Some(now);

        let interruption = Interruption {
            item_id,
            samples_played,
            samples_total,
            audio_end_ms: samples_to_ms(samples_played, self.sample_rate),
            discarded_samples: samples_total - samples_played,
        };

        tracing::info!(
            item_id = %interruption.item_id,
            audio_end_ms = interruption.audio_end_ms,
            discarded = interruption.discarded_samples,
            "Barge-in"
        );

        Some(interruption)
    }

    /// VAD reported the participant stopped speaking
    pub fn speech_ended(&mut self, _now: Instant) {
        self.user_speaking = false;
    }

    fn max_in_flight_samples(&self) -> u64 {
        self.sample_rate.samples_for_ms(self.config.max_in_flight_ms) as u64
    }

    fn release(&mut self) -> Vec<AudioFrame> {
        let limit = self.max_in_flight_samples();
        let mut released = Vec::new();

        while let Some(front) = self.pending.front() {
            let len = front.frame_len() as u64;
            // Always let one frame through so oversized frames cannot stall
            if self.in_flight_samples > 0 && self.in_flight_samples + len > limit {
                break;
            }
            self.in_flight_samples += len;
            if let Some(frame) = self.pending.pop_front() {
                released.push(frame);
            }
        }

        released
    }

    fn take_completion(&mut self) -> Option<TurnId> {
        let done = self.synthesis_complete
            && self.pending.is_empty()
            && self.playback.samples_played == self.playback.samples_total;
        if !done {
            return None;
        }

        let item_id = self.playback.current_item_id.take();
        self.playback = PlaybackState::default();
        self.in_flight_samples = 0;
        self.synthesis_complete = false;
        item_id
    }
}
