//! Audio frame types

use serde::{Deserialize, Serialize};

use crate::error::AudioError;

/// Supported sample rates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SampleRate {
    Hz8000,
    Hz16000,
    Hz22050,
    Hz24000,
    Hz44100,
    Hz48000,
}

impl SampleRate {
    /// Rate in Hz
    pub fn as_hz(&self) -> u32 {
        match self {
            SampleRate::Hz8000 => 8000,
            SampleRate::Hz16000 => 16000,
            SampleRate::Hz22050 => 22050,
            SampleRate::Hz24000 => 24000,
            SampleRate::Hz44100 => 44100,
            SampleRate::Hz48000 => 48000,
        }
    }

    /// Number of samples in `ms` milliseconds of mono audio
    pub fn samples_for_ms(&self, ms: u32) -> usize {
        (self.as_hz() as u64 * ms as u64 / 1000) as usize
    }
}

impl TryFrom<u32> for SampleRate {
    type Error = AudioError;

    fn try_from(hz: u32) -> Result<Self, Self::Error> {
        Ok(match hz {
            8000 => SampleRate::Hz8000,
            16000 => SampleRate::Hz16000,
            22050 => SampleRate::Hz22050,
            24000 => SampleRate::Hz24000,
            44100 => SampleRate::Hz44100,
            48000 => SampleRate::Hz48000,
            other => return Err(AudioError::UnsupportedSampleRate(other)),
        })
    }
}

impl Default for SampleRate {
    fn default() -> Self {
        SampleRate::Hz16000
    }
}

/// Channel layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Channels {
    Mono,
    Stereo,
}

impl Channels {
    pub fn count(&self) -> usize {
        match self {
            Channels::Mono => 1,
            Channels::Stereo => 2,
        }
    }
}

/// A frame of PCM audio (f32, -1.0 to 1.0, interleaved when multi-channel)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioFrame {
    /// Interleaved samples
    pub samples: Vec<f32>,
    /// Sample rate
    pub sample_rate: SampleRate,
    /// Channel layout
    pub channels: Channels,
    /// Monotonic frame sequence from the producer
    pub sequence: u64,
    /// Frame energy in dBFS
    pub energy_db: f32,
}

impl AudioFrame {
    /// Create a new frame; energy is computed from the samples
    pub fn new(samples: Vec<f32>, sample_rate: SampleRate, channels: Channels, sequence: u64) -> Self {
        let energy_db = Self::compute_energy_db(&samples);
        Self {
            samples,
            sample_rate,
            channels,
            sequence,
            energy_db,
        }
    }

    /// Silent mono frame of the given duration
    pub fn silence(sample_rate: SampleRate, duration_ms: u32, sequence: u64) -> Self {
        let samples = vec![0.0; sample_rate.samples_for_ms(duration_ms)];
        Self::new(samples, sample_rate, Channels::Mono, sequence)
    }

    /// Samples per channel
    pub fn frame_len(&self) -> usize {
        self.samples.len() / self.channels.count()
    }

    pub fn is_mono(&self) -> bool {
        self.channels == Channels::Mono
    }

    /// Duration in milliseconds
    pub fn duration_ms(&self) -> f64 {
        self.frame_len() as f64 * 1000.0 / self.sample_rate.as_hz() as f64
    }

    fn compute_energy_db(samples: &[f32]) -> f32 {
        if samples.is_empty() {
            return -100.0;
        }
        let mean_sq = samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32;
        if mean_sq <= f32::EPSILON {
            -100.0
        } else {
            10.0 * mean_sq.log10()
        }
    }
}
