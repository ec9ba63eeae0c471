//! Audio frame adapter
//!
//! Converts mono frames between the TTS rate and the rate the transport
//! requires. Duration is preserved: the output always holds exactly
//! `round(len * to / from)` samples.

use skyvoice_core::{AudioError, AudioFrame, SampleRate};

/// Frames shorter than this go through linear interpolation
const MIN_SINC_FRAME: usize = 64;

/// Stateless sample-rate normalizer targeting one output rate
#[derive(Debug, Clone, Copy)]
pub struct FrameAdapter {
    target: SampleRate,
}

impl FrameAdapter {
    /// Create an adapter producing frames at `target`
    pub fn new(target: SampleRate) -> Self {
        Self { target }
    }

    pub fn target(&self) -> SampleRate {
        self.target
    }

    /// Convert a frame to the target rate
    ///
    /// Frames already at the target rate pass through unchanged. Only mono
    /// frames are accepted.
    pub fn adapt(&self, frame: AudioFrame) -> Result<AudioFrame, AudioError> {
        if !frame.is_mono() {
            return Err(AudioError::InvalidFormat(format!(
                "expected mono frame, got {} channels",
                frame.channels.count()
            )));
        }

        if frame.sample_rate == self.target {
            return Ok(frame);
        }

        let samples = resample(&frame.samples, frame.sample_rate.as_hz(), self.target.as_hz());
        Ok(AudioFrame::new(samples, self.target, frame.channels, frame.sequence))
    }
}

/// Number of output samples for `len` input samples
pub fn output_len(len: usize, from_rate: u32, to_rate: u32) -> usize {
    (len as f64 * to_rate as f64 / from_rate as f64).round() as usize
}

/// Resample mono PCM
///
/// Uses rubato's FFT resampler when the frame is long enough and falls back
/// to linear interpolation otherwise or on resampler failure.
pub fn resample(input: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || input.is_empty() {
        return input.to_vec();
    }

    let target_len = output_len(input.len(), from_rate, to_rate);
    let (chunk_in, _) = sinc_chunks(from_rate, to_rate);

    let output = if input.len() < MIN_SINC_FRAME || input.len() <= chunk_in / 2 {
        resample_linear(input, from_rate, to_rate, target_len)
    } else {
        match resample_sinc(input, from_rate, to_rate, target_len) {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!(error = %e, from_rate, to_rate, "Rubato resampling failed, using linear");
                resample_linear(input, from_rate, to_rate, target_len)
            }
        }
    };

    fit_length(output, target_len)
}

fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// FFT chunk sizes (input, output) for a rate pair
///
/// The input chunk is an even number of whole rate periods, so half a chunk
/// maps to a whole number of output samples and the filter delay
/// (`output_delay`, half an output chunk) lands on a sample.
fn sinc_chunks(from_rate: u32, to_rate: u32) -> (usize, usize) {
    let g = gcd(from_rate, to_rate).max(1);
    let period_in = (from_rate / g) as usize;
    let period_out = (to_rate / g) as usize;

    let mut periods = MIN_SINC_FRAME.div_ceil(period_in).max(2);
    if periods % 2 == 1 {
        periods += 1;
    }
    (periods * period_in, periods * period_out)
}

/// FFT resampling of one isolated frame
///
/// The frame is extended by half a chunk on each side with its point
/// reflection (keeps value and slope continuous at the edges), run through
/// the resampler, and the output window matching the original frame is cut
/// out after skipping the resampler delay.
fn resample_sinc(
    input: &[f32],
    from_rate: u32,
    to_rate: u32,
    target_len: usize,
) -> Result<Vec<f32>, AudioError> {
    use rubato::{FftFixedInOut, Resampler as RubatoResampler};

    let (chunk_in, chunk_out) = sinc_chunks(from_rate, to_rate);
    let mut resampler =
        FftFixedInOut::<f64>::new(from_rate as usize, to_rate as usize, chunk_in, 1)
            .map_err(|e| AudioError::Resampling(e.to_string()))?;
    if resampler.input_frames_next() != chunk_in {
        return Err(AudioError::Resampling(format!(
            "unexpected chunk size {} (wanted {})",
            resampler.input_frames_next(),
            chunk_in
        )));
    }

    let half = chunk_in / 2;
    let first = input[0] as f64;
    let last = input[input.len() - 1] as f64;
    let mut padded: Vec<f64> = Vec::with_capacity(input.len() + 2 * chunk_in);
    padded.extend((1..=half).rev().map(|k| 2.0 * first - input[k] as f64));
    padded.extend(input.iter().map(|&s| s as f64));
    padded.extend((1..=half).map(|k| 2.0 * last - input[input.len() - 1 - k] as f64));

    // Original sample 0 comes out at half a chunk of padding plus the delay
    let skip = chunk_out / 2 + resampler.output_delay();
    let chunks = padded
        .len()
        .div_ceil(chunk_in)
        .max((skip + target_len).div_ceil(chunk_out));
    padded.resize(chunks * chunk_in, 0.0);

    let mut output = Vec::with_capacity(chunks * chunk_out);
    for chunk in padded.chunks(chunk_in) {
        let out = resampler
            .process(&[chunk], None)
            .map_err(|e| AudioError::Resampling(e.to_string()))?;
        if let Some(channel) = out.into_iter().next() {
            output.extend(channel);
        }
    }

    Ok(output
        .into_iter()
        .skip(skip)
        .take(target_len)
        .map(|s| s as f32)
        .collect())
}

fn resample_linear(input: &[f32], from_rate: u32, to_rate: u32, output_len: usize) -> Vec<f32> {
    let ratio = to_rate as f64 / from_rate as f64;
    let last = input.len().saturating_sub(1);
    let mut output = Vec::with_capacity(output_len);

    for i in 0..output_len {
        let src_idx = i as f64 / ratio;
        let idx_floor = (src_idx.floor() as usize).min(last);
        let idx_ceil = (idx_floor + 1).min(last);
        let frac = (src_idx - idx_floor as f64).clamp(0.0, 1.0) as f32;

        output.push(input[idx_floor] * (1.0 - frac) + input[idx_ceil] * frac);
    }

    output
}

/// Pad with the last sample or truncate to exactly `len`
fn fit_length(mut samples: Vec<f32>, len: usize) -> Vec<f32> {
    let pad = samples.last().copied().unwrap_or(0.0);
    samples.resize(len, pad);
    samples
}
