//! Channel mixing and band-limited resampling.
//!
//! Every clip is decoded to mono at a single target rate before any other
//! processing:
//!
//! 1. [`stereo_to_mono`]: downmix any number of interleaved channels to mono.
//! 2. [`resample`]: band-limited sinc interpolation (`rubato::SincFixedIn`,
//!    Blackman-Harris² window).
//!
//! The resampler parameters are fixed constants, so the same input and ratio
//! always produce the same output on a given build.

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use thiserror::Error;

/// Frames fed to the sinc resampler per call.
const CHUNK_FRAMES: usize = 1024;
/// Sinc kernel length (taps).
const SINC_LEN: usize = 256;
/// Anti-aliasing cutoff relative to the lower Nyquist frequency.
const F_CUTOFF: f32 = 0.95;
const OVERSAMPLING: usize = 256;

// ---------------------------------------------------------------------------
// ResampleError
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ResampleError {
    /// Ratio is zero, negative or not finite.
    #[error("invalid resample ratio {0}")]
    InvalidRatio(f64),

    /// rubato rejected the configuration or failed mid-stream.
    #[error("resampler failed: {0}")]
    Backend(String),
}

// ---------------------------------------------------------------------------
// stereo_to_mono
// ---------------------------------------------------------------------------

/// Mix interleaved multi-channel audio down to mono by averaging all channels.
///
/// * `channels == 1` returns the input as an owned `Vec`.
/// * `channels == 0` returns an empty vector.
/// * A trailing incomplete frame is ignored.
///
/// ```rust
/// use aimusic_dataset::audio::stereo_to_mono;
///
/// let stereo = vec![0.5_f32, -0.5, 0.2, 0.4]; // L R L R
/// let mono = stereo_to_mono(&stereo, 2);
/// assert_eq!(mono.len(), 2);
/// assert!((mono[1] - 0.3).abs() < 1e-6);
/// ```
pub fn stereo_to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => samples.to_vec(),
        n => {
            let n = n as usize;
            samples
                .chunks_exact(n)
                .map(|frame| frame.iter().sum::<f32>() / n as f32)
                .collect()
        }
    }
}

// ---------------------------------------------------------------------------
// resample
// ---------------------------------------------------------------------------

/// Resample `samples` from `source_rate` to `target_rate` Hz.
///
/// Equal rates return a copy of the input.
pub fn resample_to(
    samples: &[f32],
    source_rate: u32,
    target_rate: u32,
) -> Result<Vec<f32>, ResampleError> {
    if source_rate == target_rate {
        return Ok(samples.to_vec());
    }
    if source_rate == 0 || target_rate == 0 {
        return Err(ResampleError::InvalidRatio(
            target_rate as f64 / source_rate as f64,
        ));
    }
    resample(samples, target_rate as f64 / source_rate as f64)
}

/// Resample by an arbitrary `ratio` (`output_rate / input_rate`).
///
/// The output has exactly `round(samples.len() * ratio)` samples and is
/// aligned with the input: the resampler's group delay is trimmed from the
/// head and the tail is flushed with zeros.
pub fn resample(samples: &[f32], ratio: f64) -> Result<Vec<f32>, ResampleError> {
    if !ratio.is_finite() || ratio <= 0.0 {
        return Err(ResampleError::InvalidRatio(ratio));
    }
    if samples.is_empty() {
        return Ok(Vec::new());
    }
    if ratio == 1.0 {
        return Ok(samples.to_vec());
    }

    let params = SincInterpolationParameters {
        sinc_len: SINC_LEN,
        f_cutoff: F_CUTOFF,
        interpolation: SincInterpolationType::Cubic,
        oversampling_factor: OVERSAMPLING,
        window: WindowFunction::BlackmanHarris2,
    };
    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, params, CHUNK_FRAMES, 1)
        .map_err(|e| ResampleError::Backend(e.to_string()))?;

    let expected = (samples.len() as f64 * ratio).round() as usize;
    let delay = resampler.output_delay();
    let wanted = expected + delay;
    let mut output: Vec<f32> = Vec::with_capacity(wanted + CHUNK_FRAMES);

    let mut pos = 0;
    while samples.len() - pos >= resampler.input_frames_next() {
        let n = resampler.input_frames_next();
        let chunk = resampler
            .process(&[&samples[pos..pos + n]], None)
            .map_err(|e| ResampleError::Backend(e.to_string()))?;
        output.extend_from_slice(&chunk[0]);
        pos += n;
    }
    if pos < samples.len() {
        let chunk = resampler
            .process_partial(Some(&[&samples[pos..]][..]), None)
            .map_err(|e| ResampleError::Backend(e.to_string()))?;
        output.extend_from_slice(&chunk[0]);
    }

    // Flush the filter tail; each empty call emits roughly one chunk.
    let max_flushes = wanted / CHUNK_FRAMES.max(1) + 4;
    let mut flushes = 0;
    while output.len() < wanted && flushes < max_flushes {
        let chunk = resampler
            .process_partial(None::<&[Vec<f32>]>, None)
            .map_err(|e| ResampleError::Backend(e.to_string()))?;
        if chunk[0].is_empty() {
            break;
        }
        output.extend_from_slice(&chunk[0]);
        flushes += 1;
    }

    let mut aligned: Vec<f32> = output.into_iter().skip(delay).take(expected).collect();
    aligned.resize(expected, 0.0);
    Ok(aligned)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
