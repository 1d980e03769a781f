//! Classical spectral descriptors.
//!
//! Every function is a pure function of the waveform.  Frame-wise outputs are
//! centred like the STFT (`1 + len / hop` frames).
//!
//! | Descriptor | Defaults | Output |
//! |------------|----------|--------|
//! | [`mfcc`] | 13 coefficients over a 128-band dB mel spectrogram, orthonormal DCT-II | `(n_mfcc, frames)` |
//! | [`spectral_centroid`] | magnitude spectrum | `frames` Hz |
//! | [`spectral_rolloff`] | 85 % of spectral energy | `frames` Hz |
//! | [`spectral_contrast`] | 6 octave bands from 200 Hz, 2 % quantile | `(7, frames)` dB |
//! | [`zero_crossing_rate`] | frame 2048, hop 512 | `frames` |
//! | [`rms_energy`] | frame 2048, hop 512 | `frames` |
//! | [`chroma`] | 12 pitch classes, C first, per-frame max-normalised | `(12, frames)` |

use std::f32::consts::PI;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::audio::WaveformBuffer;
use crate::dsp::{fft_frequencies, magnitude_spectrogram, power_spectrogram, StftParams};

use super::mel::{mel_spectrogram_with, power_to_db, MelParams, AMIN};
use super::FeatureError;

pub const DEFAULT_N_MFCC: usize = 13;
pub const DEFAULT_ROLL_PERCENT: f32 = 0.85;
pub const CONTRAST_FMIN: f32 = 200.0;
pub const CONTRAST_BANDS: usize = 6;
pub const CONTRAST_QUANTILE: f32 = 0.02;

fn non_empty(buffer: &WaveformBuffer) -> Result<(), FeatureError> {
    if buffer.is_empty() {
        Err(FeatureError::EmptySignal)
    } else {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MFCC
// ---------------------------------------------------------------------------

/// Mel-frequency cepstral coefficients.
pub fn mfcc(
    buffer: &WaveformBuffer,
    n_mfcc: usize,
    mel: &MelParams,
) -> Result<Array2<f32>, FeatureError> {
    if n_mfcc == 0 || n_mfcc > mel.n_mels {
        return Err(FeatureError::InvalidParameter {
            name: "n_mfcc",
            reason: format!("must be in 1..={}, got {n_mfcc}", mel.n_mels),
        });
    }
    let db = power_to_db(&mel_spectrogram_with(buffer, mel)?, Some(80.0));
    let n_mels = db.nrows();

    // Orthonormal DCT-II basis, (n_mfcc, n_mels).
    let basis = Array2::from_shape_fn((n_mfcc, n_mels), |(k, n)| {
        let scale = if k == 0 {
            (1.0 / n_mels as f32).sqrt()
        } else {
            (2.0 / n_mels as f32).sqrt()
        };
        scale * (PI * k as f32 * (2 * n + 1) as f32 / (2 * n_mels) as f32).cos()
    });
    Ok(basis.dot(&db))
}

// ---------------------------------------------------------------------------
// Spectral shape
// ---------------------------------------------------------------------------

/// Magnitude-weighted mean frequency per frame.
pub fn spectral_centroid(
    buffer: &WaveformBuffer,
    params: &StftParams,
) -> Result<Vec<f32>, FeatureError> {
    non_empty(buffer)?;
    let mag = magnitude_spectrogram(buffer.samples(), params);
    let freqs = fft_frequencies(buffer.sample_rate(), params.n_fft);

    Ok(mag
        .columns()
        .into_iter()
        .map(|col| {
            let total: f32 = col.sum();
            if total <= 0.0 {
                return 0.0;
            }
            col.iter().zip(&freqs).map(|(m, f)| m * f).sum::<f32>() / total
        })
        .collect())
}

/// Frequency below which `roll_percent` of each frame's magnitude lies.
pub fn spectral_rolloff(
    buffer: &WaveformBuffer,
    params: &StftParams,
    roll_percent: f32,
) -> Result<Vec<f32>, FeatureError> {
    non_empty(buffer)?;
    if !(roll_percent > 0.0 && roll_percent < 1.0) {
        return Err(FeatureError::InvalidParameter {
            name: "roll_percent",
            reason: format!("must be in (0, 1), got {roll_percent}"),
        });
    }
    let mag = magnitude_spectrogram(buffer.samples(), params);
    let freqs = fft_frequencies(buffer.sample_rate(), params.n_fft);

    Ok(mag
        .columns()
        .into_iter()
        .map(|col| {
            let threshold = roll_percent * col.sum();
            let mut cumulative = 0.0;
            for (m, &f) in col.iter().zip(&freqs) {
                cumulative += m;
                if cumulative >= threshold && threshold > 0.0 {
                    return f;
                }
            }
            0.0
        })
        .collect())
}

/// Peak-to-valley contrast per octave band, shape `(CONTRAST_BANDS + 1,
/// frames)`.  Band edges are `0, 200, 400, … Hz`, the top band reaching
/// Nyquist.
pub fn spectral_contrast(
    buffer: &WaveformBuffer,
    params: &StftParams,
) -> Result<Array2<f32>, FeatureError> {
    non_empty(buffer)?;
    let nyquist = buffer.sample_rate() as f32 / 2.0;
    let mut edges = vec![0.0_f32];
    edges.extend((0..=CONTRAST_BANDS).map(|k| CONTRAST_FMIN * 2.0_f32.powi(k as i32)));
    if edges[CONTRAST_BANDS] >= nyquist {
        return Err(FeatureError::InvalidParameter {
            name: "sample_rate",
            reason: format!(
                "octave band edge {} Hz reaches Nyquist {nyquist} Hz",
                edges[CONTRAST_BANDS]
            ),
        });
    }

    let mag = magnitude_spectrogram(buffer.samples(), params);
    let freqs = fft_frequencies(buffer.sample_rate(), params.n_fft);
    let n_frames = mag.ncols();
    let mut contrast = Array2::<f32>::zeros((CONTRAST_BANDS + 1, n_frames));

    for band in 0..=CONTRAST_BANDS {
        let low = edges[band];
        let high = if band == CONTRAST_BANDS {
            nyquist
        } else {
            edges[band + 1]
        };
        let bins: Vec<usize> = freqs
            .iter()
            .enumerate()
            .filter(|(_, f)| **f >= low && **f <= high)
            .map(|(k, _)| k)
            .collect();
        if bins.is_empty() {
            continue;
        }
        let take = ((CONTRAST_QUANTILE * bins.len() as f32).round() as usize).max(1);

        for t in 0..n_frames {
            let mut values: Vec<f32> = bins.iter().map(|&k| mag[[k, t]]).collect();
            values.sort_by(f32::total_cmp);
            let valley = values[..take].iter().sum::<f32>() / take as f32;
            let peak = values[values.len() - take..].iter().sum::<f32>() / take as f32;
            contrast[[band, t]] =
                10.0 * peak.max(AMIN).log10() - 10.0 * valley.max(AMIN).log10();
        }
    }
    Ok(contrast)
}

// ---------------------------------------------------------------------------
// Time-domain framing
// ---------------------------------------------------------------------------

/// Centred frames of `frame_length` samples.  `edge` selects edge padding
/// instead of zeros.
fn frames(samples: &[f32], frame_length: usize, hop: usize, edge: bool) -> Vec<Vec<f32>> {
    let pad = frame_length / 2;
    let first = samples.first().copied().unwrap_or(0.0);
    let last = samples.last().copied().unwrap_or(0.0);
    let mut padded = Vec::with_capacity(samples.len() + 2 * pad);
    padded.extend(std::iter::repeat(if edge { first } else { 0.0 }).take(pad));
    padded.extend_from_slice(samples);
    padded.extend(std::iter::repeat(if edge { last } else { 0.0 }).take(pad));

    let n_frames = 1 + samples.len() / hop;
    (0..n_frames)
        .map(|t| {
            let start = t * hop;
            let end = (start + frame_length).min(padded.len());
            padded[start.min(end)..end].to_vec()
        })
        .collect()
}

fn check_framing(frame_length: usize, hop: usize) -> Result<(), FeatureError> {
    if frame_length == 0 || hop == 0 {
        return Err(FeatureError::InvalidParameter {
            name: "frame_length/hop",
            reason: format!("must be > 0, got {frame_length} / {hop}"),
        });
    }
    Ok(())
}

/// Fraction of sign changes per frame.  Zero counts as positive.
pub fn zero_crossing_rate(
    buffer: &WaveformBuffer,
    frame_length: usize,
    hop: usize,
) -> Result<Vec<f32>, FeatureError> {
    non_empty(buffer)?;
    check_framing(frame_length, hop)?;
    Ok(frames(buffer.samples(), frame_length, hop, true)
        .iter()
        .map(|frame| {
            let crossings = frame
                .windows(2)
                .filter(|w| (w[0] >= 0.0) != (w[1] >= 0.0))
                .count();
            crossings as f32 / frame_length as f32
        })
        .collect())
}

/// Root-mean-square energy per frame.
pub fn rms_energy(
    buffer: &WaveformBuffer,
    frame_length: usize,
    hop: usize,
) -> Result<Vec<f32>, FeatureError> {
    non_empty(buffer)?;
    check_framing(frame_length, hop)?;
    Ok(frames(buffer.samples(), frame_length, hop, false)
        .iter()
        .map(|frame| {
            let sum_sq: f64 = frame.iter().map(|&s| (s as f64) * (s as f64)).sum();
            (sum_sq / frame_length as f64).sqrt() as f32
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Chroma
// ---------------------------------------------------------------------------

/// Pitch-class energy profile, shape `(12, frames)`, row 0 = C.
pub fn chroma(buffer: &WaveformBuffer, params: &StftParams) -> Result<Array2<f32>, FeatureError> {
    non_empty(buffer)?;
    let power = power_spectrogram(buffer.samples(), params);
    let freqs = fft_frequencies(buffer.sample_rate(), params.n_fft);
    let mut out = Array2::<f32>::zeros((12, power.ncols()));

    let classes: Vec<Option<usize>> = freqs
        .iter()
        .map(|&f| {
            // Skip DC and sub-audio bins.
            (f >= 20.0).then(|| {
                let midi = 69.0 + 12.0 * (f / 440.0).log2();
                (midi.round() as i64).rem_euclid(12) as usize
            })
        })
        .collect();

    for (k, class) in classes.iter().enumerate() {
        if let Some(c) = class {
            for t in 0..power.ncols() {
                out[[*c, t]] += power[[k, t]];
            }
        }
    }
    for mut col in out.columns_mut() {
        let max = col.iter().copied().fold(0.0_f32, f32::max);
        if max > 0.0 {
            col.mapv_inplace(|v| v / max);
        }
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// DescriptorSummary
// ---------------------------------------------------------------------------

/// Mean and standard deviation of a frame-wise series.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Moments {
    pub mean: f32,
    pub std: f32,
}

impl Moments {
    pub fn of(values: impl IntoIterator<Item = f32>) -> Self {
        let values: Vec<f64> = values.into_iter().map(f64::from).collect();
        if values.is_empty() {
            return Self::default();
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
        Self {
            mean: mean as f32,
            std: var.sqrt() as f32,
        }
    }
}

/// Clip-level summary of every descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DescriptorSummary {
    pub mfcc: Vec<Moments>,
    pub spectral_centroid: Moments,
    pub spectral_rolloff: Moments,
    pub spectral_contrast: Vec<Moments>,
    pub zero_crossing_rate: Moments,
    pub rms_energy: Moments,
    pub chroma: Vec<Moments>,
}

impl DescriptorSummary {
    /// Compute every descriptor with the STFT geometry of `mel`.
    pub fn extract(
        buffer: &WaveformBuffer,
        mel: &MelParams,
        n_mfcc: usize,
    ) -> Result<Self, FeatureError> {
        let stft = mel.stft();
        let rows = |a: &Array2<f32>| -> Vec<Moments> {
            a.rows().into_iter().map(|r| Moments::of(r.iter().copied())).collect()
        };

        Ok(Self {
            mfcc: rows(&mfcc(buffer, n_mfcc, mel)?),
            spectral_centroid: Moments::of(spectral_centroid(buffer, &stft)?),
            spectral_rolloff: Moments::of(spectral_rolloff(buffer, &stft, DEFAULT_ROLL_PERCENT)?),
            spectral_contrast: rows(&spectral_contrast(buffer, &stft)?),
            zero_crossing_rate: Moments::of(zero_crossing_rate(buffer, stft.n_fft, stft.hop_length)?),
            rms_energy: Moments::of(rms_energy(buffer, stft.n_fft, stft.hop_length)?),
            chroma: rows(&chroma(buffer, &stft)?),
        })
    }

    /// Flatten to `[mean, std]` pairs in field order.
    pub fn to_vector(&self) -> Vec<f32> {
        let scalars = [
            self.spectral_centroid,
            self.spectral_rolloff,
            self.zero_crossing_rate,
            self.rms_energy,
        ];
        self.mfcc
            .iter()
            .chain(&scalars[..2])
            .chain(&self.spectral_contrast)
            .chain(&scalars[2..])
            .chain(&self.chroma)
            .flat_map(|m| [m.mean, m.std])
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
