//! Mel spectrogram and decibel scaling.
//!
//! Slaney mel scale with Slaney area normalisation over power
//! spectra from [`crate::dsp::stft`].

use ndarray::Array2;

use crate::audio::WaveformBuffer;
use crate::dsp::{fft_frequencies, power_spectrogram, StftParams};

use super::FeatureError;

/// Floor applied before taking logarithms.
pub const AMIN: f32 = 1e-10;

// ---------------------------------------------------------------------------
// MelParams
// ---------------------------------------------------------------------------

/// Parameters of [`mel_spectrogram_with`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MelParams {
    pub n_fft: usize,
    pub hop_length: usize,
    pub win_length: usize,
    pub n_mels: usize,
    pub fmin: f32,
    /// Upper filter edge; `None` means Nyquist.
    pub fmax: Option<f32>,
}

impl Default for MelParams {
    fn default() -> Self {
        Self {
            n_fft: 2048,
            hop_length: 512,
            win_length: 2048,
            n_mels: 128,
            fmin: 0.0,
            fmax: None,
        }
    }
}

impl MelParams {
    pub fn stft(&self) -> StftParams {
        StftParams::new(self.n_fft, self.hop_length, self.win_length)
    }

    pub fn validate(&self, sample_rate: u32) -> Result<(), FeatureError> {
        let invalid = |name: &'static str, reason: String| FeatureError::InvalidParameter { name, reason };
        if !self.stft().is_valid() || self.win_length > self.n_fft {
            return Err(invalid(
                "stft",
                format!(
                    "n_fft {} / hop {} / win {}",
                    self.n_fft, self.hop_length, self.win_length
                ),
            ));
        }
        if self.n_mels == 0 {
            return Err(invalid("n_mels", "must be > 0".into()));
        }
        let nyquist = sample_rate as f32 / 2.0;
        let fmax = self.fmax.unwrap_or(nyquist);
        if !(self.fmin >= 0.0 && self.fmin < fmax && fmax <= nyquist) {
            return Err(invalid(
                "fmin/fmax",
                format!("need 0 <= fmin < fmax <= {nyquist}, got {} / {fmax}", self.fmin),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Mel scale
// ---------------------------------------------------------------------------

const F_SP: f32 = 200.0 / 3.0;
const MIN_LOG_HZ: f32 = 1000.0;
const MIN_LOG_MEL: f32 = MIN_LOG_HZ / F_SP;

fn log_step() -> f32 {
    6.4_f32.ln() / 27.0
}

/// Slaney mel value of `hz` (linear below 1 kHz, logarithmic above).
pub fn hz_to_mel(hz: f32) -> f32 {
    if hz < MIN_LOG_HZ {
        hz / F_SP
    } else {
        MIN_LOG_MEL + (hz / MIN_LOG_HZ).ln() / log_step()
    }
}

pub fn mel_to_hz(mel: f32) -> f32 {
    if mel < MIN_LOG_MEL {
        mel * F_SP
    } else {
        MIN_LOG_HZ * (log_step() * (mel - MIN_LOG_MEL)).exp()
    }
}

/// Triangular mel filterbank of shape `(n_mels, n_fft / 2 + 1)`.
pub fn mel_filterbank(
    sample_rate: u32,
    n_fft: usize,
    n_mels: usize,
    fmin: f32,
    fmax: f32,
) -> Array2<f32> {
    let fft_freqs = fft_frequencies(sample_rate, n_fft);
    let mel_min = hz_to_mel(fmin);
    let mel_max = hz_to_mel(fmax);

    let mel_f: Vec<f32> = (0..n_mels + 2)
        .map(|i| mel_to_hz(mel_min + (mel_max - mel_min) * i as f32 / (n_mels + 1) as f32))
        .collect();
    let fdiff: Vec<f32> = mel_f.windows(2).map(|w| w[1] - w[0]).collect();

    let mut weights = Array2::<f32>::zeros((n_mels, fft_freqs.len()));
    for m in 0..n_mels {
        let enorm = 2.0 / (mel_f[m + 2] - mel_f[m]);
        for (k, &f) in fft_freqs.iter().enumerate() {
            let lower = (f - mel_f[m]) / fdiff[m];
            let upper = (mel_f[m + 2] - f) / fdiff[m + 1];
            weights[[m, k]] = lower.min(upper).max(0.0) * enorm;
        }
    }
    weights
}

// ---------------------------------------------------------------------------
// Spectrogram
// ---------------------------------------------------------------------------

/// Power mel spectrogram with `n_fft = win_length`, shape
/// `(n_mels, 1 + len / hop_length)`.
pub fn mel_spectrogram(
    buffer: &WaveformBuffer,
    n_mels: usize,
    hop_length: usize,
    win_length: usize,
) -> Result<Array2<f32>, FeatureError> {
    mel_spectrogram_with(
        buffer,
        &MelParams {
            n_fft: win_length,
            hop_length,
            win_length,
            n_mels,
            ..MelParams::default()
        },
    )
}

pub fn mel_spectrogram_with(
    buffer: &WaveformBuffer,
    params: &MelParams,
) -> Result<Array2<f32>, FeatureError> {
    if buffer.is_empty() {
        return Err(FeatureError::EmptySignal);
    }
    params.validate(buffer.sample_rate())?;

    let fmax = params
        .fmax
        .unwrap_or(buffer.sample_rate() as f32 / 2.0);
    let filters = mel_filterbank(
        buffer.sample_rate(),
        params.n_fft,
        params.n_mels,
        params.fmin,
        fmax,
    );
    let power = power_spectrogram(buffer.samples(), &params.stft());
    Ok(filters.dot(&power))
}

/// Convert a power spectrogram to decibels relative to its maximum.
///
/// With `top_db`, values are floored at `max_db - top_db`.
pub fn power_to_db(power: &Array2<f32>, top_db: Option<f32>) -> Array2<f32> {
    let reference = power.iter().copied().fold(0.0_f32, f32::max).max(AMIN);
    let ref_db = 10.0 * reference.log10();
    let mut db = power.mapv(|p| 10.0 * p.max(AMIN).log10() - ref_db);

    if let Some(top_db) = top_db {
        let max_db = db.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let floor = max_db - top_db;
        db.mapv_inplace(|v| v.max(floor));
    }
    db
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
