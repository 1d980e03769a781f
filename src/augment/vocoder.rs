//! Phase-vocoder time-scale modification.
//!
//! Frames of the STFT are resampled along the time axis at `rate`; bin
//! magnitudes are linearly interpolated between neighbouring frames and
//! phases are advanced by each bin's measured instantaneous frequency, so
//! the tempo changes while the pitch stays put.

use std::f32::consts::PI;

use ndarray::Array2;
use rustfft::num_complex::Complex32;

use crate::dsp::{istft, stft, StftParams};

/// Frame geometry used for every stretch: 2048-point FFT, 75 % overlap.
pub const VOCODER_PARAMS: StftParams = StftParams {
    n_fft: 2048,
    hop_length: 512,
    win_length: 2048,
};

/// Wrap a phase difference into `[-π, π]`.
fn princarg(phase: f32) -> f32 {
    phase - 2.0 * PI * (phase / (2.0 * PI)).round()
}

/// Stretch `samples` by `rate` (> 1 plays faster).
///
/// The output length is `round(samples.len() / rate)`.
pub fn phase_vocoder(samples: &[f32], rate: f32, params: &StftParams) -> Vec<f32> {
    let out_len = (samples.len() as f64 / rate as f64).round() as usize;
    if samples.is_empty() || out_len == 0 {
        return Vec::new();
    }

    let spectrum = stft(samples, params);
    let (n_bins, n_frames) = spectrum.dim();

    let steps: Vec<f64> = (0..)
        .map(|i| i as f64 * rate as f64)
        .take_while(|&t| t < n_frames as f64)
        .collect();

    let phi_advance: Vec<f32> = (0..n_bins)
        .map(|k| 2.0 * PI * params.hop_length as f32 * k as f32 / params.n_fft as f32)
        .collect();
    let mut phase_acc: Vec<f32> = (0..n_bins).map(|k| spectrum[[k, 0]].arg()).collect();

    let zero = Complex32::new(0.0, 0.0);
    let mut stretched = Array2::<Complex32>::zeros((n_bins, steps.len()));

    for (t_out, &step) in steps.iter().enumerate() {
        let left = step.floor() as usize;
        let alpha = (step - left as f64) as f32;

        for k in 0..n_bins {
            let c0 = spectrum[[k, left]];
            let c1 = if left + 1 < n_frames {
                spectrum[[k, left + 1]]
            } else {
                zero
            };

            let magnitude = (1.0 - alpha) * c0.norm() + alpha * c1.norm();
            stretched[[k, t_out]] = Complex32::from_polar(magnitude, phase_acc[k]);

            let delta = princarg(c1.arg() - c0.arg() - phi_advance[k]);
            phase_acc[k] += phi_advance[k] + delta;
        }
    }

    istft(&stretched, params, out_len)
}
