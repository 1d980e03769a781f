//! Short-time Fourier transform shared by the augmenter and the feature
//! extractor.
//!
//! Conventions:
//!
//! - periodic Hann window of `win_length`, zero-padded to `n_fft` and centred;
//! - centred frames: the signal is zero-padded by `n_fft / 2` on both sides,
//!   giving `1 + len / hop_length` frames;
//! - spectra are `(n_fft / 2 + 1) × frames` arrays.

use std::f32::consts::PI;

use ndarray::Array2;
use rustfft::num_complex::Complex32;
use rustfft::FftPlanner;

/// Frame geometry for [`stft`] / [`istft`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StftParams {
    pub n_fft: usize,
    pub hop_length: usize,
    pub win_length: usize,
}

impl StftParams {
    pub fn new(n_fft: usize, hop_length: usize, win_length: usize) -> Self {
        Self {
            n_fft,
            hop_length,
            win_length: win_length.min(n_fft),
        }
    }

    /// Number of frequency bins.
    pub fn n_bins(&self) -> usize {
        self.n_fft / 2 + 1
    }

    /// Number of centred frames for a signal of `len` samples.
    pub fn n_frames(&self, len: usize) -> usize {
        1 + len / self.hop_length.max(1)
    }

    /// Whether the geometry is usable.
    pub fn is_valid(&self) -> bool {
        self.n_fft >= 2 && self.hop_length > 0 && self.win_length > 0
    }
}

/// Periodic Hann window (`fftbins=True` in scipy terms).
pub fn hann_window(len: usize) -> Vec<f32> {
    (0..len)
        .map(|n| 0.5 - 0.5 * (2.0 * PI * n as f32 / len as f32).cos())
        .collect()
}

/// Hann window of `win_length` centred inside `n_fft` zeros.
fn padded_window(params: &StftParams) -> Vec<f32> {
    let mut window = vec![0.0; params.n_fft];
    let offset = (params.n_fft - params.win_length) / 2;
    window[offset..offset + params.win_length].copy_from_slice(&hann_window(params.win_length));
    window
}

/// Complex STFT of `samples`.
pub fn stft(samples: &[f32], params: &StftParams) -> Array2<Complex32> {
    let n_fft = params.n_fft;
    let pad = n_fft / 2;
    let n_frames = params.n_frames(samples.len());
    let window = padded_window(params);

    let mut padded = vec![0.0_f32; samples.len() + 2 * pad];
    padded[pad..pad + samples.len()].copy_from_slice(samples);

    let fft = FftPlanner::<f32>::new().plan_fft_forward(n_fft);
    let mut spectrum = Array2::<Complex32>::zeros((params.n_bins(), n_frames));
    let mut frame = vec![Complex32::new(0.0, 0.0); n_fft];

    for t in 0..n_frames {
        let start = t * params.hop_length;
        for (i, slot) in frame.iter_mut().enumerate() {
            let s = padded.get(start + i).copied().unwrap_or(0.0);
            *slot = Complex32::new(s * window[i], 0.0);
        }
        fft.process(&mut frame);
        for (k, value) in frame.iter().take(params.n_bins()).enumerate() {
            spectrum[[k, t]] = *value;
        }
    }

    spectrum
}

/// Power spectrogram `|X|²`.
pub fn power_spectrogram(samples: &[f32], params: &StftParams) -> Array2<f32> {
    stft(samples, params).mapv(|c| c.norm_sqr())
}

/// Magnitude spectrogram `|X|`.
pub fn magnitude_spectrogram(samples: &[f32], params: &StftParams) -> Array2<f32> {
    stft(samples, params).mapv(|c| c.norm())
}

/// Inverse of [`stft`] by weighted overlap-add, returning exactly `length`
/// samples.
pub fn istft(spectrum: &Array2<Complex32>, params: &StftParams, length: usize) -> Vec<f32> {
    let n_fft = params.n_fft;
    let hop = params.hop_length;
    let pad = n_fft / 2;
    let n_frames = spectrum.ncols();
    let window = padded_window(params);

    let total = n_fft + hop * n_frames.saturating_sub(1);
    let mut output = vec![0.0_f32; total];
    let mut window_sum = vec![0.0_f32; total];

    let ifft = FftPlanner::<f32>::new().plan_fft_inverse(n_fft);
    let mut frame = vec![Complex32::new(0.0, 0.0); n_fft];
    let scale = 1.0 / n_fft as f32;

    for t in 0..n_frames {
        // Rebuild the full Hermitian spectrum from the positive bins.
        for k in 0..n_fft {
            frame[k] = if k < params.n_bins() {
                spectrum[[k, t]]
            } else {
                spectrum[[n_fft - k, t]].conj()
            };
        }
        ifft.process(&mut frame);

        let start = t * hop;
        for i in 0..n_fft {
            output[start + i] += frame[i].re * scale * window[i];
            window_sum[start + i] += window[i] * window[i];
        }
    }

    for (sample, &w) in output.iter_mut().zip(&window_sum) {
        if w > 1e-8 {
            *sample /= w;
        }
    }

    let mut trimmed: Vec<f32> = output.into_iter().skip(pad).take(length).collect();
    trimmed.resize(length, 0.0);
    trimmed
}

/// Centre frequency in Hz of every STFT bin.
pub fn fft_frequencies(sample_rate: u32, n_fft: usize) -> Vec<f32> {
    (0..n_fft / 2 + 1)
        .map(|k| k as f32 * sample_rate as f32 / n_fft as f32)
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, rate: f32, n: usize) -> Vec<f32> {
        (0..n)
            .map(|i| (2.0 * PI * freq * i as f32 / rate).sin())
            .collect()
    }

    #[test]
    fn frame_count_is_centred() {
        let params = StftParams::new(512, 128, 512);
        let spec = stft(&vec![0.0; 1_000], &params);
        assert_eq!(spec.dim(), (257, 1 + 1_000 / 128));
    }

    #[test]
    fn peak_lands_on_tone_bin() {
        let params = StftParams::new(1024, 256, 1024);
        // 1 kHz at 16 kHz → bin 64
        let power = power_spectrogram(&sine(1_000.0, 16_000.0, 8_000), &params);
        let frame = power.column(10);
        let peak_bin = frame
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(k, _)| k)
            .unwrap();
        assert_eq!(peak_bin, 64);
    }

    #[test]
    fn istft_inverts_stft() {
        let params = StftParams::new(512, 128, 512);
        let signal = sine(440.0, 16_000.0, 4_000);
        let rebuilt = istft(&stft(&signal, &params), &params, signal.len());
        assert_eq!(rebuilt.len(), signal.len());
        let max_err = signal
            .iter()
            .zip(&rebuilt)
            .map(|(a, b)| (a - b).abs())
            .fold(0.0_f32, f32::max);
        assert!(max_err < 1e-3, "max error {max_err}");
    }

    #[test]
    fn short_window_is_centred() {
        let params = StftParams::new(8, 2, 4);
        let w = padded_window(&params);
        assert_eq!(w[..2], [0.0, 0.0]);
        assert_eq!(w[6..], [0.0, 0.0]);
        assert!(w[4] > 0.9);
    }

    #[test]
    fn frequencies_span_to_nyquist() {
        let f = fft_frequencies(16_000, 2048);
        assert_eq!(f.len(), 1025);
        assert_eq!(f[0], 0.0);
        assert!((f[1024] - 8_000.0).abs() < 1e-3);
    }
}
