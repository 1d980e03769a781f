//! Waveform → feature conversion.
//!
//! # Pipeline
//!
//! ```text
//! WaveformBuffer → mel_spectrogram (power) → power_to_db → to_image_tensor → FeatureTensor
//!                └→ DescriptorSummary (optional)
//! ```
//!
//! [`FeatureExtractor`] bundles the parameters so every clip and every dataset
//! variant goes through exactly the same chain.
//!
//! ```rust
//! use aimusic_dataset::audio::WaveformBuffer;
//! use aimusic_dataset::features::FeatureExtractor;
//!
//! let clip = WaveformBuffer::new(vec![0.1; 16_000], 16_000);
//! let tensor = FeatureExtractor::default().image_tensor(&clip).unwrap();
//! assert_eq!(tensor.shape(), [3, 128, 32]);
//! ```

pub mod cache;
pub mod descriptors;
pub mod mel;
pub mod tensor;

use thiserror::Error;

use crate::audio::WaveformBuffer;

pub use cache::{read_npy, write_npy, TensorCacheError};
pub use descriptors::{
    chroma, mfcc, rms_energy, spectral_centroid, spectral_contrast, spectral_rolloff,
    zero_crossing_rate, DescriptorSummary, Moments, DEFAULT_N_MFCC,
};
pub use mel::{hz_to_mel, mel_filterbank, mel_spectrogram, mel_spectrogram_with, mel_to_hz, power_to_db, MelParams};
pub use tensor::{resize_bilinear, to_image_tensor, FeatureTensor, IMAGENET_MEAN, IMAGENET_STD};

// ---------------------------------------------------------------------------
// FeatureError
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FeatureError {
    /// The waveform or spectrogram has no samples.
    #[error("empty signal: nothing to extract features from")]
    EmptySignal,

    #[error("invalid {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

// ---------------------------------------------------------------------------
// FeatureExtractor
// ---------------------------------------------------------------------------

/// Fixed feature chain applied to every clip.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureExtractor {
    pub mel: MelParams,
    /// Dynamic range kept by the dB conversion.
    pub top_db: Option<f32>,
    /// Output `(height, width)`; `None` keeps `(n_mels, frames)`.
    pub image_size: Option<(usize, usize)>,
    pub n_mfcc: usize,
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self {
            mel: MelParams::default(),
            top_db: Some(80.0),
            image_size: None,
            n_mfcc: DEFAULT_N_MFCC,
        }
    }
}

impl FeatureExtractor {
    /// dB mel spectrogram of `buffer`.
    pub fn log_mel(&self, buffer: &WaveformBuffer) -> Result<ndarray::Array2<f32>, FeatureError> {
        let power = mel_spectrogram_with(buffer, &self.mel)?;
        Ok(power_to_db(&power, self.top_db))
    }

    /// Normalised 3-channel image tensor of `buffer`.
    pub fn image_tensor(&self, buffer: &WaveformBuffer) -> Result<FeatureTensor, FeatureError> {
        to_image_tensor(&self.log_mel(buffer)?, self.image_size)
    }

    pub fn descriptors(&self, buffer: &WaveformBuffer) -> Result<DescriptorSummary, FeatureError> {
        DescriptorSummary::extract(buffer, &self.mel, self.n_mfcc)
    }

    /// Shape every tensor from a clip of `clip_samples` samples will have.
    pub fn output_shape(&self, clip_samples: usize) -> [usize; 3] {
        match self.image_size {
            Some((h, w)) => [3, h, w],
            None => [3, self.mel.n_mels, self.mel.stft().n_frames(clip_samples)],
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
