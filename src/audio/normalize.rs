//! Amplitude normalisation.
//!
//! | Mode | Result |
//! |------|--------|
//! | `Peak` | max absolute sample is exactly `1.0` |
//! | `Rms`  | RMS level equals the configured target (default `0.1`) |
//!
//! Both modes reject an all-zero buffer with [`NormalizeError::SilentClip`]
//! instead of dividing by zero. The input buffer is never modified.
//!
//! ```rust
//! use aimusic_dataset::audio::{normalize, NormalizeMode, WaveformBuffer};
//!
//! let buf = WaveformBuffer::new(vec![0.25, -0.5, 0.1], 16_000);
//! let out = normalize(&buf, NormalizeMode::Peak).unwrap();
//! assert_eq!(out.peak(), 1.0);
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::WaveformBuffer;

/// RMS level targeted by [`NormalizeMode::Rms`] unless configured otherwise.
pub const DEFAULT_TARGET_RMS: f32 = 0.1;

// ---------------------------------------------------------------------------
// NormalizeError
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Clone, PartialEq)]
pub enum NormalizeError {
    /// Every sample is zero, so no gain can be derived.
    #[error("silent clip: {samples} samples with zero energy")]
    SilentClip { samples: usize },

    /// The buffer contains NaN or infinite samples.
    #[error("clip contains non-finite samples")]
    NonFinite,

    /// Configured RMS target is not a positive finite number.
    #[error("invalid RMS target {0}")]
    InvalidTarget(f32),
}

// ---------------------------------------------------------------------------
// NormalizeMode / Normalizer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizeMode {
    #[default]
    Peak,
    Rms,
}

/// A normalisation mode together with its RMS target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalizer {
    pub mode: NormalizeMode,
    /// Only read in [`NormalizeMode::Rms`].
    pub target_rms: f32,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self {
            mode: NormalizeMode::Peak,
            target_rms: DEFAULT_TARGET_RMS,
        }
    }
}

impl Normalizer {
    pub fn new(mode: NormalizeMode, target_rms: f32) -> Self {
        Self { mode, target_rms }
    }

    /// Return a rescaled copy of `buffer`.
    pub fn normalize(&self, buffer: &WaveformBuffer) -> Result<WaveformBuffer, NormalizeError> {
        if buffer.samples().iter().any(|s| !s.is_finite()) {
            return Err(NormalizeError::NonFinite);
        }

        match self.mode {
            NormalizeMode::Peak => {
                let peak = buffer.peak();
                if peak == 0.0 {
                    return Err(NormalizeError::SilentClip {
                        samples: buffer.len(),
                    });
                }
                // Divide rather than multiply by 1/peak so the loudest
                // sample lands on exactly ±1.0.
                Ok(buffer.map_samples(|s| s / peak))
            }
            NormalizeMode::Rms => {
                if !self.target_rms.is_finite() || self.target_rms <= 0.0 {
                    return Err(NormalizeError::InvalidTarget(self.target_rms));
                }
                let rms = buffer.rms();
                if rms == 0.0 {
                    return Err(NormalizeError::SilentClip {
                        samples: buffer.len(),
                    });
                }
                let gain = self.target_rms / rms;
                Ok(buffer.map_samples(|s| s * gain))
            }
        }
    }
}

/// Normalise with `mode`, using [`DEFAULT_TARGET_RMS`] for RMS mode.
pub fn normalize(
    buffer: &WaveformBuffer,
    mode: NormalizeMode,
) -> Result<WaveformBuffer, NormalizeError> {
    Normalizer::new(mode, DEFAULT_TARGET_RMS).normalize(buffer)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
