//! Pitch and tempo augmentation with recorded provenance.
//!
//! # Operations
//!
//! | Function | Effect | Valid parameter |
//! |----------|--------|-----------------|
//! | [`pitch_shift`] | shifts pitch, keeps duration | `[-2, +2]` semitones |
//! | [`time_stretch`] | changes tempo, keeps pitch; length becomes `round(len / ratio)` | `[0.8, 1.2]` |
//! | [`random_augment`] | draws an [`AugmentationSpec`] from a caller RNG and applies it | ranges inside the limits above |
//!
//! Out-of-range parameters are rejected with
//! [`AugmentError::ParameterRange`], never clamped.  `time_stretch` leaves the
//! output at its stretched length; callers fit it back to the clip duration
//! with [`crate::audio::fix_length`].
//!
//! ```rust
//! use aimusic_dataset::augment::{draw_spec, AugmentRanges};
//! use aimusic_dataset::dataset::seeded_rng;
//!
//! let mut rng = seeded_rng(42, 7);
//! let spec = draw_spec(&mut rng, &AugmentRanges::pitch_and_tempo()).unwrap();
//! assert!(spec.pitch_semitones.is_some() && spec.tempo_ratio.is_some());
//! ```

pub mod vocoder;

use std::ops::RangeInclusive;

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::audio::{fix_length, resample, CropPolicy, ResampleError, WaveformBuffer};

pub use vocoder::{phase_vocoder, VOCODER_PARAMS};

/// Permitted pitch shift in semitones.
pub const PITCH_LIMITS: RangeInclusive<f32> = -2.0..=2.0;
/// Permitted tempo ratio.
pub const TEMPO_LIMITS: RangeInclusive<f32> = 0.8..=1.2;

// ---------------------------------------------------------------------------
// AugmentError
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Clone, PartialEq)]
pub enum AugmentError {
    /// A parameter or range bound lies outside its permitted interval.
    #[error("{parameter} = {value} outside permitted range [{min}, {max}]")]
    ParameterRange {
        parameter: &'static str,
        value: f32,
        min: f32,
        max: f32,
    },

    /// A range whose start exceeds its end.
    #[error("{parameter} range is inverted: [{start}, {end}]")]
    InvertedRange {
        parameter: &'static str,
        start: f32,
        end: f32,
    },

    #[error(transparent)]
    Resample(#[from] ResampleError),
}

fn check(
    parameter: &'static str,
    value: f32,
    limits: &RangeInclusive<f32>,
) -> Result<(), AugmentError> {
    if value.is_finite() && limits.contains(&value) {
        Ok(())
    } else {
        Err(AugmentError::ParameterRange {
            parameter,
            value,
            min: *limits.start(),
            max: *limits.end(),
        })
    }
}

fn check_range(
    parameter: &'static str,
    range: &RangeInclusive<f32>,
    limits: &RangeInclusive<f32>,
) -> Result<(), AugmentError> {
    check(parameter, *range.start(), limits)?;
    check(parameter, *range.end(), limits)?;
    if range.start() > range.end() {
        return Err(AugmentError::InvertedRange {
            parameter,
            start: *range.start(),
            end: *range.end(),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// AugmentationSpec
// ---------------------------------------------------------------------------

/// The exact transform applied to one clip in one dataset variant.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AugmentationSpec {
    /// Pitch shift in semitones, `None` when not applied.
    pub pitch_semitones: Option<f32>,
    /// Tempo ratio, `None` when not applied.
    pub tempo_ratio: Option<f32>,
}

impl AugmentationSpec {
    /// No transform at all.
    pub const IDENTITY: Self = Self {
        pitch_semitones: None,
        tempo_ratio: None,
    };

    /// Build a validated spec.
    pub fn new(pitch_semitones: Option<f32>, tempo_ratio: Option<f32>) -> Result<Self, AugmentError> {
        if let Some(p) = pitch_semitones {
            check("pitch_semitones", p, &PITCH_LIMITS)?;
        }
        if let Some(t) = tempo_ratio {
            check("tempo_ratio", t, &TEMPO_LIMITS)?;
        }
        Ok(Self {
            pitch_semitones,
            tempo_ratio,
        })
    }

    pub fn is_identity(&self) -> bool {
        self.pitch_semitones.is_none() && self.tempo_ratio.is_none()
    }

    /// Apply pitch shift, then time stretch.  The result keeps the stretched
    /// length.
    pub fn apply(&self, buffer: &WaveformBuffer) -> Result<WaveformBuffer, AugmentError> {
        let mut out = buffer.clone();
        if let Some(semitones) = self.pitch_semitones {
            out = pitch_shift(&out, semitones)?;
        }
        if let Some(ratio) = self.tempo_ratio {
            out = time_stretch(&out, ratio)?;
        }
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Transforms
// ---------------------------------------------------------------------------

/// Shift pitch by `semitones` while keeping the number of samples.
///
/// Implemented as a phase-vocoder stretch by `2^(-semitones/12)` followed by
/// a sinc resample by the same factor, head-fitted to the input length.
pub fn pitch_shift(buffer: &WaveformBuffer, semitones: f32) -> Result<WaveformBuffer, AugmentError> {
    check("pitch_semitones", semitones, &PITCH_LIMITS)?;
    if semitones == 0.0 || buffer.is_empty() {
        return Ok(buffer.clone());
    }

    let rate = 2.0_f32.powf(-semitones / 12.0);
    let stretched = phase_vocoder(buffer.samples(), rate, &VOCODER_PARAMS);
    let shifted = resample(&stretched, rate as f64)?;
    Ok(fix_length(
        &WaveformBuffer::new(shifted, buffer.sample_rate()),
        buffer.len(),
        CropPolicy::Head,
    ))
}

/// Change tempo by `ratio` (> 1 faster) without changing pitch.
pub fn time_stretch(buffer: &WaveformBuffer, ratio: f32) -> Result<WaveformBuffer, AugmentError> {
    check("tempo_ratio", ratio, &TEMPO_LIMITS)?;
    if ratio == 1.0 || buffer.is_empty() {
        return Ok(buffer.clone());
    }
    Ok(WaveformBuffer::new(
        phase_vocoder(buffer.samples(), ratio, &VOCODER_PARAMS),
        buffer.sample_rate(),
    ))
}

// ---------------------------------------------------------------------------
// Random draws
// ---------------------------------------------------------------------------

/// Which transforms may be drawn, and with what probability.
#[derive(Debug, Clone, PartialEq)]
pub struct AugmentRanges {
    pub pitch: Option<RangeInclusive<f32>>,
    pub tempo: Option<RangeInclusive<f32>>,
    /// Chance each enabled transform is applied.
    pub apply_probability: f32,
}

impl AugmentRanges {
    pub fn none() -> Self {
        Self {
            pitch: None,
            tempo: None,
            apply_probability: 1.0,
        }
    }

    pub fn pitch_and_tempo() -> Self {
        Self {
            pitch: Some(PITCH_LIMITS),
            tempo: Some(TEMPO_LIMITS),
            apply_probability: 1.0,
        }
    }

    pub fn validate(&self) -> Result<(), AugmentError> {
        if let Some(range) = &self.pitch {
            check_range("pitch_range", range, &PITCH_LIMITS)?;
        }
        if let Some(range) = &self.tempo {
            check_range("tempo_range", range, &TEMPO_LIMITS)?;
        }
        check("apply_probability", self.apply_probability, &(0.0..=1.0))?;
        Ok(())
    }
}

/// Draw an [`AugmentationSpec`] from `rng`.
///
/// For every enabled transform, in the order pitch then tempo, one coin and
/// one value are always consumed, whether or not the coin fires.
pub fn draw_spec<R: Rng + ?Sized>(
    rng: &mut R,
    ranges: &AugmentRanges,
) -> Result<AugmentationSpec, AugmentError> {
    ranges.validate()?;

    let mut draw = |range: &Option<RangeInclusive<f32>>| -> Option<f32> {
        let range = range.as_ref()?;
        let coin: f32 = rng.gen();
        let value = rng.gen_range(range.clone());
        (coin < ranges.apply_probability).then_some(value)
    };

    let pitch_semitones = draw(&ranges.pitch);
    let tempo_ratio = draw(&ranges.tempo);
    Ok(AugmentationSpec {
        pitch_semitones,
        tempo_ratio,
    })
}

/// Draw a spec from `rng` and apply it to `buffer`.
pub fn random_augment<R: Rng + ?Sized>(
    buffer: &WaveformBuffer,
    rng: &mut R,
    ranges: &AugmentRanges,
) -> Result<(WaveformBuffer, AugmentationSpec), AugmentError> {
    let spec = draw_spec(rng, ranges)?;
    let out = spec.apply(buffer)?;
    Ok((out, spec))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
