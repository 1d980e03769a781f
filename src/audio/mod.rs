//! Audio I/O and waveform transforms.
//!
//! # Pipeline
//!
//! ```text
//! file → source::decode (symphonia) → stereo_to_mono → resample (rubato sinc)
//!      → WaveformBuffer → segments → Normalizer
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use aimusic_dataset::audio::{load, normalize, NormalizeMode};
//!
//! let buf = load("clips/human_0001.mp3", 16_000).unwrap();
//! let first = buf.segments(160_000, 160_000).next().expect("at least 10 s");
//! let clip = normalize(&first, NormalizeMode::Peak).unwrap();
//! println!("{} samples @ {}Hz", clip.len(), clip.sample_rate());
//! ```

pub mod buffer;
pub mod normalize;
pub mod resample;
pub mod source;

pub use buffer::{fix_length, CropPolicy, Segments, WaveformBuffer};
pub use normalize::{normalize, NormalizeError, NormalizeMode, Normalizer, DEFAULT_TARGET_RMS};
pub use resample::{resample, resample_to, stereo_to_mono, ResampleError};
pub use source::{decode, load, save_wav, DecodedAudio, LoadError};
