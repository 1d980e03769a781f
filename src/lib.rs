//! Dataset construction and augmentation for human-vs-synthetic music
//! classification.
//!
//! Stages are plain functions over explicit data types:
//!
//! ```text
//! audio (WaveformBuffer) → augment (AugmentationSpec) → features (FeatureTensor)
//!                        └──────── dataset (DatasetAssembler, DatasetManifest) ────────┘
//! ```
//!
//! [`pipeline::DatasetBuilder`] runs them over a whole source manifest.

pub mod audio;
pub mod augment;
pub mod config;
pub mod dataset;
pub mod dsp;
pub mod features;
pub mod pipeline;
