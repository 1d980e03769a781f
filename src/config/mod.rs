//! Configuration module for the dataset pipeline.
//!
//! Provides `PipelineConfig` (top-level settings), sub-configs for each
//! stage, `AppPaths` for cross-platform directories, and TOML persistence via
//! `PipelineConfig::load` / `PipelineConfig::save`.

pub mod paths;
pub mod settings;

pub use paths::AppPaths;
pub use settings::{
    AudioConfig, AugmentConfig, DatasetConfig, FeatureConfig, PipelineConfig, RunConfig,
};
