//! Batch orchestration for the dataset pipeline.
//!
//! This module wires the per-clip stages (load → normalise → augment →
//! extract) to the dataset assembler and runs them over a worker pool.
//!
//! # Architecture
//!
//! ```text
//! SourceManifest
//!        │
//!        ▼
//! DatasetBuilder::build()  ← async, tokio
//!        │
//!        ├─ scan      JoinSet::spawn_blocking (≤ run.workers)  → Clip | SkippedClip
//!        ├─ assemble  DatasetAssembler (pure, seeded)          → AssembledDataset
//!        └─ extract   JoinSet::spawn_blocking (≤ run.workers)  → .npy / inline tensors
//!
//! (DatasetManifest, RunReport) ←─── written by the binary
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::path::Path;
//! use aimusic_dataset::config::PipelineConfig;
//! use aimusic_dataset::dataset::SourceManifest;
//! use aimusic_dataset::pipeline::DatasetBuilder;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let sources = SourceManifest::load(Path::new("sources.json"))?;
//!     let builder = DatasetBuilder::new(PipelineConfig::load()?)?;
//!     let (manifest, report) = builder.build(&sources).await?;
//!     manifest.save(Path::new("dataset.json"))?;
//!     report.log_summary();
//!     Ok(())
//! }
//! ```

pub mod report;
pub mod runner;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use report::RunReport;
pub use runner::{
    BuildError, ClipError, ClipRenderer, DatasetBuilder, RenderedVariant, TensorOutput, TensorSink,
};
