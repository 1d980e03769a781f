//! Dataset assembly: balancing, splitting, variants and manifests.
//!
//! # Flow
//!
//! ```text
//! SourceManifest ─▶ Vec<Clip> ─▶ DatasetAssembler::assemble
//!                                  ├─ balance_classes     (seeded subsample)
//!                                  ├─ assign_splits       (fixed counts, stratified)
//!                                  └─ per-clip AugmentationSpec for Base / Pitch / Tempo / PitchTempo
//!                              ─▶ AssembledDataset + ContinuousCurriculum
//!                              ─▶ (pipeline renders tensors) ─▶ DatasetManifest ─▶ SplitLoader
//! ```
//!
//! # Quick start
//!
//! ```rust
//! use aimusic_dataset::dataset::{Clip, DatasetAssembler, Label, Split, SplitTargets, Variant};
//!
//! let clips: Vec<Clip> = (0..10)
//!     .map(|i| Clip::new(format!("h{i}"), "h.wav", Label::Human))
//!     .chain((0..12).map(|i| Clip::new(format!("s{i}"), "s.wav", Label::Synthetic)))
//!     .collect();
//!
//! let ds = DatasetAssembler::new(42)
//!     .with_targets(SplitTargets { train: 14, validation: 4, test: 2 })
//!     .assemble(clips)
//!     .unwrap();
//! assert_eq!(ds.variant(Variant::Tempo).unwrap().split(Split::Train).len(), 14);
//! ```

pub mod assembler;
pub mod clip;
pub mod loader;
pub mod manifest;
pub mod sampling;
pub mod split;
pub mod variant;

pub use assembler::{AssembledDataset, AssemblyError, DatasetAssembler, DrawMode};
pub use clip::{Clip, Label, SourceEntry, SourceManifest};
pub use loader::{LoaderError, SplitLoader};
pub use manifest::{
    DatasetManifest, ManifestEntry, ManifestError, SkippedClip, TensorRef, VariantManifest,
    MANIFEST_VERSION,
};
pub use sampling::{balance_classes, derive_seed, seeded_rng};
pub use split::{assign_splits, label_quotas, verify_split_consistency, SplitPlan, SplitTargets};
pub use variant::{ContinuousCurriculum, DatasetVariant, Split, Variant, VariantEntry};
