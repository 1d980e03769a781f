//! Persisted output manifest.
//!
//! One JSON document per run: per variant, per split, the ordered entries
//! with clip id, label, augmentation and a reference to the feature tensor.
//! Loading it back reproduces a training run without recomputing any
//! transform.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::augment::AugmentationSpec;
use crate::features::DescriptorSummary;

use super::assembler::AssemblyError;
use super::clip::Label;
use super::loader::SplitLoader;
use super::split::verify_split_consistency;
use super::variant::{ContinuousCurriculum, Split, Variant};

/// Bumped when the layout changes incompatibly.
pub const MANIFEST_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// ManifestError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("manifest I/O on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed manifest {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("unsupported manifest version {0}")]
    Version(u32),

    #[error("inconsistent manifest: {0}")]
    Inconsistent(#[from] AssemblyError),
}

pub(crate) fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), ManifestError> {
    let io_err = |source| ManifestError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    let json = serde_json::to_string_pretty(value).map_err(|source| ManifestError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    std::fs::write(path, json).map_err(io_err)
}

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

/// Where an entry's feature tensor lives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TensorRef {
    /// `.npy` file; relative paths resolve against
    /// [`DatasetManifest::tensor_root`].
    Cached { path: PathBuf },
    /// Row-major values stored in the manifest itself.
    Inline { shape: [usize; 3], data: Vec<f32> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub clip_id: String,
    pub label: Label,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    pub source: PathBuf,
    #[serde(default)]
    pub segment: usize,
    pub augmentation: AugmentationSpec,
    pub tensor: TensorRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub descriptors: Option<DescriptorSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantManifest {
    pub variant: Variant,
    pub train: Vec<ManifestEntry>,
    pub validation: Vec<ManifestEntry>,
    pub test: Vec<ManifestEntry>,
}

impl VariantManifest {
    pub fn new(variant: Variant) -> Self {
        Self {
            variant,
            train: Vec::new(),
            validation: Vec::new(),
            test: Vec::new(),
        }
    }

    pub fn split(&self, split: Split) -> &[ManifestEntry] {
        match split {
            Split::Train => &self.train,
            Split::Validation => &self.validation,
            Split::Test => &self.test,
        }
    }

    pub fn split_mut(&mut self, split: Split) -> &mut Vec<ManifestEntry> {
        match split {
            Split::Train => &mut self.train,
            Split::Validation => &mut self.validation,
            Split::Test => &mut self.test,
        }
    }

    pub fn len(&self) -> usize {
        self.train.len() + self.validation.len() + self.test.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A clip left out of the run, with the reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedClip {
    pub clip_id: String,
    pub path: PathBuf,
    /// Short error class, e.g. `corrupt_file`.
    pub kind: String,
    pub reason: String,
}

// ---------------------------------------------------------------------------
// DatasetManifest
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetManifest {
    pub version: u32,
    pub seed: u64,
    pub sample_rate: u32,
    /// Samples per clip fed to the feature extractor.
    pub clip_samples: usize,
    /// Shape shared by every tensor.
    pub tensor_shape: [usize; 3],
    /// Directory holding this run's cached tensors.  `None` when every
    /// tensor is inline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tensor_root: Option<PathBuf>,
    pub curriculum: ContinuousCurriculum,
    pub variants: Vec<VariantManifest>,
    #[serde(default)]
    pub skipped: Vec<SkippedClip>,
    /// Clips dropped by balancing or by the split targets.
    #[serde(default)]
    pub excluded: Vec<String>,
}

impl DatasetManifest {
    pub fn variant(&self, variant: Variant) -> Option<&VariantManifest> {
        self.variants.iter().find(|v| v.variant == variant)
    }

    /// Variants in curriculum order.
    pub fn curriculum_variants(&self) -> impl Iterator<Item = &VariantManifest> + '_ {
        self.curriculum.iter().filter_map(move |v| self.variant(v))
    }

    /// Loader over one split, reading cached tensors from `tensor_root`.
    pub fn loader(&self, variant: Variant, split: Split) -> Option<SplitLoader<'_>> {
        let root = self.tensor_root.as_deref().unwrap_or_else(|| Path::new("."));
        self.loader_at(variant, split, root)
    }

    /// Loader over one split with the tensor cache moved to `root`.
    pub fn loader_at<'a>(
        &'a self,
        variant: Variant,
        split: Split,
        root: &Path,
    ) -> Option<SplitLoader<'a>> {
        self.variant(variant)
            .map(|v| SplitLoader::new(v.split(split), root, self.tensor_shape))
    }

    /// Re-check the split invariants.
    pub fn verify(&self) -> Result<(), AssemblyError> {
        verify_split_consistency(self.variants.iter().flat_map(|v| {
            Split::ALL.into_iter().flat_map(move |split| {
                v.split(split)
                    .iter()
                    .map(move |e| (v.variant, split, e.clip_id.as_str()))
            })
        }))?;
        Ok(())
    }

    pub fn save(&self, path: &Path) -> Result<(), ManifestError> {
        write_json(path, self)?;
        log::info!("dataset manifest written to {}", path.display());
        Ok(())
    }

    /// Load and verify a manifest.
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let content = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let manifest: Self = serde_json::from_str(&content).map_err(|source| ManifestError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        if manifest.version != MANIFEST_VERSION {
            return Err(ManifestError::Version(manifest.version));
        }
        manifest.verify()?;
        Ok(manifest)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn entry(id: &str, label: Label, spec: AugmentationSpec) -> ManifestEntry {
        ManifestEntry {
            clip_id: id.into(),
            label,
            platform: None,
            source: PathBuf::from(format!("{id}.wav")),
            segment: 0,
            augmentation: spec,
            tensor: TensorRef::Inline {
                shape: [3, 1, 2],
                data: vec![0.0; 6],
            },
            descriptors: None,
        }
    }

    fn manifest() -> DatasetManifest {
        let mut base = VariantManifest::new(Variant::Base);
        base.train.push(entry("a", Label::Human, AugmentationSpec::IDENTITY));
        base.test.push(entry("b", Label::Synthetic, AugmentationSpec::IDENTITY));

        let mut pitch = VariantManifest::new(Variant::Pitch);
        let spec = AugmentationSpec::new(Some(1.25), None).unwrap();
        pitch.train.push(entry("a", Label::Human, spec));
        pitch.test.push(entry("b", Label::Synthetic, spec));

        DatasetManifest {
            version: MANIFEST_VERSION,
            seed: 42,
            sample_rate: 16_000,
            clip_samples: 160_000,
            tensor_shape: [3, 1, 2],
            tensor_root: None,
            curriculum: ContinuousCurriculum::new(vec![Variant::Base, Variant::Pitch]).unwrap(),
            variants: vec![base, pitch],
            skipped: vec![SkippedClip {
                clip_id: "c".into(),
                path: "c.mp3".into(),
                kind: "corrupt_file".into(),
                reason: "truncated".into(),
            }],
            excluded: Vec::new(),
        }
    }

    #[test]
    fn save_then_load_is_identical() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("dataset.json");
        let original = manifest();
        original.save(&path).expect("save");
        assert_eq!(DatasetManifest::load(&path).expect("load"), original);
    }

    #[test]
    fn tensor_ref_is_tagged() {
        let json = serde_json::to_value(TensorRef::Cached {
            path: "base/a.npy".into(),
        })
        .unwrap();
        assert_eq!(json["kind"], "cached");
        assert_eq!(json["path"], "base/a.npy");
    }

    #[test]
    fn load_rejects_cross_variant_conflict() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("bad.json");
        let mut bad = manifest();
        let moved = bad.variants[1].test.remove(0);
        bad.variants[1].validation.push(moved);
        write_json(&path, &bad).unwrap();

        assert!(matches!(
            DatasetManifest::load(&path),
            Err(ManifestError::Inconsistent(AssemblyError::SplitAssignmentConflict { .. }))
        ));
    }

    #[test]
    fn load_rejects_unknown_version() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("v9.json");
        let mut future = manifest();
        future.version = 9;
        write_json(&path, &future).unwrap();
        assert!(matches!(DatasetManifest::load(&path), Err(ManifestError::Version(9))));
    }

    #[test]
    fn loader_reads_from_recorded_tensor_root() {
        use crate::features::{write_npy, FeatureTensor};

        let dir = tempdir().expect("temp dir");
        let tensor = FeatureTensor::from_shape_vec([3, 1, 2], vec![0.5; 6]).unwrap();
        write_npy(&dir.path().join("run/base/a.npy"), &tensor).unwrap();

        let mut m = manifest();
        m.tensor_root = Some(dir.path().join("run"));
        m.variants[0].train[0].tensor = TensorRef::Cached {
            path: "base/a.npy".into(),
        };

        let loader = m.loader(Variant::Base, Split::Train).unwrap();
        let (loaded, label) = loader.iter().next().unwrap().unwrap();
        assert_eq!(loaded, tensor);
        assert_eq!(label, Label::Human);

        let moved = m.loader_at(Variant::Base, Split::Train, dir.path()).unwrap();
        assert!(moved.iter().next().unwrap().is_err());
    }

    #[test]
    fn curriculum_order_survives() {
        let m = manifest();
        let order: Vec<Variant> = m.curriculum_variants().map(|v| v.variant).collect();
        assert_eq!(order, vec![Variant::Base, Variant::Pitch]);
    }
}
