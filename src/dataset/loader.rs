//! `(FeatureTensor, Label)` iteration over one split of a manifest.
//!
//! A [`SplitLoader`] borrows the manifest, so iterating it again restarts the
//! epoch.  Shuffling is per epoch and never crosses the split boundary.

use std::path::{Path, PathBuf};

use rand::seq::SliceRandom;
use rand::Rng;
use thiserror::Error;

use crate::features::{read_npy, FeatureError, FeatureTensor, TensorCacheError};

use super::clip::Label;
use super::manifest::{ManifestEntry, TensorRef};

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error(transparent)]
    Cache(#[from] TensorCacheError),

    #[error(transparent)]
    Feature(#[from] FeatureError),

    #[error("tensor for {clip_id} has shape {got:?}, expected {expected:?}")]
    ShapeMismatch {
        clip_id: String,
        got: [usize; 3],
        expected: [usize; 3],
    },
}

/// Finite, restartable view of one split.
#[derive(Debug, Clone)]
pub struct SplitLoader<'a> {
    entries: &'a [ManifestEntry],
    root: PathBuf,
    shape: [usize; 3],
}

impl<'a> SplitLoader<'a> {
    pub fn new(entries: &'a [ManifestEntry], root: &Path, shape: [usize; 3]) -> Self {
        Self {
            entries,
            root: root.to_path_buf(),
            shape,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &'a [ManifestEntry] {
        self.entries
    }

    /// Load the tensor of one entry.
    pub fn load(&self, entry: &ManifestEntry) -> Result<(FeatureTensor, Label), LoaderError> {
        let tensor = match &entry.tensor {
            TensorRef::Cached { path } => read_npy(&self.root.join(path))?,
            TensorRef::Inline { shape, data } => FeatureTensor::from_shape_vec(*shape, data.clone())?,
        };
        if tensor.shape() != self.shape {
            return Err(LoaderError::ShapeMismatch {
                clip_id: entry.clip_id.clone(),
                got: tensor.shape(),
                expected: self.shape,
            });
        }
        Ok((tensor, entry.label))
    }

    /// One epoch in manifest order.
    pub fn iter(&self) -> impl Iterator<Item = Result<(FeatureTensor, Label), LoaderError>> + '_ {
        self.entries.iter().map(move |e| self.load(e))
    }

    /// One epoch in an order shuffled by `rng`.
    pub fn iter_shuffled<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
    ) -> impl Iterator<Item = Result<(FeatureTensor, Label), LoaderError>> + '_ {
        let mut order: Vec<usize> = (0..self.entries.len()).collect();
        order.shuffle(rng);
        order.into_iter().map(move |i| self.load(&self.entries[i]))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
