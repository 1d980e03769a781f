//! Dataset variants, splits and the continuous-learning curriculum.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::augment::AugmentationSpec;

use super::assembler::AssemblyError;
use super::clip::{Clip, Label};

// ---------------------------------------------------------------------------
// Variant
// ---------------------------------------------------------------------------

/// Which augmentation a dataset variant applies.
///
/// | Variant | Pitch shift | Time stretch |
/// |---------|-------------|--------------|
/// | Base | - | - |
/// | Pitch | yes | - |
/// | Tempo | - | yes |
/// | PitchTempo | yes | yes |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    Base,
    Pitch,
    Tempo,
    PitchTempo,
}

impl Variant {
    pub const ALL: [Variant; 4] = [
        Variant::Base,
        Variant::Pitch,
        Variant::Tempo,
        Variant::PitchTempo,
    ];

    /// Lowercase name, also used as the cache sub-directory.
    pub fn slug(self) -> &'static str {
        match self {
            Variant::Base => "base",
            Variant::Pitch => "pitch",
            Variant::Tempo => "tempo",
            Variant::PitchTempo => "pitch_tempo",
        }
    }

    pub fn applies_pitch(self) -> bool {
        matches!(self, Variant::Pitch | Variant::PitchTempo)
    }

    pub fn applies_tempo(self) -> bool {
        matches!(self, Variant::Tempo | Variant::PitchTempo)
    }

    /// Random stream offset of this variant's per-clip draws.
    pub fn stream_id(self) -> u64 {
        self as u64
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for Variant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Variant::ALL
            .into_iter()
            .find(|v| v.slug() == s.to_ascii_lowercase().replace('-', "_"))
            .ok_or_else(|| format!("unknown variant '{s}'"))
    }
}

// ---------------------------------------------------------------------------
// Split
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Split {
    Train,
    Validation,
    Test,
}

impl Split {
    pub const ALL: [Split; 3] = [Split::Train, Split::Validation, Split::Test];
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Split::Train => "train",
            Split::Validation => "validation",
            Split::Test => "test",
        })
    }
}

// ---------------------------------------------------------------------------
// DatasetVariant
// ---------------------------------------------------------------------------

/// A clip paired with the exact transform it receives in one variant.
#[derive(Debug, Clone, PartialEq)]
pub struct VariantEntry {
    pub clip: Clip,
    pub augmentation: AugmentationSpec,
}

/// One variant's ordered train / validation / test lists.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetVariant {
    pub variant: Variant,
    pub train: Vec<VariantEntry>,
    pub validation: Vec<VariantEntry>,
    pub test: Vec<VariantEntry>,
}

impl DatasetVariant {
    pub fn new(variant: Variant) -> Self {
        Self {
            variant,
            train: Vec::new(),
            validation: Vec::new(),
            test: Vec::new(),
        }
    }

    pub fn split(&self, split: Split) -> &[VariantEntry] {
        match split {
            Split::Train => &self.train,
            Split::Validation => &self.validation,
            Split::Test => &self.test,
        }
    }

    pub fn split_mut(&mut self, split: Split) -> &mut Vec<VariantEntry> {
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

    /// Every entry tagged with its split, in split order.
    pub fn entries(&self) -> impl Iterator<Item = (Split, &VariantEntry)> {
        Split::ALL
            .into_iter()
            .flat_map(move |s| self.split(s).iter().map(move |e| (s, e)))
    }

    pub fn label_count(&self, split: Split, label: Label) -> usize {
        self.split(split).iter().filter(|e| e.clip.label == label).count()
    }
}

// ---------------------------------------------------------------------------
// ContinuousCurriculum
// ---------------------------------------------------------------------------

/// Fixed order in which a trainer consumes the variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Variant>", into = "Vec<Variant>")]
pub struct ContinuousCurriculum(Vec<Variant>);

impl ContinuousCurriculum {
    /// Validate an order: non-empty and free of repeats.
    pub fn new(order: Vec<Variant>) -> Result<Self, AssemblyError> {
        if order.is_empty() {
            return Err(AssemblyError::InvalidCurriculum("empty order".into()));
        }
        for (i, v) in order.iter().enumerate() {
            if order[..i].contains(v) {
                return Err(AssemblyError::InvalidCurriculum(format!("{v} listed twice")));
            }
        }
        Ok(Self(order))
    }

    pub fn order(&self) -> &[Variant] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = Variant> + '_ {
        self.0.iter().copied()
    }
}

impl Default for ContinuousCurriculum {
    fn default() -> Self {
        Self(Variant::ALL.to_vec())
    }
}

impl TryFrom<Vec<Variant>> for ContinuousCurriculum {
    type Error = AssemblyError;

    fn try_from(order: Vec<Variant>) -> Result<Self, Self::Error> {
        Self::new(order)
    }
}

impl From<ContinuousCurriculum> for Vec<Variant> {
    fn from(c: ContinuousCurriculum) -> Self {
        c.0
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
