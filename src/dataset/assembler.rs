//! Balanced, split, reproducible dataset variants.
//!
//! # Algorithm
//!
//! 1. Sort clips by id and reject duplicate ids.
//! 2. [`balance_classes`] with the balance stream.
//! 3. [`assign_splits`] with the split stream; the resulting plan is shared by
//!    every variant.
//! 4. Draw an [`AugmentationSpec`] per clip per variant (see [`DrawMode`]).
//! 5. Build the four [`DatasetVariant`]s, verify split consistency across
//!    them and attach the [`ContinuousCurriculum`].
//!
//! The assembler does no I/O; it only decides who goes where with which
//! transform.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::augment::{draw_spec, AugmentError, AugmentRanges, AugmentationSpec};

use super::clip::{Clip, Label};
use super::sampling::{
    balance_classes, derive_seed, seeded_rng, AUGMENT_STREAM, BALANCE_STREAM, SPLIT_STREAM,
};
use super::split::{assign_splits, verify_split_consistency, SplitTargets};
use super::variant::{ContinuousCurriculum, DatasetVariant, Split, Variant, VariantEntry};

// ---------------------------------------------------------------------------
// AssemblyError
// ---------------------------------------------------------------------------

/// Structural failures.  Any of these aborts the whole run.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AssemblyError {
    /// Not enough clips to fill the split targets.  `label` is `None` when
    /// the overall population is short.
    #[error("insufficient data{}: need {required}, have {available}", .label.map(|l| format!(" ({l})")).unwrap_or_default())]
    InsufficientData {
        label: Option<Label>,
        required: usize,
        available: usize,
    },

    /// A clip landed in different splits.
    #[error("clip {clip_id} assigned to {first} and to {second} (in {variant})")]
    SplitAssignmentConflict {
        clip_id: String,
        variant: Variant,
        first: Split,
        second: Split,
    },

    #[error("duplicate clip id {0}")]
    DuplicateClip(String),

    #[error("invalid curriculum: {0}")]
    InvalidCurriculum(String),

    #[error(transparent)]
    Augment(#[from] AugmentError),
}

// ---------------------------------------------------------------------------
// DrawMode
// ---------------------------------------------------------------------------

/// How augmentation parameters relate across variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrawMode {
    /// Every variant draws its own parameters per clip.
    #[default]
    Independent,
    /// One `(pitch, tempo)` pair per clip: Pitch uses the shift, Tempo the
    /// stretch, PitchTempo both.
    Shared,
}

// ---------------------------------------------------------------------------
// AssembledDataset
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct AssembledDataset {
    pub seed: u64,
    /// In [`Variant::ALL`] order.
    pub variants: Vec<DatasetVariant>,
    pub curriculum: ContinuousCurriculum,
    /// Ids dropped by class balancing or left over after the split targets.
    pub excluded: Vec<String>,
}

impl AssembledDataset {
    pub fn variant(&self, variant: Variant) -> Option<&DatasetVariant> {
        self.variants.iter().find(|v| v.variant == variant)
    }

    /// Variants in curriculum order.
    pub fn curriculum_variants(&self) -> impl Iterator<Item = &DatasetVariant> + '_ {
        self.curriculum.iter().filter_map(move |v| self.variant(v))
    }

    /// Clips that made it into the dataset, in Base-variant split order.
    pub fn clips(&self) -> Vec<&Clip> {
        self.variant(Variant::Base)
            .map(|base| base.entries().map(|(_, e)| &e.clip).collect())
            .unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// DatasetAssembler
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct DatasetAssembler {
    pub seed: u64,
    pub targets: SplitTargets,
    /// Pitch / tempo ranges; only the transforms a variant applies are used.
    pub ranges: AugmentRanges,
    pub draws: DrawMode,
    pub curriculum: ContinuousCurriculum,
}

impl DatasetAssembler {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            targets: SplitTargets::default(),
            ranges: AugmentRanges::pitch_and_tempo(),
            draws: DrawMode::default(),
            curriculum: ContinuousCurriculum::default(),
        }
    }

    pub fn with_targets(mut self, targets: SplitTargets) -> Self {
        self.targets = targets;
        self
    }

    pub fn with_ranges(mut self, ranges: AugmentRanges) -> Self {
        self.ranges = ranges;
        self
    }

    pub fn with_draw_mode(mut self, draws: DrawMode) -> Self {
        self.draws = draws;
        self
    }

    pub fn with_curriculum(mut self, curriculum: ContinuousCurriculum) -> Self {
        self.curriculum = curriculum;
        self
    }

    pub fn assemble(&self, mut clips: Vec<Clip>) -> Result<AssembledDataset, AssemblyError> {
        self.ranges.validate()?;

        clips.sort_by(|a, b| a.id.cmp(&b.id));
        if let Some(pair) = clips.windows(2).find(|w| w[0].id == w[1].id) {
            return Err(AssemblyError::DuplicateClip(pair[0].id.clone()));
        }
        let all_ids: Vec<String> = clips.iter().map(|c| c.id.clone()).collect();

        let balanced = balance_classes(clips, &mut seeded_rng(self.seed, BALANCE_STREAM));
        let plan = assign_splits(
            &balanced,
            &self.targets,
            &mut seeded_rng(self.seed, SPLIT_STREAM),
        )?;

        let specs = balanced
            .iter()
            .enumerate()
            .map(|(i, _)| self.draw_clip_specs(i as u64))
            .collect::<Result<Vec<_>, _>>()?;

        let mut variants: Vec<DatasetVariant> =
            Variant::ALL.into_iter().map(DatasetVariant::new).collect();
        for dv in variants.iter_mut() {
            let slot = dv.variant as usize;
            for split in Split::ALL {
                dv.split_mut(split).extend(plan.get(split).iter().map(|&i| VariantEntry {
                    clip: balanced[i].clone(),
                    augmentation: specs[i][slot],
                }));
            }
        }

        verify_split_consistency(variants.iter().flat_map(|dv| {
            dv.entries()
                .map(move |(split, e)| (dv.variant, split, e.clip.id.as_str()))
        }))?;

        let kept: HashSet<&str> = variants[0]
            .entries()
            .map(|(_, e)| e.clip.id.as_str())
            .collect();
        let excluded: Vec<String> = all_ids
            .into_iter()
            .filter(|id| !kept.contains(id.as_str()))
            .collect();

        log::info!(
            "assembled seed {}: train {} / validation {} / test {} ({} excluded)",
            self.seed,
            plan.train.len(),
            plan.validation.len(),
            plan.test.len(),
            excluded.len()
        );

        Ok(AssembledDataset {
            seed: self.seed,
            variants,
            curriculum: self.curriculum.clone(),
            excluded,
        })
    }

    /// Specs of clip `index` for every variant, in [`Variant::ALL`] order.
    fn draw_clip_specs(&self, index: u64) -> Result<[AugmentationSpec; 4], AssemblyError> {
        let clip_stream = AUGMENT_STREAM + index;
        let mut specs = [AugmentationSpec::IDENTITY; 4];

        match self.draws {
            DrawMode::Independent => {
                let clip_seed = derive_seed(self.seed, clip_stream);
                for variant in Variant::ALL.into_iter().filter(|v| *v != Variant::Base) {
                    let ranges = AugmentRanges {
                        pitch: self.ranges.pitch.clone().filter(|_| variant.applies_pitch()),
                        tempo: self.ranges.tempo.clone().filter(|_| variant.applies_tempo()),
                        apply_probability: self.ranges.apply_probability,
                    };
                    let mut rng = seeded_rng(clip_seed, variant.stream_id());
                    specs[variant as usize] = draw_spec(&mut rng, &ranges)?;
                }
            }
            DrawMode::Shared => {
                let full = draw_spec(&mut seeded_rng(self.seed, clip_stream), &self.ranges)?;
                for variant in Variant::ALL {
                    specs[variant as usize] = AugmentationSpec {
                        pitch_semitones: full.pitch_semitones.filter(|_| variant.applies_pitch()),
                        tempo_ratio: full.tempo_ratio.filter(|_| variant.applies_tempo()),
                    };
                }
            }
        }
        Ok(specs)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::augment::{PITCH_LIMITS, TEMPO_LIMITS};

    fn population(humans: usize, synthetic: usize) -> Vec<Clip> {
        (0..humans)
            .map(|i| Clip::new(format!("human_{i:05}"), "h.wav", Label::Human))
            .chain((0..synthetic).map(|i| {
                Clip::new(format!("ai_{i:05}"), "s.wav", Label::Synthetic).with_platform("suno")
            }))
            .collect()
    }

    fn small_targets() -> SplitTargets {
        SplitTargets {
            train: 40,
            validation: 6,
            test: 4,
        }
    }

    #[test]
    fn every_variant_shares_splits() {
        let ds = DatasetAssembler::new(42)
            .with_targets(small_targets())
            .assemble(population(25, 40))
            .unwrap();

        let base = ds.variant(Variant::Base).unwrap();
        for dv in &ds.variants {
            for split in Split::ALL {
                let a: Vec<&str> = base.split(split).iter().map(|e| e.clip.id.as_str()).collect();
                let b: Vec<&str> = dv.split(split).iter().map(|e| e.clip.id.as_str()).collect();
                assert_eq!(a, b, "{} {split}", dv.variant);
            }
        }
        assert_eq!(ds.excluded.len(), 15);
    }

    #[test]
    fn specs_match_variant_kind() {
        let ds = DatasetAssembler::new(7)
            .with_targets(small_targets())
            .assemble(population(25, 25))
            .unwrap();

        for dv in &ds.variants {
            for (_, e) in dv.entries() {
                let spec = e.augmentation;
                assert_eq!(spec.pitch_semitones.is_some(), dv.variant.applies_pitch());
                assert_eq!(spec.tempo_ratio.is_some(), dv.variant.applies_tempo());
                if let Some(p) = spec.pitch_semitones {
                    assert!(PITCH_LIMITS.contains(&p));
                }
                if let Some(t) = spec.tempo_ratio {
                    assert!(TEMPO_LIMITS.contains(&t));
                }
            }
        }
    }

    #[test]
    fn independent_draws_differ_between_variants() {
        let ds = DatasetAssembler::new(3)
            .with_targets(small_targets())
            .assemble(population(25, 25))
            .unwrap();
        let pitch = ds.variant(Variant::Pitch).unwrap();
        let both = ds.variant(Variant::PitchTempo).unwrap();
        let differing = pitch
            .train
            .iter()
            .zip(&both.train)
            .filter(|(a, b)| a.augmentation.pitch_semitones != b.augmentation.pitch_semitones)
            .count();
        assert!(differing > 30);
    }

    #[test]
    fn shared_draws_project_one_pair() {
        let ds = DatasetAssembler::new(3)
            .with_targets(small_targets())
            .with_draw_mode(DrawMode::Shared)
            .assemble(population(25, 25))
            .unwrap();
        let pitch = ds.variant(Variant::Pitch).unwrap();
        let tempo = ds.variant(Variant::Tempo).unwrap();
        let both = ds.variant(Variant::PitchTempo).unwrap();
        for ((p, t), b) in pitch.train.iter().zip(&tempo.train).zip(&both.train) {
            assert_eq!(p.augmentation.pitch_semitones, b.augmentation.pitch_semitones);
            assert_eq!(t.augmentation.tempo_ratio, b.augmentation.tempo_ratio);
        }
    }

    #[test]
    fn input_order_does_not_matter() {
        let assembler = DatasetAssembler::new(11).with_targets(small_targets());
        let forward = population(25, 30);
        let mut reversed = forward.clone();
        reversed.reverse();
        assert_eq!(
            assembler.assemble(forward).unwrap(),
            assembler.assemble(reversed).unwrap()
        );
    }

    #[test]
    fn duplicate_ids_rejected() {
        let mut clips = population(5, 5);
        clips.push(Clip::new("human_00001", "dup.wav", Label::Human));
        let err = DatasetAssembler::new(1)
            .with_targets(SplitTargets { train: 6, validation: 2, test: 2 })
            .assemble(clips)
            .unwrap_err();
        assert_eq!(err, AssemblyError::DuplicateClip("human_00001".into()));
    }

    #[test]
    fn too_few_clips_is_insufficient_data() {
        let err = DatasetAssembler::new(1)
            .with_targets(small_targets())
            .assemble(population(20, 100))
            .unwrap_err();
        assert!(matches!(err, AssemblyError::InsufficientData { .. }));
    }

    #[test]
    fn invalid_ranges_rejected_before_drawing() {
        let mut ranges = AugmentRanges::pitch_and_tempo();
        ranges.tempo = Some(0.5..=1.0);
        let err = DatasetAssembler::new(1)
            .with_ranges(ranges)
            .with_targets(small_targets())
            .assemble(population(25, 25))
            .unwrap_err();
        assert!(matches!(err, AssemblyError::Augment(AugmentError::ParameterRange { .. })));
    }

    #[test]
    fn curriculum_order_is_respected() {
        let curriculum =
            ContinuousCurriculum::new(vec![Variant::PitchTempo, Variant::Base]).unwrap();
        let ds = DatasetAssembler::new(5)
            .with_targets(small_targets())
            .with_curriculum(curriculum)
            .assemble(population(25, 25))
            .unwrap();
        let order: Vec<Variant> = ds.curriculum_variants().map(|v| v.variant).collect();
        assert_eq!(order, vec![Variant::PitchTempo, Variant::Base]);
        assert_eq!(ds.variants.len(), 4);
    }
}
