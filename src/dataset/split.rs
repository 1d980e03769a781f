//! Stratified fixed-count train / validation / test assignment.
//!
//! Targets are absolute counts, not ratios.  Each split's label quota is
//! half its size; an odd split gives the extra clip to the label with more
//! clips still unassigned (human on ties), which keeps per-label totals equal
//! to the balanced population.

use std::collections::{BTreeMap, HashSet};

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::assembler::AssemblyError;
use super::clip::{Clip, Label};
use super::variant::{Split, Variant};

// ---------------------------------------------------------------------------
// SplitTargets
// ---------------------------------------------------------------------------

/// Absolute clip counts per split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitTargets {
    pub train: usize,
    pub validation: usize,
    pub test: usize,
}

impl Default for SplitTargets {
    fn default() -> Self {
        Self {
            train: 8_596,
            validation: 1_076,
            test: 1_074,
        }
    }
}

impl SplitTargets {
    pub fn get(&self, split: Split) -> usize {
        match split {
            Split::Train => self.train,
            Split::Validation => self.validation,
            Split::Test => self.test,
        }
    }

    pub fn total(&self) -> usize {
        self.train + self.validation + self.test
    }
}

/// `(human, synthetic)` counts for each split in [`Split::ALL`] order.
pub fn label_quotas(
    targets: &SplitTargets,
    humans: usize,
    synthetic: usize,
) -> Result<[(usize, usize); 3], AssemblyError> {
    if targets.total() > humans + synthetic {
        return Err(AssemblyError::InsufficientData {
            label: None,
            required: targets.total(),
            available: humans + synthetic,
        });
    }

    let mut left = (humans, synthetic);
    let mut quotas = [(0, 0); 3];
    for (slot, split) in quotas.iter_mut().zip(Split::ALL) {
        let size = targets.get(split);
        let half = size / 2;
        let (mut h, mut s) = (half, half);
        if size % 2 == 1 {
            if left.0 >= left.1 {
                h += 1;
            } else {
                s += 1;
            }
        }
        if h > left.0 {
            return Err(AssemblyError::InsufficientData {
                label: Some(Label::Human),
                required: h,
                available: left.0,
            });
        }
        if s > left.1 {
            return Err(AssemblyError::InsufficientData {
                label: Some(Label::Synthetic),
                required: s,
                available: left.1,
            });
        }
        left = (left.0 - h, left.1 - s);
        *slot = (h, s);
    }
    Ok(quotas)
}

// ---------------------------------------------------------------------------
// SplitPlan
// ---------------------------------------------------------------------------

/// Ordered clip indices of every split.  Indices refer to the slice passed
/// to [`assign_splits`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SplitPlan {
    pub train: Vec<usize>,
    pub validation: Vec<usize>,
    pub test: Vec<usize>,
    /// Clips left out because the targets are below the population.
    pub unassigned: Vec<usize>,
}

impl SplitPlan {
    pub fn get(&self, split: Split) -> &[usize] {
        match split {
            Split::Train => &self.train,
            Split::Validation => &self.validation,
            Split::Test => &self.test,
        }
    }

    fn get_mut(&mut self, split: Split) -> &mut Vec<usize> {
        match split {
            Split::Train => &mut self.train,
            Split::Validation => &mut self.validation,
            Split::Test => &mut self.test,
        }
    }

    /// Clip id → split.
    pub fn assignment(&self, clips: &[Clip]) -> BTreeMap<String, Split> {
        Split::ALL
            .into_iter()
            .flat_map(|s| self.get(s).iter().map(move |&i| (clips[i].id.clone(), s)))
            .collect()
    }
}

/// Stratified random assignment of `clips` to splits.
///
/// Each label's clips are shuffled and dealt out by quota in train,
/// validation, test order; every split list is then shuffled so labels
/// interleave.
pub fn assign_splits<R: Rng + ?Sized>(
    clips: &[Clip],
    targets: &SplitTargets,
    rng: &mut R,
) -> Result<SplitPlan, AssemblyError> {
    let mut by_label: [Vec<usize>; 2] = [Vec::new(), Vec::new()];
    for (i, clip) in clips.iter().enumerate() {
        by_label[clip.label.index() as usize].push(i);
    }
    let quotas = label_quotas(targets, by_label[0].len(), by_label[1].len())?;

    for group in by_label.iter_mut() {
        group.shuffle(rng);
    }

    let mut plan = SplitPlan::default();
    let mut cursor = [0usize; 2];
    for (split, (h, s)) in Split::ALL.into_iter().zip(quotas) {
        let list = plan.get_mut(split);
        for (label, take) in [(0, h), (1, s)] {
            list.extend_from_slice(&by_label[label][cursor[label]..cursor[label] + take]);
            cursor[label] += take;
        }
        list.shuffle(rng);
    }
    for label in 0..2 {
        plan.unassigned.extend_from_slice(&by_label[label][cursor[label]..]);
    }
    plan.unassigned.sort_unstable();
    Ok(plan)
}

// ---------------------------------------------------------------------------
// Consistency
// ---------------------------------------------------------------------------

/// Check that no clip sits in two splits, within or across variants, and
/// that no variant lists a clip twice.  Returns the shared assignment.
pub fn verify_split_consistency<'a>(
    entries: impl IntoIterator<Item = (Variant, Split, &'a str)>,
) -> Result<BTreeMap<String, Split>, AssemblyError> {
    let mut assignment: BTreeMap<String, Split> = BTreeMap::new();
    let mut seen: HashSet<(Variant, &'a str)> = HashSet::new();

    for (variant, split, clip_id) in entries {
        if let Some(&first) = assignment.get(clip_id) {
            if first != split {
                return Err(AssemblyError::SplitAssignmentConflict {
                    clip_id: clip_id.to_string(),
                    variant,
                    first,
                    second: split,
                });
            }
        } else {
            assignment.insert(clip_id.to_string(), split);
        }
        if !seen.insert((variant, clip_id)) {
            return Err(AssemblyError::DuplicateClip(format!("{clip_id} (in {variant})")));
        }
    }
    Ok(assignment)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::sampling::{seeded_rng, SPLIT_STREAM};

    fn balanced(n: usize) -> Vec<Clip> {
        (0..n)
            .map(|i| Clip::new(format!("h{i:05}"), "h.wav", Label::Human))
            .chain((0..n).map(|i| Clip::new(format!("s{i:05}"), "s.wav", Label::Synthetic)))
            .collect()
    }

    #[test]
    fn default_targets_sum_to_population() {
        assert_eq!(SplitTargets::default().total(), 10_746);
    }

    #[test]
    fn quotas_for_default_targets() {
        let q = label_quotas(&SplitTargets::default(), 5_373, 5_373).unwrap();
        assert_eq!(q, [(4_298, 4_298), (538, 538), (537, 537)]);
    }

    #[test]
    fn odd_targets_hand_the_extra_clip_to_the_fuller_label() {
        let targets = SplitTargets { train: 8_597, validation: 1_075, test: 1_074 };
        let q = label_quotas(&targets, 5_373, 5_373).unwrap();
        assert_eq!(q, [(4_299, 4_298), (537, 538), (537, 537)]);
        let humans: usize = q.iter().map(|x| x.0).sum();
        let synthetic: usize = q.iter().map(|x| x.1).sum();
        assert_eq!((humans, synthetic), (5_373, 5_373));
    }

    #[test]
    fn even_targets_are_exactly_balanced() {
        let targets = SplitTargets { train: 80, validation: 10, test: 10 };
        let q = label_quotas(&targets, 50, 50).unwrap();
        assert!(q.iter().all(|(h, s)| h == s));
    }

    #[test]
    fn paper_targets_exceed_population() {
        let targets = SplitTargets { train: 8_599, validation: 1_075, test: 1_074 };
        let err = label_quotas(&targets, 5_373, 5_373).unwrap_err();
        assert!(matches!(err, AssemblyError::InsufficientData { required: 10_748, available: 10_746, .. }));
    }

    #[test]
    fn assignment_respects_targets_and_balance() {
        let clips = balanced(60);
        let targets = SplitTargets { train: 80, validation: 21, test: 19 };
        let plan = assign_splits(&clips, &targets, &mut seeded_rng(42, SPLIT_STREAM)).unwrap();

        for split in Split::ALL {
            let ids = plan.get(split);
            assert_eq!(ids.len(), targets.get(split));
            let humans = ids.iter().filter(|&&i| clips[i].label == Label::Human).count();
            let synthetic = ids.len() - humans;
            assert!(humans.abs_diff(synthetic) <= 1, "{split}: {humans} vs {synthetic}");
        }
        assert!(plan.unassigned.is_empty());

        let assignment = plan.assignment(&clips);
        assert_eq!(assignment.len(), 120);
    }

    #[test]
    fn leftover_clips_are_reported() {
        let clips = balanced(10);
        let targets = SplitTargets { train: 8, validation: 4, test: 4 };
        let plan = assign_splits(&clips, &targets, &mut seeded_rng(1, SPLIT_STREAM)).unwrap();
        assert_eq!(plan.unassigned.len(), 4);
    }

    #[test]
    fn assignment_is_seeded() {
        let clips = balanced(50);
        let targets = SplitTargets { train: 80, validation: 10, test: 10 };
        let a = assign_splits(&clips, &targets, &mut seeded_rng(42, SPLIT_STREAM)).unwrap();
        let b = assign_splits(&clips, &targets, &mut seeded_rng(42, SPLIT_STREAM)).unwrap();
        let c = assign_splits(&clips, &targets, &mut seeded_rng(43, SPLIT_STREAM)).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn consistency_detects_conflicts_and_duplicates() {
        let ok = [
            (Variant::Base, Split::Train, "a"),
            (Variant::Pitch, Split::Train, "a"),
            (Variant::Base, Split::Test, "b"),
        ];
        assert_eq!(verify_split_consistency(ok).unwrap().len(), 2);

        let conflict = [
            (Variant::Base, Split::Train, "a"),
            (Variant::Tempo, Split::Validation, "a"),
        ];
        assert!(matches!(
            verify_split_consistency(conflict),
            Err(AssemblyError::SplitAssignmentConflict { variant: Variant::Tempo, .. })
        ));

        let duplicate = [
            (Variant::Base, Split::Train, "a"),
            (Variant::Base, Split::Train, "a"),
        ];
        assert!(matches!(
            verify_split_consistency(duplicate),
            Err(AssemblyError::DuplicateClip(_))
        ));
    }
}
