//! Seeded randomness and class balancing.
//!
//! Every stochastic step gets its own generator derived from the run seed
//! and a stream number, so adding draws to one step never shifts another and
//! per-clip draws do not depend on worker scheduling.

use rand::seq::index;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::clip::{Clip, Label};

/// Stream used by [`balance_classes`].
pub const BALANCE_STREAM: u64 = 1;
/// Stream used by split assignment.
pub const SPLIT_STREAM: u64 = 2;
/// Base stream of per-clip augmentation draws; clip `i` uses
/// `AUGMENT_STREAM + i`.
pub const AUGMENT_STREAM: u64 = 1 << 32;

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^ (x >> 31)
}

/// Mix `seed` and `stream` into an independent 64-bit seed.
pub fn derive_seed(seed: u64, stream: u64) -> u64 {
    splitmix64(seed ^ splitmix64(stream))
}

/// Deterministic generator for `(seed, stream)`.
pub fn seeded_rng(seed: u64, stream: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(derive_seed(seed, stream))
}

/// Keep `min(|human|, |synthetic|)` clips of each label.
///
/// The majority class is subsampled without replacement; survivors keep
/// their input order.  Output lists humans first.
pub fn balance_classes<R: Rng + ?Sized>(clips: Vec<Clip>, rng: &mut R) -> Vec<Clip> {
    let (human, synthetic): (Vec<Clip>, Vec<Clip>) =
        clips.into_iter().partition(|c| c.label == Label::Human);
    let n = human.len().min(synthetic.len());

    let mut keep = |group: Vec<Clip>| -> Vec<Clip> {
        if group.len() == n {
            return group;
        }
        let mut chosen = index::sample(&mut *rng, group.len(), n).into_vec();
        chosen.sort_unstable();
        let mut group: Vec<Option<Clip>> = group.into_iter().map(Some).collect();
        chosen.into_iter().filter_map(|i| group[i].take()).collect()
    };

    let mut balanced = keep(human);
    balanced.extend(keep(synthetic));
    balanced
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
