//! Train/val/test partitioning.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::{ManifestError, Result};
use crate::types::SplitAssignment;

pub const TRAIN: &str = "train";
pub const VAL: &str = "val";
pub const TEST: &str = "test";

/// Train and validation fractions; the test split takes the remainder.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitRatios {
    pub train: f64,
    pub val: f64,
}

impl SplitRatios {
    /// Checked constructor: each ratio in `[0, 1]` and `train + val <= 1`.
    pub fn new(train: f64, val: f64) -> Result<Self> {
        let invalid = |message: &str| ManifestError::InvalidRatio {
            train,
            val,
            message: message.to_string(),
        };
        if !(0.0..=1.0).contains(&train) || !(0.0..=1.0).contains(&val) {
            return Err(invalid("each ratio must be within [0, 1]"));
        }
        if train + val > 1.0 + f64::EPSILON {
            return Err(invalid("train + val must not exceed 1"));
        }
        Ok(Self { train, val })
    }
}

impl Default for SplitRatios {
    fn default() -> Self {
        Self { train: 0.8, val: 0.1 }
    }
}

/// Shuffle `ids` with `rng` and partition them into train/val/test.
///
/// `n_train = floor(n * train)`, `n_val = floor(n * val)`, the rest is test.
/// Counts are clamped so the three splits always partition `ids` exactly,
/// even for ratios that overshoot.
pub fn assign_splits<R: Rng + ?Sized>(ids: &[String], ratios: SplitRatios, rng: &mut R) -> SplitAssignment {
    let mut shuffled = ids.to_vec();
    shuffled.shuffle(rng);

    let n = shuffled.len();
    let n_train = split_count(n, ratios.train).min(n);
    let n_val = split_count(n, ratios.val).min(n - n_train);

    let test = shuffled.split_off(n_train + n_val);
    let val = shuffled.split_off(n_train);

    let mut splits = SplitAssignment::new();
    splits.insert(TRAIN, shuffled);
    splits.insert(VAL, val);
    splits.insert(TEST, test);
    splits
}

fn split_count(n: usize, ratio: f64) -> usize {
    if ratio.is_nan() || ratio <= 0.0 {
        return 0;
    }
    (n as f64 * ratio).floor() as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::BTreeSet;

    fn ids(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("id{i:03}")).collect()
    }

    #[test]
    fn test_sizes_follow_floor() {
        let mut rng = StdRng::seed_from_u64(7);
        let splits = assign_splits(&ids(10), SplitRatios::default(), &mut rng);
        assert_eq!(splits.get(TRAIN).len(), 8);
        assert_eq!(splits.get(VAL).len(), 1);
        assert_eq!(splits.get(TEST).len(), 1);
    }

    #[test]
    fn test_remainder_goes_to_test() {
        let mut rng = StdRng::seed_from_u64(1);
        let splits = assign_splits(&ids(7), SplitRatios::new(0.5, 0.25).unwrap(), &mut rng);
        assert_eq!(splits.get(TRAIN).len(), 3);
        assert_eq!(splits.get(VAL).len(), 1);
        assert_eq!(splits.get(TEST).len(), 3);
    }

    #[test]
    fn test_exact_partition_for_many_sizes() {
        let mut rng = StdRng::seed_from_u64(99);
        for n in 0..60 {
            for (train, val) in [(0.0, 0.0), (0.8, 0.1), (0.33, 0.33), (1.0, 0.0), (0.0, 1.0), (0.7, 0.3)] {
                let input = ids(n);
                let splits = assign_splits(&input, SplitRatios { train, val }, &mut rng);
                assert_eq!(splits.total_len(), n, "n={n} train={train} val={val}");
                let union: BTreeSet<&str> = splits.all_ids();
                assert_eq!(union.len(), n, "duplicate or lost ids for n={n}");
            }
        }
    }

    #[test]
    fn test_overshooting_ratios_are_clamped() {
        let mut rng = StdRng::seed_from_u64(3);
        let splits = assign_splits(&ids(10), SplitRatios { train: 0.9, val: 0.5 }, &mut rng);
        assert_eq!(splits.get(TRAIN).len(), 9);
        assert_eq!(splits.get(VAL).len(), 1);
        assert!(splits.get(TEST).is_empty());
        assert_eq!(splits.total_len(), 10);
    }

    #[test]
    fn test_same_seed_same_assignment() {
        let input = ids(25);
        let a = assign_splits(&input, SplitRatios::default(), &mut StdRng::seed_from_u64(42));
        let b = assign_splits(&input, SplitRatios::default(), &mut StdRng::seed_from_u64(42));
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_input() {
        let splits = assign_splits(&[], SplitRatios::default(), &mut StdRng::seed_from_u64(0));
        assert!(splits.contains(TRAIN) && splits.contains(VAL) && splits.contains(TEST));
        assert_eq!(splits.total_len(), 0);
    }

    #[test]
    fn test_ratio_validation() {
        assert!(SplitRatios::new(0.8, 0.1).is_ok());
        assert!(SplitRatios::new(0.0, 0.0).is_ok());
        assert!(SplitRatios::new(1.0, 0.0).is_ok());
        assert!(SplitRatios::new(0.9, 0.2).is_err());
        assert!(SplitRatios::new(-0.1, 0.2).is_err());
        assert!(SplitRatios::new(0.5, 1.5).is_err());
    }
}
