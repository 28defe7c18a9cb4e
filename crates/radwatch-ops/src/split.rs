//! Stratified train/test split

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use radwatch_core::{Error, Label, Result};

/// Row indices of each side of the split, ascending
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Split row indices so each class keeps its share in the test set.
///
/// Every class with at least two rows contributes at least one row to each
/// side. The same labels, ratio and seed always give the same split.
pub fn stratified_split(labels: &[Label], test_ratio: f64, seed: u64) -> Result<Split> {
    if !(test_ratio > 0.0 && test_ratio < 1.0) {
        return Err(Error::config(format!(
            "test_ratio must lie strictly between 0 and 1, got {}",
            test_ratio
        )));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut train = Vec::new();
    let mut test = Vec::new();

    for class in Label::ALL {
        let mut indices: Vec<usize> = labels
            .iter()
            .enumerate()
            .filter(|(_, l)| **l == class)
            .map(|(i, _)| i)
            .collect();
        indices.shuffle(&mut rng);

        let n = indices.len();
        let n_test = if n < 2 {
            0
        } else {
            ((n as f64 * test_ratio).round() as usize).clamp(1, n - 1)
        };
        test.extend_from_slice(&indices[..n_test]);
        train.extend_from_slice(&indices[n_test..]);
    }

    train.sort_unstable();
    test.sort_unstable();
    Ok(Split { train, test })
}
