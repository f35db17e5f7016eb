//! # K-Fold Partitions
//!
//! A [`CvSet`] splits the sample indices `0..n` into `k` folds. Each fold's test
//! set is one block of a seeded random permutation and its training set is the
//! complement, so train and test are disjoint by construction and the test sets
//! cover every sample exactly once.

use crate::EdgenetError;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

/// Seed used when the caller does not pick one.
pub const DEFAULT_SEED: u64 = 23;

/// One train/test split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fold {
    train: Vec<usize>,
    test: Vec<usize>,
}

impl Fold {
    pub fn train(&self) -> &[usize] {
        &self.train
    }

    pub fn test(&self) -> &[usize] {
        &self.test
    }
}

#[derive(Debug, Clone)]
pub struct CvSet {
    folds: Vec<Fold>,
    fold_ids: Vec<usize>,
}

impl CvSet {
    /// Shuffles `0..n_samples` with `seed` and deals the permuted indices to
    /// the `n_folds` test sets round-robin. Test set sizes differ by at most one.
    pub fn new(n_samples: usize, n_folds: usize, seed: u64) -> Result<Self, EdgenetError> {
        if n_folds < 2 || n_folds > n_samples {
            return Err(EdgenetError::InvalidFolds {
                samples: n_samples,
                folds: n_folds,
            });
        }

        let mut permutation: Vec<usize> = (0..n_samples).collect();
        let mut rng = StdRng::seed_from_u64(seed);
        permutation.shuffle(&mut rng);

        let mut fold_ids = vec![0; n_samples];
        for (position, &sample) in permutation.iter().enumerate() {
            fold_ids[sample] = position % n_folds;
        }

        let folds = folds_from_ids(&fold_ids, n_folds);
        log::debug!(
            "Built {} folds over {} samples (seed {})",
            n_folds,
            n_samples,
            seed
        );
        Ok(Self { folds, fold_ids })
    }

    /// Reuses an existing sample-to-fold assignment.
    ///
    /// Not implemented yet; always returns [`EdgenetError::NotImplemented`].
    pub fn from_fold_ids(fold_ids: &[usize]) -> Result<Self, EdgenetError> {
        log::error!(
            "Rejected external fold assignment over {} samples",
            fold_ids.len()
        );
        Err(EdgenetError::NotImplemented(
            "cross-validation from externally supplied fold ids",
        ))
    }

    pub fn folds(&self) -> &[Fold] {
        &self.folds
    }

    pub fn n_folds(&self) -> usize {
        self.folds.len()
    }

    /// Sample index to the fold whose test set holds it.
    pub fn fold_ids(&self) -> &[usize] {
        &self.fold_ids
    }
}

fn folds_from_ids(fold_ids: &[usize], n_folds: usize) -> Vec<Fold> {
    (0..n_folds)
        .map(|k| {
            let (test, train) = (0..fold_ids.len()).partition(|&i| fold_ids[i] == k);
            Fold { train, test }
        })
        .collect()
}
