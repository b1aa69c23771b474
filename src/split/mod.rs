//! Seeded train/test partitioning
//!
//! The splitter is the only producer of train/test provenance, which is what
//! the transform pipeline checks before it agrees to fit.

use crate::data::{Dataset, Label, Provenance};
use crate::error::{Result, SentinelError};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Split settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    /// Fraction of rows that go to the training split
    pub train_ratio: f64,
    pub seed: u64,
    /// Split each class separately so both halves keep the label mix
    pub stratify: bool,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            train_ratio: 0.8,
            seed: 42,
            stratify: false,
        }
    }
}

impl SplitConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.train_ratio > 0.0 && self.train_ratio < 1.0) {
            return Err(SentinelError::invalid_parameter(
                "split.train_ratio",
                self.train_ratio,
                "must lie in (0, 1)",
            ));
        }
        Ok(())
    }
}

/// Row indices of one partition, in permutation order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Deterministic train/test splitter
#[derive(Debug, Clone)]
pub struct Splitter {
    config: SplitConfig,
}

impl Splitter {
    pub fn new(config: SplitConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Split `dataset` into (train, test). Same dataset and seed give the
    /// same partition.
    ///
    /// Only raw datasets can be split; re-splitting either half fails with
    /// [`SentinelError::LeakageGuardViolation`].
    pub fn split(&self, dataset: &Dataset) -> Result<(Dataset, Dataset)> {
        let provenance = dataset.provenance();
        if provenance != Provenance::Raw {
            return Err(SentinelError::LeakageGuardViolation { provenance });
        }
        let labels = dataset.labels().ok_or_else(|| {
            SentinelError::DataError("Cannot split an unlabelled dataset".to_string())
        })?;
        let indices = self.split_indices(labels)?;

        let split_id = self.split_id(dataset.n_rows());
        let train = dataset.select_rows(&indices.train, Provenance::TrainSplit { split_id });
        let test = dataset.select_rows(&indices.test, Provenance::TestSplit { split_id });

        debug!(
            train = train.n_rows(),
            test = test.n_rows(),
            seed = self.config.seed,
            stratify = self.config.stratify,
            "Split dataset"
        );
        Ok((train, test))
    }

    /// Partition row indices for the given labels
    pub fn split_indices(&self, labels: &[Label]) -> Result<SplitIndices> {
        let n = labels.len();
        if n < 2 {
            return Err(SentinelError::DataError(format!(
                "Need at least 2 rows to split, got {}",
                n
            )));
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);

        if !self.config.stratify {
            let mut indices: Vec<usize> = (0..n).collect();
            indices.shuffle(&mut rng);
            let n_train = self.train_size(n);
            let test = indices.split_off(n_train);
            return Ok(SplitIndices {
                train: indices,
                test,
            });
        }

        let mut train = Vec::with_capacity(n);
        let mut test = Vec::with_capacity(n);
        for class in [Label::Safe, Label::Malicious] {
            let mut members: Vec<usize> = (0..n).filter(|&i| labels[i] == class).collect();
            if members.is_empty() {
                continue;
            }
            members.shuffle(&mut rng);
            let n_train = if members.len() == 1 {
                1
            } else {
                self.train_size(members.len())
            };
            let held_out = members.split_off(n_train);
            train.extend(members);
            test.extend(held_out);
        }
        if test.is_empty() {
            return Err(SentinelError::DataError(
                "Stratified split left the test split empty".to_string(),
            ));
        }
        train.shuffle(&mut rng);
        test.shuffle(&mut rng);

        Ok(SplitIndices { train, test })
    }

    /// Training rows for `n` rows, keeping both halves non-empty
    fn train_size(&self, n: usize) -> usize {
        let n_train = (n as f64 * self.config.train_ratio).round() as usize;
        n_train.clamp(1, n - 1)
    }

    fn split_id(&self, n_rows: usize) -> u64 {
        self.config.seed ^ (n_rows as u64).rotate_left(32) ^ self.config.train_ratio.to_bits()
    }
}
