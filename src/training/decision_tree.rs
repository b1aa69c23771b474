//! CART decision tree
//!
//! Classification trees expect 0/1 targets and store the positive-class
//! fraction in each leaf, so the same tree serves hard predictions,
//! probabilities and forest averaging. Regression trees back gradient
//! boosting.

use crate::error::{Result, SentinelError};
use ndarray::{Array1, Array2, ArrayView1};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Node counts below this scan features sequentially
const PARALLEL_MIN_SAMPLES: usize = 512;

/// Rounding slack when comparing impurity gains against zero
const GAIN_TOLERANCE: f64 = 1e-12;

/// Decision tree node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    Leaf {
        value: f64,
        n_samples: usize,
    },
    Split {
        feature_idx: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
        n_samples: usize,
        impurity: f64,
    },
}

/// Impurity criterion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    Gini,
    Entropy,
    /// Variance reduction, for regression trees
    Mse,
}

impl Criterion {
    /// Impurity from a node's count, target sum and squared-target sum
    fn impurity(self, count: usize, sum: f64, sq_sum: f64) -> f64 {
        if count == 0 {
            return 0.0;
        }
        let n = count as f64;
        match self {
            Criterion::Gini => {
                let p = sum / n;
                2.0 * p * (1.0 - p)
            }
            Criterion::Entropy => {
                let p = sum / n;
                let q = 1.0 - p;
                let term = |v: f64| if v > 0.0 { -v * v.ln() } else { 0.0 };
                term(p) + term(q)
            }
            Criterion::Mse => (sq_sum / n - (sum / n).powi(2)).max(0.0),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct SplitChoice {
    feature: usize,
    threshold: f64,
    gain: f64,
}

/// Decision tree model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    root: Option<TreeNode>,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features examined per split; all when unset
    pub max_features: Option<usize>,
    pub criterion: Criterion,
    /// Seed for per-split feature sampling
    pub random_state: Option<u64>,
    n_features: usize,
    feature_importances: Option<Array1<f64>>,
    is_classification: bool,
}

impl Default for DecisionTree {
    fn default() -> Self {
        Self::new_classifier()
    }
}

impl DecisionTree {
    pub fn new_classifier() -> Self {
        Self {
            root: None,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            criterion: Criterion::Gini,
            random_state: None,
            n_features: 0,
            feature_importances: None,
            is_classification: true,
        }
    }

    pub fn new_regressor() -> Self {
        Self {
            criterion: Criterion::Mse,
            is_classification: false,
            ..Self::new_classifier()
        }
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn with_min_samples_split(mut self, min_samples: usize) -> Self {
        self.min_samples_split = min_samples;
        self
    }

    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples;
        self
    }

    pub fn with_max_features(mut self, max_features: usize) -> Self {
        self.max_features = Some(max_features);
        self
    }

    pub fn with_criterion(mut self, criterion: Criterion) -> Self {
        self.criterion = criterion;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    pub fn is_fitted(&self) -> bool {
        self.root.is_some()
    }

    /// Fit the tree to training data
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        let n_samples = x.nrows();
        let n_features = x.ncols();

        if n_samples != y.len() {
            return Err(SentinelError::ShapeError {
                expected: format!("y length = {}", n_samples),
                actual: format!("y length = {}", y.len()),
            });
        }
        if n_samples == 0 || n_samples < self.min_samples_split {
            return Err(SentinelError::TrainingError(format!(
                "Need at least {} samples, got {}",
                self.min_samples_split.max(1),
                n_samples
            )));
        }
        if self.is_classification && y.iter().any(|&v| v != 0.0 && v != 1.0) {
            return Err(SentinelError::TrainingError(
                "Classification targets must be 0 or 1".to_string(),
            ));
        }
        if self.criterion == Criterion::Mse && self.is_classification {
            return Err(SentinelError::invalid_parameter(
                "criterion",
                "mse",
                "classification trees use gini or entropy",
            ));
        }

        self.n_features = n_features;
        let mut rng = ChaCha8Rng::seed_from_u64(self.random_state.unwrap_or(0));
        let mut importances = vec![0.0; n_features];

        let indices: Vec<usize> = (0..n_samples).collect();
        let root = self.build_tree(x, y, &indices, 0, &mut importances, &mut rng);
        self.root = Some(root);

        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            for imp in &mut importances {
                *imp /= total;
            }
        }
        self.feature_importances = Some(Array1::from_vec(importances));

        Ok(self)
    }

    fn build_tree(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        indices: &[usize],
        depth: usize,
        importances: &mut [f64],
        rng: &mut ChaCha8Rng,
    ) -> TreeNode {
        let n_samples = indices.len();
        let (sum, sq_sum) = indices
            .iter()
            .fold((0.0, 0.0), |(s, q), &i| (s + y[i], q + y[i] * y[i]));
        let leaf = TreeNode::Leaf {
            value: if n_samples > 0 { sum / n_samples as f64 } else { 0.0 },
            n_samples,
        };

        let pure = indices.iter().all(|&i| (y[i] - y[indices[0]]).abs() < 1e-12);
        if n_samples < self.min_samples_split
            || n_samples < 2 * self.min_samples_leaf
            || self.max_depth.map_or(false, |d| depth >= d)
            || pure
        {
            return leaf;
        }

        let parent_impurity = self.criterion.impurity(n_samples, sum, sq_sum);
        let features = self.candidate_features(rng);

        let Some(choice) = self.find_best_split(x, y, indices, &features, parent_impurity) else {
            return leaf;
        };

        let (left_indices, right_indices): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| x[[i, choice.feature]] <= choice.threshold);

        importances[choice.feature] += n_samples as f64 * choice.gain;

        let left = Box::new(self.build_tree(x, y, &left_indices, depth + 1, importances, rng));
        let right = Box::new(self.build_tree(x, y, &right_indices, depth + 1, importances, rng));

        TreeNode::Split {
            feature_idx: choice.feature,
            threshold: choice.threshold,
            left,
            right,
            n_samples,
            impurity: parent_impurity,
        }
    }

    /// Features examined at one split: a seeded random subset when
    /// `max_features` is below the feature count
    fn candidate_features(&self, rng: &mut ChaCha8Rng) -> Vec<usize> {
        let mut features: Vec<usize> = (0..self.n_features).collect();
        if let Some(k) = self.max_features {
            if k < self.n_features {
                features.shuffle(rng);
                features.truncate(k.max(1));
            }
        }
        features
    }

    fn find_best_split(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        indices: &[usize],
        features: &[usize],
        parent_impurity: f64,
    ) -> Option<SplitChoice> {
        let scan = |&f: &usize| self.best_split_for_feature(x, y, indices, f, parent_impurity);
        let per_feature: Vec<Option<SplitChoice>> = if indices.len() >= PARALLEL_MIN_SAMPLES {
            features.par_iter().map(scan).collect()
        } else {
            features.iter().map(scan).collect()
        };

        // First feature in scan order wins ties
        per_feature.into_iter().flatten().fold(None, |best, c| match best {
            Some(b) if b.gain >= c.gain => Some(b),
            _ => Some(c),
        })
    }

    /// Sorted sweep over one feature with running target statistics
    fn best_split_for_feature(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        indices: &[usize],
        feature: usize,
        parent_impurity: f64,
    ) -> Option<SplitChoice> {
        let mut pairs: Vec<(f64, f64)> = indices.iter().map(|&i| (x[[i, feature]], y[i])).collect();
        pairs.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));

        let n = pairs.len();
        let (total_sum, total_sq) = pairs
            .iter()
            .fold((0.0, 0.0), |(s, q), &(_, yi)| (s + yi, q + yi * yi));

        let mut left_sum = 0.0;
        let mut left_sq = 0.0;
        let mut best: Option<SplitChoice> = None;

        for k in 0..n.saturating_sub(1) {
            let (xv, yi) = pairs[k];
            left_sum += yi;
            left_sq += yi * yi;

            let next = pairs[k + 1].0;
            if next <= xv {
                continue;
            }
            let left_n = k + 1;
            let right_n = n - left_n;
            if left_n < self.min_samples_leaf || right_n < self.min_samples_leaf {
                continue;
            }

            let left_imp = self.criterion.impurity(left_n, left_sum, left_sq);
            let right_imp = self
                .criterion
                .impurity(right_n, total_sum - left_sum, total_sq - left_sq);
            let weighted = (left_n as f64 * left_imp + right_n as f64 * right_imp) / n as f64;
            let gain = parent_impurity - weighted;

            // Zero-gain splits are kept: impure nodes such as XOR need them
            if gain > -GAIN_TOLERANCE && best.map_or(true, |b| gain > b.gain) {
                best = Some(SplitChoice {
                    feature,
                    threshold: (xv + next) / 2.0,
                    gain,
                });
            }
        }

        best
    }

    /// Leaf value reached by one sample
    pub(crate) fn predict_row(&self, sample: ArrayView1<f64>) -> Result<f64> {
        let mut node = self.root.as_ref().ok_or(SentinelError::ModelNotFitted)?;
        loop {
            match node {
                TreeNode::Leaf { value, .. } => return Ok(*value),
                TreeNode::Split {
                    feature_idx,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    node = if sample[*feature_idx] <= *threshold {
                        left
                    } else {
                        right
                    };
                }
            }
        }
    }

    /// Replace each leaf value with `update(rows)`, where `rows` are the
    /// rows of `x` that reach the leaf. Leaves no row reaches are unchanged.
    pub(crate) fn refit_leaves<F>(&mut self, x: &Array2<f64>, update: F) -> Result<()>
    where
        F: Fn(&[usize]) -> f64,
    {
        self.check_width(x)?;
        let root = self.root.as_mut().ok_or(SentinelError::ModelNotFitted)?;
        let rows: Vec<usize> = (0..x.nrows()).collect();
        refit_node(root, x, &rows, &update);
        Ok(())
    }

    fn check_width(&self, x: &Array2<f64>) -> Result<()> {
        if x.ncols() != self.n_features {
            return Err(SentinelError::ShapeError {
                expected: format!("{} features", self.n_features),
                actual: format!("{} features", x.ncols()),
            });
        }
        Ok(())
    }

    /// Leaf values: positive-class probability for classifiers, the
    /// prediction itself for regressors
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.check_width(x)?;
        x.rows().into_iter().map(|row| self.predict_row(row)).collect()
    }

    /// Make predictions
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let values = self.predict_proba(x)?;
        if self.is_classification {
            Ok(values.mapv(|p| if p > 0.5 { 1.0 } else { 0.0 }))
        } else {
            Ok(values)
        }
    }

    pub fn feature_importances(&self) -> Option<&Array1<f64>> {
        self.feature_importances.as_ref()
    }

    pub fn get_depth(&self) -> usize {
        fn depth(node: &TreeNode) -> usize {
            match node {
                TreeNode::Leaf { .. } => 1,
                TreeNode::Split { left, right, .. } => 1 + depth(left).max(depth(right)),
            }
        }
        self.root.as_ref().map_or(0, depth)
    }

    pub fn get_n_leaves(&self) -> usize {
        fn leaves(node: &TreeNode) -> usize {
            match node {
                TreeNode::Leaf { .. } => 1,
                TreeNode::Split { left, right, .. } => leaves(left) + leaves(right),
            }
        }
        self.root.as_ref().map_or(0, leaves)
    }
}

fn refit_node<F>(node: &mut TreeNode, x: &Array2<f64>, rows: &[usize], update: &F)
where
    F: Fn(&[usize]) -> f64,
{
    match node {
        TreeNode::Leaf { value, .. } => {
            if !rows.is_empty() {
                *value = update(rows);
            }
        }
        TreeNode::Split {
            feature_idx,
            threshold,
            left,
            right,
            ..
        } => {
            let (feature, threshold) = (*feature_idx, *threshold);
            let (left_rows, right_rows): (Vec<usize>, Vec<usize>) =
                rows.iter().partition(|&&i| x[[i, feature]] <= threshold);
            refit_node(left, x, &left_rows, update);
            refit_node(right, x, &right_rows, update);
        }
    }
}
