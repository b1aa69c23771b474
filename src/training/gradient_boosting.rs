//! Gradient boosted trees for binary classification
//!
//! Each round fits a regression tree to the log-loss gradient `y - p` on a
//! row subsample, replaces its leaf outputs with the Newton step
//! `sum(y - p) / sum(p (1 - p))` and adds the shrunken output to the running
//! log odds.

use ndarray::{Array1, Array2, Axis};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::decision_tree::DecisionTree;
use crate::error::{Result, SentinelError};

/// Gradient boosting configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostingConfig {
    /// Number of boosting rounds (trees)
    pub n_estimators: usize,
    /// Learning rate (shrinkage)
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    /// Row subsample ratio per round
    pub subsample: f64,
    pub random_state: Option<u64>,
}

impl Default for GradientBoostingConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 3,
            min_samples_leaf: 1,
            subsample: 1.0,
            random_state: Some(42),
        }
    }
}

/// Gradient boosting classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostingClassifier {
    config: GradientBoostingConfig,
    trees: Vec<DecisionTree>,
    initial_log_odds: f64,
    feature_importances: Vec<f64>,
}

/// Leaves whose summed hessian falls below this get a zero step
const MIN_CURVATURE: f64 = 1e-12;

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

impl GradientBoostingClassifier {
    pub fn new(config: GradientBoostingConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
            initial_log_odds: 0.0,
            feature_importances: Vec::new(),
        }
    }

    pub fn config(&self) -> &GradientBoostingConfig {
        &self.config
    }

    /// Fit binary classification
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        let n_samples = x.nrows();
        let n_features = x.ncols();

        if n_samples != y.len() {
            return Err(SentinelError::ShapeError {
                expected: format!("y length = {}", n_samples),
                actual: format!("y length = {}", y.len()),
            });
        }
        if n_samples == 0 {
            return Err(SentinelError::TrainingError(
                "Cannot fit on an empty training set".to_string(),
            ));
        }
        if self.config.n_estimators == 0 {
            return Err(SentinelError::invalid_parameter("n_estimators", 0, "must be at least 1"));
        }
        if !(self.config.subsample > 0.0 && self.config.subsample <= 1.0) {
            return Err(SentinelError::invalid_parameter(
                "subsample",
                self.config.subsample,
                "must be in (0, 1]",
            ));
        }

        let p = y.mean().unwrap_or(0.5).clamp(1e-6, 1.0 - 1e-6);
        self.initial_log_odds = (p / (1.0 - p)).ln();
        let mut log_odds = Array1::from_elem(n_samples, self.initial_log_odds);

        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.config.random_state.unwrap_or(42));
        self.trees.clear();
        self.feature_importances = vec![0.0; n_features];

        for _ in 0..self.config.n_estimators {
            let probs = log_odds.mapv(sigmoid);
            let residuals = y - &probs;

            let rows = self.subsample_indices(n_samples, &mut rng);
            let x_sub = x.select(Axis(0), &rows);
            let y_sub: Array1<f64> = rows.iter().map(|&i| residuals[i]).collect();
            let hessian: Vec<f64> = rows.iter().map(|&i| probs[i] * (1.0 - probs[i])).collect();

            let mut tree = DecisionTree::new_regressor()
                .with_max_depth(self.config.max_depth)
                .with_min_samples_leaf(self.config.min_samples_leaf);
            tree.fit(&x_sub, &y_sub)?;
            tree.refit_leaves(&x_sub, |leaf_rows| {
                let gradient: f64 = leaf_rows.iter().map(|&r| y_sub[r]).sum();
                let curvature: f64 = leaf_rows.iter().map(|&r| hessian[r]).sum();
                if curvature < MIN_CURVATURE {
                    0.0
                } else {
                    gradient / curvature
                }
            })?;

            let update = tree.predict(x)?;
            log_odds.scaled_add(self.config.learning_rate, &update);

            if let Some(imp) = tree.feature_importances() {
                for (acc, &v) in self.feature_importances.iter_mut().zip(imp.iter()) {
                    *acc += v;
                }
            }
            self.trees.push(tree);
        }

        let total: f64 = self.feature_importances.iter().sum();
        if total > 0.0 {
            for imp in &mut self.feature_importances {
                *imp /= total;
            }
        }

        Ok(())
    }

    /// Predict class labels
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let probs = self.predict_proba(x)?;
        Ok(probs.mapv(|p| if p > 0.5 { 1.0 } else { 0.0 }))
    }

    /// Positive-class probabilities
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.trees.is_empty() {
            return Err(SentinelError::ModelNotFitted);
        }
        let per_tree: Result<Vec<Array1<f64>>> =
            self.trees.par_iter().map(|t| t.predict(x)).collect();

        let mut log_odds = Array1::from_elem(x.nrows(), self.initial_log_odds);
        for update in per_tree? {
            log_odds.scaled_add(self.config.learning_rate, &update);
        }
        Ok(log_odds.mapv(sigmoid))
    }

    pub fn feature_importances(&self) -> &[f64] {
        &self.feature_importances
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    fn subsample_indices(&self, n: usize, rng: &mut Xoshiro256PlusPlus) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..n).collect();
        if self.config.subsample < 1.0 {
            let sample_size = ((n as f64) * self.config.subsample).ceil() as usize;
            indices.shuffle(rng);
            indices.truncate(sample_size.max(1));
            indices.sort_unstable();
        }
        indices
    }
}
