//! AdaBoost over decision stumps
//!
//! Binary discrete AdaBoost: stumps vote with signs in {-1, +1}, weighted by
//! `learning_rate * ln((1 - err) / err)`. Rounds stop early once a stump is
//! no better than chance or fits the weighted data perfectly.

use crate::error::{Result, SentinelError};
use ndarray::{Array1, Array2, ArrayView1};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

const MIN_ERROR: f64 = 1e-10;

/// A single decision stump: splits on one feature at one threshold
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Stump {
    feature_index: usize,
    threshold: f64,
    /// Sign when feature <= threshold
    left: f64,
    /// Sign when feature > threshold
    right: f64,
}

impl Stump {
    fn vote(&self, sample: ArrayView1<f64>) -> f64 {
        if sample[self.feature_index] <= self.threshold {
            self.left
        } else {
            self.right
        }
    }
}

/// Best stump for one feature and its weighted error
fn best_stump_for_feature(
    x: &Array2<f64>,
    signs: &[f64],
    weights: &Array1<f64>,
    feature: usize,
) -> Option<(Stump, f64)> {
    let mut order: Vec<usize> = (0..x.nrows()).collect();
    order.sort_by(|&a, &b| {
        x[[a, feature]]
            .partial_cmp(&x[[b, feature]])
            .unwrap_or(Ordering::Equal)
    });

    let total_pos: f64 = signs
        .iter()
        .zip(weights.iter())
        .filter(|(s, _)| **s > 0.0)
        .map(|(_, w)| w)
        .sum();
    let total: f64 = weights.sum();

    let mut left_pos = 0.0;
    let mut left_w = 0.0;
    let mut best: Option<(Stump, f64)> = None;

    for k in 0..order.len().saturating_sub(1) {
        let i = order[k];
        left_w += weights[i];
        if signs[i] > 0.0 {
            left_pos += weights[i];
        }
        let (v, next) = (x[[i, feature]], x[[order[k + 1], feature]]);
        if next <= v {
            continue;
        }

        // Error of "left -1, right +1"; the flipped stump errs on the rest
        let right_neg = (total - left_w) - (total_pos - left_pos);
        let err_up = left_pos + right_neg;
        let err_down = total - err_up;
        let (err, left, right) = if err_up <= err_down {
            (err_up, -1.0, 1.0)
        } else {
            (err_down, 1.0, -1.0)
        };

        if best.as_ref().map_or(true, |(_, e)| err < *e) {
            best = Some((
                Stump {
                    feature_index: feature,
                    threshold: (v + next) / 2.0,
                    left,
                    right,
                },
                err,
            ));
        }
    }
    best
}

/// AdaBoost classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaBoostClassifier {
    pub n_estimators: usize,
    pub learning_rate: f64,
    stumps: Vec<Stump>,
    alphas: Vec<f64>,
    n_features: usize,
}

impl Default for AdaBoostClassifier {
    fn default() -> Self {
        Self::new(50, 1.0)
    }
}

impl AdaBoostClassifier {
    pub fn new(n_estimators: usize, learning_rate: f64) -> Self {
        Self {
            n_estimators,
            learning_rate,
            stumps: Vec::new(),
            alphas: Vec::new(),
            n_features: 0,
        }
    }

    pub fn is_fitted(&self) -> bool {
        !self.stumps.is_empty()
    }

    /// Rounds actually kept after early stopping
    pub fn n_rounds(&self) -> usize {
        self.stumps.len()
    }

    fn fit_stump(x: &Array2<f64>, signs: &[f64], weights: &Array1<f64>) -> (Stump, f64) {
        let total_pos: f64 = signs
            .iter()
            .zip(weights.iter())
            .filter(|(s, _)| **s > 0.0)
            .map(|(_, w)| w)
            .sum();
        let total = weights.sum();
        let majority = if total_pos >= total - total_pos { 1.0 } else { -1.0 };
        let constant = (
            Stump {
                feature_index: 0,
                threshold: f64::INFINITY,
                left: majority,
                right: majority,
            },
            total_pos.min(total - total_pos),
        );

        let per_feature: Vec<Option<(Stump, f64)>> = (0..x.ncols())
            .into_par_iter()
            .map(|f| best_stump_for_feature(x, signs, weights, f))
            .collect();

        per_feature
            .into_iter()
            .flatten()
            .fold(constant, |best, c| if c.1 < best.1 { c } else { best })
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        let n_samples = x.nrows();
        if n_samples != y.len() {
            return Err(SentinelError::ShapeError {
                expected: format!("y length = {}", n_samples),
                actual: format!("y length = {}", y.len()),
            });
        }
        if n_samples == 0 || x.ncols() == 0 {
            return Err(SentinelError::TrainingError(
                "Cannot fit on an empty training set".to_string(),
            ));
        }
        if self.n_estimators == 0 {
            return Err(SentinelError::invalid_parameter("n_estimators", 0, "must be at least 1"));
        }
        if !(self.learning_rate > 0.0) {
            return Err(SentinelError::invalid_parameter(
                "learning_rate",
                self.learning_rate,
                "must be positive",
            ));
        }

        let signs: Vec<f64> = y.iter().map(|&v| if v > 0.5 { 1.0 } else { -1.0 }).collect();
        let mut weights = Array1::from_elem(n_samples, 1.0 / n_samples as f64);

        self.n_features = x.ncols();
        self.stumps.clear();
        self.alphas.clear();

        for round in 0..self.n_estimators {
            let (stump, error) = Self::fit_stump(x, &signs, &weights);

            if error >= 0.5 {
                if round == 0 {
                    return Err(SentinelError::TrainingError(format!(
                        "First stump has weighted error {:.3}, no better than chance",
                        error
                    )));
                }
                break;
            }

            let error = error.max(MIN_ERROR);
            let alpha = self.learning_rate * ((1.0 - error) / error).ln();

            let votes: Vec<f64> = x.rows().into_iter().map(|row| stump.vote(row)).collect();
            for ((w, &v), &s) in weights.iter_mut().zip(votes.iter()).zip(signs.iter()) {
                *w *= (-alpha * v * s).exp();
            }
            let w_sum = weights.sum();
            if w_sum > 0.0 {
                weights /= w_sum;
            }

            self.stumps.push(stump);
            self.alphas.push(alpha);

            if error <= MIN_ERROR {
                break;
            }
        }

        Ok(self)
    }

    /// Weighted vote `sum(alpha * h(x))`
    pub fn decision_function(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if !self.is_fitted() {
            return Err(SentinelError::ModelNotFitted);
        }
        if x.ncols() != self.n_features {
            return Err(SentinelError::ShapeError {
                expected: format!("{} features", self.n_features),
                actual: format!("{} features", x.ncols()),
            });
        }
        Ok(x.rows()
            .into_iter()
            .map(|row| {
                self.stumps
                    .iter()
                    .zip(self.alphas.iter())
                    .map(|(s, a)| a * s.vote(row))
                    .sum()
            })
            .collect())
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(self
            .decision_function(x)?
            .mapv(|f| if f > 0.0 { 1.0 } else { 0.0 }))
    }

    /// Positive-class probability via the logistic link `1 / (1 + e^(-2f))`
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(self
            .decision_function(x)?
            .mapv(|f| 1.0 / (1.0 + (-2.0 * f).exp())))
    }

    /// Alpha-weighted stump usage per feature
    pub fn feature_importances(&self) -> Option<Array1<f64>> {
        if !self.is_fitted() {
            return None;
        }
        let mut importances = vec![0.0f64; self.n_features];
        for (stump, &alpha) in self.stumps.iter().zip(self.alphas.iter()) {
            if stump.threshold.is_finite() {
                importances[stump.feature_index] += alpha.abs();
            }
        }
        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            for v in importances.iter_mut() {
                *v /= total;
            }
        }
        Some(Array1::from_vec(importances))
    }
}
