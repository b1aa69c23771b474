//! KNN-based imputation

use crate::error::{Result, SentinelError};
use crate::imputation::{is_missing, Imputer};
use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Distance between two partially observed rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// Euclidean over shared coordinates, scaled up for the missing ones
    #[default]
    NanEuclidean,
    Manhattan,
}

/// How neighbor values are averaged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Weighting {
    #[default]
    Uniform,
    /// Inverse distance weighting
    Distance,
}

/// KNN-based imputer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KNNImputer {
    n_neighbors: usize,
    metric: DistanceMetric,
    weights: Weighting,
    /// Training rows, missing values kept as NaN
    donors: Option<Array2<f64>>,
    /// Observed-value means of the training columns
    feature_means: Option<Array1<f64>>,
}

impl KNNImputer {
    pub fn new(n_neighbors: usize) -> Self {
        Self {
            n_neighbors: n_neighbors.max(1),
            metric: DistanceMetric::default(),
            weights: Weighting::default(),
            donors: None,
            feature_means: None,
        }
    }

    pub fn with_metric(mut self, metric: DistanceMetric) -> Self {
        self.metric = metric;
        self
    }

    pub fn with_weights(mut self, weights: Weighting) -> Self {
        self.weights = weights;
        self
    }

    pub fn n_neighbors(&self) -> usize {
        self.n_neighbors
    }

    pub fn is_fitted(&self) -> bool {
        self.donors.is_some()
    }

    pub fn n_features(&self) -> Option<usize> {
        self.donors.as_ref().map(|d| d.ncols())
    }

    /// Distance over the coordinates both rows observe; infinite when none
    fn distance(&self, a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
        let mut present = 0usize;
        let mut accum = 0.0f64;

        for (&ai, &bi) in a.iter().zip(b.iter()) {
            if is_missing(ai) || is_missing(bi) {
                continue;
            }
            present += 1;
            match self.metric {
                DistanceMetric::NanEuclidean => {
                    let d = ai - bi;
                    accum += d * d;
                }
                DistanceMetric::Manhattan => accum += (ai - bi).abs(),
            }
        }

        if present == 0 {
            return f64::INFINITY;
        }

        let scale = a.len() as f64 / present as f64;
        match self.metric {
            DistanceMetric::NanEuclidean => (scale * accum).sqrt(),
            DistanceMetric::Manhattan => scale * accum,
        }
    }

    fn impute_value(&self, donors: &Array2<f64>, neighbors: &[(usize, f64)], feature: usize) -> f64 {
        let fallback = self
            .feature_means
            .as_ref()
            .map(|m| m[feature])
            .unwrap_or(0.0);
        if neighbors.is_empty() {
            return fallback;
        }

        match self.weights {
            Weighting::Uniform => {
                let sum: f64 = neighbors.iter().map(|&(i, _)| donors[[i, feature]]).sum();
                sum / neighbors.len() as f64
            }
            Weighting::Distance => {
                // An exact match decides alone
                if let Some(&(i, _)) = neighbors.iter().find(|(_, d)| *d < 1e-12) {
                    return donors[[i, feature]];
                }
                let (weighted, total) = neighbors.iter().fold((0.0, 0.0), |(ws, wt), &(i, d)| {
                    let w = 1.0 / d;
                    (ws + donors[[i, feature]] * w, wt + w)
                });
                if total > 0.0 {
                    weighted / total
                } else {
                    fallback
                }
            }
        }
    }
}

impl Default for KNNImputer {
    fn default() -> Self {
        Self::new(3)
    }
}

impl Imputer for KNNImputer {
    fn fit(&mut self, x: &Array2<f64>) -> Result<()> {
        if x.nrows() == 0 {
            return Err(SentinelError::TransformError(
                "Cannot fit KNN imputer on an empty matrix".to_string(),
            ));
        }

        let means = Array1::from_iter(x.columns().into_iter().map(|col| {
            let (sum, count) = col
                .iter()
                .filter(|v| !is_missing(**v))
                .fold((0.0, 0usize), |(s, c), &v| (s + v, c + 1));
            if count == 0 {
                0.0
            } else {
                sum / count as f64
            }
        }));

        self.donors = Some(x.clone());
        self.feature_means = Some(means);
        Ok(())
    }

    fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let donors = self.donors.as_ref().ok_or(SentinelError::ModelNotFitted)?;
        if x.ncols() != donors.ncols() {
            return Err(SentinelError::ShapeError {
                expected: format!("{} features", donors.ncols()),
                actual: format!("{} features", x.ncols()),
            });
        }

        let mut result = x.clone();

        for (row_idx, row) in x.rows().into_iter().enumerate() {
            if !row.iter().any(|&v| is_missing(v)) {
                continue;
            }

            let mut ranked: Vec<(usize, f64)> = donors
                .rows()
                .into_iter()
                .enumerate()
                .map(|(i, donor)| (i, self.distance(row, donor)))
                .filter(|(_, d)| d.is_finite())
                .collect();
            // Stable on ties: lower donor index wins
            ranked.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal).then(a.0.cmp(&b.0)));

            for (j, &value) in row.iter().enumerate() {
                if !is_missing(value) {
                    continue;
                }
                let neighbors: Vec<(usize, f64)> = ranked
                    .iter()
                    .filter(|(i, _)| !is_missing(donors[[*i, j]]))
                    .take(self.n_neighbors)
                    .copied()
                    .collect();
                result[[row_idx, j]] = self.impute_value(donors, &neighbors, j);
            }
        }

        Ok(result)
    }
}
