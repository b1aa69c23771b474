//! Model search engine
//!
//! Fits every catalog point on the transformed training split and scores it
//! on the held-out split. Fits run on a bounded rayon pool; results come back
//! in enumeration order, so the candidate list is identical across runs for
//! identical inputs.

use super::catalog::Catalog;
use super::metrics::ClassificationMetrics;
use super::models::{FittedModel, ModelFamily};
use super::params::HyperParams;
use crate::error::{Result, SentinelError};
use crate::preprocessing::TransformedDataset;
use crate::utils::{parallel_map_with_config, ParallelConfig};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Search settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Seed handed to every stochastic fit
    pub seed: u64,
    /// Concurrent fits; all cores when unset
    pub max_workers: Option<usize>,
    pub catalog: Catalog,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            max_workers: None,
            catalog: Catalog::default(),
        }
    }
}

impl SearchConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_max_workers(mut self, workers: usize) -> Self {
        self.max_workers = Some(workers);
        self
    }

    pub fn with_catalog(mut self, catalog: Catalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_workers == Some(0) {
            return Err(SentinelError::invalid_parameter(
                "search.max_workers",
                0,
                "must be at least 1",
            ));
        }
        self.catalog.validate()
    }
}

/// One evaluated grid point
#[derive(Debug, Clone)]
pub struct ModelCandidate {
    /// Position in catalog enumeration order
    pub ordinal: usize,
    pub params: HyperParams,
    /// None when the fit failed
    pub model: Option<FittedModel>,
    pub train_metrics: Option<ClassificationMetrics>,
    pub test_metrics: Option<ClassificationMetrics>,
    pub error: Option<String>,
    pub fit_millis: u64,
}

impl ModelCandidate {
    pub fn family(&self) -> ModelFamily {
        self.params.family()
    }

    pub fn is_failed(&self) -> bool {
        self.model.is_none()
    }

    /// Held-out F1, if the candidate was scored
    pub fn f1(&self) -> Option<f64> {
        self.test_metrics.map(|m| m.f1)
    }

    /// Failure as a [`SentinelError::CandidateFit`]
    pub fn fit_error(&self) -> Option<SentinelError> {
        self.error.as_ref().map(|reason| SentinelError::CandidateFit {
            candidate: self.params.to_string(),
            reason: reason.clone(),
        })
    }

    /// Record for metrics tracking; the fitted model is left out
    pub fn summary(&self) -> serde_json::Value {
        serde_json::json!({
            "ordinal": self.ordinal,
            "family": self.family(),
            "params": self.params,
            "train_metrics": self.train_metrics,
            "test_metrics": self.test_metrics,
            "error": self.error,
            "fit_millis": self.fit_millis,
        })
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panic: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panic: {}", s)
    } else {
        "panic during fit".to_string()
    }
}

/// Runs the catalog against a train/test pair
#[derive(Debug, Clone)]
pub struct SearchEngine {
    seed: u64,
    parallel: ParallelConfig,
}

impl Default for SearchEngine {
    fn default() -> Self {
        Self::new(42, None)
    }
}

impl SearchEngine {
    pub fn new(seed: u64, max_workers: Option<usize>) -> Self {
        Self {
            seed,
            parallel: ParallelConfig {
                n_threads: max_workers,
            },
        }
    }

    pub fn from_config(config: &SearchConfig) -> Self {
        Self::new(config.seed, config.max_workers)
    }

    /// Fit and score every catalog point. A failing fit becomes a failed
    /// candidate; only invalid inputs abort the search.
    pub fn search(
        &self,
        train: &TransformedDataset,
        test: &TransformedDataset,
        catalog: &Catalog,
    ) -> Result<Vec<ModelCandidate>> {
        catalog.validate()?;
        train.require_labels()?;
        test.require_labels()?;
        if train.features.ncols() != test.features.ncols() {
            return Err(SentinelError::ShapeError {
                expected: format!("{} test features", train.features.ncols()),
                actual: format!("{} test features", test.features.ncols()),
            });
        }

        let points: Vec<(usize, HyperParams)> = catalog.enumerate().into_iter().enumerate().collect();
        let start = Instant::now();
        info!(
            candidates = points.len(),
            workers = self.parallel.num_threads(),
            train_rows = train.n_rows(),
            test_rows = test.n_rows(),
            "Starting model search"
        );

        let candidates = parallel_map_with_config(points, &self.parallel, |(ordinal, params)| {
            self.evaluate(ordinal, params, train, test)
        })?;

        let failed = candidates.iter().filter(|c| c.is_failed()).count();
        info!(
            evaluated = candidates.len() - failed,
            failed,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Model search finished"
        );
        Ok(candidates)
    }

    fn evaluate(
        &self,
        ordinal: usize,
        params: HyperParams,
        train: &TransformedDataset,
        test: &TransformedDataset,
    ) -> ModelCandidate {
        let start = Instant::now();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let y_train = train.require_labels()?;
            let y_test = test.require_labels()?;
            let model = params.fit(&train.features, y_train, self.seed)?;
            let train_metrics = model.score(&train.features, y_train)?;
            let test_metrics = model.score(&test.features, y_test)?;
            Ok::<_, SentinelError>((model, train_metrics, test_metrics))
        }))
        .unwrap_or_else(|payload| Err(SentinelError::TrainingError(panic_message(payload))));
        let fit_millis = start.elapsed().as_millis() as u64;

        match outcome {
            Ok((model, train_metrics, test_metrics)) => {
                debug!(
                    ordinal,
                    candidate = %params,
                    f1 = test_metrics.f1,
                    recall = test_metrics.recall,
                    precision = test_metrics.precision,
                    train_f1 = train_metrics.f1,
                    fit_millis,
                    "Candidate scored"
                );
                ModelCandidate {
                    ordinal,
                    params,
                    model: Some(model),
                    train_metrics: Some(train_metrics),
                    test_metrics: Some(test_metrics),
                    error: None,
                    fit_millis,
                }
            }
            Err(e) => {
                warn!(ordinal, candidate = %params, error = %e, "Candidate failed");
                ModelCandidate {
                    ordinal,
                    params,
                    model: None,
                    train_metrics: None,
                    test_metrics: None,
                    error: Some(e.to_string()),
                    fit_millis,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Provenance;
    use crate::training::catalog::{AdaBoostGrid, DecisionTreeGrid, FamilyGrid};
    use ndarray::{Array1, Array2};

    fn data(n: usize, offset: usize) -> TransformedDataset {
        let features = Array2::from_shape_fn((n, 3), |(i, j)| {
            let i = i + offset;
            let base = if i % 2 == 0 { 1.0 } else { -1.0 };
            if j == 0 {
                base
            } else {
                ((i * (j + 2)) % 3) as f64 - 1.0
            }
        });
        let labels = Array1::from_shape_fn(n, |i| if (i + offset) % 2 == 0 { 1.0 } else { 0.0 });
        TransformedDataset {
            features,
            labels: Some(labels),
            feature_names: vec!["a".into(), "b".into(), "c".into()],
            provenance: Provenance::Raw,
        }
    }

    #[test]
    fn test_search_scores_every_point_in_order() {
        let engine = SearchEngine::new(7, Some(2));
        let catalog = Catalog::default();
        let candidates = engine.search(&data(80, 0), &data(20, 80), &catalog).unwrap();

        assert_eq!(candidates.len(), catalog.len());
        for (i, c) in candidates.iter().enumerate() {
            assert_eq!(c.ordinal, i);
            assert!(!c.is_failed(), "{:?}", c.error);
            assert_eq!(c.f1(), Some(1.0));
        }
    }

    #[test]
    fn test_failed_fit_is_recorded_not_fatal() {
        let catalog = Catalog::new(vec![
            FamilyGrid::DecisionTree(DecisionTreeGrid {
                min_samples_split: vec![2, 100_000],
                ..Default::default()
            }),
            FamilyGrid::AdaBoost(AdaBoostGrid::default()),
        ])
        .unwrap();
        let candidates = SearchEngine::default()
            .search(&data(40, 0), &data(10, 40), &catalog)
            .unwrap();

        assert_eq!(candidates.len(), 3);
        assert!(!candidates[0].is_failed());
        assert!(candidates[1].is_failed());
        assert!(matches!(
            candidates[1].fit_error(),
            Some(SentinelError::CandidateFit { .. })
        ));
        assert!(!candidates[2].is_failed());
    }

    #[test]
    fn test_unlabelled_input_is_rejected() {
        let mut test = data(10, 0);
        test.labels = None;
        assert!(SearchEngine::default()
            .search(&data(10, 0), &test, &Catalog::default())
            .is_err());
    }

    #[test]
    fn test_summary_omits_model() {
        let candidates = SearchEngine::default()
            .search(
                &data(20, 0),
                &data(10, 20),
                &Catalog::new(vec![FamilyGrid::AdaBoost(AdaBoostGrid::default())]).unwrap(),
            )
            .unwrap();
        let summary = candidates[0].summary();
        assert_eq!(summary["family"], "ada_boost");
        assert!(summary.get("model").is_none());
    }
}
