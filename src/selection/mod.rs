//! Model selection
//!
//! Ranks scored candidates by held-out F1, then recall, then complexity
//! (estimator count, family rank), then ordinal. The winner is bundled with
//! the transform it was trained behind.

use crate::data::{Dataset, Label};
use crate::error::{Result, SentinelError};
use crate::preprocessing::TransformArtifact;
use crate::training::{
    ClassificationMetrics, FittedModel, HyperParams, ModelCandidate, ModelFamily,
};
use chrono::{DateTime, Utc};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::{debug, info};

/// Acceptance rules for the selector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// Minimum held-out F1 for a model to be accepted
    pub min_f1: f64,
    /// Largest allowed `train F1 - test F1`
    pub max_overfit_gap: Option<f64>,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            min_f1: 0.6,
            max_overfit_gap: None,
        }
    }
}

impl SelectionConfig {
    pub fn with_min_f1(mut self, min_f1: f64) -> Self {
        self.min_f1 = min_f1;
        self
    }

    pub fn with_max_overfit_gap(mut self, gap: f64) -> Self {
        self.max_overfit_gap = Some(gap);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.min_f1) {
            return Err(SentinelError::invalid_parameter(
                "selection.min_f1",
                self.min_f1,
                "must be in [0, 1]",
            ));
        }
        if let Some(gap) = self.max_overfit_gap {
            if !(gap >= 0.0) {
                return Err(SentinelError::invalid_parameter(
                    "selection.max_overfit_gap",
                    gap,
                    "must be >= 0",
                ));
            }
        }
        Ok(())
    }
}

/// Inference-ready bundle: the winning model plus the transform that
/// produced its inputs. This is the unit of versioning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectedModel {
    pub transform: TransformArtifact,
    pub model: FittedModel,
    pub params: HyperParams,
    pub test_metrics: ClassificationMetrics,
    pub train_metrics: ClassificationMetrics,
    /// Candidate ordinal within its run
    pub ordinal: usize,
    pub selected_at: DateTime<Utc>,
}

impl SelectedModel {
    pub fn family(&self) -> ModelFamily {
        self.model.family()
    }

    /// Positive-class probability per row
    pub fn predict_proba(&self, dataset: &Dataset) -> Result<Array1<f64>> {
        let transformed = self.transform.apply(dataset)?;
        self.model.predict_proba(&transformed.features)
    }

    /// Apply the bundled transform, then the model
    pub fn predict(&self, dataset: &Dataset) -> Result<Vec<Label>> {
        let transformed = self.transform.apply(dataset)?;
        let predictions = self.model.predict(&transformed.features)?;
        Ok(predictions.iter().map(|&p| Label::from_f64(p)).collect())
    }

    /// Metrics against the dataset's own labels
    pub fn score(&self, dataset: &Dataset) -> Result<ClassificationMetrics> {
        let transformed = self.transform.apply(dataset)?;
        let labels = transformed.require_labels()?;
        self.model.score(&transformed.features, labels)
    }
}

/// Ordering of two scored candidates; `Less` means `a` ranks first
fn rank_order(a: &ModelCandidate, b: &ModelCandidate) -> Ordering {
    let (Some(ma), Some(mb)) = (a.test_metrics, b.test_metrics) else {
        return a.is_failed().cmp(&b.is_failed());
    };
    mb.f1
        .total_cmp(&ma.f1)
        .then_with(|| mb.recall.total_cmp(&ma.recall))
        .then_with(|| a.params.complexity().cmp(&b.params.complexity()))
        .then_with(|| a.ordinal.cmp(&b.ordinal))
}

/// Picks the winning candidate
#[derive(Debug, Clone, Default)]
pub struct Selector {
    config: SelectionConfig,
}

impl Selector {
    pub fn new(config: SelectionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &SelectionConfig {
        &self.config
    }

    fn within_gap(&self, candidate: &ModelCandidate) -> bool {
        match (self.config.max_overfit_gap, candidate.train_metrics, candidate.test_metrics) {
            (Some(gap), Some(train), Some(test)) => train.f1 - test.f1 <= gap,
            _ => true,
        }
    }

    /// Scored candidates that pass the overfit check, best first
    pub fn rank<'a>(&self, candidates: &'a [ModelCandidate]) -> Vec<&'a ModelCandidate> {
        let mut viable: Vec<&ModelCandidate> = candidates
            .iter()
            .filter(|c| !c.is_failed() && c.test_metrics.is_some())
            .filter(|c| {
                let keep = self.within_gap(c);
                if !keep {
                    debug!(ordinal = c.ordinal, candidate = %c.params, "Excluded by overfit gap");
                }
                keep
            })
            .collect();
        viable.sort_by(|a, b| rank_order(a, b));
        viable
    }

    /// Choose the best candidate and bundle it with `transform`.
    ///
    /// Fails with [`SentinelError::NoViableCandidate`] when nothing was
    /// scored or the best F1 is below `min_f1`.
    pub fn select(
        &self,
        candidates: Vec<ModelCandidate>,
        transform: TransformArtifact,
    ) -> Result<SelectedModel> {
        let failed = candidates.iter().filter(|c| c.is_failed()).count();
        let evaluated = candidates.len() - failed;
        let best_f1 = candidates
            .iter()
            .filter_map(ModelCandidate::f1)
            .max_by(f64::total_cmp);

        let winner_ordinal = self
            .rank(&candidates)
            .first()
            .filter(|c| c.f1().map_or(false, |f1| f1 >= self.config.min_f1))
            .map(|c| c.ordinal);

        let no_viable = SentinelError::NoViableCandidate {
            failed,
            evaluated,
            best_f1,
            min_f1: self.config.min_f1,
        };
        let Some(ordinal) = winner_ordinal else {
            return Err(no_viable);
        };
        let winner = candidates
            .into_iter()
            .find(|c| c.ordinal == ordinal)
            .ok_or(no_viable)?;

        let (Some(model), Some(test_metrics), Some(train_metrics)) =
            (winner.model, winner.test_metrics, winner.train_metrics)
        else {
            return Err(SentinelError::TrainingError(format!(
                "Selected candidate {} has no fitted state",
                ordinal
            )));
        };

        info!(
            ordinal,
            candidate = %winner.params,
            f1 = test_metrics.f1,
            recall = test_metrics.recall,
            precision = test_metrics.precision,
            "Selected model"
        );

        Ok(SelectedModel {
            transform,
            model,
            params: winner.params,
            test_metrics,
            train_metrics,
            ordinal,
            selected_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::{
        AdaBoostParams, ConfusionMatrix, DecisionTree, DecisionTreeParams, RandomForestParams,
    };

    fn metrics(f1: f64, recall: f64) -> ClassificationMetrics {
        ClassificationMetrics {
            precision: f1,
            recall,
            f1,
            accuracy: f1,
            confusion: ConfusionMatrix::default(),
        }
    }

    fn candidate(ordinal: usize, params: HyperParams, f1: f64, recall: f64) -> ModelCandidate {
        ModelCandidate {
            ordinal,
            params,
            model: Some(FittedModel::DecisionTree(DecisionTree::new_classifier())),
            train_metrics: Some(metrics(f1, recall)),
            test_metrics: Some(metrics(f1, recall)),
            error: None,
            fit_millis: 0,
        }
    }

    fn failed(ordinal: usize) -> ModelCandidate {
        ModelCandidate {
            ordinal,
            params: HyperParams::DecisionTree(DecisionTreeParams::default()),
            model: None,
            train_metrics: None,
            test_metrics: None,
            error: Some("boom".to_string()),
            fit_millis: 0,
        }
    }

    fn forest(n: usize) -> HyperParams {
        HyperParams::RandomForest(RandomForestParams {
            n_estimators: n,
            ..Default::default()
        })
    }

    #[test]
    fn test_higher_f1_wins() {
        let candidates = vec![candidate(0, forest(8), 0.8, 0.9), candidate(1, forest(8), 0.9, 0.7)];
        let ranked = Selector::default().rank(&candidates);
        assert_eq!(ranked[0].ordinal, 1);
    }

    #[test]
    fn test_equal_f1_higher_recall_wins() {
        let candidates = vec![candidate(0, forest(8), 0.9, 0.85), candidate(1, forest(32), 0.9, 0.95)];
        let ranked = Selector::default().rank(&candidates);
        assert_eq!(ranked[0].ordinal, 1);
    }

    #[test]
    fn test_equal_f1_and_recall_simpler_wins() {
        let candidates = vec![
            candidate(0, forest(32), 0.9, 0.9),
            candidate(1, forest(8), 0.9, 0.9),
            candidate(
                2,
                HyperParams::AdaBoost(AdaBoostParams {
                    n_estimators: 8,
                    learning_rate: 1.0,
                }),
                0.9,
                0.9,
            ),
        ];
        let ranked = Selector::default().rank(&candidates);
        let order: Vec<usize> = ranked.iter().map(|c| c.ordinal).collect();
        // AdaBoost ranks below RandomForest at equal estimator counts
        assert_eq!(order, vec![2, 1, 0]);
    }

    #[test]
    fn test_failed_candidates_are_never_ranked() {
        let candidates = vec![failed(0), candidate(1, forest(8), 0.7, 0.7)];
        let ranked = Selector::default().rank(&candidates);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].ordinal, 1);
    }

    #[test]
    fn test_all_failed_is_no_viable_candidate() {
        let err = Selector::default()
            .select(vec![failed(0), failed(1)], dummy_transform())
            .unwrap_err();
        assert!(matches!(
            err,
            SentinelError::NoViableCandidate {
                failed: 2,
                evaluated: 0,
                best_f1: None,
                ..
            }
        ));
    }

    #[test]
    fn test_below_min_f1_is_no_viable_candidate() {
        let selector = Selector::new(SelectionConfig::default().with_min_f1(0.95)).unwrap();
        let err = selector
            .select(vec![candidate(0, forest(8), 0.9, 0.9)], dummy_transform())
            .unwrap_err();
        match err {
            SentinelError::NoViableCandidate { best_f1, .. } => assert_eq!(best_f1, Some(0.9)),
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_overfit_gap_excludes_candidate() {
        let mut overfit = candidate(0, forest(8), 0.8, 0.8);
        overfit.train_metrics = Some(metrics(1.0, 1.0));
        let candidates = vec![overfit, candidate(1, forest(16), 0.75, 0.75)];

        let selector = Selector::new(SelectionConfig::default().with_max_overfit_gap(0.05)).unwrap();
        let ranked = selector.rank(&candidates);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].ordinal, 1);
    }

    #[test]
    fn test_select_bundles_winner() {
        let candidates = vec![candidate(0, forest(8), 0.8, 0.8), candidate(1, forest(8), 0.9, 0.9)];
        let selected = Selector::default().select(candidates, dummy_transform()).unwrap();
        assert_eq!(selected.ordinal, 1);
        assert_eq!(selected.test_metrics.f1, 0.9);
        assert_eq!(selected.family(), ModelFamily::DecisionTree);
    }

    fn dummy_transform() -> TransformArtifact {
        use crate::data::Value;
        use crate::preprocessing::TransformPipeline;
        use crate::schema::{ColumnType, Schema, SchemaVersion};
        use crate::split::{SplitConfig, Splitter};

        let schema = Schema::new(SchemaVersion(1)).with_column("x", ColumnType::Integer, true);
        let dataset = Dataset::from_columns(
            vec!["x".to_string()],
            vec![(0..10i64).map(Value::from).collect()],
            Some((0..10).map(|i| Label::from_f64((i % 2) as f64)).collect()),
            SchemaVersion(1),
            "test",
        )
        .unwrap();
        let (train, _) = Splitter::new(SplitConfig::default()).unwrap().split(&dataset).unwrap();
        TransformPipeline::default().fit(&train, &schema).unwrap()
    }
}
