//! Validated hyperparameter records, one per model family

use super::adaboost::AdaBoostClassifier;
use super::decision_tree::{Criterion, DecisionTree};
use super::gradient_boosting::{GradientBoostingClassifier, GradientBoostingConfig};
use super::logistic::LogisticRegression;
use super::models::{Classifier, FittedModel, ModelFamily};
use super::random_forest::{MaxFeatures, RandomForest};
use crate::error::{Result, SentinelError};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::fmt;

fn check_tree_shape(
    max_depth: Option<usize>,
    min_samples_split: usize,
    min_samples_leaf: usize,
) -> Result<()> {
    if max_depth == Some(0) {
        return Err(SentinelError::invalid_parameter("max_depth", 0, "must be at least 1"));
    }
    if min_samples_split < 2 {
        return Err(SentinelError::invalid_parameter(
            "min_samples_split",
            min_samples_split,
            "must be at least 2",
        ));
    }
    if min_samples_leaf == 0 {
        return Err(SentinelError::invalid_parameter(
            "min_samples_leaf",
            0,
            "must be at least 1",
        ));
    }
    Ok(())
}

fn check_classification_criterion(criterion: Criterion) -> Result<()> {
    if criterion == Criterion::Mse {
        return Err(SentinelError::invalid_parameter(
            "criterion",
            "mse",
            "classifiers use gini or entropy",
        ));
    }
    Ok(())
}

fn check_estimators(n_estimators: usize) -> Result<()> {
    if n_estimators == 0 {
        return Err(SentinelError::invalid_parameter("n_estimators", 0, "must be at least 1"));
    }
    Ok(())
}

fn check_learning_rate(learning_rate: f64) -> Result<()> {
    if !(learning_rate.is_finite() && learning_rate > 0.0) {
        return Err(SentinelError::invalid_parameter(
            "learning_rate",
            learning_rate,
            "must be a positive number",
        ));
    }
    Ok(())
}

fn depth_str(max_depth: Option<usize>) -> String {
    max_depth.map_or_else(|| "none".to_string(), |d| d.to_string())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTreeParams {
    pub criterion: Criterion,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
}

impl Default for DecisionTreeParams {
    fn default() -> Self {
        Self {
            criterion: Criterion::Gini,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
        }
    }
}

impl DecisionTreeParams {
    pub fn validate(&self) -> Result<()> {
        check_classification_criterion(self.criterion)?;
        check_tree_shape(self.max_depth, self.min_samples_split, self.min_samples_leaf)
    }

    fn build(&self, seed: u64) -> DecisionTree {
        let mut tree = DecisionTree::new_classifier()
            .with_criterion(self.criterion)
            .with_min_samples_split(self.min_samples_split)
            .with_min_samples_leaf(self.min_samples_leaf)
            .with_random_state(seed);
        if let Some(d) = self.max_depth {
            tree = tree.with_max_depth(d);
        }
        tree
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForestParams {
    pub n_estimators: usize,
    pub criterion: Criterion,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: MaxFeatures,
    pub bootstrap: bool,
}

impl Default for RandomForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            criterion: Criterion::Gini,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::Sqrt,
            bootstrap: true,
        }
    }
}

impl RandomForestParams {
    pub fn validate(&self) -> Result<()> {
        check_estimators(self.n_estimators)?;
        check_classification_criterion(self.criterion)?;
        check_tree_shape(self.max_depth, self.min_samples_split, self.min_samples_leaf)?;
        self.max_features.validate()
    }

    fn build(&self, seed: u64) -> RandomForest {
        let mut forest = RandomForest::new(self.n_estimators)
            .with_max_depth(self.max_depth)
            .with_min_samples_split(self.min_samples_split)
            .with_min_samples_leaf(self.min_samples_leaf)
            .with_max_features(self.max_features)
            .with_bootstrap(self.bootstrap)
            .with_random_state(seed);
        forest.criterion = self.criterion;
        forest
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaBoostParams {
    pub n_estimators: usize,
    pub learning_rate: f64,
}

impl Default for AdaBoostParams {
    fn default() -> Self {
        Self {
            n_estimators: 50,
            learning_rate: 1.0,
        }
    }
}

impl AdaBoostParams {
    pub fn validate(&self) -> Result<()> {
        check_estimators(self.n_estimators)?;
        check_learning_rate(self.learning_rate)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostingParams {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub subsample: f64,
    pub min_samples_leaf: usize,
}

impl Default for GradientBoostingParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 3,
            subsample: 1.0,
            min_samples_leaf: 1,
        }
    }
}

impl GradientBoostingParams {
    pub fn validate(&self) -> Result<()> {
        check_estimators(self.n_estimators)?;
        check_learning_rate(self.learning_rate)?;
        check_tree_shape(Some(self.max_depth), 2, self.min_samples_leaf)?;
        if !(self.subsample > 0.0 && self.subsample <= 1.0) {
            return Err(SentinelError::invalid_parameter(
                "subsample",
                self.subsample,
                "must be in (0, 1]",
            ));
        }
        Ok(())
    }

    fn build(&self, seed: u64) -> GradientBoostingClassifier {
        GradientBoostingClassifier::new(GradientBoostingConfig {
            n_estimators: self.n_estimators,
            learning_rate: self.learning_rate,
            max_depth: self.max_depth,
            min_samples_leaf: self.min_samples_leaf,
            subsample: self.subsample,
            random_state: Some(seed),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegressionParams {
    /// L2 penalty
    pub alpha: f64,
    pub learning_rate: f64,
    pub max_iter: usize,
    pub tol: f64,
}

impl Default for LogisticRegressionParams {
    fn default() -> Self {
        Self {
            alpha: 0.01,
            learning_rate: 0.1,
            max_iter: 1000,
            tol: 1e-6,
        }
    }
}

impl LogisticRegressionParams {
    pub fn validate(&self) -> Result<()> {
        if !(self.alpha.is_finite() && self.alpha >= 0.0) {
            return Err(SentinelError::invalid_parameter("alpha", self.alpha, "must be >= 0"));
        }
        check_learning_rate(self.learning_rate)?;
        if self.max_iter == 0 {
            return Err(SentinelError::invalid_parameter("max_iter", 0, "must be at least 1"));
        }
        if !(self.tol.is_finite() && self.tol > 0.0) {
            return Err(SentinelError::invalid_parameter("tol", self.tol, "must be positive"));
        }
        Ok(())
    }

    fn build(&self) -> LogisticRegression {
        LogisticRegression::new()
            .with_alpha(self.alpha)
            .with_learning_rate(self.learning_rate)
            .with_max_iter(self.max_iter)
            .with_tol(self.tol)
    }
}

/// One point of the search space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HyperParams {
    LogisticRegression(LogisticRegressionParams),
    DecisionTree(DecisionTreeParams),
    AdaBoost(AdaBoostParams),
    RandomForest(RandomForestParams),
    GradientBoosting(GradientBoostingParams),
}

impl HyperParams {
    pub fn family(&self) -> ModelFamily {
        match self {
            HyperParams::LogisticRegression(_) => ModelFamily::LogisticRegression,
            HyperParams::DecisionTree(_) => ModelFamily::DecisionTree,
            HyperParams::AdaBoost(_) => ModelFamily::AdaBoost,
            HyperParams::RandomForest(_) => ModelFamily::RandomForest,
            HyperParams::GradientBoosting(_) => ModelFamily::GradientBoosting,
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            HyperParams::LogisticRegression(p) => p.validate(),
            HyperParams::DecisionTree(p) => p.validate(),
            HyperParams::AdaBoost(p) => p.validate(),
            HyperParams::RandomForest(p) => p.validate(),
            HyperParams::GradientBoosting(p) => p.validate(),
        }
    }

    /// Estimator count used for complexity ranking; 1 for single models
    pub fn n_estimators(&self) -> usize {
        match self {
            HyperParams::LogisticRegression(_) | HyperParams::DecisionTree(_) => 1,
            HyperParams::AdaBoost(p) => p.n_estimators,
            HyperParams::RandomForest(p) => p.n_estimators,
            HyperParams::GradientBoosting(p) => p.n_estimators,
        }
    }

    /// `(estimator count, family rank)`; smaller is simpler
    pub fn complexity(&self) -> (usize, u8) {
        (self.n_estimators(), self.family().complexity_rank())
    }

    /// Fit a fresh model with these parameters. `seed` drives every random
    /// choice the family makes.
    pub fn fit(&self, x: &Array2<f64>, y: &Array1<f64>, seed: u64) -> Result<FittedModel> {
        self.validate()?;
        Ok(match self {
            HyperParams::LogisticRegression(p) => {
                let mut m = p.build();
                Classifier::fit(&mut m, x, y)?;
                FittedModel::LogisticRegression(m)
            }
            HyperParams::DecisionTree(p) => {
                let mut m = p.build(seed);
                Classifier::fit(&mut m, x, y)?;
                FittedModel::DecisionTree(m)
            }
            HyperParams::AdaBoost(p) => {
                let mut m = AdaBoostClassifier::new(p.n_estimators, p.learning_rate);
                Classifier::fit(&mut m, x, y)?;
                FittedModel::AdaBoost(m)
            }
            HyperParams::RandomForest(p) => {
                let mut m = p.build(seed);
                Classifier::fit(&mut m, x, y)?;
                FittedModel::RandomForest(m)
            }
            HyperParams::GradientBoosting(p) => {
                let mut m = p.build(seed);
                Classifier::fit(&mut m, x, y)?;
                FittedModel::GradientBoosting(m)
            }
        })
    }
}

impl fmt::Display for HyperParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HyperParams::LogisticRegression(p) => write!(
                f,
                "logistic_regression(alpha={}, learning_rate={}, max_iter={}, tol={})",
                p.alpha, p.learning_rate, p.max_iter, p.tol
            ),
            HyperParams::DecisionTree(p) => write!(
                f,
                "decision_tree(criterion={:?}, max_depth={}, min_samples_split={}, min_samples_leaf={})",
                p.criterion,
                depth_str(p.max_depth),
                p.min_samples_split,
                p.min_samples_leaf
            ),
            HyperParams::AdaBoost(p) => write!(
                f,
                "ada_boost(n_estimators={}, learning_rate={})",
                p.n_estimators, p.learning_rate
            ),
            HyperParams::RandomForest(p) => write!(
                f,
                "random_forest(n_estimators={}, criterion={:?}, max_depth={}, min_samples_split={}, min_samples_leaf={}, max_features={:?}, bootstrap={})",
                p.n_estimators,
                p.criterion,
                depth_str(p.max_depth),
                p.min_samples_split,
                p.min_samples_leaf,
                p.max_features,
                p.bootstrap
            ),
            HyperParams::GradientBoosting(p) => write!(
                f,
                "gradient_boosting(n_estimators={}, learning_rate={}, max_depth={}, subsample={}, min_samples_leaf={})",
                p.n_estimators, p.learning_rate, p.max_depth, p.subsample, p.min_samples_leaf
            ),
        }
    }
}
