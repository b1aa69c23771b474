//! Classifier capability and the closed set of fitted models

use super::adaboost::AdaBoostClassifier;
use super::decision_tree::DecisionTree;
use super::gradient_boosting::GradientBoostingClassifier;
use super::logistic::LogisticRegression;
use super::metrics::ClassificationMetrics;
use super::random_forest::RandomForest;
use crate::error::Result;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Binary classifier over a dense feature matrix; targets are 0/1
pub trait Classifier: Send + Sync {
    /// Fit the model to training data
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()>;

    /// Positive-class probabilities
    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>>;

    /// Hard 0/1 predictions
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(self
            .predict_proba(x)?
            .mapv(|p| if p > 0.5 { 1.0 } else { 0.0 }))
    }

    /// Precision, recall and F1 against known labels
    fn score(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<ClassificationMetrics> {
        ClassificationMetrics::compute(y, &self.predict(x)?)
    }
}

impl Classifier for DecisionTree {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        DecisionTree::fit(self, x, y).map(|_| ())
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        DecisionTree::predict_proba(self, x)
    }
}

impl Classifier for RandomForest {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        RandomForest::fit(self, x, y).map(|_| ())
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        RandomForest::predict_proba(self, x)
    }
}

impl Classifier for AdaBoostClassifier {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        AdaBoostClassifier::fit(self, x, y).map(|_| ())
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        AdaBoostClassifier::predict_proba(self, x)
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        AdaBoostClassifier::predict(self, x)
    }
}

impl Classifier for GradientBoostingClassifier {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        GradientBoostingClassifier::fit(self, x, y)
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        GradientBoostingClassifier::predict_proba(self, x)
    }
}

impl Classifier for LogisticRegression {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        LogisticRegression::fit(self, x, y).map(|_| ())
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        LogisticRegression::predict_proba(self, x)
    }
}

/// Model families in the search catalog, declared from simplest to most
/// complex; the derived ordering is the complexity rank
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFamily {
    LogisticRegression,
    DecisionTree,
    AdaBoost,
    RandomForest,
    GradientBoosting,
}

impl ModelFamily {
    pub const ALL: [ModelFamily; 5] = [
        ModelFamily::LogisticRegression,
        ModelFamily::DecisionTree,
        ModelFamily::AdaBoost,
        ModelFamily::RandomForest,
        ModelFamily::GradientBoosting,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ModelFamily::LogisticRegression => "logistic_regression",
            ModelFamily::DecisionTree => "decision_tree",
            ModelFamily::AdaBoost => "ada_boost",
            ModelFamily::RandomForest => "random_forest",
            ModelFamily::GradientBoosting => "gradient_boosting",
        }
    }

    /// 0 for the simplest family
    pub fn complexity_rank(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fitted state of one candidate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FittedModel {
    LogisticRegression(LogisticRegression),
    DecisionTree(DecisionTree),
    AdaBoost(AdaBoostClassifier),
    RandomForest(RandomForest),
    GradientBoosting(GradientBoostingClassifier),
}

impl FittedModel {
    pub fn family(&self) -> ModelFamily {
        match self {
            FittedModel::LogisticRegression(_) => ModelFamily::LogisticRegression,
            FittedModel::DecisionTree(_) => ModelFamily::DecisionTree,
            FittedModel::AdaBoost(_) => ModelFamily::AdaBoost,
            FittedModel::RandomForest(_) => ModelFamily::RandomForest,
            FittedModel::GradientBoosting(_) => ModelFamily::GradientBoosting,
        }
    }

    pub fn as_classifier(&self) -> &dyn Classifier {
        match self {
            FittedModel::LogisticRegression(m) => m,
            FittedModel::DecisionTree(m) => m,
            FittedModel::AdaBoost(m) => m,
            FittedModel::RandomForest(m) => m,
            FittedModel::GradientBoosting(m) => m,
        }
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.as_classifier().predict(x)
    }

    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.as_classifier().predict_proba(x)
    }

    pub fn score(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<ClassificationMetrics> {
        self.as_classifier().score(x, y)
    }
}
