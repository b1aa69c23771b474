//! Hyperparameter grids and the search catalog
//!
//! A grid lists candidate values per field. Its points are the cartesian
//! product of the fields in declaration order, the last field varying
//! fastest. The catalog enumerates its grids in order, so every point has a
//! stable ordinal.

use super::decision_tree::Criterion;
use super::models::ModelFamily;
use super::params::{
    AdaBoostParams, DecisionTreeParams, GradientBoostingParams, HyperParams,
    LogisticRegressionParams, RandomForestParams,
};
use super::random_forest::MaxFeatures;
use crate::error::{Result, SentinelError};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DecisionTreeGrid {
    pub criterion: Vec<Criterion>,
    pub max_depth: Vec<Option<usize>>,
    pub min_samples_split: Vec<usize>,
    pub min_samples_leaf: Vec<usize>,
}

impl Default for DecisionTreeGrid {
    fn default() -> Self {
        let d = DecisionTreeParams::default();
        Self {
            criterion: vec![d.criterion],
            max_depth: vec![d.max_depth],
            min_samples_split: vec![d.min_samples_split],
            min_samples_leaf: vec![d.min_samples_leaf],
        }
    }
}

impl DecisionTreeGrid {
    fn points(&self) -> Vec<HyperParams> {
        let mut out = Vec::new();
        for &criterion in &self.criterion {
            for &max_depth in &self.max_depth {
                for &min_samples_split in &self.min_samples_split {
                    for &min_samples_leaf in &self.min_samples_leaf {
                        out.push(HyperParams::DecisionTree(DecisionTreeParams {
                            criterion,
                            max_depth,
                            min_samples_split,
                            min_samples_leaf,
                        }));
                    }
                }
            }
        }
        out
    }

    fn empty_fields(&self) -> Vec<&'static str> {
        [
            ("criterion", self.criterion.is_empty()),
            ("max_depth", self.max_depth.is_empty()),
            ("min_samples_split", self.min_samples_split.is_empty()),
            ("min_samples_leaf", self.min_samples_leaf.is_empty()),
        ]
        .into_iter()
        .filter_map(|(name, empty)| empty.then_some(name))
        .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RandomForestGrid {
    pub n_estimators: Vec<usize>,
    pub criterion: Vec<Criterion>,
    pub max_depth: Vec<Option<usize>>,
    pub min_samples_split: Vec<usize>,
    pub min_samples_leaf: Vec<usize>,
    pub max_features: Vec<MaxFeatures>,
    pub bootstrap: Vec<bool>,
}

impl Default for RandomForestGrid {
    fn default() -> Self {
        let d = RandomForestParams::default();
        Self {
            n_estimators: vec![d.n_estimators],
            criterion: vec![d.criterion],
            max_depth: vec![d.max_depth],
            min_samples_split: vec![d.min_samples_split],
            min_samples_leaf: vec![d.min_samples_leaf],
            max_features: vec![d.max_features],
            bootstrap: vec![d.bootstrap],
        }
    }
}

impl RandomForestGrid {
    fn points(&self) -> Vec<HyperParams> {
        let mut out = Vec::new();
        for &n_estimators in &self.n_estimators {
            for &criterion in &self.criterion {
                for &max_depth in &self.max_depth {
                    for &min_samples_split in &self.min_samples_split {
                        for &min_samples_leaf in &self.min_samples_leaf {
                            for &max_features in &self.max_features {
                                for &bootstrap in &self.bootstrap {
                                    out.push(HyperParams::RandomForest(RandomForestParams {
                                        n_estimators,
                                        criterion,
                                        max_depth,
                                        min_samples_split,
                                        min_samples_leaf,
                                        max_features,
                                        bootstrap,
                                    }));
                                }
                            }
                        }
                    }
                }
            }
        }
        out
    }

    fn empty_fields(&self) -> Vec<&'static str> {
        [
            ("n_estimators", self.n_estimators.is_empty()),
            ("criterion", self.criterion.is_empty()),
            ("max_depth", self.max_depth.is_empty()),
            ("min_samples_split", self.min_samples_split.is_empty()),
            ("min_samples_leaf", self.min_samples_leaf.is_empty()),
            ("max_features", self.max_features.is_empty()),
            ("bootstrap", self.bootstrap.is_empty()),
        ]
        .into_iter()
        .filter_map(|(name, empty)| empty.then_some(name))
        .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AdaBoostGrid {
    pub n_estimators: Vec<usize>,
    pub learning_rate: Vec<f64>,
}

impl Default for AdaBoostGrid {
    fn default() -> Self {
        let d = AdaBoostParams::default();
        Self {
            n_estimators: vec![d.n_estimators],
            learning_rate: vec![d.learning_rate],
        }
    }
}

impl AdaBoostGrid {
    fn points(&self) -> Vec<HyperParams> {
        let mut out = Vec::new();
        for &n_estimators in &self.n_estimators {
            for &learning_rate in &self.learning_rate {
                out.push(HyperParams::AdaBoost(AdaBoostParams {
                    n_estimators,
                    learning_rate,
                }));
            }
        }
        out
    }

    fn empty_fields(&self) -> Vec<&'static str> {
        [
            ("n_estimators", self.n_estimators.is_empty()),
            ("learning_rate", self.learning_rate.is_empty()),
        ]
        .into_iter()
        .filter_map(|(name, empty)| empty.then_some(name))
        .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GradientBoostingGrid {
    pub n_estimators: Vec<usize>,
    pub learning_rate: Vec<f64>,
    pub max_depth: Vec<usize>,
    pub subsample: Vec<f64>,
    pub min_samples_leaf: Vec<usize>,
}

impl Default for GradientBoostingGrid {
    fn default() -> Self {
        let d = GradientBoostingParams::default();
        Self {
            n_estimators: vec![d.n_estimators],
            learning_rate: vec![d.learning_rate],
            max_depth: vec![d.max_depth],
            subsample: vec![d.subsample],
            min_samples_leaf: vec![d.min_samples_leaf],
        }
    }
}

impl GradientBoostingGrid {
    fn points(&self) -> Vec<HyperParams> {
        let mut out = Vec::new();
        for &n_estimators in &self.n_estimators {
            for &learning_rate in &self.learning_rate {
                for &max_depth in &self.max_depth {
                    for &subsample in &self.subsample {
                        for &min_samples_leaf in &self.min_samples_leaf {
                            out.push(HyperParams::GradientBoosting(GradientBoostingParams {
                                n_estimators,
                                learning_rate,
                                max_depth,
                                subsample,
                                min_samples_leaf,
                            }));
                        }
                    }
                }
            }
        }
        out
    }

    fn empty_fields(&self) -> Vec<&'static str> {
        [
            ("n_estimators", self.n_estimators.is_empty()),
            ("learning_rate", self.learning_rate.is_empty()),
            ("max_depth", self.max_depth.is_empty()),
            ("subsample", self.subsample.is_empty()),
            ("min_samples_leaf", self.min_samples_leaf.is_empty()),
        ]
        .into_iter()
        .filter_map(|(name, empty)| empty.then_some(name))
        .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogisticRegressionGrid {
    pub alpha: Vec<f64>,
    pub learning_rate: Vec<f64>,
    pub max_iter: Vec<usize>,
    pub tol: Vec<f64>,
}

impl Default for LogisticRegressionGrid {
    fn default() -> Self {
        let d = LogisticRegressionParams::default();
        Self {
            alpha: vec![d.alpha],
            learning_rate: vec![d.learning_rate],
            max_iter: vec![d.max_iter],
            tol: vec![d.tol],
        }
    }
}

impl LogisticRegressionGrid {
    fn points(&self) -> Vec<HyperParams> {
        let mut out = Vec::new();
        for &alpha in &self.alpha {
            for &learning_rate in &self.learning_rate {
                for &max_iter in &self.max_iter {
                    for &tol in &self.tol {
                        out.push(HyperParams::LogisticRegression(LogisticRegressionParams {
                            alpha,
                            learning_rate,
                            max_iter,
                            tol,
                        }));
                    }
                }
            }
        }
        out
    }

    fn empty_fields(&self) -> Vec<&'static str> {
        [
            ("alpha", self.alpha.is_empty()),
            ("learning_rate", self.learning_rate.is_empty()),
            ("max_iter", self.max_iter.is_empty()),
            ("tol", self.tol.is_empty()),
        ]
        .into_iter()
        .filter_map(|(name, empty)| empty.then_some(name))
        .collect()
    }
}

/// Grid for one family. In JSON: `{"family": "random_forest", "grid": {...}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", content = "grid", rename_all = "snake_case", deny_unknown_fields)]
pub enum FamilyGrid {
    LogisticRegression(LogisticRegressionGrid),
    DecisionTree(DecisionTreeGrid),
    AdaBoost(AdaBoostGrid),
    RandomForest(RandomForestGrid),
    GradientBoosting(GradientBoostingGrid),
}

impl FamilyGrid {
    pub fn family(&self) -> ModelFamily {
        match self {
            FamilyGrid::LogisticRegression(_) => ModelFamily::LogisticRegression,
            FamilyGrid::DecisionTree(_) => ModelFamily::DecisionTree,
            FamilyGrid::AdaBoost(_) => ModelFamily::AdaBoost,
            FamilyGrid::RandomForest(_) => ModelFamily::RandomForest,
            FamilyGrid::GradientBoosting(_) => ModelFamily::GradientBoosting,
        }
    }

    /// Grid points in enumeration order
    pub fn points(&self) -> Vec<HyperParams> {
        match self {
            FamilyGrid::LogisticRegression(g) => g.points(),
            FamilyGrid::DecisionTree(g) => g.points(),
            FamilyGrid::AdaBoost(g) => g.points(),
            FamilyGrid::RandomForest(g) => g.points(),
            FamilyGrid::GradientBoosting(g) => g.points(),
        }
    }

    fn empty_fields(&self) -> Vec<&'static str> {
        match self {
            FamilyGrid::LogisticRegression(g) => g.empty_fields(),
            FamilyGrid::DecisionTree(g) => g.empty_fields(),
            FamilyGrid::AdaBoost(g) => g.empty_fields(),
            FamilyGrid::RandomForest(g) => g.empty_fields(),
            FamilyGrid::GradientBoosting(g) => g.empty_fields(),
        }
    }

    /// Reject empty fields and out-of-range values
    pub fn validate(&self) -> Result<()> {
        let empty = self.empty_fields();
        if !empty.is_empty() {
            return Err(SentinelError::ConfigError(format!(
                "{} grid has empty fields: {}",
                self.family(),
                empty.join(", ")
            )));
        }
        for point in self.points() {
            point.validate().map_err(|e| {
                SentinelError::ConfigError(format!("{} grid point {}: {}", self.family(), point, e))
            })?;
        }
        Ok(())
    }
}

/// Ordered list of family grids searched by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Catalog {
    pub families: Vec<FamilyGrid>,
}

impl Default for Catalog {
    /// All five families over small grids sized for a few thousand rows
    fn default() -> Self {
        Self {
            families: vec![
                FamilyGrid::DecisionTree(DecisionTreeGrid {
                    criterion: vec![Criterion::Gini, Criterion::Entropy],
                    ..Default::default()
                }),
                FamilyGrid::RandomForest(RandomForestGrid {
                    n_estimators: vec![8, 16, 32],
                    ..Default::default()
                }),
                FamilyGrid::AdaBoost(AdaBoostGrid {
                    n_estimators: vec![8, 16, 32],
                    learning_rate: vec![1.0, 0.1],
                }),
                FamilyGrid::GradientBoosting(GradientBoostingGrid {
                    n_estimators: vec![16, 32],
                    learning_rate: vec![0.1, 0.05],
                    max_depth: vec![3],
                    subsample: vec![0.8],
                    ..Default::default()
                }),
                FamilyGrid::LogisticRegression(LogisticRegressionGrid {
                    max_iter: vec![500],
                    ..Default::default()
                }),
            ],
        }
    }
}

impl Catalog {
    pub fn new(families: Vec<FamilyGrid>) -> Result<Self> {
        let catalog = Self { families };
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn with_family(mut self, grid: FamilyGrid) -> Self {
        self.families.push(grid);
        self
    }

    /// Load and validate a JSON catalog
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            SentinelError::ConfigError(format!("Failed to open catalog {}: {}", path.display(), e))
        })?;
        let catalog: Catalog = serde_json::from_reader(BufReader::new(file))?;
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn validate(&self) -> Result<()> {
        if self.families.is_empty() {
            return Err(SentinelError::ConfigError(
                "Catalog lists no model families".to_string(),
            ));
        }
        self.families.iter().try_for_each(FamilyGrid::validate)
    }

    /// Every grid point, in search order
    pub fn enumerate(&self) -> Vec<HyperParams> {
        self.families.iter().flat_map(FamilyGrid::points).collect()
    }

    pub fn len(&self) -> usize {
        self.families.iter().map(|g| g.points().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
