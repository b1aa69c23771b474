//! Model training and search
//!
//! Five binary classifier families behind the [`Classifier`] capability:
//! - Logistic regression
//! - Decision trees (CART)
//! - AdaBoost over stumps
//! - Random forests
//! - Gradient boosted trees
//!
//! [`Catalog`] enumerates validated hyperparameter grids and
//! [`SearchEngine`] fits and scores every point of it.

pub mod adaboost;
pub mod catalog;
pub mod decision_tree;
pub mod gradient_boosting;
pub mod logistic;
mod metrics;
mod models;
mod params;
pub mod random_forest;
mod search;

pub use adaboost::AdaBoostClassifier;
pub use catalog::{
    AdaBoostGrid, Catalog, DecisionTreeGrid, FamilyGrid, GradientBoostingGrid,
    LogisticRegressionGrid, RandomForestGrid,
};
pub use decision_tree::{Criterion, DecisionTree, TreeNode};
pub use gradient_boosting::{GradientBoostingClassifier, GradientBoostingConfig};
pub use logistic::LogisticRegression;
pub use metrics::{ClassificationMetrics, ConfusionMatrix};
pub use models::{Classifier, FittedModel, ModelFamily};
pub use params::{
    AdaBoostParams, DecisionTreeParams, GradientBoostingParams, HyperParams,
    LogisticRegressionParams, RandomForestParams,
};
pub use random_forest::{MaxFeatures, RandomForest};
pub use search::{ModelCandidate, SearchConfig, SearchEngine};
