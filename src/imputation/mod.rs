//! Missing value imputation
//!
//! Imputers are fitted once on the training matrix and then only read;
//! `transform` takes `&self` so a fitted imputer can be shared across threads.

mod knn;

pub use knn::{DistanceMetric, KNNImputer, Weighting};

use crate::error::Result;
use ndarray::Array2;

/// Trait for imputers
pub trait Imputer: Send + Sync {
    /// Fit the imputer on data with missing values
    fn fit(&mut self, x: &Array2<f64>) -> Result<()>;

    /// Transform data by imputing missing values
    fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>>;

    fn fit_transform(&mut self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.fit(x)?;
        self.transform(x)
    }
}

/// Missing marker in numeric matrices
#[inline]
pub fn is_missing(v: f64) -> bool {
    v.is_nan()
}
