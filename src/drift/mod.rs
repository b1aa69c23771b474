//! Drift detection
//!
//! Compares each monitored column of a candidate dataset against the same
//! column of a reference dataset. The detector only produces evidence; the
//! accept/reject decision belongs to [`crate::validation::DataValidator`].

mod ks;

pub use ks::KolmogorovSmirnovTest;

use crate::data::{Dataset, Value};
use crate::error::{Result, SentinelError};
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Raw output of a two-sample test
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TestOutcome {
    pub statistic: f64,
    pub p_value: f64,
    /// Threshold implied by the test's own significance level
    pub critical_value: f64,
}

/// A two-sample distribution comparison
pub trait TwoSampleTest: Send + Sync {
    fn name(&self) -> &'static str;

    fn compare(&self, reference: &[f64], candidate: &[f64]) -> Result<TestOutcome>;
}

/// Drift detection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriftConfig {
    /// Significance level used to derive the KS critical value
    pub alpha: f64,
    /// Fixed statistic threshold; overrides the critical value when set
    pub statistic_threshold: Option<f64>,
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            alpha: 0.05,
            statistic_threshold: None,
        }
    }
}

impl DriftConfig {
    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_statistic_threshold(mut self, threshold: f64) -> Self {
        self.statistic_threshold = Some(threshold);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.alpha > 0.0 && self.alpha < 1.0) {
            return Err(SentinelError::invalid_parameter(
                "drift.alpha",
                self.alpha,
                "must lie in (0, 1)",
            ));
        }
        if let Some(t) = self.statistic_threshold {
            if !(0.0..=1.0).contains(&t) {
                return Err(SentinelError::invalid_parameter(
                    "drift.statistic_threshold",
                    t,
                    "KS statistics lie in [0, 1]",
                ));
            }
        }
        Ok(())
    }
}

/// Per-column verdict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum DriftOutcome {
    NoDrift {
        statistic: f64,
        p_value: f64,
        threshold: f64,
    },
    Drift {
        statistic: f64,
        p_value: f64,
        threshold: f64,
    },
    /// The column could not be tested
    Error { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDrift {
    pub column: String,
    pub reference_size: usize,
    pub candidate_size: usize,
    pub outcome: DriftOutcome,
}

impl ColumnDrift {
    pub fn is_drift(&self) -> bool {
        matches!(self.outcome, DriftOutcome::Drift { .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(self.outcome, DriftOutcome::Error { .. })
    }
}

/// Drift evidence for one validation run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftReport {
    pub test: String,
    pub config: DriftConfig,
    pub columns: Vec<ColumnDrift>,
    pub reference_rows: usize,
    pub candidate_rows: usize,
    pub created_at: DateTime<Utc>,
}

impl DriftReport {
    pub fn drifted_columns(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| c.is_drift())
            .map(|c| c.column.clone())
            .collect()
    }

    pub fn errored_columns(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| c.is_error())
            .map(|c| c.column.clone())
            .collect()
    }

    pub fn has_drift(&self) -> bool {
        self.columns.iter().any(ColumnDrift::is_drift)
    }

    pub fn has_errors(&self) -> bool {
        self.columns.iter().any(ColumnDrift::is_error)
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDrift> {
        self.columns.iter().find(|c| c.column == name)
    }

    pub fn summary(&self) -> String {
        let drifted = self.drifted_columns();
        let errored = self.errored_columns();
        let mut s = format!(
            "{} column(s) tested, {} drifted, {} errored",
            self.columns.len(),
            drifted.len(),
            errored.len()
        );
        if !drifted.is_empty() {
            s.push_str(&format!("; drifted: {}", drifted.join(", ")));
        }
        if !errored.is_empty() {
            s.push_str(&format!("; errored: {}", errored.join(", ")));
        }
        s
    }
}

/// Column-wise drift detector
pub struct DriftDetector {
    config: DriftConfig,
    test: Box<dyn TwoSampleTest>,
}

impl DriftDetector {
    /// KS-based detector
    pub fn new(config: DriftConfig) -> Result<Self> {
        config.validate()?;
        let test = KolmogorovSmirnovTest::new(config.alpha)?;
        Ok(Self {
            config,
            test: Box::new(test),
        })
    }

    /// Detector backed by another two-sample test
    pub fn with_test(config: DriftConfig, test: Box<dyn TwoSampleTest>) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, test })
    }

    pub fn config(&self) -> &DriftConfig {
        &self.config
    }

    /// Test every requested column; columns are processed in parallel and
    /// reported in request order.
    pub fn detect(&self, reference: &Dataset, candidate: &Dataset, columns: &[String]) -> DriftReport {
        let results: Vec<ColumnDrift> = columns
            .par_iter()
            .map(|column| self.detect_column(reference, candidate, column))
            .collect();

        for r in &results {
            match &r.outcome {
                DriftOutcome::Drift {
                    statistic,
                    threshold,
                    ..
                } => warn!(column = %r.column, statistic, threshold, "Drift detected"),
                DriftOutcome::Error { reason } => {
                    warn!(column = %r.column, reason = %reason, "Drift test failed")
                }
                DriftOutcome::NoDrift { statistic, .. } => {
                    debug!(column = %r.column, statistic, "No drift")
                }
            }
        }

        DriftReport {
            test: self.test.name().to_string(),
            config: self.config.clone(),
            columns: results,
            reference_rows: reference.n_rows(),
            candidate_rows: candidate.n_rows(),
            created_at: Utc::now(),
        }
    }

    fn detect_column(&self, reference: &Dataset, candidate: &Dataset, column: &str) -> ColumnDrift {
        let observed = observed_values(reference, column, "reference")
            .and_then(|r| observed_values(candidate, column, "candidate").map(|c| (r, c)));

        let (ref_values, cand_values) = match observed {
            Ok(pair) => pair,
            Err(reason) => {
                return ColumnDrift {
                    column: column.to_string(),
                    reference_size: 0,
                    candidate_size: 0,
                    outcome: DriftOutcome::Error { reason },
                }
            }
        };

        let outcome = match self.test.compare(&ref_values, &cand_values) {
            Ok(t) => {
                let threshold = self.config.statistic_threshold.unwrap_or(t.critical_value);
                if t.statistic > threshold {
                    DriftOutcome::Drift {
                        statistic: t.statistic,
                        p_value: t.p_value,
                        threshold,
                    }
                } else {
                    DriftOutcome::NoDrift {
                        statistic: t.statistic,
                        p_value: t.p_value,
                        threshold,
                    }
                }
            }
            Err(e) => DriftOutcome::Error {
                reason: e.to_string(),
            },
        };

        ColumnDrift {
            column: column.to_string(),
            reference_size: ref_values.len(),
            candidate_size: cand_values.len(),
            outcome,
        }
    }
}

/// Non-null numeric values of a column, or the reason it cannot be tested
fn observed_values(dataset: &Dataset, column: &str, side: &str) -> std::result::Result<Vec<f64>, String> {
    let values = dataset
        .column(column)
        .ok_or_else(|| format!("column absent from {} dataset", side))?;

    let mut observed = Vec::with_capacity(values.len());
    for (row, v) in values.iter().enumerate() {
        match v {
            Value::Text(_) => {
                return Err(format!(
                    "non-numeric value in {} dataset at row {}",
                    side, row
                ))
            }
            other => {
                if let Some(x) = other.as_f64() {
                    observed.push(x);
                }
            }
        }
    }
    if observed.is_empty() {
        return Err(format!("no observed values in {} dataset", side));
    }
    Ok(observed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaVersion;

    fn dataset(columns: &[(&str, Vec<Value>)]) -> Dataset {
        Dataset::from_columns(
            columns.iter().map(|(n, _)| n.to_string()).collect(),
            columns.iter().map(|(_, v)| v.clone()).collect(),
            None,
            SchemaVersion(1),
            "test",
        )
        .unwrap()
    }

    fn ints(range: std::ops::Range<i64>) -> Vec<Value> {
        range.map(Value::Int).collect()
    }

    #[test]
    fn test_identical_datasets_never_drift() {
        let a = dataset(&[("x", ints(0..300)), ("y", ints(-50..250))]);
        let detector = DriftDetector::new(DriftConfig::default()).unwrap();
        let report = detector.detect(&a, &a.clone(), &["x".to_string(), "y".to_string()]);

        assert!(!report.has_drift());
        assert!(!report.has_errors());
        assert_eq!(report.columns.len(), 2);
    }

    #[test]
    fn test_shifted_column_is_flagged() {
        let reference = dataset(&[("x", ints(0..200)), ("y", ints(0..200))]);
        let candidate = dataset(&[("x", ints(1000..1200)), ("y", ints(0..200))]);
        let detector = DriftDetector::new(DriftConfig::default()).unwrap();
        let report = detector.detect(&reference, &candidate, &["x".to_string(), "y".to_string()]);

        assert_eq!(report.drifted_columns(), vec!["x".to_string()]);
        match &report.column("x").unwrap().outcome {
            DriftOutcome::Drift { statistic, .. } => assert!((statistic - 1.0).abs() < 1e-12),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_missing_column_is_error() {
        let reference = dataset(&[("x", ints(0..10))]);
        let candidate = dataset(&[("z", ints(0..10))]);
        let detector = DriftDetector::new(DriftConfig::default()).unwrap();
        let report = detector.detect(&reference, &candidate, &["x".to_string()]);

        assert_eq!(report.errored_columns(), vec!["x".to_string()]);
        assert!(!report.has_drift());
    }

    #[test]
    fn test_all_null_and_text_columns_are_errors() {
        let reference = dataset(&[("n", vec![Value::Null; 5]), ("t", vec![Value::from("a"); 5])]);
        let detector = DriftDetector::new(DriftConfig::default()).unwrap();
        let report = detector.detect(&reference, &reference, &["n".to_string(), "t".to_string()]);
        assert_eq!(report.errored_columns().len(), 2);
    }

    #[test]
    fn test_explicit_threshold_is_recorded() {
        let a = dataset(&[("x", ints(0..100))]);
        let b = dataset(&[("x", ints(10..110))]);
        let config = DriftConfig::default().with_statistic_threshold(0.05);
        let report = DriftDetector::new(config).unwrap().detect(&a, &b, &["x".to_string()]);

        match &report.column("x").unwrap().outcome {
            DriftOutcome::Drift { threshold, statistic, .. } => {
                assert_eq!(*threshold, 0.05);
                assert!((statistic - 0.1).abs() < 1e-12);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(DriftDetector::new(DriftConfig::default().with_alpha(2.0)).is_err());
        assert!(DriftDetector::new(DriftConfig::default().with_statistic_threshold(1.5)).is_err());
    }
}
