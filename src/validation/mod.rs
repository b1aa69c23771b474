//! Data validation gate
//!
//! Combines schema validation and drift detection into one accept/reject
//! decision with a report that carries both sub-reports unchanged.

use crate::data::Dataset;
use crate::drift::{DriftConfig, DriftDetector, DriftReport};
use crate::error::{Result, SentinelError};
use crate::schema::{self, Schema, ValidationResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

/// What drift does to the gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftPolicy {
    /// Drift rejects the dataset
    #[default]
    Block,
    /// Drift is reported and logged only
    Advisory,
}

/// Validator settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Type and null violations reject too, not only structural ones
    pub reject_on_type_violations: bool,
    pub drift_policy: DriftPolicy,
    /// Columns tested for drift; defaults to the schema's numeric features
    pub monitored_columns: Option<Vec<String>>,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            reject_on_type_violations: true,
            drift_policy: DriftPolicy::Block,
            monitored_columns: None,
        }
    }
}

/// Aggregated result of one validation run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub accepted: bool,
    /// Rejected on schema grounds, as opposed to drift
    pub schema_rejected: bool,
    pub schema: ValidationResult,
    pub drift: DriftReport,
    /// Human-readable reasons for a rejection
    pub rejection_reasons: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl ValidationReport {
    /// Persist the report as pretty JSON, creating parent directories
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Turn a rejected report into the matching error
    pub fn into_error(self) -> SentinelError {
        if self.schema_rejected {
            SentinelError::SchemaViolation(Box::new(self))
        } else {
            SentinelError::DriftDetected(Box::new(self))
        }
    }
}

/// Schema plus drift gate
pub struct DataValidator {
    config: ValidatorConfig,
    detector: DriftDetector,
}

impl DataValidator {
    pub fn new(config: ValidatorConfig, drift: DriftConfig) -> Result<Self> {
        Ok(Self {
            config,
            detector: DriftDetector::new(drift)?,
        })
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Validate `dataset` against `schema` and `reference`.
    ///
    /// Pure over its inputs: nothing is written anywhere.
    pub fn run(&self, dataset: &Dataset, schema: &Schema, reference: &Dataset) -> (bool, ValidationReport) {
        let schema_result = schema::validate(dataset, schema);
        let monitored = self
            .config
            .monitored_columns
            .clone()
            .unwrap_or_else(|| schema.numeric_features());

        // Drift on a structurally broken dataset is meaningless
        let drift = if schema_result.has_structural_violations() {
            self.detector.detect(reference, dataset, &[])
        } else {
            self.detector.detect(reference, dataset, &monitored)
        };

        let mut reasons = Vec::new();
        if schema_result.has_structural_violations() {
            reasons.push(format!("structural schema violations: {}", schema_result.summary()));
        } else if self.config.reject_on_type_violations && !schema_result.is_valid() {
            reasons.push(format!("value schema violations: {}", schema_result.summary()));
        }
        let schema_rejected = !reasons.is_empty();
        if drift.has_errors() {
            reasons.push(format!(
                "drift test failed for: {}",
                drift.errored_columns().join(", ")
            ));
        }
        if drift.has_drift() && self.config.drift_policy == DriftPolicy::Block {
            reasons.push(format!(
                "drift detected in: {}",
                drift.drifted_columns().join(", ")
            ));
        }

        let accepted = reasons.is_empty();
        info!(
            accepted,
            rows = dataset.n_rows(),
            schema_violations = schema_result.violations.len(),
            drifted = drift.drifted_columns().len(),
            "Validation finished"
        );

        let report = ValidationReport {
            accepted,
            schema_rejected,
            schema: schema_result,
            drift,
            rejection_reasons: reasons,
            created_at: Utc::now(),
        };
        (accepted, report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Value;
    use crate::schema::{ColumnType, SchemaVersion};

    fn schema() -> Schema {
        Schema::new(SchemaVersion(1))
            .with_column("x", ColumnType::Integer, true)
            .with_column("y", ColumnType::Integer, false)
    }

    fn dataset(x: Vec<Value>, y: Vec<Value>) -> Dataset {
        Dataset::from_columns(
            vec!["x".to_string(), "y".to_string()],
            vec![x, y],
            None,
            SchemaVersion(1),
            "test",
        )
        .unwrap()
    }

    fn ints(range: std::ops::Range<i64>) -> Vec<Value> {
        range.map(Value::Int).collect()
    }

    fn validator(config: ValidatorConfig) -> DataValidator {
        DataValidator::new(config, DriftConfig::default()).unwrap()
    }

    #[test]
    fn test_accepts_clean_dataset() {
        let ds = dataset(ints(0..100), ints(0..100));
        let (ok, report) = validator(ValidatorConfig::default()).run(&ds, &schema(), &ds);
        assert!(ok);
        assert!(report.rejection_reasons.is_empty());
        assert_eq!(report.drift.columns.len(), 2);
    }

    #[test]
    fn test_drift_blocks_by_default() {
        let reference = dataset(ints(0..100), ints(0..100));
        let candidate = dataset(ints(500..600), ints(0..100));
        let (ok, report) = validator(ValidatorConfig::default()).run(&candidate, &schema(), &reference);

        assert!(!ok);
        assert_eq!(report.drift.drifted_columns(), vec!["x".to_string()]);
        assert!(matches!(report.into_error(), SentinelError::DriftDetected(_)));
    }

    #[test]
    fn test_advisory_drift_accepts() {
        let reference = dataset(ints(0..100), ints(0..100));
        let candidate = dataset(ints(500..600), ints(0..100));
        let config = ValidatorConfig {
            drift_policy: DriftPolicy::Advisory,
            ..Default::default()
        };
        let (ok, report) = validator(config).run(&candidate, &schema(), &reference);
        assert!(ok);
        assert!(report.drift.has_drift());
    }

    #[test]
    fn test_null_violation_rejects_unless_relaxed() {
        let mut y = ints(0..100);
        y[3] = Value::Null;
        let ds = dataset(ints(0..100), y);

        let (ok, report) = validator(ValidatorConfig::default()).run(&ds, &schema(), &ds);
        assert!(!ok);
        assert!(matches!(report.into_error(), SentinelError::SchemaViolation(_)));

        let relaxed = ValidatorConfig {
            reject_on_type_violations: false,
            ..Default::default()
        };
        let (ok, _) = validator(relaxed).run(&ds, &schema(), &ds);
        assert!(ok);
    }

    #[test]
    fn test_structural_violation_skips_drift() {
        let ds = Dataset::from_columns(
            vec!["x".to_string()],
            vec![ints(0..10)],
            None,
            SchemaVersion(1),
            "test",
        )
        .unwrap();
        let (ok, report) = validator(ValidatorConfig::default()).run(&ds, &schema(), &ds);
        assert!(!ok);
        assert!(report.drift.columns.is_empty());
        assert!(report.schema.has_structural_violations());
    }

    #[test]
    fn test_monitored_column_override() {
        let reference = dataset(ints(0..100), ints(0..100));
        let candidate = dataset(ints(500..600), ints(0..100));
        let config = ValidatorConfig {
            monitored_columns: Some(vec!["y".to_string()]),
            ..Default::default()
        };
        let (ok, report) = validator(config).run(&candidate, &schema(), &reference);
        assert!(ok);
        assert_eq!(report.drift.columns.len(), 1);
    }

    #[test]
    fn test_report_written_as_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data_validation/drift_report/report.json");
        let ds = dataset(ints(0..20), ints(0..20));
        let (_, report) = validator(ValidatorConfig::default()).run(&ds, &schema(), &ds);
        report.write_json(&path).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["accepted"], serde_json::Value::Bool(true));
    }
}
