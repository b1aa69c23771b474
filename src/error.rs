//! Error types for the URL Sentinel pipeline

use crate::data::Provenance;
use crate::validation::ValidationReport;
use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, SentinelError>;

/// Main error type for the pipeline
#[derive(Error, Debug)]
pub enum SentinelError {
    /// Structural or type mismatch between a dataset and its schema.
    #[error("Schema violation: {}", .0.schema.summary())]
    SchemaViolation(Box<ValidationReport>),

    /// Monitored columns drifted away from the reference distribution.
    #[error("Drift detected in columns: {}", .0.drift.drifted_columns().join(", "))]
    DriftDetected(Box<ValidationReport>),

    /// A transform was fitted on something other than a training split.
    #[error("Leakage guard violation: transform fit requires a training split, got {provenance}")]
    LeakageGuardViolation { provenance: Provenance },

    #[error("Candidate {candidate} failed to fit: {reason}")]
    CandidateFit { candidate: String, reason: String },

    #[error(
        "No viable candidate: {failed} failed, {evaluated} evaluated, best F1 {}, minimum {min_f1:.4}",
        best_f1.map(|f| format!("{:.4}", f)).unwrap_or_else(|| "n/a".to_string())
    )]
    NoViableCandidate {
        failed: usize,
        evaluated: usize,
        best_f1: Option<f64>,
        min_f1: f64,
    },

    #[error("Promotion rejected: candidate F1 {candidate_f1:.4} vs deployed {deployed_tag} F1 {deployed_f1:.4}")]
    PromotionRejected {
        candidate_f1: f64,
        deployed_f1: f64,
        deployed_tag: String,
    },

    #[error("Artifact store error: {0}")]
    ArtifactStore(String),

    #[error("Data error: {0}")]
    DataError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Transform error: {0}")]
    TransformError(String),

    #[error("Training error: {0}")]
    TrainingError(String),

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl SentinelError {
    pub(crate) fn invalid_parameter(
        name: &str,
        value: impl std::fmt::Display,
        reason: &str,
    ) -> Self {
        SentinelError::InvalidParameter {
            name: name.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Validation report attached to the error, if any
    pub fn report(&self) -> Option<&ValidationReport> {
        match self {
            SentinelError::SchemaViolation(r) | SentinelError::DriftDetected(r) => Some(r),
            _ => None,
        }
    }

    /// Short machine-readable kind, used in run records
    pub fn kind(&self) -> &'static str {
        match self {
            SentinelError::SchemaViolation(_) => "schema_violation",
            SentinelError::DriftDetected(_) => "drift_detected",
            SentinelError::LeakageGuardViolation { .. } => "leakage_guard_violation",
            SentinelError::CandidateFit { .. } => "candidate_fit_error",
            SentinelError::NoViableCandidate { .. } => "no_viable_candidate",
            SentinelError::PromotionRejected { .. } => "promotion_rejected",
            SentinelError::ArtifactStore(_) => "artifact_store_error",
            SentinelError::DataError(_) => "data_error",
            SentinelError::ConfigError(_) => "config_error",
            SentinelError::TransformError(_) => "transform_error",
            SentinelError::TrainingError(_) => "training_error",
            SentinelError::InvalidParameter { .. } => "invalid_parameter",
            SentinelError::ShapeError { .. } => "shape_error",
            SentinelError::ModelNotFitted => "model_not_fitted",
            SentinelError::SerializationError(_) => "serialization_error",
            SentinelError::IoError(_) => "io_error",
        }
    }
}

impl From<polars::error::PolarsError> for SentinelError {
    fn from(err: polars::error::PolarsError) -> Self {
        SentinelError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for SentinelError {
    fn from(err: serde_json::Error) -> Self {
        SentinelError::SerializationError(err.to_string())
    }
}

impl From<bincode::Error> for SentinelError {
    fn from(err: bincode::Error) -> Self {
        SentinelError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for SentinelError {
    fn from(err: ndarray::ShapeError) -> Self {
        SentinelError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SentinelError::DataError("test error".to_string());
        assert_eq!(err.to_string(), "Data error: test error");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: SentinelError = io_err.into();
        assert!(matches!(err, SentinelError::IoError(_)));
        assert_eq!(err.kind(), "io_error");
    }

    #[test]
    fn test_no_viable_candidate_display() {
        let err = SentinelError::NoViableCandidate {
            failed: 3,
            evaluated: 0,
            best_f1: None,
            min_f1: 0.9,
        };
        let msg = err.to_string();
        assert!(msg.contains("3 failed"));
        assert!(msg.contains("n/a"));
    }
}
