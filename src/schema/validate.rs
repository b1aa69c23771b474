//! Dataset-against-schema validation

use super::{ColumnType, Schema, SchemaVersion};
use crate::data::{Dataset, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A single contract breach
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SchemaViolation {
    /// Dataset was tagged with another schema version
    VersionMismatch {
        expected: SchemaVersion,
        actual: SchemaVersion,
    },
    MissingColumn { column: String },
    UnexpectedColumn { column: String },
    /// Schema declares a target but the dataset has no labels
    MissingLabels { target: String },
    TypeMismatch {
        column: String,
        expected: ColumnType,
        found: String,
        count: usize,
        first_row: usize,
    },
    NullNotAllowed {
        column: String,
        count: usize,
        first_row: usize,
    },
}

impl SchemaViolation {
    /// Structural violations concern the dataset's shape, not its values
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            SchemaViolation::VersionMismatch { .. }
                | SchemaViolation::MissingColumn { .. }
                | SchemaViolation::UnexpectedColumn { .. }
                | SchemaViolation::MissingLabels { .. }
        )
    }

    pub fn column(&self) -> Option<&str> {
        match self {
            SchemaViolation::MissingColumn { column }
            | SchemaViolation::UnexpectedColumn { column }
            | SchemaViolation::TypeMismatch { column, .. }
            | SchemaViolation::NullNotAllowed { column, .. } => Some(column),
            SchemaViolation::MissingLabels { target } => Some(target),
            SchemaViolation::VersionMismatch { .. } => None,
        }
    }
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaViolation::VersionMismatch { expected, actual } => {
                write!(f, "dataset is tagged {} but the schema is {}", actual, expected)
            }
            SchemaViolation::MissingColumn { column } => write!(f, "missing column '{}'", column),
            SchemaViolation::UnexpectedColumn { column } => {
                write!(f, "unexpected column '{}'", column)
            }
            SchemaViolation::MissingLabels { target } => {
                write!(f, "dataset has no '{}' labels", target)
            }
            SchemaViolation::TypeMismatch {
                column,
                expected,
                found,
                count,
                first_row,
            } => write!(
                f,
                "column '{}' expects {} but has {} {} value(s), first at row {}",
                column, expected, count, found, first_row
            ),
            SchemaViolation::NullNotAllowed {
                column,
                count,
                first_row,
            } => write!(
                f,
                "column '{}' is not nullable but has {} null(s), first at row {}",
                column, count, first_row
            ),
        }
    }
}

/// Every violation found for one dataset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub schema_version: SchemaVersion,
    pub dataset_version: SchemaVersion,
    pub n_rows: usize,
    pub violations: Vec<SchemaViolation>,
    /// Null fraction per schema column; empty when validation stopped at a
    /// structural mismatch
    pub null_rates: BTreeMap<String, f64>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn has_structural_violations(&self) -> bool {
        self.violations.iter().any(SchemaViolation::is_structural)
    }

    /// Type and null violations only
    pub fn value_violations(&self) -> impl Iterator<Item = &SchemaViolation> {
        self.violations.iter().filter(|v| !v.is_structural())
    }

    pub fn summary(&self) -> String {
        if self.violations.is_empty() {
            return "no violations".to_string();
        }
        let structural = self.violations.iter().filter(|v| v.is_structural()).count();
        let details: Vec<String> = self.violations.iter().map(|v| v.to_string()).collect();
        format!(
            "{} violation(s), {} structural: {}",
            self.violations.len(),
            structural,
            details.join("; ")
        )
    }
}

/// Check a dataset against a schema.
///
/// Structural problems (version tag, column set, labels) are all collected
/// and then validation stops. Otherwise every column's values are checked
/// and every type or null problem is reported.
pub fn validate(dataset: &Dataset, schema: &Schema) -> ValidationResult {
    let mut violations = Vec::new();

    if dataset.schema_version() != schema.version {
        violations.push(SchemaViolation::VersionMismatch {
            expected: schema.version,
            actual: dataset.schema_version(),
        });
    }
    for spec in &schema.columns {
        if dataset.column_index(&spec.name).is_none() {
            violations.push(SchemaViolation::MissingColumn {
                column: spec.name.clone(),
            });
        }
    }
    for name in dataset.columns() {
        if schema.column(name).is_none() {
            violations.push(SchemaViolation::UnexpectedColumn {
                column: name.clone(),
            });
        }
    }
    if let Some(target) = &schema.target {
        if dataset.labels().is_none() && !dataset.is_empty() {
            violations.push(SchemaViolation::MissingLabels {
                target: target.clone(),
            });
        }
    }

    let mut result = ValidationResult {
        schema_version: schema.version,
        dataset_version: dataset.schema_version(),
        n_rows: dataset.n_rows(),
        violations,
        null_rates: BTreeMap::new(),
    };
    if !result.violations.is_empty() {
        return result;
    }

    for spec in &schema.columns {
        let Some(values) = dataset.column(&spec.name) else {
            continue;
        };
        let mut nulls = 0usize;
        let mut first_null = None;
        let mut mismatches = 0usize;
        let mut first_mismatch = None;
        let mut found = "";

        for (row, value) in values.iter().enumerate() {
            if value.is_null() {
                nulls += 1;
                first_null.get_or_insert(row);
            } else if !conforms(value, spec.column_type) {
                mismatches += 1;
                if first_mismatch.is_none() {
                    first_mismatch = Some(row);
                    found = value.type_name();
                }
            }
        }

        let rate = if values.is_empty() {
            0.0
        } else {
            nulls as f64 / values.len() as f64
        };
        result.null_rates.insert(spec.name.clone(), rate);

        if let Some(first_row) = first_mismatch {
            result.violations.push(SchemaViolation::TypeMismatch {
                column: spec.name.clone(),
                expected: spec.column_type,
                found: found.to_string(),
                count: mismatches,
                first_row,
            });
        }
        if let (false, Some(first_row)) = (spec.nullable, first_null) {
            result.violations.push(SchemaViolation::NullNotAllowed {
                column: spec.name.clone(),
                count: nulls,
                first_row,
            });
        }
    }

    result
}

fn conforms(value: &Value, column_type: ColumnType) -> bool {
    match (column_type, value) {
        (ColumnType::Integer, Value::Int(_)) => true,
        (ColumnType::Integer, Value::Float(v)) => v.is_finite() && v.fract() == 0.0,
        (ColumnType::Float, Value::Int(_) | Value::Float(_)) => true,
        (ColumnType::Categorical, Value::Text(_)) => true,
        _ => false,
    }
}
