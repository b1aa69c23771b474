//! Records, datasets and provenance tracking
//!
//! A [`Dataset`] keeps raw ingested values column-major so that schema
//! checks see exactly what the source delivered. Numeric conversion happens
//! later, inside the transform pipeline.

mod source;

pub use source::{CsvRecordSource, InMemorySource, RecordSource, SourceSnapshot};

use crate::error::{Result, SentinelError};
use crate::schema::SchemaVersion;
use chrono::{DateTime, Utc};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// A single raw cell value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Int(i64),
    Float(f64),
    Text(String),
    Null,
}

impl Value {
    /// Numeric view of the value; `None` for text and nulls
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) if v.is_nan() => None,
            Value::Float(v) => Some(*v),
            Value::Text(_) | Value::Null => None,
        }
    }

    /// Nulls and NaN floats both count as missing
    pub fn is_null(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Float(v) => v.is_nan(),
            _ => false,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Null => "null",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Text(s) => write!(f, "{}", s),
            Value::Null => write!(f, "null"),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

/// Binary target: `Malicious` is the positive class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Label {
    Safe,
    Malicious,
}

impl Label {
    pub fn as_f64(self) -> f64 {
        match self {
            Label::Safe => 0.0,
            Label::Malicious => 1.0,
        }
    }

    pub fn from_f64(v: f64) -> Self {
        if v > 0.5 {
            Label::Malicious
        } else {
            Label::Safe
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Safe => write!(f, "safe"),
            Label::Malicious => write!(f, "malicious"),
        }
    }
}

/// One URL's feature mapping plus its label (absent for inference rows)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub fields: BTreeMap<String, Value>,
    pub label: Option<Label>,
}

impl Record {
    pub fn new(label: Option<Label>) -> Self {
        Self {
            fields: BTreeMap::new(),
            label,
        }
    }

    /// Builder-style field insertion
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }
}

/// Where a dataset came from, as far as leakage is concerned.
///
/// Only [`crate::split::Splitter`] can produce the split variants; every
/// public constructor yields `Raw`. Derived copies keep the provenance of
/// the dataset they were made from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Provenance {
    Raw,
    TrainSplit { split_id: u64 },
    TestSplit { split_id: u64 },
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provenance::Raw => write!(f, "raw dataset"),
            Provenance::TrainSplit { split_id } => write!(f, "train split {:016x}", split_id),
            Provenance::TestSplit { split_id } => write!(f, "test split {:016x}", split_id),
        }
    }
}

/// Ordered collection of records sharing one schema version
#[derive(Debug, Clone)]
pub struct Dataset {
    columns: Vec<String>,
    /// Column-major raw values, `values[col][row]`
    values: Vec<Vec<Value>>,
    labels: Option<Vec<Label>>,
    schema_version: SchemaVersion,
    created_at: DateTime<Utc>,
    source: String,
    provenance: Provenance,
}

impl Dataset {
    /// Build a dataset from records. Every record's key set must equal `columns`.
    pub fn from_records(
        columns: Vec<String>,
        records: &[Record],
        schema_version: SchemaVersion,
        source: impl Into<String>,
    ) -> Result<Self> {
        check_unique(&columns)?;

        let mut values: Vec<Vec<Value>> = (0..columns.len())
            .map(|_| Vec::with_capacity(records.len()))
            .collect();

        for (row, record) in records.iter().enumerate() {
            if record.fields.len() != columns.len()
                || !columns.iter().all(|c| record.fields.contains_key(c))
            {
                let extra: Vec<&String> = record
                    .fields
                    .keys()
                    .filter(|k| !columns.contains(k))
                    .collect();
                let missing: Vec<&String> = columns
                    .iter()
                    .filter(|c| !record.fields.contains_key(*c))
                    .collect();
                return Err(SentinelError::DataError(format!(
                    "Record {} keys do not match the declared columns (missing {:?}, extra {:?})",
                    row, missing, extra
                )));
            }
            for (j, col) in columns.iter().enumerate() {
                values[j].push(record.fields[col].clone());
            }
        }

        let labelled = records.iter().filter(|r| r.label.is_some()).count();
        let labels = if labelled == 0 && !records.is_empty() {
            None
        } else if labelled == records.len() {
            Some(records.iter().filter_map(|r| r.label).collect())
        } else {
            return Err(SentinelError::DataError(format!(
                "{} of {} records carry a label; labels must be all present or all absent",
                labelled,
                records.len()
            )));
        };

        Ok(Self {
            columns,
            values,
            labels,
            schema_version,
            created_at: Utc::now(),
            source: source.into(),
            provenance: Provenance::Raw,
        })
    }

    /// Build a dataset from column-major values
    pub fn from_columns(
        columns: Vec<String>,
        values: Vec<Vec<Value>>,
        labels: Option<Vec<Label>>,
        schema_version: SchemaVersion,
        source: impl Into<String>,
    ) -> Result<Self> {
        check_unique(&columns)?;
        if columns.len() != values.len() {
            return Err(SentinelError::ShapeError {
                expected: format!("{} value columns", columns.len()),
                actual: format!("{} value columns", values.len()),
            });
        }
        let n_rows = values
            .first()
            .map(|c| c.len())
            .or_else(|| labels.as_ref().map(|l| l.len()))
            .unwrap_or(0);
        if let Some((name, col)) = columns
            .iter()
            .zip(values.iter())
            .find(|(_, col)| col.len() != n_rows)
        {
            return Err(SentinelError::ShapeError {
                expected: format!("{} rows in every column", n_rows),
                actual: format!("{} rows in column '{}'", col.len(), name),
            });
        }
        if let Some(l) = &labels {
            if l.len() != n_rows {
                return Err(SentinelError::ShapeError {
                    expected: format!("{} labels", n_rows),
                    actual: format!("{} labels", l.len()),
                });
            }
        }

        Ok(Self {
            columns,
            values,
            labels,
            schema_version,
            created_at: Utc::now(),
            source: source.into(),
            provenance: Provenance::Raw,
        })
    }

    pub fn n_rows(&self) -> usize {
        self.values
            .first()
            .map(|c| c.len())
            .or_else(|| self.labels.as_ref().map(|l| l.len()))
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.n_rows() == 0
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Raw values of a column
    pub fn column(&self, name: &str) -> Option<&[Value]> {
        self.column_index(name).map(|j| self.values[j].as_slice())
    }

    pub fn labels(&self) -> Option<&[Label]> {
        self.labels.as_deref()
    }

    /// Labels encoded as 0/1 floats
    pub fn label_vector(&self) -> Option<Array1<f64>> {
        self.labels
            .as_ref()
            .map(|l| l.iter().map(|label| label.as_f64()).collect())
    }

    pub fn schema_version(&self) -> SchemaVersion {
        self.schema_version
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn provenance(&self) -> Provenance {
        self.provenance
    }

    /// Explicitly re-tag the dataset with another schema version.
    ///
    /// Split provenance survives the re-tag.
    pub fn with_schema_version(&self, version: SchemaVersion) -> Self {
        let mut retagged = self.clone();
        retagged.schema_version = version;
        retagged
    }

    /// Reconstruct the record at `row`
    pub fn record(&self, row: usize) -> Option<Record> {
        if row >= self.n_rows() {
            return None;
        }
        let fields = self
            .columns
            .iter()
            .zip(self.values.iter())
            .map(|(name, col)| (name.clone(), col[row].clone()))
            .collect();
        Some(Record {
            fields,
            label: self.labels.as_ref().map(|l| l[row]),
        })
    }

    pub fn records(&self) -> impl Iterator<Item = Record> + '_ {
        (0..self.n_rows()).filter_map(move |i| self.record(i))
    }

    /// Copy of this dataset with one column rewritten
    pub fn map_column<F>(&self, name: &str, f: F) -> Result<Self>
    where
        F: Fn(&Value) -> Value,
    {
        let j = self
            .column_index(name)
            .ok_or_else(|| SentinelError::DataError(format!("Unknown column '{}'", name)))?;
        let mut mapped = self.clone();
        mapped.values[j] = self.values[j].iter().map(f).collect();
        mapped.created_at = Utc::now();
        Ok(mapped)
    }

    /// Drop the labels, as inference data arrives without them
    pub fn without_labels(&self) -> Self {
        let mut unlabelled = self.clone();
        unlabelled.labels = None;
        unlabelled
    }

    /// Copy of this dataset carrying the given labels
    pub fn with_labels(&self, labels: Vec<Label>) -> Result<Self> {
        if labels.len() != self.n_rows() {
            return Err(SentinelError::ShapeError {
                expected: format!("{} labels", self.n_rows()),
                actual: format!("{} labels", labels.len()),
            });
        }
        let mut labelled = self.clone();
        labelled.labels = Some(labels);
        Ok(labelled)
    }

    /// Row subset carrying the given provenance; used by the splitter only
    pub(crate) fn select_rows(&self, rows: &[usize], provenance: Provenance) -> Self {
        let values = self
            .values
            .iter()
            .map(|col| rows.iter().map(|&i| col[i].clone()).collect())
            .collect();
        let labels = self
            .labels
            .as_ref()
            .map(|l| rows.iter().map(|&i| l[i]).collect());
        Self {
            columns: self.columns.clone(),
            values,
            labels,
            schema_version: self.schema_version,
            created_at: self.created_at,
            source: self.source.clone(),
            provenance,
        }
    }
}

fn check_unique(columns: &[String]) -> Result<()> {
    let mut seen = HashSet::with_capacity(columns.len());
    for c in columns {
        if !seen.insert(c.as_str()) {
            return Err(SentinelError::DataError(format!("Duplicate column '{}'", c)));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns() -> Vec<String> {
        vec!["a".to_string(), "b".to_string()]
    }

    #[test]
    fn test_from_records_roundtrips_rows() {
        let records = vec![
            Record::new(Some(Label::Safe)).with("a", 1).with("b", 2.5),
            Record::new(Some(Label::Malicious)).with("a", -1).with("b", Value::Null),
        ];
        let ds = Dataset::from_records(columns(), &records, SchemaVersion(1), "test").unwrap();

        assert_eq!(ds.n_rows(), 2);
        assert_eq!(ds.provenance(), Provenance::Raw);
        assert_eq!(ds.record(1).unwrap(), records[1]);
        assert_eq!(ds.label_vector().unwrap().to_vec(), vec![0.0, 1.0]);
    }

    #[test]
    fn test_from_records_rejects_key_mismatch() {
        let records = vec![Record::new(None).with("a", 1).with("c", 2)];
        let err = Dataset::from_records(columns(), &records, SchemaVersion(1), "test").unwrap_err();
        assert!(matches!(err, SentinelError::DataError(_)));
    }

    #[test]
    fn test_from_records_rejects_partial_labels() {
        let records = vec![
            Record::new(Some(Label::Safe)).with("a", 1).with("b", 1),
            Record::new(None).with("a", 1).with("b", 1),
        ];
        assert!(Dataset::from_records(columns(), &records, SchemaVersion(1), "test").is_err());
    }

    #[test]
    fn test_from_columns_rejects_ragged() {
        let values = vec![vec![Value::Int(1)], vec![]];
        assert!(Dataset::from_columns(columns(), values, None, SchemaVersion(1), "t").is_err());
    }

    #[test]
    fn test_value_nulls() {
        assert!(Value::Null.is_null());
        assert!(Value::Float(f64::NAN).is_null());
        assert_eq!(Value::Float(f64::NAN).as_f64(), None);
        assert_eq!(Value::Int(-1).as_f64(), Some(-1.0));
        assert_eq!(Value::from("x").as_f64(), None);
    }

    #[test]
    fn test_derived_copies_keep_provenance() {
        let records = vec![Record::new(Some(Label::Safe)).with("a", 1).with("b", 2)];
        let ds = Dataset::from_records(columns(), &records, SchemaVersion(1), "t").unwrap();
        let split = ds.select_rows(&[0], Provenance::TestSplit { split_id: 7 });
        let test_split = Provenance::TestSplit { split_id: 7 };

        let retagged = split.with_schema_version(SchemaVersion(2));
        assert_eq!(retagged.schema_version(), SchemaVersion(2));
        assert_eq!(retagged.provenance(), test_split);

        let relabelled = split
            .without_labels()
            .with_labels(vec![Label::Malicious])
            .unwrap();
        assert_eq!(relabelled.provenance(), test_split);
        let mapped = split.map_column("a", |_| Value::Int(0)).unwrap();
        assert_eq!(mapped.provenance(), test_split);
    }
}
