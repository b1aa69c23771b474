//! Record sources
//!
//! The document store that feeds the pipeline is external; a source only has
//! to hand back an ordered set of records tagged with its schema version.

use super::{Dataset, Label, Value};
use crate::error::{Result, SentinelError};
use crate::schema::SchemaVersion;
use polars::prelude::*;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Result of a source read
#[derive(Debug, Clone)]
pub struct SourceSnapshot {
    pub schema_version: SchemaVersion,
    pub dataset: Dataset,
}

/// Read side of the raw-record collaborator
pub trait RecordSource: Send + Sync {
    fn fetch(&self) -> Result<SourceSnapshot>;
}

/// Serves a dataset held in memory
#[derive(Debug, Clone)]
pub struct InMemorySource {
    dataset: Dataset,
}

impl InMemorySource {
    pub fn new(dataset: Dataset) -> Self {
        Self { dataset }
    }
}

impl RecordSource for InMemorySource {
    fn fetch(&self) -> Result<SourceSnapshot> {
        Ok(SourceSnapshot {
            schema_version: self.dataset.schema_version(),
            dataset: self.dataset.clone(),
        })
    }
}

/// CSV export of the phishing collection, read through polars
#[derive(Debug, Clone)]
pub struct CsvRecordSource {
    path: PathBuf,
    target_column: String,
    malicious_value: i64,
    safe_value: i64,
    schema_version: SchemaVersion,
    columns: Option<Vec<String>>,
}

impl CsvRecordSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            target_column: "Result".to_string(),
            malicious_value: -1,
            safe_value: 1,
            schema_version: SchemaVersion::default(),
            columns: None,
        }
    }

    pub fn with_target_column(mut self, name: impl Into<String>) -> Self {
        self.target_column = name.into();
        self
    }

    /// Target value that marks a malicious URL; every other value reads as safe
    pub fn with_malicious_value(mut self, value: i64) -> Self {
        self.malicious_value = value;
        self
    }

    /// Target value written for safe rows
    pub fn with_safe_value(mut self, value: i64) -> Self {
        self.safe_value = value;
        self
    }

    pub fn with_schema_version(mut self, version: SchemaVersion) -> Self {
        self.schema_version = version;
        self
    }

    /// Keep only these feature columns
    pub fn with_columns(mut self, columns: Vec<String>) -> Self {
        self.columns = Some(columns);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write a dataset in the layout this source reads back
    pub fn write(&self, dataset: &Dataset) -> Result<()> {
        let mut columns: Vec<Column> = Vec::with_capacity(dataset.columns().len() + 1);
        for name in dataset.columns() {
            let values = dataset.column(name).unwrap_or_default();
            columns.push(to_polars_column(name, values));
        }
        if let Some(labels) = dataset.labels() {
            let target: Vec<i64> = labels
                .iter()
                .map(|l| match l {
                    Label::Malicious => self.malicious_value,
                    Label::Safe => self.safe_value,
                })
                .collect();
            columns.push(Column::new(self.target_column.as_str().into(), target));
        }

        let mut df = DataFrame::new(columns)?;
        let mut file = File::create(&self.path)?;
        CsvWriter::new(&mut file).include_header(true).finish(&mut df)?;
        info!(path = %self.path.display(), rows = dataset.n_rows(), "Wrote dataset");
        Ok(())
    }

    fn decode_labels(&self, column: &Column) -> Result<Vec<Label>> {
        let casted = column.as_materialized_series().cast(&DataType::Int64)?;
        casted
            .i64()?
            .into_iter()
            .enumerate()
            .map(|(row, v)| match v {
                Some(v) if v == self.malicious_value => Ok(Label::Malicious),
                Some(_) => Ok(Label::Safe),
                None => Err(SentinelError::DataError(format!(
                    "Missing '{}' value at row {}",
                    self.target_column, row
                ))),
            })
            .collect()
    }
}

impl RecordSource for CsvRecordSource {
    fn fetch(&self) -> Result<SourceSnapshot> {
        let file = File::open(&self.path).map_err(|e| {
            SentinelError::DataError(format!("{}: {}", self.path.display(), e))
        })?;

        let df = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(100))
            .into_reader_with_file_handle(file)
            .finish()?;

        let mut names = Vec::with_capacity(df.width());
        let mut values = Vec::with_capacity(df.width());
        let mut labels = None;

        for col in df.get_columns() {
            let name = col.name().to_string();
            if name == self.target_column {
                labels = Some(self.decode_labels(col)?);
                continue;
            }
            if let Some(keep) = &self.columns {
                if !keep.contains(&name) {
                    continue;
                }
            }
            values.push(column_values(col)?);
            names.push(name);
        }

        debug!(
            path = %self.path.display(),
            rows = df.height(),
            columns = names.len(),
            labelled = labels.is_some(),
            "Read CSV snapshot"
        );

        let dataset = Dataset::from_columns(
            names,
            values,
            labels,
            self.schema_version,
            self.path.display().to_string(),
        )?;

        Ok(SourceSnapshot {
            schema_version: self.schema_version,
            dataset,
        })
    }
}

fn column_values(column: &Column) -> Result<Vec<Value>> {
    let series = column.as_materialized_series();
    let values = match series.dtype() {
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64 => {
            let casted = series.cast(&DataType::Int64)?;
            casted
                .i64()?
                .into_iter()
                .map(|v| v.map(Value::Int).unwrap_or(Value::Null))
                .collect()
        }
        DataType::Float32 | DataType::Float64 => {
            let casted = series.cast(&DataType::Float64)?;
            casted
                .f64()?
                .into_iter()
                .map(|v| v.map(Value::Float).unwrap_or(Value::Null))
                .collect()
        }
        DataType::Null => vec![Value::Null; series.len()],
        _ => {
            let casted = series.cast(&DataType::String)?;
            casted
                .str()?
                .into_iter()
                .map(|v| v.map(|s| Value::Text(s.to_string())).unwrap_or(Value::Null))
                .collect()
        }
    };
    Ok(values)
}

fn to_polars_column(name: &str, values: &[Value]) -> Column {
    let has_text = values.iter().any(|v| matches!(v, Value::Text(_)));
    let has_float = values.iter().any(|v| matches!(v, Value::Float(_)));

    if has_text {
        let data: Vec<Option<String>> = values
            .iter()
            .map(|v| match v {
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .collect();
        Column::new(name.into(), data)
    } else if has_float {
        let data: Vec<Option<f64>> = values.iter().map(Value::as_f64).collect();
        Column::new(name.into(), data)
    } else {
        let data: Vec<Option<i64>> = values
            .iter()
            .map(|v| match v {
                Value::Int(i) => Some(*i),
                _ => None,
            })
            .collect();
        Column::new(name.into(), data)
    }
}
