//! Run tracking
//!
//! Every training run emits one [`RunRecord`]: candidate configurations and
//! their metrics, the selected configuration and the validation report.
//! Sinks decide where the record goes.

use crate::error::{Result, SentinelError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Final state of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// A bundle was persisted
    Promoted,
    /// The run finished but nothing was persisted
    Rejected,
    Failed,
}

/// Opaque structured record, string keys to JSON values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunRecord {
    fields: BTreeMap<String, serde_json::Value>,
}

impl RunRecord {
    pub fn new(run_id: impl Into<String>) -> Self {
        let mut record = Self::default();
        record
            .fields
            .insert("run_id".to_string(), serde_json::Value::String(run_id.into()));
        record
    }

    /// Set `key`; values that fail to serialize are stored as `null`
    pub fn with(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Serialize) {
        let value = serde_json::to_value(value).unwrap_or(serde_json::Value::Null);
        self.fields.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.fields.get(key)
    }

    pub fn run_id(&self) -> Option<&str> {
        self.get("run_id").and_then(|v| v.as_str())
    }

    pub fn status(&self) -> Option<RunStatus> {
        self.get("status")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn fields(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.fields
    }
}

/// Receives one record per run
pub trait MetricsSink: Send + Sync {
    fn emit(&self, record: &RunRecord) -> Result<()>;
}

/// Keeps records in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<RunRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<RunRecord> {
        self.records.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl MetricsSink for MemorySink {
    fn emit(&self, record: &RunRecord) -> Result<()> {
        self.records.lock().push(record.clone());
        Ok(())
    }
}

/// Appends one JSON object per line
#[derive(Debug)]
pub struct JsonLinesSink {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonLinesSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read back every record in the file
    pub fn read_all(&self) -> Result<Vec<RunRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        fs::read_to_string(&self.path)?
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| serde_json::from_str(l).map_err(SentinelError::from))
            .collect()
    }
}

impl MetricsSink for JsonLinesSink {
    fn emit(&self, record: &RunRecord) -> Result<()> {
        let _guard = self.lock.lock();
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_fields() {
        let record = RunRecord::new("abc")
            .with("status", RunStatus::Rejected)
            .with("f1", 0.93)
            .with("drifted", vec!["URL_Length"]);

        assert_eq!(record.run_id(), Some("abc"));
        assert_eq!(record.status(), Some(RunStatus::Rejected));
        assert_eq!(record.get("f1").and_then(|v| v.as_f64()), Some(0.93));
        assert_eq!(record.get("drifted").unwrap()[0], "URL_Length");
    }

    #[test]
    fn test_memory_sink() {
        let sink = MemorySink::new();
        assert!(sink.is_empty());
        sink.emit(&RunRecord::new("a")).unwrap();
        sink.emit(&RunRecord::new("b")).unwrap();
        assert_eq!(sink.len(), 2);
        assert_eq!(sink.records()[1].run_id(), Some("b"));
    }

    #[test]
    fn test_json_lines_sink_appends() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonLinesSink::new(dir.path().join("nested").join("runs.jsonl"));

        sink.emit(&RunRecord::new("first").with("status", RunStatus::Promoted))
            .unwrap();
        sink.emit(&RunRecord::new("second").with("status", RunStatus::Failed))
            .unwrap();

        let records = sink.read_all().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].run_id(), Some("first"));
        assert_eq!(records[1].status(), Some(RunStatus::Failed));
    }
}
