//! Schema registry
//!
//! A [`Schema`] is the versioned contract a dataset must satisfy before it
//! reaches the splitter: the exact feature column set, each column's type
//! and whether it may be null.

mod validate;

pub use validate::{validate, SchemaViolation, ValidationResult};

use crate::error::{Result, SentinelError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

/// The 30 pre-extracted URL features of the UCI phishing dataset
pub const URL_FEATURES: [&str; 30] = [
    "having_IP_Address",
    "URL_Length",
    "Shortining_Service",
    "having_At_Symbol",
    "double_slash_redirecting",
    "Prefix_Suffix",
    "having_Sub_Domain",
    "SSLfinal_State",
    "Domain_registeration_length",
    "Favicon",
    "port",
    "HTTPS_token",
    "Request_URL",
    "URL_of_Anchor",
    "Links_in_tags",
    "SFH",
    "Submitting_to_email",
    "Abnormal_URL",
    "Redirect",
    "on_mouseover",
    "RightClick",
    "popUpWidnow",
    "Iframe",
    "age_of_domain",
    "DNSRecord",
    "web_traffic",
    "Page_Rank",
    "Google_Index",
    "Links_pointing_to_page",
    "Statistical_report",
];

/// Target column of the phishing dataset
pub const TARGET_COLUMN: &str = "Result";

/// Schema version tag carried by every dataset
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SchemaVersion(pub u32);

impl Default for SchemaVersion {
    fn default() -> Self {
        SchemaVersion(1)
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "schema v{}", self.0)
    }
}

/// Declared type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    /// Whole numbers; integral floats are accepted
    Integer,
    Float,
    Categorical,
}

impl ColumnType {
    pub fn is_numeric(self) -> bool {
        matches!(self, ColumnType::Integer | ColumnType::Float)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Integer => write!(f, "integer"),
            ColumnType::Float => write!(f, "float"),
            ColumnType::Categorical => write!(f, "categorical"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    #[serde(default)]
    pub nullable: bool,
}

/// Versioned column contract
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub version: SchemaVersion,
    pub columns: Vec<ColumnSpec>,
    /// Label column; when set, datasets must carry labels
    #[serde(default)]
    pub target: Option<String>,
}

impl Schema {
    pub fn new(version: SchemaVersion) -> Self {
        Self {
            version,
            columns: Vec::new(),
            target: None,
        }
    }

    pub fn with_column(
        mut self,
        name: impl Into<String>,
        column_type: ColumnType,
        nullable: bool,
    ) -> Self {
        self.columns.push(ColumnSpec {
            name: name.into(),
            column_type,
            nullable,
        });
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Built-in schema of the phishing URL feature set
    pub fn url_features() -> Self {
        URL_FEATURES
            .iter()
            .fold(Schema::new(SchemaVersion(1)), |schema, name| {
                schema.with_column(*name, ColumnType::Integer, true)
            })
            .with_target(TARGET_COLUMN)
    }

    /// Load a schema from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let schema: Schema = serde_json::from_str(&content)?;
        schema.check()?;
        Ok(schema)
    }

    pub fn to_json_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Feature column names in declaration order
    pub fn feature_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Numeric feature column names; the default drift monitoring set
    pub fn numeric_features(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| c.column_type.is_numeric())
            .map(|c| c.name.clone())
            .collect()
    }

    fn check(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for c in &self.columns {
            if !seen.insert(c.name.as_str()) {
                return Err(SentinelError::ConfigError(format!(
                    "Schema declares column '{}' twice",
                    c.name
                )));
            }
            if Some(&c.name) == self.target.as_ref() {
                return Err(SentinelError::ConfigError(format!(
                    "Target '{}' is also declared as a feature column",
                    c.name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_features_schema() {
        let schema = Schema::url_features();
        assert_eq!(schema.columns.len(), 30);
        assert_eq!(schema.numeric_features().len(), 30);
        assert_eq!(schema.target.as_deref(), Some("Result"));
        assert!(schema.columns.iter().all(|c| c.nullable));
    }

    #[test]
    fn test_schema_json_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schema.json");
        let schema = Schema::new(SchemaVersion(3))
            .with_column("a", ColumnType::Integer, false)
            .with_column("b", ColumnType::Categorical, true)
            .with_target("label");

        schema.to_json_file(&path).unwrap();
        let loaded = Schema::from_json_file(&path).unwrap();
        assert_eq!(loaded, schema);
        assert_eq!(loaded.numeric_features(), vec!["a".to_string()]);
    }

    #[test]
    fn test_schema_json_rejects_duplicate_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schema.json");
        std::fs::write(
            &path,
            r#"{"version":1,"columns":[{"name":"a","type":"integer"},{"name":"a","type":"float"}]}"#,
        )
        .unwrap();
        assert!(matches!(
            Schema::from_json_file(&path),
            Err(SentinelError::ConfigError(_))
        ));
    }
}
