//! Leak-free preprocessing pipeline
//!
//! `fit` only accepts the training split produced by the splitter. The
//! resulting [`TransformArtifact`] owns every fitted table and never touches
//! raw training data again, so `apply` is a pure function of the artifact and
//! its input.

use super::encoder::OrdinalEncoder;
use crate::data::{Dataset, Provenance, Value};
use crate::error::{Result, SentinelError};
use crate::imputation::{is_missing, DistanceMetric, Imputer, KNNImputer, Weighting};
use crate::schema::{ColumnType, Schema};
use chrono::{DateTime, Utc};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{debug, info};

/// Transform settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformConfig {
    pub n_neighbors: usize,
    pub weights: Weighting,
    pub metric: DistanceMetric,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            n_neighbors: 3,
            weights: Weighting::Uniform,
            metric: DistanceMetric::NanEuclidean,
        }
    }
}

impl TransformConfig {
    pub fn validate(&self) -> Result<()> {
        if self.n_neighbors == 0 {
            return Err(SentinelError::invalid_parameter(
                "transform.n_neighbors",
                self.n_neighbors,
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Numeric feature matrix ready for model fitting or prediction
#[derive(Debug, Clone)]
pub struct TransformedDataset {
    pub features: Array2<f64>,
    pub labels: Option<Array1<f64>>,
    pub feature_names: Vec<String>,
    pub provenance: Provenance,
}

impl TransformedDataset {
    pub fn n_rows(&self) -> usize {
        self.features.nrows()
    }

    /// Any NaN left in the feature matrix
    pub fn has_missing(&self) -> bool {
        self.features.iter().any(|&v| is_missing(v))
    }

    /// Labels, or an error for unlabelled data
    pub fn require_labels(&self) -> Result<&Array1<f64>> {
        self.labels
            .as_ref()
            .ok_or_else(|| SentinelError::DataError("Dataset has no labels".to_string()))
    }
}

/// Fitted preprocessing state, reused for test and inference data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformArtifact {
    feature_columns: Vec<String>,
    column_types: Vec<ColumnType>,
    encoders: BTreeMap<String, OrdinalEncoder>,
    imputer: KNNImputer,
    fitted_rows: usize,
    fitted_on: Provenance,
    fitted_at: DateTime<Utc>,
}

impl TransformArtifact {
    pub fn feature_columns(&self) -> &[String] {
        &self.feature_columns
    }

    pub fn encoders(&self) -> &BTreeMap<String, OrdinalEncoder> {
        &self.encoders
    }

    pub fn fitted_rows(&self) -> usize {
        self.fitted_rows
    }

    pub fn fitted_on(&self) -> Provenance {
        self.fitted_on
    }

    pub fn fitted_at(&self) -> DateTime<Utc> {
        self.fitted_at
    }

    /// Encode and impute `dataset` with the fitted state
    pub fn apply(&self, dataset: &Dataset) -> Result<TransformedDataset> {
        let raw = self.encode(dataset)?;
        let features = self.imputer.transform(&raw)?;
        Ok(TransformedDataset {
            features,
            labels: dataset.label_vector(),
            feature_names: self.feature_columns.clone(),
            provenance: dataset.provenance(),
        })
    }

    /// Numeric matrix in artifact column order, NaN where values are missing
    fn encode(&self, dataset: &Dataset) -> Result<Array2<f64>> {
        let mut missing: Vec<&String> = self
            .feature_columns
            .iter()
            .filter(|c| dataset.column_index(c).is_none())
            .collect();
        let extra: Vec<&String> = dataset
            .columns()
            .iter()
            .filter(|c| !self.feature_columns.contains(c))
            .collect();
        if !missing.is_empty() || !extra.is_empty() {
            missing.sort();
            return Err(SentinelError::TransformError(format!(
                "Dataset columns differ from the fitted transform (missing {:?}, extra {:?})",
                missing, extra
            )));
        }

        let n = dataset.n_rows();
        let mut x = Array2::from_elem((n, self.feature_columns.len()), f64::NAN);

        for (j, (name, column_type)) in self
            .feature_columns
            .iter()
            .zip(self.column_types.iter())
            .enumerate()
        {
            let values = dataset.column(name).unwrap_or_default();
            match column_type {
                ColumnType::Categorical => {
                    let encoder = self.encoders.get(name).ok_or_else(|| {
                        SentinelError::TransformError(format!("No encoder fitted for '{}'", name))
                    })?;
                    for (i, v) in values.iter().enumerate() {
                        x[[i, j]] = encoder.encode(v);
                    }
                }
                ColumnType::Integer | ColumnType::Float => {
                    for (i, v) in values.iter().enumerate() {
                        x[[i, j]] = match v {
                            Value::Text(s) => {
                                return Err(SentinelError::TransformError(format!(
                                    "Non-numeric value '{}' in column '{}' at row {}",
                                    s, name, i
                                )))
                            }
                            other => other.as_f64().unwrap_or(f64::NAN),
                        };
                    }
                }
            }
        }

        Ok(x)
    }
}

/// Fits [`TransformArtifact`]s
#[derive(Debug, Clone, Default)]
pub struct TransformPipeline {
    config: TransformConfig,
}

impl TransformPipeline {
    pub fn new(config: TransformConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Fit on the training split.
    ///
    /// Fails with [`SentinelError::LeakageGuardViolation`] for any dataset
    /// the splitter did not mark as a training split.
    pub fn fit(&self, train: &Dataset, schema: &Schema) -> Result<TransformArtifact> {
        let provenance = train.provenance();
        if !matches!(provenance, Provenance::TrainSplit { .. }) {
            return Err(SentinelError::LeakageGuardViolation { provenance });
        }
        if train.is_empty() {
            return Err(SentinelError::TransformError(
                "Cannot fit a transform on an empty training split".to_string(),
            ));
        }

        let start = Instant::now();
        let feature_columns = schema.feature_names();
        let column_types: Vec<ColumnType> = schema.columns.iter().map(|c| c.column_type).collect();

        let mut encoders = BTreeMap::new();
        for (name, column_type) in feature_columns.iter().zip(column_types.iter()) {
            if *column_type == ColumnType::Categorical {
                let values = train.column(name).ok_or_else(|| {
                    SentinelError::TransformError(format!("Training split lacks column '{}'", name))
                })?;
                encoders.insert(name.clone(), OrdinalEncoder::fit(name, values)?);
            }
        }

        let mut artifact = TransformArtifact {
            feature_columns,
            column_types,
            encoders,
            imputer: KNNImputer::new(self.config.n_neighbors)
                .with_weights(self.config.weights)
                .with_metric(self.config.metric),
            fitted_rows: train.n_rows(),
            fitted_on: provenance,
            fitted_at: Utc::now(),
        };

        let encoded = artifact.encode(train)?;
        let missing = encoded.iter().filter(|v| is_missing(**v)).count();
        artifact.imputer.fit(&encoded)?;

        info!(
            rows = train.n_rows(),
            features = artifact.feature_columns.len(),
            categorical = artifact.encoders.len(),
            missing_cells = missing,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Fitted transform"
        );
        Ok(artifact)
    }

    /// Apply a fitted artifact; same as [`TransformArtifact::apply`]
    pub fn apply(artifact: &TransformArtifact, dataset: &Dataset) -> Result<TransformedDataset> {
        let out = artifact.apply(dataset)?;
        debug!(rows = out.n_rows(), provenance = %out.provenance, "Applied transform");
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Label;
    use crate::schema::SchemaVersion;
    use crate::split::{SplitConfig, Splitter};

    fn schema() -> Schema {
        Schema::new(SchemaVersion(1))
            .with_column("num", ColumnType::Integer, true)
            .with_column("cat", ColumnType::Categorical, true)
            .with_target("Result")
    }

    fn dataset(n: usize) -> Dataset {
        let num: Vec<Value> = (0..n)
            .map(|i| if i % 5 == 0 { Value::Null } else { Value::Int(i as i64 % 3 - 1) })
            .collect();
        let cat: Vec<Value> = (0..n)
            .map(|i| match i % 4 {
                0 => Value::Null,
                1 => Value::from("a"),
                _ => Value::from("b"),
            })
            .collect();
        let labels = (0..n)
            .map(|i| if i % 2 == 0 { Label::Malicious } else { Label::Safe })
            .collect();
        Dataset::from_columns(
            vec!["num".to_string(), "cat".to_string()],
            vec![num, cat],
            Some(labels),
            SchemaVersion(1),
            "test",
        )
        .unwrap()
    }

    fn split(n: usize) -> (Dataset, Dataset) {
        Splitter::new(SplitConfig::default()).unwrap().split(&dataset(n)).unwrap()
    }

    #[test]
    fn test_fit_apply_removes_missing_values() {
        let (train, test) = split(50);
        let artifact = TransformPipeline::default().fit(&train, &schema()).unwrap();

        let out_train = artifact.apply(&train).unwrap();
        let out_test = artifact.apply(&test).unwrap();

        assert!(!out_train.has_missing());
        assert!(!out_test.has_missing());
        assert_eq!(out_test.features.ncols(), 2);
        assert_eq!(out_test.labels.as_ref().unwrap().len(), test.n_rows());
    }

    #[test]
    fn test_apply_is_deterministic() {
        let (train, _) = split(40);
        let artifact = TransformPipeline::default().fit(&train, &schema()).unwrap();
        let a = artifact.apply(&train).unwrap();
        let b = artifact.apply(&train).unwrap();
        assert_eq!(a.features, b.features);
    }

    #[test]
    fn test_leakage_guard() {
        let (_, test) = split(30);
        let pipeline = TransformPipeline::default();

        let err = pipeline.fit(&test, &schema()).unwrap_err();
        assert!(matches!(
            err,
            SentinelError::LeakageGuardViolation {
                provenance: Provenance::TestSplit { .. }
            }
        ));
        assert!(matches!(
            pipeline.fit(&dataset(30), &schema()),
            Err(SentinelError::LeakageGuardViolation { provenance: Provenance::Raw })
        ));
    }

    #[test]
    fn test_test_rows_never_reach_fit() {
        let splitter = Splitter::new(SplitConfig::default()).unwrap();
        let (_, test) = splitter.split(&dataset(40)).unwrap();

        assert!(matches!(
            splitter.split(&test),
            Err(SentinelError::LeakageGuardViolation {
                provenance: Provenance::TestSplit { .. }
            })
        ));
        let retagged = test.with_schema_version(SchemaVersion(2));
        assert!(matches!(
            TransformPipeline::default().fit(&retagged, &schema()),
            Err(SentinelError::LeakageGuardViolation {
                provenance: Provenance::TestSplit { .. }
            })
        ));
    }

    #[test]
    fn test_rejects_mismatched_columns() {
        let (train, _) = split(30);
        let artifact = TransformPipeline::default().fit(&train, &schema()).unwrap();
        let other = Dataset::from_columns(
            vec!["num".to_string()],
            vec![vec![Value::Int(1)]],
            None,
            SchemaVersion(1),
            "test",
        )
        .unwrap();
        assert!(matches!(artifact.apply(&other), Err(SentinelError::TransformError(_))));
    }

    #[test]
    fn test_artifact_survives_serialization() {
        let (train, test) = split(30);
        let artifact = TransformPipeline::default().fit(&train, &schema()).unwrap();
        let bytes = bincode::serialize(&artifact).unwrap();
        let restored: TransformArtifact = bincode::deserialize(&bytes).unwrap();
        assert_eq!(
            restored.apply(&test).unwrap().features,
            artifact.apply(&test).unwrap().features
        );
    }
}
