//! Pipeline configuration

use crate::drift::DriftConfig;
use crate::error::{Result, SentinelError};
use crate::export::VersionTag;
use crate::preprocessing::TransformConfig;
use crate::selection::SelectionConfig;
use crate::split::SplitConfig;
use crate::training::SearchConfig;
use crate::validation::ValidatorConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// When a freshly selected bundle may replace the deployed one
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum PromotionPolicy {
    /// Passing the selector's `min_f1` is enough
    AbsoluteBar,
    /// F1 must be at least the deployed bundle's F1 on the same test split
    #[default]
    NotWorseThanDeployed,
    /// F1 must exceed the deployed bundle's F1 by at least `min_improvement`
    BeatDeployed { min_improvement: f64 },
}

impl PromotionPolicy {
    pub fn validate(&self) -> Result<()> {
        if let PromotionPolicy::BeatDeployed { min_improvement } = *self {
            if !(0.0..=1.0).contains(&min_improvement) {
                return Err(SentinelError::invalid_parameter(
                    "promotion.min_improvement",
                    min_improvement,
                    "must be in [0, 1]",
                ));
            }
        }
        Ok(())
    }

    /// Check `candidate_f1` against the deployed bundle, if there is one
    pub fn check(&self, candidate_f1: f64, deployed: Option<(VersionTag, f64)>) -> Result<()> {
        let Some((tag, deployed_f1)) = deployed else {
            return Ok(());
        };
        let admitted = match *self {
            PromotionPolicy::AbsoluteBar => true,
            PromotionPolicy::NotWorseThanDeployed => candidate_f1 >= deployed_f1,
            PromotionPolicy::BeatDeployed { min_improvement } => {
                candidate_f1 > deployed_f1 && candidate_f1 - deployed_f1 >= min_improvement
            }
        };
        if admitted {
            Ok(())
        } else {
            Err(SentinelError::PromotionRejected {
                candidate_f1,
                deployed_f1,
                deployed_tag: tag.to_string(),
            })
        }
    }
}

/// Everything a training run needs besides its data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Label column in CSV exports
    pub target_column: String,
    /// Label value that marks a malicious URL
    pub malicious_value: i64,
    pub split: SplitConfig,
    pub drift: DriftConfig,
    pub validation: ValidatorConfig,
    pub transform: TransformConfig,
    pub search: SearchConfig,
    pub selection: SelectionConfig,
    pub promotion: PromotionPolicy,
    /// Root for per-run validation reports and the run log
    pub artifact_dir: PathBuf,
    /// Root of the local artifact store
    pub model_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target_column: crate::schema::TARGET_COLUMN.to_string(),
            malicious_value: -1,
            split: SplitConfig::default(),
            drift: DriftConfig::default(),
            validation: ValidatorConfig::default(),
            transform: TransformConfig::default(),
            search: SearchConfig::default(),
            selection: SelectionConfig::default(),
            promotion: PromotionPolicy::default(),
            artifact_dir: PathBuf::from("Artifacts"),
            model_dir: PathBuf::from("saved_models"),
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_split(mut self, split: SplitConfig) -> Self {
        self.split = split;
        self
    }

    pub fn with_drift(mut self, drift: DriftConfig) -> Self {
        self.drift = drift;
        self
    }

    pub fn with_validation(mut self, validation: ValidatorConfig) -> Self {
        self.validation = validation;
        self
    }

    pub fn with_transform(mut self, transform: TransformConfig) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_search(mut self, search: SearchConfig) -> Self {
        self.search = search;
        self
    }

    pub fn with_selection(mut self, selection: SelectionConfig) -> Self {
        self.selection = selection;
        self
    }

    pub fn with_promotion(mut self, promotion: PromotionPolicy) -> Self {
        self.promotion = promotion;
        self
    }

    pub fn with_artifact_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifact_dir = dir.into();
        self
    }

    pub fn with_model_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.model_dir = dir.into();
        self
    }

    /// Load and validate a JSON config; missing sections take defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let config: PipelineConfig = serde_json::from_str(&content).map_err(|e| {
            SentinelError::ConfigError(format!("{}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.target_column.trim().is_empty() {
            return Err(SentinelError::ConfigError(
                "target_column must not be empty".to_string(),
            ));
        }
        self.split.validate()?;
        self.drift.validate()?;
        self.transform.validate()?;
        self.search.validate()?;
        self.selection.validate()?;
        self.promotion.validate()
    }

    /// `<artifact_dir>/<timestamp>/data_validation/drift_report/report.json`
    pub fn report_path(&self, at: DateTime<Utc>) -> PathBuf {
        self.artifact_dir
            .join(at.format("%m_%d_%Y_%H_%M_%S").to_string())
            .join("data_validation")
            .join("drift_report")
            .join("report.json")
    }

    /// Append-only run log
    pub fn runs_log_path(&self) -> PathBuf {
        self.artifact_dir.join("runs.jsonl")
    }
}
