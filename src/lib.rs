//! URL Sentinel - retrainable malicious-URL classification
//!
//! This crate implements the offline training side of a phishing URL
//! classifier:
//! - Schema validation and KS drift detection against a reference snapshot
//! - A seeded, leak-free train/test split
//! - KNN imputation fitted on the training split only
//! - A parallel search over five classifier families
//! - Selection by F1 and versioned promotion of the winning bundle
//!
//! # Modules
//!
//! ## Data
//! - [`data`] - Records, datasets and record sources
//! - [`schema`] - Versioned column contracts
//! - [`synthetic`] - Synthetic URL feature datasets
//!
//! ## Validation
//! - [`drift`] - Two-sample drift tests
//! - [`validation`] - The accept/reject gate
//!
//! ## Training
//! - [`split`] - Train/test partitioning
//! - [`imputation`] - KNN imputation
//! - [`preprocessing`] - Transform fitting and application
//! - [`training`] - Classifiers, grids and the search engine
//! - [`selection`] - Candidate ranking
//!
//! ## Operations
//! - [`export`] - Versioned artifact stores
//! - [`tracking`] - Per-run records
//! - [`pipeline`] - End-to-end training runs
//! - [`cli`] - Command-line interface

// Core error handling
pub mod error;

// Data
pub mod data;
pub mod schema;
pub mod synthetic;

// Validation
pub mod drift;
pub mod validation;

// Training
pub mod split;
pub mod imputation;
pub mod preprocessing;
pub mod training;
pub mod selection;

// Operations
pub mod export;
pub mod tracking;
pub mod pipeline;
pub mod cli;

// Utilities
pub mod utils;

pub use error::{Result, SentinelError};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{Result, SentinelError};

    // Data
    pub use crate::data::{
        CsvRecordSource, Dataset, InMemorySource, Label, Provenance, Record, RecordSource, Value,
    };
    pub use crate::schema::{ColumnType, Schema, SchemaVersion, URL_FEATURES};

    // Validation
    pub use crate::drift::{DriftConfig, DriftDetector, DriftReport};
    pub use crate::validation::{DataValidator, DriftPolicy, ValidationReport, ValidatorConfig};

    // Preprocessing
    pub use crate::preprocessing::{TransformArtifact, TransformConfig, TransformPipeline};
    pub use crate::split::{SplitConfig, Splitter};

    // Training
    pub use crate::training::{
        Catalog, ClassificationMetrics, Classifier, FamilyGrid, FittedModel, HyperParams,
        ModelCandidate, ModelFamily, SearchConfig, SearchEngine,
    };
    pub use crate::selection::{SelectedModel, SelectionConfig, Selector};

    // Artifacts
    pub use crate::export::{
        ArtifactStore, DeployedModel, InMemoryArtifactStore, LocalArtifactStore, VersionSelector,
        VersionTag,
    };

    // Runs
    pub use crate::pipeline::{PipelineConfig, PromotionPolicy, RunOutcome, TrainingPipeline};
    pub use crate::tracking::{JsonLinesSink, MemorySink, MetricsSink, RunRecord};
}
