//! Training run orchestration
//!
//! One run is strictly sequential: validate, split, fit the transform,
//! search, select, check promotion, persist. Every run emits a single
//! [`RunRecord`], whether it promoted a bundle or not.

mod config;

pub use config::{PipelineConfig, PromotionPolicy};

use crate::data::{Dataset, RecordSource};
use crate::error::{Result, SentinelError};
use crate::export::{ArtifactStore, ArtifactUri, VersionSelector, VersionTag};
use crate::preprocessing::TransformPipeline;
use crate::schema::Schema;
use crate::selection::{SelectedModel, Selector};
use crate::split::Splitter;
use crate::tracking::{MetricsSink, RunRecord, RunStatus};
use crate::training::{ModelCandidate, SearchEngine};
use crate::utils::Timer;
use crate::validation::{DataValidator, ValidationReport};
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, info_span, warn};
use uuid::Uuid;

/// Result of a promoted run
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: String,
    pub version: VersionTag,
    pub uri: ArtifactUri,
    pub selected: SelectedModel,
    pub report: ValidationReport,
    /// Deployed version the bundle was compared against
    pub previous: Option<VersionTag>,
    pub n_candidates: usize,
    pub n_failed: usize,
}

/// Runs the full training sequence against one artifact store
pub struct TrainingPipeline {
    config: PipelineConfig,
    schema: Schema,
    store: Arc<dyn ArtifactStore>,
    sink: Option<Arc<dyn MetricsSink>>,
    write_reports: bool,
}

impl TrainingPipeline {
    pub fn new(config: PipelineConfig, store: Arc<dyn ArtifactStore>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            schema: Schema::url_features(),
            store,
            sink: None,
            write_reports: false,
        })
    }

    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = schema;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Write each run's validation report under `config.artifact_dir`
    pub fn with_report_files(mut self) -> Self {
        self.write_reports = true;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Fetch a snapshot from `source` and run on it
    pub fn run_from_source(
        &self,
        source: &dyn RecordSource,
        reference: &Dataset,
    ) -> Result<RunOutcome> {
        let snapshot = source.fetch()?;
        info!(
            rows = snapshot.dataset.n_rows(),
            schema_version = snapshot.schema_version.0,
            source = snapshot.dataset.source(),
            "Fetched snapshot"
        );
        self.run(&snapshot.dataset, reference)
    }

    /// Train on `dataset`, using `reference` as the drift baseline.
    ///
    /// Nothing is written to the store unless every stage succeeds and the
    /// promotion policy admits the new bundle.
    pub fn run(&self, dataset: &Dataset, reference: &Dataset) -> Result<RunOutcome> {
        let run_id = Uuid::new_v4().to_string();
        let span = info_span!("training_run", run_id = %run_id);
        let _enter = span.enter();

        let mut record = RunRecord::new(run_id.as_str())
            .with("started_at", Utc::now())
            .with("rows", dataset.n_rows())
            .with("source", dataset.source());
        let mut timer = Timer::start(run_id.as_str());

        let result = self.execute(&run_id, dataset, reference, &mut record, &mut timer);

        let stage_millis: BTreeMap<&str, u64> = timer
            .stages()
            .iter()
            .map(|(name, d)| (name.as_str(), d.as_millis() as u64))
            .collect();
        record.insert("stage_millis", stage_millis);
        record.insert("elapsed_ms", timer.elapsed().as_millis() as u64);

        match &result {
            Ok(outcome) => {
                record.insert("status", RunStatus::Promoted);
                record.insert("version", outcome.version.to_string());
                record.insert("uri", outcome.uri.to_string());
                info!(version = %outcome.version, uri = %outcome.uri, "Run promoted");
            }
            Err(e) => {
                let status = match e {
                    SentinelError::SchemaViolation(_)
                    | SentinelError::DriftDetected(_)
                    | SentinelError::NoViableCandidate { .. }
                    | SentinelError::PromotionRejected { .. } => RunStatus::Rejected,
                    _ => RunStatus::Failed,
                };
                record.insert("status", status);
                record.insert("error_kind", e.kind());
                record.insert("error", e.to_string());
                info!(status = ?status, error = %e, "Run did not promote");
            }
        }

        if let Some(sink) = &self.sink {
            if let Err(e) = sink.emit(&record) {
                warn!(error = %e, "Failed to emit run record");
            }
        }
        result
    }

    fn execute(
        &self,
        run_id: &str,
        dataset: &Dataset,
        reference: &Dataset,
        record: &mut RunRecord,
        timer: &mut Timer,
    ) -> Result<RunOutcome> {
        // Validate
        let validator =
            DataValidator::new(self.config.validation.clone(), self.config.drift.clone())?;
        let (accepted, report) = validator.run(dataset, &self.schema, reference);
        record.insert("validation_report", &report);
        if self.write_reports {
            let path = self.config.report_path(report.created_at);
            report.write_json(&path)?;
            record.insert("report_path", path.display().to_string());
        }
        timer.checkpoint("validate");
        if !accepted {
            return Err(report.into_error());
        }

        // Split and transform
        let (train, test) = Splitter::new(self.config.split.clone())?.split(dataset)?;
        timer.checkpoint("split");

        let transform = TransformPipeline::new(self.config.transform.clone())?
            .fit(&train, &self.schema)?;
        let train_x = transform.apply(&train)?;
        let test_x = transform.apply(&test)?;
        timer.checkpoint("transform");

        // Search and select
        let candidates = SearchEngine::from_config(&self.config.search).search(
            &train_x,
            &test_x,
            &self.config.search.catalog,
        )?;
        let n_candidates = candidates.len();
        let n_failed = candidates.iter().filter(|c| c.is_failed()).count();
        record.insert(
            "candidates",
            candidates.iter().map(ModelCandidate::summary).collect::<Vec<_>>(),
        );
        timer.checkpoint("search");

        let selected = Selector::new(self.config.selection.clone())?.select(candidates, transform)?;
        record.insert(
            "selected",
            serde_json::json!({
                "ordinal": selected.ordinal,
                "family": selected.family(),
                "params": selected.params,
                "test_metrics": selected.test_metrics,
                "train_metrics": selected.train_metrics,
            }),
        );
        timer.checkpoint("select");

        // Promote
        let deployed = self.deployed_baseline(&test)?;
        if let Some((tag, f1)) = deployed {
            record.insert("deployed", serde_json::json!({ "version": tag.to_string(), "f1": f1 }));
        }
        self.config
            .promotion
            .check(selected.test_metrics.f1, deployed)?;

        let version = self.store.next_tag()?;
        let uri = self.store.put(&selected, version)?;
        timer.checkpoint("persist");

        info!(
            run_id,
            family = %selected.family(),
            f1 = selected.test_metrics.f1,
            recall = selected.test_metrics.recall,
            "Selected model"
        );

        Ok(RunOutcome {
            run_id: run_id.to_string(),
            version,
            uri,
            selected,
            report,
            previous: deployed.map(|(tag, _)| tag),
            n_candidates,
            n_failed,
        })
    }

    /// Latest deployed bundle re-scored on this run's test split
    fn deployed_baseline(&self, test: &Dataset) -> Result<Option<(VersionTag, f64)>> {
        let Some(tag) = self.store.latest_tag()? else {
            return Ok(None);
        };
        let deployed = self.store.get(VersionSelector::Tag(tag))?;
        let metrics = deployed.score(test)?;
        info!(version = %tag, f1 = metrics.f1, "Scored deployed bundle");
        Ok(Some((tag, metrics.f1)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::InMemoryArtifactStore;
    use crate::synthetic::url_feature_dataset;
    use crate::tracking::MemorySink;
    use crate::training::{Catalog, FamilyGrid, LogisticRegressionGrid, SearchConfig};

    fn quick_config() -> PipelineConfig {
        let catalog =
            Catalog::new(vec![FamilyGrid::LogisticRegression(LogisticRegressionGrid::default())])
                .unwrap();
        PipelineConfig::default().with_search(SearchConfig::default().with_catalog(catalog))
    }

    #[test]
    fn test_run_promotes_and_records() {
        let data = url_feature_dataset(300, 1, 0.0).unwrap();
        let store = Arc::new(InMemoryArtifactStore::new());
        let sink = Arc::new(MemorySink::new());
        let pipeline = TrainingPipeline::new(quick_config(), store.clone())
            .unwrap()
            .with_sink(sink.clone());

        let outcome = pipeline.run(&data, &data).unwrap();
        assert_eq!(outcome.version, VersionTag(1));
        assert_eq!(outcome.previous, None);
        assert_eq!(store.latest_tag().unwrap(), Some(VersionTag(1)));

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status(), Some(RunStatus::Promoted));
        assert!(records[0].get("validation_report").is_some());
        assert_eq!(records[0].get("candidates").unwrap().as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_identical_rerun_is_not_worse() {
        let data = url_feature_dataset(300, 2, 0.0).unwrap();
        let store = Arc::new(InMemoryArtifactStore::new());
        let pipeline = TrainingPipeline::new(quick_config(), store.clone()).unwrap();

        let first = pipeline.run(&data, &data).unwrap();
        let second = pipeline.run(&data, &data).unwrap();
        assert_eq!(second.previous, Some(first.version));
        assert_eq!(second.version, VersionTag(2));
        assert_eq!(first.selected.test_metrics, second.selected.test_metrics);
    }

    #[test]
    fn test_beat_deployed_rejects_equal_model() {
        let data = url_feature_dataset(300, 3, 0.0).unwrap();
        let store = Arc::new(InMemoryArtifactStore::new());
        let sink = Arc::new(MemorySink::new());
        let config = quick_config().with_promotion(PromotionPolicy::BeatDeployed {
            min_improvement: 0.0,
        });
        let pipeline = TrainingPipeline::new(config, store.clone())
            .unwrap()
            .with_sink(sink.clone());

        pipeline.run(&data, &data).unwrap();
        let err = pipeline.run(&data, &data).unwrap_err();
        assert!(matches!(err, SentinelError::PromotionRejected { .. }));
        assert_eq!(store.list_tags().unwrap(), vec![VersionTag(1)]);
        assert_eq!(sink.records()[1].status(), Some(RunStatus::Rejected));
    }

    #[test]
    fn test_report_file_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let data = url_feature_dataset(200, 4, 0.0).unwrap();
        let config = quick_config().with_artifact_dir(dir.path());
        let pipeline = TrainingPipeline::new(config, Arc::new(InMemoryArtifactStore::new()))
            .unwrap()
            .with_report_files();

        let outcome = pipeline.run(&data, &data).unwrap();
        let path = pipeline.config().report_path(outcome.report.created_at);
        assert!(path.exists());
        assert!(path.ends_with("data_validation/drift_report/report.json"));
    }
}
