//! End-to-end tests for training runs

use std::sync::Arc;

use url_sentinel::data::{CsvRecordSource, Dataset, Value};
use url_sentinel::error::SentinelError;
use url_sentinel::export::{ArtifactStore, InMemoryArtifactStore, LocalArtifactStore, VersionTag};
use url_sentinel::pipeline::{PipelineConfig, TrainingPipeline};
use url_sentinel::selection::SelectionConfig;
use url_sentinel::split::SplitConfig;
use url_sentinel::synthetic::url_feature_dataset;
use url_sentinel::tracking::{JsonLinesSink, MemorySink, RunStatus};
use url_sentinel::training::{
    Catalog, DecisionTreeGrid, FamilyGrid, LogisticRegressionGrid, RandomForestGrid, SearchConfig,
};

fn shift(ds: &Dataset, column: &str, offset: i64) -> Dataset {
    ds.map_column(column, |v| match v {
        Value::Int(i) => Value::Int(i + offset),
        other => other.clone(),
    })
    .unwrap()
}

fn small_catalog() -> Catalog {
    Catalog::new(vec![
        FamilyGrid::LogisticRegression(LogisticRegressionGrid::default()),
        FamilyGrid::RandomForest(RandomForestGrid {
            n_estimators: vec![8],
            ..Default::default()
        }),
    ])
    .unwrap()
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn test_clean_run_selects_a_strong_model() {
    let data = url_feature_dataset(1000, 42, 0.05).unwrap();
    let config = PipelineConfig::default()
        .with_split(SplitConfig {
            train_ratio: 0.8,
            seed: 42,
            stratify: false,
        })
        .with_selection(SelectionConfig::default().with_min_f1(0.9));
    let store = Arc::new(InMemoryArtifactStore::new());
    let pipeline = TrainingPipeline::new(config, store.clone()).unwrap();

    let outcome = pipeline.run(&data, &data).unwrap();

    assert!(outcome.selected.test_metrics.f1 >= 0.9);
    assert_eq!(outcome.n_candidates, Catalog::default().len());
    assert_eq!(outcome.version, VersionTag(1));
    assert_eq!(store.latest_tag().unwrap(), Some(VersionTag(1)));

    let applied = outcome.selected.transform.apply(&data).unwrap();
    assert!(!applied.has_missing());
}

#[test]
fn test_drifted_column_blocks_promotion() {
    let reference = url_feature_dataset(1000, 42, 0.0).unwrap();
    let store = Arc::new(InMemoryArtifactStore::new());
    let sink = Arc::new(MemorySink::new());
    let config = PipelineConfig::default().with_search(SearchConfig::default().with_catalog(small_catalog()));
    let pipeline = TrainingPipeline::new(config, store.clone())
        .unwrap()
        .with_sink(sink.clone());

    pipeline.run(&reference, &reference).unwrap();
    assert_eq!(store.latest_tag().unwrap(), Some(VersionTag(1)));

    let drifted = shift(&reference, "URL_Length", 10);
    let err = pipeline.run(&drifted, &reference).unwrap_err();

    let report = err.report().expect("drift error carries its report");
    assert!(matches!(err, SentinelError::DriftDetected(_)));
    assert_eq!(report.drift.drifted_columns(), vec!["URL_Length".to_string()]);

    assert_eq!(store.latest_tag().unwrap(), Some(VersionTag(1)));
    assert_eq!(store.list_tags().unwrap(), vec![VersionTag(1)]);

    let records = sink.records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[1].status(), Some(RunStatus::Rejected));
    assert_eq!(
        records[1].get("error_kind").and_then(|v| v.as_str()),
        Some("drift_detected")
    );
    assert!(records[1].get("validation_report").is_some());
}

#[test]
fn test_all_failing_grid_persists_nothing() {
    let data = url_feature_dataset(300, 7, 0.0).unwrap();
    let catalog = Catalog::new(vec![FamilyGrid::DecisionTree(DecisionTreeGrid {
        min_samples_split: vec![50_000, 100_000],
        ..Default::default()
    })])
    .unwrap();
    let store = Arc::new(InMemoryArtifactStore::new());
    let sink = Arc::new(MemorySink::new());
    let config = PipelineConfig::default().with_search(SearchConfig::default().with_catalog(catalog));
    let pipeline = TrainingPipeline::new(config, store.clone())
        .unwrap()
        .with_sink(sink.clone());

    let err = pipeline.run(&data, &data).unwrap_err();
    assert!(matches!(
        err,
        SentinelError::NoViableCandidate { failed: 2, evaluated: 0, .. }
    ));
    assert_eq!(store.latest_tag().unwrap(), None);

    let record = &sink.records()[0];
    assert_eq!(record.status(), Some(RunStatus::Rejected));
    let candidates = record.get("candidates").unwrap().as_array().unwrap();
    assert_eq!(candidates.len(), 2);
    assert!(candidates.iter().all(|c| !c["error"].is_null()));
}

// ============================================================================
// Sources, stores and run logs on disk
// ============================================================================

#[test]
fn test_run_from_csv_source_into_local_store() {
    let dir = tempfile::tempdir().unwrap();
    let csv = dir.path().join("Data.csv");
    let data = url_feature_dataset(400, 17, 0.05).unwrap();
    CsvRecordSource::new(&csv).write(&data).unwrap();

    let config = PipelineConfig::default()
        .with_search(SearchConfig::default().with_catalog(small_catalog()))
        .with_artifact_dir(dir.path().join("Artifacts"))
        .with_model_dir(dir.path().join("saved_models"));
    let store = Arc::new(LocalArtifactStore::open(&config.model_dir).unwrap());
    let sink = Arc::new(JsonLinesSink::new(config.runs_log_path()));
    let pipeline = TrainingPipeline::new(config, store.clone())
        .unwrap()
        .with_sink(sink.clone())
        .with_report_files();

    let outcome = pipeline
        .run_from_source(&CsvRecordSource::new(&csv), &data)
        .unwrap();
    assert_eq!(outcome.version, VersionTag(1));
    assert!(pipeline.config().report_path(outcome.report.created_at).exists());

    let runs = sink.read_all().unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].run_id(), Some(outcome.run_id.as_str()));
    assert_eq!(runs[0].status(), Some(RunStatus::Promoted));

    // Same inputs, same seeds: same selection, promoted as the next version
    let again = pipeline
        .run_from_source(&CsvRecordSource::new(&csv), &data)
        .unwrap();
    assert_eq!(again.version, VersionTag(2));
    assert_eq!(again.previous, Some(VersionTag(1)));
    assert_eq!(again.selected.params, outcome.selected.params);
    assert_eq!(again.selected.test_metrics, outcome.selected.test_metrics);
}
