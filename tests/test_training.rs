//! Integration tests for splitting, transform fitting, model families,
//! search and selection

use std::sync::Arc;
use std::thread;

use url_sentinel::data::{Label, Provenance};
use url_sentinel::error::SentinelError;
use url_sentinel::preprocessing::{TransformPipeline, TransformedDataset};
use url_sentinel::schema::Schema;
use url_sentinel::selection::{SelectionConfig, Selector};
use url_sentinel::split::{SplitConfig, Splitter};
use url_sentinel::synthetic::url_feature_dataset;
use url_sentinel::training::{
    AdaBoostParams, Catalog, DecisionTreeGrid, DecisionTreeParams, FamilyGrid,
    GradientBoostingParams, HyperParams, LogisticRegressionParams, ModelFamily,
    RandomForestParams, SearchEngine,
};

fn transformed(n: usize, seed: u64, missing_rate: f64) -> (TransformedDataset, TransformedDataset) {
    let ds = url_feature_dataset(n, seed, missing_rate).unwrap();
    let (train, test) = Splitter::new(SplitConfig::default()).unwrap().split(&ds).unwrap();
    let artifact = TransformPipeline::default()
        .fit(&train, &Schema::url_features())
        .unwrap();
    (artifact.apply(&train).unwrap(), artifact.apply(&test).unwrap())
}

// ============================================================================
// Split and transform
// ============================================================================

#[test]
fn test_split_is_deterministic_and_disjoint() {
    let ds = url_feature_dataset(500, 11, 0.0).unwrap();
    let splitter = Splitter::new(SplitConfig::default()).unwrap();

    let a = splitter.split_indices(ds.labels().unwrap()).unwrap();
    let b = splitter.split_indices(ds.labels().unwrap()).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.train.len(), 400);
    assert_eq!(a.test.len(), 100);

    let mut all: Vec<usize> = a.train.iter().chain(a.test.iter()).copied().collect();
    all.sort_unstable();
    assert_eq!(all, (0..500).collect::<Vec<_>>());
}

#[test]
fn test_stratified_split_keeps_label_mix() {
    let ds = url_feature_dataset(400, 12, 0.0).unwrap();
    let config = SplitConfig {
        stratify: true,
        ..Default::default()
    };
    let (train, test) = Splitter::new(config).unwrap().split(&ds).unwrap();

    let malicious = |labels: &[Label]| labels.iter().filter(|l| **l == Label::Malicious).count();
    assert_eq!(malicious(train.labels().unwrap()), 160);
    assert_eq!(malicious(test.labels().unwrap()), 40);
}

#[test]
fn test_transform_only_fits_on_train_split() {
    let ds = url_feature_dataset(200, 13, 0.1).unwrap();
    let (train, test) = Splitter::new(SplitConfig::default()).unwrap().split(&ds).unwrap();
    let pipeline = TransformPipeline::default();
    let schema = Schema::url_features();

    assert!(matches!(
        pipeline.fit(&test, &schema),
        Err(SentinelError::LeakageGuardViolation {
            provenance: Provenance::TestSplit { .. }
        })
    ));
    assert!(matches!(
        pipeline.fit(&ds, &schema),
        Err(SentinelError::LeakageGuardViolation { .. })
    ));

    let artifact = pipeline.fit(&train, &schema).unwrap();
    let once = artifact.apply(&test).unwrap();
    let twice = artifact.apply(&test).unwrap();
    assert_eq!(once.features, twice.features);
    assert!(!once.has_missing());
}

// ============================================================================
// Model families
// ============================================================================

#[test]
fn test_every_family_learns_synthetic_urls() {
    let (train, test) = transformed(600, 21, 0.0);
    let y_train = train.labels.as_ref().unwrap();
    let y_test = test.labels.as_ref().unwrap();

    let params = [
        HyperParams::LogisticRegression(LogisticRegressionParams::default()),
        HyperParams::DecisionTree(DecisionTreeParams {
            max_depth: Some(6),
            ..Default::default()
        }),
        HyperParams::AdaBoost(AdaBoostParams::default()),
        HyperParams::RandomForest(RandomForestParams {
            n_estimators: 32,
            ..Default::default()
        }),
        HyperParams::GradientBoosting(GradientBoostingParams::default()),
    ];

    for p in params {
        let model = p.fit(&train.features, y_train, 42).unwrap();
        assert_eq!(model.family(), p.family());
        let metrics = model.score(&test.features, y_test).unwrap();
        assert!(metrics.f1 >= 0.75, "{} scored F1 {:.3}", p, metrics.f1);
    }
}

#[test]
fn test_logistic_regression_separates_classes() {
    let (train, test) = transformed(1000, 42, 0.0);
    let model = HyperParams::LogisticRegression(LogisticRegressionParams::default())
        .fit(&train.features, train.labels.as_ref().unwrap(), 0)
        .unwrap();
    let metrics = model.score(&test.features, test.labels.as_ref().unwrap()).unwrap();
    assert!(metrics.f1 >= 0.9, "F1 {:.3}", metrics.f1);
}

#[test]
fn test_fits_with_imputed_values() {
    let (train, test) = transformed(400, 22, 0.15);
    assert!(!train.has_missing());
    let model = HyperParams::RandomForest(RandomForestParams {
        n_estimators: 16,
        ..Default::default()
    })
    .fit(&train.features, train.labels.as_ref().unwrap(), 1)
    .unwrap();
    let proba = model.predict_proba(&test.features).unwrap();
    assert!(proba.iter().all(|p| (0.0..=1.0).contains(p)));
}

// ============================================================================
// Search and selection
// ============================================================================

#[test]
fn test_search_is_reproducible() {
    let (train, test) = transformed(300, 31, 0.0);
    let catalog = Catalog::default();

    let a = SearchEngine::new(42, Some(2)).search(&train, &test, &catalog).unwrap();
    let b = SearchEngine::new(42, Some(4)).search(&train, &test, &catalog).unwrap();

    assert_eq!(a.len(), catalog.len());
    for (x, y) in a.iter().zip(b.iter()) {
        assert_eq!(x.ordinal, y.ordinal);
        assert_eq!(x.params, y.params);
        assert_eq!(x.test_metrics, y.test_metrics);
    }
}

#[test]
fn test_search_then_select() {
    let ds = url_feature_dataset(500, 32, 0.0).unwrap();
    let (train, test) = Splitter::new(SplitConfig::default()).unwrap().split(&ds).unwrap();
    let artifact = TransformPipeline::default()
        .fit(&train, &Schema::url_features())
        .unwrap();
    let (train_x, test_x) = (artifact.apply(&train).unwrap(), artifact.apply(&test).unwrap());

    let candidates = SearchEngine::default()
        .search(&train_x, &test_x, &Catalog::default())
        .unwrap();
    let best_f1 = candidates
        .iter()
        .filter_map(|c| c.f1())
        .fold(0.0_f64, f64::max);

    let selected = Selector::default().select(candidates, artifact).unwrap();
    assert_eq!(selected.test_metrics.f1, best_f1);

    // The bundle predicts straight from raw records
    let predictions = selected.predict(&test.without_labels()).unwrap();
    assert_eq!(predictions.len(), test.n_rows());
}

#[test]
fn test_selected_bundle_is_shared_across_threads() {
    let ds = url_feature_dataset(300, 34, 0.1).unwrap();
    let (train, test) = Splitter::new(SplitConfig::default()).unwrap().split(&ds).unwrap();
    let artifact = TransformPipeline::default()
        .fit(&train, &Schema::url_features())
        .unwrap();
    let (train_x, test_x) = (artifact.apply(&train).unwrap(), artifact.apply(&test).unwrap());
    let candidates = SearchEngine::default()
        .search(&train_x, &test_x, &Catalog::default())
        .unwrap();
    let selected = Arc::new(Selector::default().select(candidates, artifact).unwrap());

    let raw = test.without_labels();
    let expected_features = selected.transform.apply(&raw).unwrap().features;
    let expected = selected.predict(&raw).unwrap();

    thread::scope(|scope| {
        let workers: Vec<_> = (0..4)
            .map(|_| {
                let selected = Arc::clone(&selected);
                let raw = &raw;
                scope.spawn(move || {
                    let features = selected.transform.apply(raw).unwrap().features;
                    (features, selected.predict(raw).unwrap())
                })
            })
            .collect();
        for worker in workers {
            let (features, predictions) = worker.join().unwrap();
            assert_eq!(features, expected_features);
            assert_eq!(predictions, expected);
        }
    });
}

#[test]
fn test_all_failing_grid_is_no_viable_candidate() {
    let (train, test) = transformed(100, 33, 0.0);
    let catalog = Catalog::new(vec![FamilyGrid::DecisionTree(DecisionTreeGrid {
        min_samples_split: vec![100_000, 200_000],
        ..Default::default()
    })])
    .unwrap();

    let candidates = SearchEngine::default().search(&train, &test, &catalog).unwrap();
    assert!(candidates.iter().all(|c| c.is_failed()));
    assert!(candidates.iter().all(|c| c.family() == ModelFamily::DecisionTree));

    let artifact = {
        let ds = url_feature_dataset(100, 33, 0.0).unwrap();
        let (tr, _) = Splitter::new(SplitConfig::default()).unwrap().split(&ds).unwrap();
        TransformPipeline::default().fit(&tr, &Schema::url_features()).unwrap()
    };
    let err = Selector::new(SelectionConfig::default())
        .unwrap()
        .select(candidates, artifact)
        .unwrap_err();
    assert!(matches!(
        err,
        SentinelError::NoViableCandidate { failed: 2, evaluated: 0, best_f1: None, .. }
    ));
}
