use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use url_sentinel::preprocessing::{TransformPipeline, TransformedDataset};
use url_sentinel::schema::Schema;
use url_sentinel::split::{SplitConfig, Splitter};
use url_sentinel::synthetic::url_feature_dataset;
use url_sentinel::training::{Catalog, SearchEngine};

fn prepare(n_rows: usize) -> (TransformedDataset, TransformedDataset) {
    let ds = url_feature_dataset(n_rows, 42, 0.02).unwrap();
    let (train, test) = Splitter::new(SplitConfig::default()).unwrap().split(&ds).unwrap();
    let artifact = TransformPipeline::default()
        .fit(&train, &Schema::url_features())
        .unwrap();
    (artifact.apply(&train).unwrap(), artifact.apply(&test).unwrap())
}

fn bench_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("search");
    group.sample_size(10); // Every iteration fits the whole catalog

    let catalog = Catalog::default();
    for n_rows in [500, 2000].iter() {
        let (train, test) = prepare(*n_rows);

        for workers in [1, 4] {
            group.bench_with_input(
                BenchmarkId::new(format!("workers_{}", workers), n_rows),
                &(&train, &test),
                |b, (train, test)| {
                    let engine = SearchEngine::new(42, Some(workers));
                    b.iter(|| engine.search(black_box(train), black_box(test), &catalog).unwrap())
                },
            );
        }
    }

    group.finish();
}

fn bench_transform(c: &mut Criterion) {
    let mut group = c.benchmark_group("transform");

    for missing_rate in [0.0, 0.1].iter() {
        let ds = url_feature_dataset(2000, 7, *missing_rate).unwrap();
        let (train, test) = Splitter::new(SplitConfig::default()).unwrap().split(&ds).unwrap();
        let artifact = TransformPipeline::default()
            .fit(&train, &Schema::url_features())
            .unwrap();

        group.bench_with_input(
            BenchmarkId::new("apply", missing_rate),
            &test,
            |b, test| b.iter(|| artifact.apply(black_box(test)).unwrap()),
        );
    }

    group.finish();
}

criterion_group!(benches, bench_search, bench_transform);
criterion_main!(benches);
