use criterion::{BatchSize, BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use paddock::core::config::Config;
use paddock::query::engine::Collection;
use rand::Rng;
use serde_json::{Value, json};
use std::time::Duration;
use tempfile::TempDir;

/// Small blocks keep the bench collections compact on disk.
fn bench_config() -> Config {
    Config {
        block_size: 512,
        map_size: 512 * 4096,
        flush_interval: Duration::from_secs(3600),
        ..Config::default()
    }
}

/// Helper to create test documents
fn create_test_document(id: u64) -> Value {
    let mut rng = rand::thread_rng();
    json!({
        "title": format!("Document {}", id),
        "category": format!("category_{}", id % 10),
        "score": rng.gen_range(0.0..100.0),
    })
}

fn temp_collection() -> (TempDir, Collection) {
    let dir = TempDir::new().unwrap();
    let collection = Collection::open(dir.path().join("bench.db"), bench_config()).unwrap();
    (dir, collection)
}

/// Benchmark single document insertion through the journal queue
fn bench_single_insert(c: &mut Criterion) {
    let (_dir, mut collection) = temp_collection();

    c.bench_function("single_document_insert", |b| {
        let mut id = 0u64;
        b.iter(|| {
            collection.insert(create_test_document(id)).unwrap();
            id += 1;
        });
    });
}

/// Benchmark write-through batch insertion into a fresh collection
fn bench_batch_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_insert");

    for batch_size in [10u64, 100, 500].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(batch_size),
            batch_size,
            |b, &batch_size| {
                b.iter_batched(
                    || {
                        let batch: Vec<Value> =
                            (0..batch_size).map(create_test_document).collect();
                        (temp_collection(), Value::Array(batch))
                    },
                    |((_dir, mut collection), batch)| {
                        collection.insert(batch).unwrap();
                        collection.flush().unwrap();
                    },
                    BatchSize::SmallInput,
                );
            },
        );
    }
    group.finish();
}

/// Benchmark query resolution over a populated collection, scanning
/// first and then through a field index
fn bench_find(c: &mut Criterion) {
    let (_dir, mut collection) = temp_collection();
    for chunk in 0..10u64 {
        let batch: Vec<Value> = (chunk * 100..(chunk + 1) * 100)
            .map(create_test_document)
            .collect();
        collection.insert(Value::Array(batch)).unwrap();
    }
    collection.flush().unwrap();
    let query = json!({"category": "category_5"}).as_object().unwrap().clone();

    let mut group = c.benchmark_group("find");
    group.bench_function("window_scan", |b| {
        b.iter(|| {
            let docs = collection.find(black_box(&query), None).unwrap();
            black_box(docs);
        });
    });

    collection.create_index(&["category"]).unwrap();
    group.bench_function("indexed", |b| {
        b.iter(|| {
            let docs = collection.find(black_box(&query), None).unwrap();
            black_box(docs);
        });
    });

    group.bench_function("indexed_find_one", |b| {
        b.iter(|| {
            let doc = collection.find_one(black_box(&query), None).unwrap();
            black_box(doc);
        });
    });
    group.finish();
}

/// Benchmark patching documents resolved through a field index
fn bench_update(c: &mut Criterion) {
    let (_dir, mut collection) = temp_collection();
    let batch: Vec<Value> = (0..500u64).map(create_test_document).collect();
    collection.insert(Value::Array(batch)).unwrap();
    collection.create_index(&["title"]).unwrap();

    c.bench_function("indexed_update_one", |b| {
        let mut tick = 0u64;
        b.iter(|| {
            let query = json!({"title": format!("Document {}", tick % 500)});
            let patch = json!({"score": tick});
            tick += 1;
            collection
                .update_one(query.as_object().unwrap(), patch.as_object().unwrap())
                .unwrap();
        });
    });
}

criterion_group!(
    benches,
    bench_single_insert,
    bench_batch_insert,
    bench_find,
    bench_update
);
criterion_main!(benches);
