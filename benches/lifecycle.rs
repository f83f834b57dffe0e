//! Lifecycle benchmarks: build, sync, and query throughput over a
//! synthetic corpus.

use std::time::Duration;

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use deltasearch::{
    Config, DeltaSearch, IndexSpec, OracleConfig, PollPolicy, Record, SearchMode, TableSpec,
    TriggerMode,
};
use tempfile::tempdir;

fn bench_config() -> Config {
    Config {
        oracle: OracleConfig::Hashing { dimension: 128 },
        poll: PollPolicy::new(Duration::from_millis(2), 10_000),
        ..Default::default()
    }
}

fn corpus(n: usize) -> Vec<Record> {
    (0..n)
        .map(|i| {
            Record::new(
                i as i64,
                format!(
                    "note {} about topic {} with some filler words for realistic length",
                    i,
                    i % 17
                ),
            )
        })
        .collect()
}

fn index_spec() -> IndexSpec {
    IndexSpec {
        name: "bench_index".to_string(),
        endpoint: "bench-endpoint".to_string(),
        source_table: "bench_notes".to_string(),
        primary_key: "index".to_string(),
        embedding_source_column: "text".to_string(),
        trigger_mode: TriggerMode::Triggered,
    }
}

fn open_online(path: &std::path::Path, records: &[Record]) -> DeltaSearch {
    let db = DeltaSearch::open(path, bench_config()).unwrap();
    db.create_table(&TableSpec::new("bench_notes", "index", "text"), records)
        .unwrap();
    db.enable_change_tracking("bench_notes").unwrap();
    db.create_endpoint("bench-endpoint").unwrap();
    let index = db.create_index(index_spec()).unwrap();
    index
        .wait_until_online(&PollPolicy::new(Duration::from_millis(2), 10_000))
        .unwrap();
    db
}

fn bench_initial_build(c: &mut Criterion) {
    let records = corpus(500);
    c.bench_function("initial_build_500", |b| {
        b.iter_batched(
            tempdir,
            |dir| {
                let db = open_online(&dir.as_ref().unwrap().path().join("bench.db"), &records);
                db.close().unwrap();
            },
            BatchSize::PerIteration,
        );
    });
}

fn bench_sync_cycle(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let db = open_online(&dir.path().join("bench.db"), &corpus(500));
    let index = db.get_index("bench_index").unwrap();
    let mut next_key: i64 = 1_000;

    c.bench_function("sync_one_upsert", |b| {
        b.iter(|| {
            db.upsert_record("bench_notes", &Record::new(next_key, "freshly written note"))
                .unwrap();
            next_key += 1;
            index.sync().unwrap();
        });
    });
}

fn bench_search(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let db = open_online(&dir.path().join("bench.db"), &corpus(2_000));
    let index = db.get_index("bench_index").unwrap();

    let mut group = c.benchmark_group("search_2000");
    group.bench_function("ann_k5", |b| {
        b.iter(|| index.search("note about topic 7", 5, SearchMode::Ann).unwrap());
    });
    group.bench_function("hybrid_k5", |b| {
        b.iter(|| {
            index
                .search("note about topic 7", 5, SearchMode::Hybrid)
                .unwrap()
        });
    });
    group.finish();
}

criterion_group!(benches, bench_initial_build, bench_sync_cycle, bench_search);
criterion_main!(benches);
