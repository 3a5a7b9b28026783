//! Micro-benchmarks for fstsdb core operations.
//!
//! Uses Criterion for statistically rigorous measurement with regression
//! detection and HTML reports.
//!
//! # Running
//!
//! ```bash
//! cargo bench --bench micro              # run all micro-benchmarks
//! cargo bench --bench micro -- append    # filter by name
//! ```
//!
//! Reports are generated in `target/criterion/report/index.html`.

use criterion::{BatchSize, BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use fstsdb::config::EngineConfig;
use fstsdb::engine::Engine;
use tempfile::TempDir;

const PAYLOAD_128B: &[u8; 128] = &[0xAB; 128];
const PAYLOAD_1K: &[u8; 1024] = &[0xCD; 1024];

fn open_engine(dir: &std::path::Path) -> Engine {
    Engine::open(EngineConfig {
        data_dir: dir.to_path_buf(),
        ..EngineConfig::default()
    })
    .expect("open")
}

/// Appends `count` sequential-timestamp records and closes the series, so
/// R-IDX/IDX/VAL blocks exist on disk.
fn prepopulate(dir: &std::path::Path, table: &str, symbol: &str, count: u64, payload: &[u8]) {
    let engine = open_engine(dir);
    let mut series = engine.open_series(table, symbol).unwrap();
    for t in 0..count {
        series.append(t, payload).unwrap();
    }
    series.close().unwrap();
    engine.close().unwrap();
}

// ================================================================================================
// Append benchmarks
// ================================================================================================

/// Benchmark group for `SeriesHandle::append`.
///
/// # Sub-benchmarks
///
/// ## `sequential/128B` and `sequential/1K`
///
/// **Scenario:** Appends strictly increasing timestamps to a fresh series.
///
/// **What it measures:** The cost of encoding a VAL record, appending it to
/// the tail write cache, and the occasional block roll-over plus IDX/R-IDX
/// maintenance that roll-over triggers.
///
/// **Expected behaviour:** Dominated by the write-cache memcpy in the
/// common case; periodic spikes when a VAL block fills and a new IDX/R-IDX
/// block must be allocated and linked.
fn bench_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("append");

    for &(label, payload) in &[("128B", PAYLOAD_128B.as_slice()), ("1K", PAYLOAD_1K.as_slice())] {
        group.bench_function(BenchmarkId::new("sequential", label), |b| {
            b.iter_batched(
                || {
                    let dir = TempDir::new().unwrap();
                    let engine = open_engine(dir.path());
                    let series = engine.open_series("bench", "AAPL").unwrap();
                    (dir, engine, series, 0u64)
                },
                |(_dir, engine, mut series, mut seq)| {
                    for _ in 0..100 {
                        series.append(black_box(seq), black_box(payload)).unwrap();
                        seq += 1;
                    }
                    series.close().unwrap();
                    engine.close().unwrap();
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

// ================================================================================================
// Query benchmarks
// ================================================================================================

/// Benchmark group for `SeriesHandle::get_last_n` and `get_between`.
///
/// # Sub-benchmarks
///
/// ## `get_last_n/small` and `get_last_n/large`
///
/// **Scenario:** Fetches the most recent 10 records from a series with
/// 1,000 vs. 100,000 prior records, reopened so no state is cached
/// in-process.
///
/// **What it measures:** R-IDX chain walk to the tail plus a short backward
/// VAL scan. Should be close to constant time regardless of series length,
/// since the R-IDX/IDX chain lets resolution skip straight to the tail.
///
/// ## `get_between/narrow_range`
///
/// **Scenario:** Fetches a 100-record window from the middle of a
/// 100,000-record series.
///
/// **What it measures:** R-IDX binary search to locate the starting block,
/// then a forward VAL scan bounded by the range.
fn bench_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("query");

    for &(label, n) in &[("small", 1_000u64), ("large", 100_000u64)] {
        let dir = TempDir::new().unwrap();
        prepopulate(dir.path(), "bench", "AAPL", n, PAYLOAD_128B);
        let engine = open_engine(dir.path());

        group.bench_function(BenchmarkId::new("get_last_n", label), |b| {
            let mut series = engine.open_series("bench", "AAPL").unwrap();
            b.iter(|| {
                let _ = black_box(series.get_last_n(black_box(n - 1), 10).unwrap());
            });
            series.close().unwrap();
        });

        engine.close().unwrap();
    }

    {
        let dir = TempDir::new().unwrap();
        let n = 100_000u64;
        prepopulate(dir.path(), "bench", "AAPL", n, PAYLOAD_128B);
        let engine = open_engine(dir.path());
        let mid = n / 2;

        group.bench_function("get_between/narrow_range", |b| {
            let mut series = engine.open_series("bench", "AAPL").unwrap();
            b.iter(|| {
                let _ = black_box(
                    series
                        .get_between(black_box(mid), black_box(mid + 99), 0)
                        .unwrap(),
                );
            });
            series.close().unwrap();
        });

        engine.close().unwrap();
    }

    group.finish();
}

// ================================================================================================
// Lifecycle benchmarks
// ================================================================================================

/// Benchmark group for `Engine::open`/`close`.
///
/// # Sub-benchmarks
///
/// ## `open/empty` and `open/populated`
///
/// **Scenario:** Opens an engine rooted at an empty directory vs. one with
/// a 100,000-record series already on disk.
///
/// **What it measures:** `MetaStore::open`'s WAL replay plus snapshot load
/// cost — the only work `Engine::open` does beyond directory creation,
/// since series state is resolved lazily per `open_series` call.
fn bench_lifecycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("lifecycle");

    group.bench_function("open/empty", |b| {
        b.iter_batched(
            || TempDir::new().unwrap(),
            |dir| {
                let engine = open_engine(black_box(dir.path()));
                engine.close().unwrap();
            },
            BatchSize::SmallInput,
        );
    });

    group.bench_function("open/populated", |b| {
        b.iter_batched(
            || {
                let dir = TempDir::new().unwrap();
                prepopulate(dir.path(), "bench", "AAPL", 100_000, PAYLOAD_128B);
                dir
            },
            |dir| {
                let engine = open_engine(black_box(dir.path()));
                engine.close().unwrap();
            },
            BatchSize::SmallInput,
        );
    });

    group.finish();
}

criterion_group!(benches, bench_append, bench_query, bench_lifecycle);
criterion_main!(benches);
