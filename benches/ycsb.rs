//! Macro-benchmarks for fstsdb under realistic mixed ingestion/query
//! workloads, in the spirit of YCSB-style benchmarking but reshaped for an
//! append-only time-series store: there is no random-key update or delete
//! path, so workloads mix append (ingestion) against `get_last_n`
//! (dashboard-style tail reads) and `get_between` (historical range scans
//! and pagination) instead.
//!
//! # Workloads
//!
//! | Name | Mix | Description |
//! |------|-----|-------------|
//! | **ingest** | 100% append | Bulk-load phase across many series |
//! | **tail_reads** | 90% `get_last_n`, 10% append | Live dashboard polling latest ticks |
//! | **range_scan** | 90% `get_between`, 10% append | Historical chart backfill |
//! | **pagination** | 100% `get_between`, increasing offset | Paging through a backlog |
//!
//! # Running
//!
//! ```bash
//! cargo bench --bench ycsb               # all workloads
//! cargo bench --bench ycsb -- "ingest"   # ingest phase only
//! ```

use criterion::{BatchSize, BenchmarkId, Criterion, criterion_group, criterion_main};

use fstsdb::config::EngineConfig;
use fstsdb::engine::Engine;
use rand::Rng;
use std::hint::black_box;
use tempfile::TempDir;

/// Number of distinct series (symbols) ingested into per run.
const SERIES_COUNT: u64 = 50;

/// Number of records appended per series during the load phase.
const RECORDS_PER_SERIES: u64 = 2_000;

/// Number of operations per workload run.
const OPS_PER_RUN: u64 = 5_000;

/// Payload size in bytes.
const PAYLOAD_SIZE: usize = 256;

/// Range width for `get_between` workloads.
const RANGE_WIDTH: u64 = 50;

fn symbol(i: u64) -> String {
    format!("SYM{i:04}")
}

fn make_payload(rng: &mut impl Rng) -> Vec<u8> {
    let mut buf = vec![0u8; PAYLOAD_SIZE];
    rng.fill(&mut buf[..]);
    buf
}

fn open_bench_engine(dir: &std::path::Path) -> Engine {
    Engine::open(EngineConfig {
        data_dir: dir.to_path_buf(),
        ..EngineConfig::default()
    })
    .expect("open")
}

/// Load phase: appends [`RECORDS_PER_SERIES`] records to each of
/// [`SERIES_COUNT`] series, round-robin, simulating concurrent ingestion
/// from many data sources into one engine.
///
/// **Scenario:** 50 series, each receiving 2,000 sequential-timestamp
/// appends (256 B payloads), interleaved round-robin rather than one
/// series at a time.
///
/// **What it measures:** Sustained append throughput across many
/// concurrently-open write caches, exercising block roll-over and R-IDX/IDX
/// maintenance for each series independently.
///
/// **Expected behaviour:** Per-append cost should stay flat across series
/// since each series' write cache and tail block are independent state.
fn load_engine(engine: &Engine) {
    let mut rng = rand::rng();
    let mut series: Vec<_> = (0..SERIES_COUNT)
        .map(|i| engine.open_series("ticks", symbol(i)).unwrap())
        .collect();

    for t in 0..RECORDS_PER_SERIES {
        for s in series.iter_mut() {
            let payload = make_payload(&mut rng);
            s.append(t, &payload).unwrap();
        }
    }

    for s in series {
        s.close().unwrap();
    }
}

/// Workload `tail_reads` — 90% `get_last_n`, 10% append.
///
/// **Real-world analogy:** A live trading dashboard polling the most
/// recent ticks for a rotating set of symbols, with ingestion continuing
/// in the background.
///
/// **What it measures:** Read latency for the hot path (R-IDX tail walk +
/// short backward VAL scan) under concurrent write pressure on the same
/// series.
///
/// **Expected behaviour:** Dominated by the 90% reads; each read should be
/// close to constant time regardless of how much history the series holds,
/// since `get_last_n` resolves from the tail rather than scanning forward.
fn run_workload_tail_reads(engine: &Engine) {
    let mut rng = rand::rng();
    let mut series: Vec<_> = (0..SERIES_COUNT)
        .map(|i| engine.open_series("ticks", symbol(i)).unwrap())
        .collect();
    let mut next_ts = vec![RECORDS_PER_SERIES; SERIES_COUNT as usize];

    for _ in 0..OPS_PER_RUN {
        let idx = rng.random_range(0..SERIES_COUNT) as usize;
        if rng.random_bool(0.9) {
            let key = next_ts[idx].saturating_sub(1);
            let _ = black_box(series[idx].get_last_n(key, 10).unwrap());
        } else {
            let payload = make_payload(&mut rng);
            series[idx].append(next_ts[idx], &payload).unwrap();
            next_ts[idx] += 1;
        }
    }

    for s in series {
        s.close().unwrap();
    }
}

/// Workload `range_scan` — 90% `get_between`, 10% append.
///
/// **Real-world analogy:** A charting UI backfilling a historical window
/// while new ticks keep arriving.
///
/// **What it measures:** R-IDX binary search to locate a historical window
/// plus a bounded forward VAL scan, under light write pressure.
///
/// **Expected behaviour:** Slower than `tail_reads` since each scan touches
/// [`RANGE_WIDTH`] records rather than a short tail; write pressure should
/// have minimal effect since appends only ever touch the tail block.
fn run_workload_range_scan(engine: &Engine) {
    let mut rng = rand::rng();
    let mut series: Vec<_> = (0..SERIES_COUNT)
        .map(|i| engine.open_series("ticks", symbol(i)).unwrap())
        .collect();
    let mut next_ts = vec![RECORDS_PER_SERIES; SERIES_COUNT as usize];

    for _ in 0..OPS_PER_RUN {
        let idx = rng.random_range(0..SERIES_COUNT) as usize;
        if rng.random_bool(0.9) {
            let start = rng.random_range(0..RECORDS_PER_SERIES.saturating_sub(RANGE_WIDTH));
            let _ = black_box(
                series[idx]
                    .get_between(start, start + RANGE_WIDTH, 0)
                    .unwrap(),
            );
        } else {
            let payload = make_payload(&mut rng);
            series[idx].append(next_ts[idx], &payload).unwrap();
            next_ts[idx] += 1;
        }
    }

    for s in series {
        s.close().unwrap();
    }
}

/// Workload `pagination` — repeated `get_between` calls over the same
/// bounds with increasing offset.
///
/// **Real-world analogy:** A client paging through a large backlog of
/// historical records page by page, each request continuing from the
/// previous cursor.
///
/// **What it measures:** Cursor-resume cost for `get_between` — whether
/// repeated calls on the same `(low, high)` bounds stay cheap as `offset`
/// grows, since the reader resumes from persisted cursor state rather than
/// rescanning from `low` each time.
///
/// **Expected behaviour:** Roughly constant per-page cost regardless of
/// how many pages have already been consumed.
fn run_workload_pagination(engine: &Engine) {
    let mut series = engine.open_series("ticks", symbol(0)).unwrap();
    let page_size = 20u64;
    let mut offset = 0u64;
    let pages = OPS_PER_RUN.min(RECORDS_PER_SERIES / page_size);

    for _ in 0..pages {
        let _ = black_box(
            series
                .get_between(0, RECORDS_PER_SERIES - 1, offset)
                .unwrap(),
        );
        offset += page_size;
    }

    series.close().unwrap();
}

// ================================================================================================
// Criterion benchmark functions
// ================================================================================================

/// Criterion registration for the load phase.
fn bench_load(c: &mut Criterion) {
    let mut group = c.benchmark_group("ycsb/load");
    group.sample_size(10);
    group.bench_function(BenchmarkId::new("ingest", SERIES_COUNT), |b| {
        b.iter_batched(
            || {
                let dir = TempDir::new().unwrap();
                let engine = open_bench_engine(dir.path());
                (dir, engine)
            },
            |(_dir, engine)| {
                load_engine(&engine);
                engine.close().unwrap();
            },
            BatchSize::PerIteration,
        );
    });
    group.finish();
}

/// Criterion registration for the `tail_reads` workload.
fn bench_workload_tail_reads(c: &mut Criterion) {
    let mut group = c.benchmark_group("ycsb/workload");
    group.sample_size(10);
    group.bench_function("tail_reads_90read_10append", |b| {
        b.iter_batched(
            || {
                let dir = TempDir::new().unwrap();
                let engine = open_bench_engine(dir.path());
                load_engine(&engine);
                (dir, engine)
            },
            |(_dir, engine)| run_workload_tail_reads(&engine),
            BatchSize::PerIteration,
        );
    });
    group.finish();
}

/// Criterion registration for the `range_scan` workload.
fn bench_workload_range_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("ycsb/workload");
    group.sample_size(10);
    group.bench_function("range_scan_90scan_10append", |b| {
        b.iter_batched(
            || {
                let dir = TempDir::new().unwrap();
                let engine = open_bench_engine(dir.path());
                load_engine(&engine);
                (dir, engine)
            },
            |(_dir, engine)| run_workload_range_scan(&engine),
            BatchSize::PerIteration,
        );
    });
    group.finish();
}

/// Criterion registration for the `pagination` workload.
fn bench_workload_pagination(c: &mut Criterion) {
    let mut group = c.benchmark_group("ycsb/workload");
    group.sample_size(10);
    group.bench_function("pagination_cursor_resume", |b| {
        b.iter_batched(
            || {
                let dir = TempDir::new().unwrap();
                let engine = open_bench_engine(dir.path());
                load_engine(&engine);
                (dir, engine)
            },
            |(_dir, engine)| run_workload_pagination(&engine),
            BatchSize::PerIteration,
        );
    });
    group.finish();
}

// ================================================================================================
// Group registration
// ================================================================================================

criterion_group!(
    benches,
    bench_load,
    bench_workload_tail_reads,
    bench_workload_range_scan,
    bench_workload_pagination,
);

criterion_main!(benches);
