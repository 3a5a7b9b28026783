//! Integration tests for the public `Engine` API.
//!
//! These tests exercise the full stack (Appender/Query → write caches →
//! segment files, and MetaStore persistence) through
//! `fstsdb::{config::EngineConfig, engine::Engine}` only. No internal
//! modules are referenced directly.
//!
//! ## Coverage areas
//! - **Lifecycle**: open, close, reopen
//! - **Append/query round trip**: `get_last_n`, `get_between`
//! - **Persistence**: series state survives close → reopen
//! - **Log journal**: append, close, reopen, replay
//!
//! ## See also
//! - `tests/integration_coverage.rs` — pagination and multi-series coverage
//! - `tests/integration_hardening.rs` — edge cases and error conditions

use fstsdb::config::EngineConfig;
use fstsdb::engine::Engine;
use fstsdb::query::Outcome;
use tempfile::TempDir;

fn open_engine(dir: &std::path::Path) -> Engine {
    let config = EngineConfig {
        data_dir: dir.to_path_buf(),
        ..EngineConfig::default()
    };
    Engine::open(config).expect("engine open")
}

// ================================================================================================
// Lifecycle
// ================================================================================================

/// # Scenario
/// Open a fresh engine and immediately close it.
///
/// # Starting environment
/// Empty temporary directory — no prior data.
///
/// # Actions
/// 1. `Engine::open` with default config.
/// 2. `engine.close()`.
///
/// # Expected behavior
/// Both operations succeed without error.
#[test]
fn open_close_empty() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(dir.path());
    engine.close().unwrap();
}

/// # Scenario
/// Reopening an engine at the same data directory must succeed and see the
/// same on-disk state.
///
/// # Starting environment
/// An engine with one appended series, closed.
///
/// # Actions
/// 1. Open, append 10 records to `orders/AAPL`, close the series, close the engine.
/// 2. Reopen the engine at the same directory.
/// 3. Query the series.
///
/// # Expected behavior
/// The reopened engine finds all 10 records.
#[test]
fn reopen_sees_prior_data() {
    let dir = TempDir::new().unwrap();
    {
        let engine = open_engine(dir.path());
        let mut series = engine.open_series("orders", "AAPL").unwrap();
        for t in 0..10u64 {
            series.append(t, b"tick").unwrap();
        }
        series.close().unwrap();
        engine.close().unwrap();
    }

    let engine = open_engine(dir.path());
    let mut series = engine.open_series("orders", "AAPL").unwrap();
    let found = match series.get_between(0, 9, 0).unwrap() {
        Outcome::Found(v) => v,
        other => panic!("expected Found, got {other:?}"),
    };
    assert_eq!(found.len(), 10);
    series.close().unwrap();
    engine.close().unwrap();
}

// ================================================================================================
// Append / query round trip
// ================================================================================================

/// # Scenario
/// Append a run of ascending timestamps, then fetch the most recent few.
///
/// # Starting environment
/// Fresh engine, fresh series.
///
/// # Actions
/// 1. Append timestamps `0..1000`.
/// 2. `get_last_n(999, 5)`.
///
/// # Expected behavior
/// The last 5 timestamps, in ascending order, are returned.
#[test]
fn get_last_n_returns_recent_tail() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(dir.path());
    let mut series = engine.open_series("orders", "AAPL").unwrap();
    for t in 0..1000u64 {
        series.append(t, b"tick").unwrap();
    }

    let found = match series.get_last_n(999, 5).unwrap() {
        Outcome::Found(v) => v,
        other => panic!("expected Found, got {other:?}"),
    };
    let timestamps: Vec<u64> = found.iter().map(|(ts, _)| *ts).collect();
    assert_eq!(timestamps, vec![995, 996, 997, 998, 999]);

    series.close().unwrap();
    engine.close().unwrap();
}

/// # Scenario
/// `get_between` returns exactly the records within the requested bounds,
/// inclusive on both ends.
///
/// # Starting environment
/// A series with 200 records spanning timestamps `0..200`.
///
/// # Actions
/// 1. `get_between(50, 59, 0)`.
///
/// # Expected behavior
/// Exactly the 10 records with timestamps `50..=59` are returned.
#[test]
fn get_between_is_inclusive_on_both_bounds() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(dir.path());
    let mut series = engine.open_series("orders", "AAPL").unwrap();
    for t in 0..200u64 {
        series.append(t, b"tick").unwrap();
    }

    let found = match series.get_between(50, 59, 0).unwrap() {
        Outcome::Found(v) => v,
        other => panic!("expected Found, got {other:?}"),
    };
    let timestamps: Vec<u64> = found.iter().map(|(ts, _)| *ts).collect();
    assert_eq!(timestamps, (50..=59).collect::<Vec<_>>());

    series.close().unwrap();
    engine.close().unwrap();
}

// ================================================================================================
// Log journal
// ================================================================================================

/// # Scenario
/// A log journal's records survive a close → reopen cycle and replay in
/// the order they were appended.
///
/// # Starting environment
/// Fresh engine.
///
/// # Actions
/// 1. Open a log handle for `audit`, append 3 records, close it.
/// 2. Reopen the log handle and replay with `for_each`.
///
/// # Expected behavior
/// All 3 records are replayed in append order.
#[test]
fn log_journal_round_trips_through_reopen() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(dir.path());

    {
        let mut log = engine.open_log("audit").unwrap();
        log.append(b"AAPL", 1, b"buy 10").unwrap();
        log.append(b"AAPL", 2, b"sell 5").unwrap();
        log.append(b"MSFT", 3, b"buy 3").unwrap();
        log.close().unwrap();
    }

    let log = engine.open_log("audit").unwrap();
    let mut replayed = Vec::new();
    log.for_each(|v| {
        replayed.push((v.key, v.timestamp, v.payload));
        Ok(())
    })
    .unwrap();

    assert_eq!(replayed.len(), 3);
    assert_eq!(replayed[0], (b"AAPL".to_vec(), 1, b"buy 10".to_vec()));
    assert_eq!(replayed[2], (b"MSFT".to_vec(), 3, b"buy 3".to_vec()));
    log.close().unwrap();
    engine.close().unwrap();
}
