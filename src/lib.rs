//! # fstsdb
//!
//! An embeddable, append-only time-series block store. Each series
//! (`table` + `symbol`) is a chain of fixed-size blocks across three tiers:
//!
//! - **R-IDX** — range index: which IDX block covers which `[low, high)`
//!   timestamp range.
//! - **IDX** — point index: timestamp → byte offset of its value.
//! - **VAL** — the values themselves, length-prefixed.
//!
//! Blocks are packed into 256 MiB segment files and linked `prev`/`next`
//! within a tier, so appends walk to the tail and queries resolve a
//! timestamp by walking R-IDX, binary-searching IDX, then streaming VAL.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                         Engine                           │
//! │   ┌───────────┐        ┌───────────┐                     │
//! │   │ MetaStore │◄──────►│ Allocator │                     │
//! │   └───────────┘        └───────────┘                     │
//! │         ▲                     ▲                           │
//! │   ┌─────┴──────┐        ┌─────┴──────┐      ┌───────────┐│
//! │   │SeriesHandle│  ...   │SeriesHandle│  ... │ LogHandle ││
//! │   │ Appender + │        │ Appender + │      │LogJournal ││
//! │   │   Query    │        │   Query    │      └───────────┘│
//! │   └─────┬──────┘        └─────┬──────┘                   │
//! │         │                     │                           │
//! │   ┌─────┴─────────────────────┴──────┐                    │
//! │   │   R-IDX / IDX / VAL write caches  │                    │
//! │   └─────────────────┬─────────────────┘                    │
//! │                     ▼                                     │
//! │         Segment file manager (256 MiB files)               │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`engine`] | Top-level `Engine`, `SeriesHandle`, `LogHandle` |
//! | [`appender`] | Orchestrates the three write caches for one open series |
//! | [`query`] | Resolves a timestamp and streams results forward/backward |
//! | [`writecache`] | Tail-block buffering and roll-over for one tier |
//! | [`allocator`] | Segment-file block allocator |
//! | [`segment`] | Segment file I/O: block read/write, buffer pools |
//! | [`format`] | On-disk record layouts and the `Tier` enum |
//! | [`encoding`] | Hand-written little-endian binary codec |
//! | [`metastore`] | Embedded WAL+snapshot key/value metadata store |
//! | [`logjournal`] | Buffered, rotating append-only side log |
//! | [`wal`] | Generic, CRC-protected write-ahead log used by the MetaStore |
//! | [`config`] | `EngineConfig` validation |
//!
//! ## Key Features
//!
//! - **Append-only, crash-safe** — every durable mutation goes through
//!   either the block chain (fsync'd segment writes) or a WAL (MetaStore),
//!   never an in-place rewrite of committed data.
//! - **O(log n) resolution, O(1) append** — R-IDX/IDX binary search locates
//!   a timestamp's VAL block; appends always write to the tail.
//! - **Idempotent out-of-order appends** — a timestamp older than the
//!   series' current tail is silently dropped.
//! - **Paginated range queries** — `get_between` resumes from where the
//!   previous call on the same bounds left off.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fstsdb::config::EngineConfig;
//! use fstsdb::engine::Engine;
//! use fstsdb::query::Outcome;
//!
//! let config = EngineConfig {
//!     data_dir: "/tmp/fstsdb-demo".into(),
//!     ..EngineConfig::default()
//! };
//! let engine = Engine::open(config).unwrap();
//!
//! let mut series = engine.open_series("orders", "AAPL").unwrap();
//! series.append(1, b"buy 10").unwrap();
//! series.append(2, b"sell 5").unwrap();
//!
//! if let Outcome::Found(records) = series.get_last_n(2, 10).unwrap() {
//!     for (timestamp, payload) in records {
//!         println!("{timestamp}: {payload:?}");
//!     }
//! }
//!
//! series.close().unwrap();
//! engine.close().unwrap();
//! ```

#![allow(dead_code)]

pub mod allocator;
pub mod appender;
pub mod config;
pub mod encoding;
pub mod engine;
pub mod format;
pub mod logjournal;
pub mod metastore;
pub mod query;
pub mod segment;
pub mod wal;
pub mod writecache;
