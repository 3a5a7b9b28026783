//! Top-level engine: owns the shared `MetaStore` and segment allocator, and
//! hands out per-series and per-table handles.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                         Engine                           │
//! │   ┌───────────┐        ┌───────────┐                     │
//! │   │ MetaStore │◄──────►│ Allocator │                     │
//! │   └───────────┘        └───────────┘                     │
//! │         ▲                     ▲                           │
//! │         │                     │                           │
//! │   ┌─────┴─────┐         ┌─────┴─────┐       ┌───────────┐ │
//! │   │SeriesHandle│        │SeriesHandle│      │ LogHandle │ │
//! │   │(Appender + │  ...   │(Appender + │  ...  │(LogJournal)│ │
//! │   │  Query)    │        │  Query)    │       └───────────┘ │
//! │   └───────────┘         └───────────┘                     │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Handles are `!Sync` by design: callers single-thread use of one handle,
//! while distinct handles for distinct series may run on distinct threads
//! concurrently, since the only state they share — the allocator and the
//! MetaStore — is internally synchronised.

#[cfg(test)]
mod tests;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, instrument};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::allocator::{Allocator, AllocatorError};
use crate::appender::{Appender, AppenderError};
use crate::config::{ConfigError, EngineConfig, Env};
use crate::format::TsdbLogValue;
use crate::logjournal::{LogJournal, LogJournalError};
use crate::metastore::{MetaStore, MetaStoreError};
use crate::query::{Outcome, Query, QueryError};

/// Errors raised at the public engine surface. Every subsystem error funnels
/// up through here via `#[from]`.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("MetaStore error: {0}")]
    MetaStore(#[from] MetaStoreError),

    #[error("allocator error: {0}")]
    Allocator(#[from] AllocatorError),

    #[error("appender error: {0}")]
    Appender(#[from] AppenderError),

    #[error("query error: {0}")]
    Query(#[from] QueryError),

    #[error("log journal error: {0}")]
    LogJournal(#[from] LogJournalError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Installs a `tracing` subscriber per `config`'s logging knobs. Returns the
/// `WorkerGuard` for the non-blocking file writer, if one was installed —
/// dropping it flushes any buffered log lines, so callers must keep it alive
/// for the process lifetime. Safe to call more than once; later calls are a
/// no-op if a global subscriber is already installed.
///
/// `tracing-appender`'s rolling writer only rotates on a time boundary
/// (daily here), not on byte size — `log_max_size_mb`/`log_max_backups` are
/// validated but not enforced by the installed writer, since no crate in
/// this stack implements byte-size-bounded rotation the way the original
/// zap+lumberjack setup did.
pub fn init_logging(config: &EngineConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::new(config.log_level.to_string());

    match &config.log_file {
        Some(path) => {
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| Path::new("."));
            let prefix = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("fstsdb.log")
                .to_string();
            let appender = tracing_appender::rolling::daily(dir, prefix);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false);

            let registry = tracing_subscriber::registry().with(filter).with(file_layer);
            let _ = match config.env {
                Env::Dev => registry.with(fmt::layer()).try_init(),
                Env::Prod => registry.try_init(),
            };
            Some(guard)
        }
        None => {
            let _ = fmt().with_env_filter(filter).try_init();
            None
        }
    }
}

/// The top-level engine handle. Cheaply cloned — internally `Arc`-backed.
#[derive(Clone)]
pub struct Engine {
    data_dir: PathBuf,
    metastore: Arc<MetaStore>,
    allocator: Arc<Allocator>,
}

impl Engine {
    /// Opens (or creates) an engine rooted at `config.data_dir`: creates the
    /// directory if needed, opens the `MetaStore`, and wires up the segment
    /// allocator.
    #[instrument(skip(config), fields(data_dir = %config.data_dir.display()))]
    pub fn open(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        std::fs::create_dir_all(&config.data_dir)?;

        let metastore = Arc::new(MetaStore::open(&config.data_dir)?);
        let allocator = Arc::new(Allocator::new(&config.data_dir, metastore.clone()));

        info!("engine opened");
        Ok(Self {
            data_dir: config.data_dir,
            metastore,
            allocator,
        })
    }

    /// Opens an append-and-query handle for one `(table, symbol)` series,
    /// creating it lazily on first append if it doesn't exist yet.
    pub fn open_series(
        &self,
        table: impl Into<String>,
        symbol: impl Into<String>,
    ) -> Result<SeriesHandle, EngineError> {
        let table = table.into();
        let symbol = symbol.into();
        let appender = Appender::open(
            &self.data_dir,
            table.clone(),
            symbol.clone(),
            self.metastore.clone(),
            self.allocator.clone(),
        )?;
        let query = Query::open(&self.data_dir, table, symbol, self.metastore.clone())?;
        Ok(SeriesHandle { appender, query })
    }

    /// Opens a log-journal handle for `table`.
    pub fn open_log(&self, table: impl Into<String>) -> Result<LogHandle, EngineError> {
        let table = table.into();
        let journal = LogJournal::open(&self.data_dir, table.clone())?;
        Ok(LogHandle {
            data_dir: self.data_dir.clone(),
            table,
            journal: Some(journal),
        })
    }

    /// Closes the engine. All state lives on disk already; this exists as
    /// the symmetric counterpart to [`Engine::open`] and a place for future
    /// shutdown bookkeeping.
    #[instrument(skip(self))]
    pub fn close(self) -> Result<(), EngineError> {
        info!("engine closed");
        Ok(())
    }
}

/// An open append-and-query session for one series.
pub struct SeriesHandle {
    appender: Appender,
    query: Query,
}

impl SeriesHandle {
    /// Appends `(timestamp, payload)`. See [`Appender::append`].
    pub fn append(&mut self, timestamp: u64, payload: &[u8]) -> Result<(), EngineError> {
        self.appender.append(timestamp, payload).map_err(Into::into)
    }

    /// Returns the last `limit` records at-or-before `key`.
    pub fn get_last_n(
        &mut self,
        key: u64,
        limit: usize,
    ) -> Result<Outcome<Vec<(u64, Vec<u8>)>>, EngineError> {
        self.query.get_last_n(key, limit).map_err(Into::into)
    }

    /// Returns records with `low <= timestamp <= high`, paginated by `offset`.
    pub fn get_between(
        &mut self,
        low: u64,
        high: u64,
        offset: u64,
    ) -> Result<Outcome<Vec<(u64, Vec<u8>)>>, EngineError> {
        self.query.get_between(low, high, offset).map_err(Into::into)
    }

    /// Flushes the write caches and persists the series' top reference.
    pub fn close(self) -> Result<(), EngineError> {
        self.appender.close().map_err(Into::into)
    }
}

/// An open log-journal session for one table.
pub struct LogHandle {
    data_dir: PathBuf,
    table: String,
    journal: Option<LogJournal>,
}

impl LogHandle {
    /// Appends one journal record. See [`LogJournal::append`].
    pub fn append(&mut self, key: &[u8], timestamp: u64, payload: &[u8]) -> Result<(), EngineError> {
        self.journal
            .as_mut()
            .expect("journal only taken by close")
            .append(key, timestamp, payload)
            .map_err(Into::into)
    }

    /// Replays every record in this table's journal, in file and frame
    /// order. `cb` returning an error aborts iteration.
    pub fn for_each<F>(&self, cb: F) -> Result<(), EngineError>
    where
        F: FnMut(TsdbLogValue) -> Result<(), LogJournalError>,
    {
        LogJournal::for_each(&self.data_dir, &self.table, cb).map_err(Into::into)
    }

    /// Flushes any buffered partial frame.
    pub fn close(mut self) -> Result<(), EngineError> {
        if let Some(journal) = self.journal.take() {
            journal.close()?;
        }
        Ok(())
    }
}
