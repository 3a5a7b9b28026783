//! Engine configuration.
//!
//! A small, validated struct in the same style as this crate's other
//! configuration surfaces: plain public fields, a [`Default`] impl for
//! the common case, and a [`EngineConfig::validate`] pass that
//! [`crate::engine::Engine::open`] runs before it touches disk.

use std::path::PathBuf;

use thiserror::Error;
use tracing::Level;

/// Errors raised while validating an [`EngineConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("data_dir must not be empty")]
    EmptyDataDir,

    #[error("log_max_size_mb must be non-zero when log_file is set")]
    ZeroLogMaxSize,
}

/// Deployment environment tag, used to pick the logging layer installed
/// alongside the rolling file appender (see `engine::init_logging`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Env {
    /// Pretty, human-readable stdout logging in addition to the file layer.
    Dev,
    /// File-only logging; no stdout layer.
    Prod,
}

/// Top-level engine configuration.
///
/// Block sizes and segment size are deliberately absent here: they are
/// compile-time constants in [`crate::format`] so that the on-disk format
/// never silently drifts across a config change.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Root directory under which all tables, segments, and the MetaStore
    /// are created.
    pub data_dir: PathBuf,
    /// Minimum `tracing` level emitted by the installed subscriber.
    pub log_level: Level,
    /// When set, a rolling file appender is installed at this path's
    /// directory (file name prefix taken from the path's file stem).
    pub log_file: Option<PathBuf>,
    /// Rotate the active log file once it would exceed this size.
    pub log_max_size_mb: u64,
    /// Number of rotated log backups to retain.
    pub log_max_backups: u32,
    /// Maximum age, in days, before a rotated log backup is pruned.
    pub log_max_age_days: u32,
    /// Deployment environment tag.
    pub env: Env,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            log_level: Level::INFO,
            log_file: None,
            log_max_size_mb: 100,
            log_max_backups: 5,
            log_max_age_days: 14,
            env: Env::Dev,
        }
    }
}

impl EngineConfig {
    /// Validates the configuration without touching disk.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(ConfigError::EmptyDataDir);
        }
        if self.log_file.is_some() && self.log_max_size_mb == 0 {
            return Err(ConfigError::ZeroLogMaxSize);
        }
        Ok(())
    }
}
