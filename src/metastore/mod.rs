//! Embedded key/value metadata store.
//!
//! Backs series top-references and segment allocator counters, keyed by
//! `(bucket, key) -> bytes`. Not an external black box: this store is a
//! WAL-ahead, snapshot-backed `BTreeMap` guarded by a `Mutex`, in the same
//! idiom this crate already uses for its own metadata persistence — every
//! mutation is appended to a WAL before being applied, and a periodic or
//! explicit checkpoint writes an atomically-renamed, CRC-checked snapshot.
//!
//! `get` returning `None` is not an error: callers use it to detect
//! first-time initialisation (a fresh series, an unset allocator counter).

#[cfg(test)]
mod tests;

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crc32fast::Hasher as Crc32;
use thiserror::Error;
use tracing::{info, warn};

use crate::encoding::{self, Decode, Encode, EncodingError};
use crate::wal::{Wal, WalError};

const SNAPSHOT_FILENAME: &str = "blot.db";
const SNAPSHOT_TMP_SUFFIX: &str = ".tmp";
/// The generic `Wal::open` requires a `wal-<seq>.log` filename; `blot.wal`
/// would be rejected, so the MetaStore's single, non-rotating WAL segment
/// is named accordingly.
const WAL_FILENAME: &str = "wal-000000.log";

/// Errors raised by the MetaStore.
#[derive(Debug, Error)]
pub enum MetaStoreError {
    #[error("WAL error: {0}")]
    Wal(#[from] WalError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("encoding error: {0}")]
    Encoding(#[from] EncodingError),

    #[error("snapshot checksum mismatch")]
    SnapshotChecksumMismatch,

    #[error("internal error: {0}")]
    Internal(String),
}

type Key = (String, String);

#[derive(Debug, Clone, Default, PartialEq)]
struct MetaStoreData {
    entries: BTreeMap<Key, Vec<u8>>,
}

impl Encode for MetaStoreData {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        let pairs: Vec<(String, String, Vec<u8>)> = self
            .entries
            .iter()
            .map(|((bucket, key), value)| (bucket.clone(), key.clone(), value.clone()))
            .collect();
        (pairs.len() as u32).encode_to(buf)?;
        for (bucket, key, value) in &pairs {
            bucket.encode_to(buf)?;
            key.encode_to(buf)?;
            value.encode_to(buf)?;
        }
        Ok(())
    }
}

impl Decode for MetaStoreData {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let mut offset = 0;
        let (count, n) = u32::decode_from(&buf[offset..])?;
        offset += n;
        let mut entries = BTreeMap::new();
        for _ in 0..count {
            let (bucket, n) = String::decode_from(&buf[offset..])?;
            offset += n;
            let (key, n) = String::decode_from(&buf[offset..])?;
            offset += n;
            let (value, n) = Vec::<u8>::decode_from(&buf[offset..])?;
            offset += n;
            entries.insert((bucket, key), value);
        }
        Ok((Self { entries }, offset))
    }
}

/// One WAL record: "set `(bucket, key)` to `value`". There is no delete
/// operation — the MetaStore only ever grows (top references and
/// allocator counters are overwritten, never removed).
#[derive(Debug)]
struct MetaStoreEvent {
    bucket: String,
    key: String,
    value: Vec<u8>,
}

impl Encode for MetaStoreEvent {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        self.bucket.encode_to(buf)?;
        self.key.encode_to(buf)?;
        self.value.encode_to(buf)?;
        Ok(())
    }
}

impl Decode for MetaStoreEvent {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let mut offset = 0;
        let (bucket, n) = String::decode_from(&buf[offset..])?;
        offset += n;
        let (key, n) = String::decode_from(&buf[offset..])?;
        offset += n;
        let (value, n) = Vec::<u8>::decode_from(&buf[offset..])?;
        offset += n;
        Ok((Self { bucket, key, value }, offset))
    }
}

#[derive(Debug)]
struct MetaStoreSnapshot {
    data: MetaStoreData,
    checksum: u32,
}

impl Encode for MetaStoreSnapshot {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        self.data.encode_to(buf)?;
        self.checksum.encode_to(buf)?;
        Ok(())
    }
}

impl Decode for MetaStoreSnapshot {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let mut offset = 0;
        let (data, n) = MetaStoreData::decode_from(&buf[offset..])?;
        offset += n;
        let (checksum, n) = u32::decode_from(&buf[offset..])?;
        offset += n;
        Ok((Self { data, checksum }, offset))
    }
}

/// The embedded metadata store, rooted at `<data_dir>/blot`.
#[derive(Debug)]
pub struct MetaStore {
    dir: PathBuf,
    wal: Wal<MetaStoreEvent>,
    data: Mutex<MetaStoreData>,
}

impl MetaStore {
    /// Opens (creating if absent) the MetaStore rooted at `<data_dir>/blot`.
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self, MetaStoreError> {
        let dir = data_dir.as_ref().join("blot");
        fs::create_dir_all(&dir)?;

        let snapshot_path = dir.join(SNAPSHOT_FILENAME);
        let mut data = MetaStoreData::default();
        if snapshot_path.exists() {
            match Self::read_snapshot(&snapshot_path) {
                Ok(snap) => {
                    data = snap;
                    info!(path = %snapshot_path.display(), "loaded MetaStore snapshot");
                }
                Err(e) => {
                    warn!(
                        "failed to read MetaStore snapshot {:?}: {}; falling back to full WAL replay",
                        snapshot_path, e
                    );
                    data = MetaStoreData::default();
                }
            }
        }

        let wal_path = dir.join(WAL_FILENAME);
        let wal = Wal::<MetaStoreEvent>::open(&wal_path, None)?;

        let mut store = MetaStore {
            dir,
            wal,
            data: Mutex::new(data),
        };
        store.replay_wal()?;
        Ok(store)
    }

    fn lock_data(&self) -> Result<MutexGuard<'_, MetaStoreData>, MetaStoreError> {
        self.data
            .lock()
            .map_err(|_| MetaStoreError::Internal("MetaStore mutex poisoned".into()))
    }

    fn replay_wal(&mut self) -> Result<(), MetaStoreError> {
        let iter = self.wal.replay_iter()?;
        let mut count = 0u64;
        for item in iter {
            match item {
                Ok(rec) => {
                    self.apply_record(&rec)?;
                    count += 1;
                }
                Err(e) => {
                    warn!("MetaStore WAL replay stopped due to WAL error: {}", e);
                    break;
                }
            }
        }
        info!(entries = count, "MetaStore WAL replay complete");
        Ok(())
    }

    fn apply_record(&self, rec: &MetaStoreEvent) -> Result<(), MetaStoreError> {
        let mut data = self.lock_data()?;
        data.entries
            .insert((rec.bucket.clone(), rec.key.clone()), rec.value.clone());
        Ok(())
    }

    /// Reads the value stored under `(bucket, key)`, or `None` if absent.
    /// Absence is not an error — callers use it to detect first-time
    /// initialisation.
    pub fn get(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>, MetaStoreError> {
        let data = self.lock_data()?;
        Ok(data
            .entries
            .get(&(bucket.to_string(), key.to_string()))
            .cloned())
    }

    /// Writes `value` under `(bucket, key)`, durably appending to the WAL
    /// before updating in-memory state.
    pub fn put(&self, bucket: &str, key: &str, value: Vec<u8>) -> Result<(), MetaStoreError> {
        let rec = MetaStoreEvent {
            bucket: bucket.to_string(),
            key: key.to_string(),
            value,
        };
        self.wal.append(&rec)?;
        self.apply_record(&rec)?;
        Ok(())
    }

    /// Writes an atomically-renamed, CRC-checked snapshot of the current
    /// state and truncates the WAL. Safe to call at any time; not required
    /// for correctness (the WAL alone is sufficient to reconstruct state),
    /// only to bound replay time on reopen.
    pub fn checkpoint(&mut self) -> Result<(), MetaStoreError> {
        let data = self.lock_data()?.clone();
        let snapshot = MetaStoreSnapshot { data, checksum: 0 };

        let mut bytes = encoding::encode_to_vec(&snapshot)?;
        let mut hasher = Crc32::new();
        hasher.update(&bytes);
        let checksum = hasher.finalize();
        let len = bytes.len();
        bytes[len - 4..].copy_from_slice(&checksum.to_le_bytes());

        let tmp_path = self.dir.join(format!("{SNAPSHOT_FILENAME}{SNAPSHOT_TMP_SUFFIX}"));
        {
            let mut f = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp_path)?;
            f.write_all(&bytes)?;
            f.sync_all()?;
        }

        let final_path = self.dir.join(SNAPSHOT_FILENAME);
        fs::rename(&tmp_path, &final_path)?;
        Self::fsync_dir(&self.dir)?;

        self.wal.truncate()?;
        info!(path = %final_path.display(), "MetaStore snapshot written");
        Ok(())
    }

    fn fsync_dir(dir: &Path) -> Result<(), MetaStoreError> {
        File::open(dir)?.sync_all()?;
        Ok(())
    }

    fn read_snapshot(path: &Path) -> Result<MetaStoreData, MetaStoreError> {
        let mut f = File::open(path)?;
        let mut buf = Vec::new();
        f.read_to_end(&mut buf)?;

        let (snap, _) = encoding::decode_from_slice::<MetaStoreSnapshot>(&buf)?;

        let verify = MetaStoreSnapshot {
            data: snap.data.clone(),
            checksum: 0,
        };
        let verify_bytes = encoding::encode_to_vec(&verify)?;
        let mut hasher = Crc32::new();
        hasher.update(&verify_bytes);
        let computed = hasher.finalize();

        if snap.checksum != computed {
            return Err(MetaStoreError::SnapshotChecksumMismatch);
        }

        Ok(snap.data)
    }
}
