//! Segment allocator.
//!
//! Hands out fresh `(segment#, offset)` slots of a tier-specific block
//! size, serialised through a single process-wide mutex and persisted as a
//! [`BlockAloc`] counter in the [`MetaStore`]. An explicit object owned by
//! the `Engine` root — never a file-scope singleton.

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tracing::{debug, info};

use crate::encoding::{self, Decode, EncodingError};
use crate::format::{BlockAddr, BlockAloc, Tier};
use crate::metastore::{MetaStore, MetaStoreError};
use crate::segment::{self, SegmentError};

/// Errors raised by the segment allocator.
#[derive(Debug, Error)]
pub enum AllocatorError {
    #[error("MetaStore error: {0}")]
    MetaStore(#[from] MetaStoreError),

    #[error("segment error: {0}")]
    Segment(#[from] SegmentError),

    #[error("encoding error: {0}")]
    Encoding(#[from] EncodingError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Hands out block addresses for `(table, tier)` pairs, serialising
/// allocation through a single mutex and persisting the running counter in
/// the shared [`MetaStore`].
#[derive(Debug)]
pub struct Allocator {
    data_dir: PathBuf,
    metastore: Arc<MetaStore>,
    counters: Mutex<HashMap<(String, Tier), BlockAloc>>,
}

impl Allocator {
    /// Creates an allocator rooted at `data_dir`, sharing `metastore` with
    /// the rest of the engine.
    pub fn new(data_dir: impl AsRef<Path>, metastore: Arc<MetaStore>) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            metastore,
            counters: Mutex::new(HashMap::new()),
        }
    }

    fn load_counter(&self, table: &str, tier: Tier) -> Result<BlockAloc, AllocatorError> {
        match self.metastore.get(table, tier.spb_key())? {
            Some(bytes) => {
                let (aloc, _) = BlockAloc::decode_from(&bytes)
                    .map_err(AllocatorError::Encoding)?;
                Ok(aloc)
            }
            None => Ok(BlockAloc {
                seg_no: 1,
                alloc_len: 0,
            }),
        }
    }

    fn persist_counter(&self, table: &str, tier: Tier, aloc: BlockAloc) -> Result<(), AllocatorError> {
        let bytes = encoding::encode_to_vec(&aloc)?;
        self.metastore.put(table, tier.spb_key(), bytes)?;
        Ok(())
    }

    /// Allocates a fresh, block-aligned address for `(table, tier)`,
    /// creating and truncating a new segment file whenever the allocation
    /// crosses into a new segment number.
    pub fn alloc(&self, table: &str, tier: Tier) -> Result<BlockAddr, AllocatorError> {
        let mut counters = self
            .counters
            .lock()
            .map_err(|_| AllocatorError::Internal("allocator mutex poisoned".into()))?;

        let key = (table.to_string(), tier);
        let current = match counters.get(&key) {
            Some(aloc) => *aloc,
            None => self.load_counter(table, tier)?,
        };

        let block_size = tier.block_size() as u32;
        let segment_size = crate::format::SEGMENT_SIZE as u32;

        let (addr, next) = if current.alloc_len.saturating_add(block_size) <= segment_size {
            let addr = BlockAddr {
                seg_no: current.seg_no,
                seg_offset: current.alloc_len,
            };
            let next = BlockAloc {
                seg_no: current.seg_no,
                alloc_len: current.alloc_len + block_size,
            };
            (addr, next)
        } else {
            let seg_no = current.seg_no + 1;
            let addr = BlockAddr {
                seg_no,
                seg_offset: 0,
            };
            let next = BlockAloc {
                seg_no,
                alloc_len: block_size,
            };
            (addr, next)
        };
        // Entering a new segment (the initial allocation, or rolling past
        // this one's capacity) is exactly when the allocated offset is 0.
        let new_segment = addr.seg_offset == 0;

        if new_segment {
            segment::open_or_create_segment(&self.data_dir, table, tier, addr.seg_no)?;
            debug!(table, ?tier, seg_no = addr.seg_no, "segment file ensured");
        }

        self.persist_counter(table, tier, next)?;
        counters.insert(key, next);

        info!(table, ?tier, ?addr, "block allocated");
        Ok(addr)
    }
}
