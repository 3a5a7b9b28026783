//! Appender: orchestrates the three write caches for one open series.
//!
//! One `Appender` exists per open `(table, symbol)` append session. It
//! resolves the tail of the R-IDX chain once on open, then on every
//! `append` drives the VAL and IDX write caches and keeps the in-memory
//! "last R-IDX" record up to date, rewriting it in place as its `high`
//! bound grows.

#[cfg(test)]
mod tests;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::error;

use crate::allocator::{Allocator, AllocatorError};
use crate::encoding::{self, Decode, EncodingError};
use crate::format::{
    decode_idx_records, decode_ridx_records, encode_value, BlockAddr, Tier, TsdbIndex,
    TsdbRangIndex, IDX_BLOCK_SIZE, VAL_BLOCK_SIZE,
};
use crate::metastore::{MetaStore, MetaStoreError};
use crate::segment::{self, BufferPools, SegmentError};
use crate::writecache::{WriteCache, WriteCacheError};

/// Errors raised by the [`Appender`].
#[derive(Debug, Error)]
pub enum AppenderError {
    #[error("segment error: {0}")]
    Segment(#[from] SegmentError),

    #[error("allocator error: {0}")]
    Allocator(#[from] AllocatorError),

    #[error("write cache error: {0}")]
    WriteCache(#[from] WriteCacheError),

    #[error("MetaStore error: {0}")]
    MetaStore(#[from] MetaStoreError),

    #[error("encoding error: {0}")]
    Encoding(#[from] EncodingError),

    #[error("internal error: {0}")]
    Internal(String),
}

/// An open append session for one `(table, symbol)` series.
pub struct Appender {
    data_dir: PathBuf,
    table: String,
    symbol: String,
    metastore: Arc<MetaStore>,
    allocator: Arc<Allocator>,
    pools: BufferPools,
    top_ref: BlockAddr,
    ridx_cache: WriteCache,
    idx_cache: Option<WriteCache>,
    val_cache: Option<WriteCache>,
    last_ridx: Option<TsdbRangIndex>,
}

impl Appender {
    /// Opens an append session, resolving (or lazily creating) the series'
    /// top reference and the tail of its R-IDX chain.
    pub fn open(
        data_dir: impl AsRef<Path>,
        table: impl Into<String>,
        symbol: impl Into<String>,
        metastore: Arc<MetaStore>,
        allocator: Arc<Allocator>,
    ) -> Result<Self, AppenderError> {
        let data_dir = data_dir.as_ref().to_path_buf();
        let table = table.into();
        let symbol = symbol.into();
        let pools = BufferPools::default();

        let top_ref_bytes = metastore.get(&table, &symbol)?;

        let (top_ref, ridx_cache, last_ridx) = match top_ref_bytes {
            None => {
                let cache = WriteCache::new_head(&data_dir, &table, Tier::RIdx, allocator.clone())?;
                (cache.addr(), cache, None)
            }
            Some(bytes) => {
                let (top_ref, _) = BlockAddr::decode_from(&bytes)?;
                let (tail_addr, tail_block) =
                    Self::walk_ridx_tail(&data_dir, &table, top_ref, &pools)?;
                let last_ridx = if tail_block.header.len > 0 {
                    decode_ridx_records(&tail_block.payload, tail_block.header.len)?
                        .last()
                        .copied()
                } else {
                    None
                };
                let cache = WriteCache::new(
                    &data_dir,
                    table.clone(),
                    Tier::RIdx,
                    allocator.clone(),
                    tail_addr,
                    tail_block,
                );
                (top_ref, cache, last_ridx)
            }
        };

        Ok(Self {
            data_dir,
            table,
            symbol,
            metastore,
            allocator,
            pools,
            top_ref,
            ridx_cache,
            idx_cache: None,
            val_cache: None,
            last_ridx,
        })
    }

    /// Walks `next` pointers from `top_ref` until a block whose `next` is
    /// null has been read, returning that block's address and contents.
    fn walk_ridx_tail(
        data_dir: &Path,
        table: &str,
        top_ref: BlockAddr,
        pools: &BufferPools,
    ) -> Result<(BlockAddr, segment::Block), AppenderError> {
        let mut addr = top_ref;
        let mut block = segment::read_block(data_dir, table, Tier::RIdx, addr, pools)?;
        while !block.header.next.is_null() {
            addr = block.header.next;
            block = segment::read_block(data_dir, table, Tier::RIdx, addr, pools)?;
        }
        Ok((addr, block))
    }

    /// Appends `(timestamp, payload)`. A `timestamp` earlier than the
    /// current R-IDX tail's `high` is silently dropped (idempotent no-op).
    pub fn append(&mut self, timestamp: u64, payload: &[u8]) -> Result<(), AppenderError> {
        if let Some(last) = &self.last_ridx {
            if timestamp < last.high {
                return Ok(());
            }
        }

        if self.idx_cache.is_none() {
            self.populate_idx_val_caches()?;
        }

        let value_bytes = encode_value(timestamp, payload)?;
        let val_addr = self
            .val_cache
            .as_mut()
            .expect("VAL cache populated above")
            .append(&value_bytes)?;

        let idx_record = TsdbIndex {
            key: timestamp,
            addr: val_addr,
        };
        let idx_bytes = encoding::encode_to_vec(&idx_record)?;
        let idx_addr = self
            .idx_cache
            .as_mut()
            .expect("IDX cache populated above")
            .append(&idx_bytes)?;

        let idx_block_size = IDX_BLOCK_SIZE as u32;
        let ridx_target = BlockAddr {
            seg_no: idx_addr.seg_no,
            seg_offset: (idx_addr.seg_offset / idx_block_size) * idx_block_size,
        };

        match &mut self.last_ridx {
            None => {
                self.last_ridx = Some(TsdbRangIndex {
                    low: timestamp,
                    high: timestamp + 1,
                    off: 0,
                    addr: ridx_target,
                });
            }
            Some(last) if last.addr == ridx_target => {
                last.high = timestamp + 1;
            }
            Some(last) => {
                let mut old = *last;
                self.ridx_cache.update_tail_ridx(&mut old)?;
                self.last_ridx = Some(TsdbRangIndex {
                    low: timestamp,
                    high: timestamp + 1,
                    off: 0,
                    addr: ridx_target,
                });
            }
        }

        Ok(())
    }

    fn populate_idx_val_caches(&mut self) -> Result<(), AppenderError> {
        match &self.last_ridx {
            None => {
                self.idx_cache = Some(WriteCache::new_head(
                    &self.data_dir,
                    self.table.clone(),
                    Tier::Idx,
                    self.allocator.clone(),
                )?);
                self.val_cache = Some(WriteCache::new_head(
                    &self.data_dir,
                    self.table.clone(),
                    Tier::Val,
                    self.allocator.clone(),
                )?);
            }
            Some(last) => {
                let idx_block =
                    segment::read_block(&self.data_dir, &self.table, Tier::Idx, last.addr, &self.pools)?;
                let idx_records = decode_idx_records(&idx_block.payload, idx_block.header.len)?;
                let last_idx_rec = idx_records.last().copied().ok_or_else(|| {
                    AppenderError::Internal(
                        "IDX block at R-IDX tail has no records".to_string(),
                    )
                })?;

                let val_block_size = VAL_BLOCK_SIZE as u32;
                let val_addr = BlockAddr {
                    seg_no: last_idx_rec.addr.seg_no,
                    seg_offset: (last_idx_rec.addr.seg_offset / val_block_size) * val_block_size,
                };
                let val_block =
                    segment::read_block(&self.data_dir, &self.table, Tier::Val, val_addr, &self.pools)?;

                self.idx_cache = Some(WriteCache::new(
                    &self.data_dir,
                    self.table.clone(),
                    Tier::Idx,
                    self.allocator.clone(),
                    last.addr,
                    idx_block,
                ));
                self.val_cache = Some(WriteCache::new(
                    &self.data_dir,
                    self.table.clone(),
                    Tier::Val,
                    self.allocator.clone(),
                    val_addr,
                    val_block,
                ));
            }
        }
        Ok(())
    }

    /// Flushes all three write caches and persists the top reference.
    /// Every flush is attempted even if an earlier one failed; the first
    /// error encountered is returned after all have been attempted.
    pub fn close(mut self) -> Result<(), AppenderError> {
        let mut first_err: Option<AppenderError> = None;

        if let Some(mut last) = self.last_ridx.take() {
            if let Err(e) = self.ridx_cache.update_tail_ridx(&mut last) {
                error!("failed to update tail R-IDX slot: {e}");
                first_err.get_or_insert(e.into());
            }
            self.last_ridx = Some(last);
        }

        if let Some(mut val_cache) = self.val_cache.take() {
            if let Err(e) = val_cache.close() {
                error!("failed to flush VAL write cache: {e}");
                first_err.get_or_insert(e.into());
            }
        }
        if let Some(mut idx_cache) = self.idx_cache.take() {
            if let Err(e) = idx_cache.close() {
                error!("failed to flush IDX write cache: {e}");
                first_err.get_or_insert(e.into());
            }
        }
        if let Err(e) = self.ridx_cache.close() {
            error!("failed to flush R-IDX write cache: {e}");
            first_err.get_or_insert(e.into());
        }

        match encoding::encode_to_vec(&self.top_ref) {
            Ok(bytes) => {
                if let Err(e) = self.metastore.put(&self.table, &self.symbol, bytes) {
                    error!("failed to persist top reference: {e}");
                    first_err.get_or_insert(e.into());
                }
            }
            Err(e) => {
                first_err.get_or_insert(e.into());
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
