//! Write cache: the tail block of one tier, for one open series.
//!
//! Buffers exactly one block in memory while it fills up. On overflow it
//! allocates a fresh block, links the old one to it via `next`, and writes
//! the old block out — [`WriteCache::roll_over`]. The two tier "flavours"
//! (length-prefixed VAL records vs. fixed-width index records) are handled
//! by one type parameterised over [`Tier`], per this crate's
//! method-table-over-subclass-hierarchy convention.

#[cfg(test)]
mod tests;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, trace};

use crate::allocator::{Allocator, AllocatorError};
use crate::encoding::{self, EncodingError};
use crate::format::{
    BlockAddr, Tier, TsdbRangIndex, BLOCK_HEADER_LEN, RIDX_RECORD_LEN, VAL_LEN_PREFIX,
};
use crate::segment::{self, Block, SegmentError};

/// Errors raised by a [`WriteCache`].
#[derive(Debug, Error)]
pub enum WriteCacheError {
    #[error("segment error: {0}")]
    Segment(#[from] SegmentError),

    #[error("allocator error: {0}")]
    Allocator(#[from] AllocatorError),

    #[error("encoding error: {0}")]
    Encoding(#[from] EncodingError),

    #[error("record of {record_len} bytes exceeds block payload capacity of {capacity} bytes")]
    TooLong { record_len: usize, capacity: usize },
}

/// Buffers the tail block of `tier` for one `(table, series)` while it is
/// being appended to.
pub struct WriteCache {
    data_dir: PathBuf,
    table: String,
    tier: Tier,
    allocator: Arc<Allocator>,
    addr: BlockAddr,
    block: Block,
}

impl WriteCache {
    /// Wraps an already-resolved `(addr, block)` pair as the tail of
    /// `tier`'s chain.
    pub fn new(
        data_dir: impl AsRef<Path>,
        table: impl Into<String>,
        tier: Tier,
        allocator: Arc<Allocator>,
        addr: BlockAddr,
        block: Block,
    ) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            table: table.into(),
            tier,
            allocator,
            addr,
            block,
        }
    }

    /// Allocates a brand-new, empty tail block (no predecessor).
    pub fn new_head(
        data_dir: impl AsRef<Path>,
        table: impl Into<String>,
        tier: Tier,
        allocator: Arc<Allocator>,
    ) -> Result<Self, WriteCacheError> {
        let table = table.into();
        let addr = allocator.alloc(&table, tier)?;
        let block = Block::empty(tier, BlockAddr::NULL);
        Ok(Self::new(data_dir, table, tier, allocator, addr, block))
    }

    /// The address of the block currently buffered in memory.
    pub fn addr(&self) -> BlockAddr {
        self.addr
    }

    /// The block currently buffered in memory.
    pub fn block(&self) -> &Block {
        &self.block
    }

    fn capacity(&self) -> usize {
        self.tier.block_size() - BLOCK_HEADER_LEN
    }

    /// Appends one record's bytes to the tail block, rolling over to a
    /// fresh block first if the current one lacks room. For
    /// [`Tier::is_length_prefixed`] tiers a `u32` length prefix precedes
    /// `record_bytes`. Returns the absolute file address the record (or,
    /// for VAL, its length prefix) was written at.
    pub fn append(&mut self, record_bytes: &[u8]) -> Result<BlockAddr, WriteCacheError> {
        let prefix_len = if self.tier.is_length_prefixed() {
            VAL_LEN_PREFIX
        } else {
            0
        };
        let total_len = prefix_len + record_bytes.len();
        let capacity = self.capacity();

        if total_len > capacity {
            return Err(WriteCacheError::TooLong {
                record_len: total_len,
                capacity,
            });
        }

        if self.block.header.len as usize + total_len > capacity {
            self.roll_over()?;
        }

        let old_len = self.block.header.len as usize;
        if prefix_len > 0 {
            let len_prefix = (record_bytes.len() as u32).to_le_bytes();
            self.block.payload[old_len..old_len + VAL_LEN_PREFIX].copy_from_slice(&len_prefix);
            self.block.payload[old_len + VAL_LEN_PREFIX..old_len + total_len]
                .copy_from_slice(record_bytes);
        } else {
            self.block.payload[old_len..old_len + total_len].copy_from_slice(record_bytes);
        }
        self.block.header.len += total_len as u32;

        Ok(BlockAddr {
            seg_no: self.addr.seg_no,
            seg_offset: self.addr.seg_offset + BLOCK_HEADER_LEN as u32 + old_len as u32,
        })
    }

    /// Allocates a fresh block, writes out the current one with its `next`
    /// pointer set to the new block, and makes the new block current. The
    /// new block's `prev` is the address of the block just written out —
    /// never its own address.
    fn roll_over(&mut self) -> Result<(), WriteCacheError> {
        let new_addr = self.allocator.alloc(&self.table, self.tier)?;
        self.block.header.next = new_addr;
        segment::write_block(&self.data_dir, &self.table, self.tier, self.addr, &self.block)?;

        let old_addr = self.addr;
        self.block = Block::empty(self.tier, old_addr);
        self.addr = new_addr;

        debug!(table = %self.table, tier = ?self.tier, old = ?old_addr, new = ?new_addr, "write cache rolled over");
        Ok(())
    }

    /// Rewrites the last-written R-IDX slot in place (assigning a fresh
    /// 1-based `off` on first use) so `high` can keep growing while the
    /// IDX block it summarises is still being filled. Valid only on a
    /// [`Tier::RIdx`] cache.
    pub fn update_tail_ridx(&mut self, record: &mut TsdbRangIndex) -> Result<(), WriteCacheError> {
        debug_assert_eq!(self.tier, Tier::RIdx);

        if record.off == 0 {
            record.off = (self.block.header.len / RIDX_RECORD_LEN as u32) + 1;
            let needs_new_slot_room =
                RIDX_RECORD_LEN + self.block.header.len as usize + BLOCK_HEADER_LEN
                    > self.tier.block_size();
            if needs_new_slot_room {
                self.roll_over()?;
                record.off = 1;
            }
        }

        let in_block_offset = ((record.off - 1) * RIDX_RECORD_LEN as u32) as usize;
        let encoded = encoding::encode_to_vec(record)?;
        debug_assert_eq!(encoded.len(), RIDX_RECORD_LEN);

        if in_block_offset == self.block.header.len as usize {
            self.block.payload[in_block_offset..in_block_offset + RIDX_RECORD_LEN]
                .copy_from_slice(&encoded);
            self.block.header.len += RIDX_RECORD_LEN as u32;
            trace!(off = record.off, "R-IDX slot appended");
        } else {
            self.block.payload[in_block_offset..in_block_offset + RIDX_RECORD_LEN]
                .copy_from_slice(&encoded);
            trace!(off = record.off, "R-IDX slot rewritten in place");
        }

        Ok(())
    }

    /// Writes the current block to disk.
    pub fn close(&mut self) -> Result<(), WriteCacheError> {
        segment::write_block(&self.data_dir, &self.table, self.tier, self.addr, &self.block)
    }
}
