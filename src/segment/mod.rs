//! Segment file manager.
//!
//! A *segment* is a fixed-size (256 MiB) file holding many fixed-size blocks
//! of one [`Tier`] for one table: `<dir>/<table>/seg_<N>.<ext>`. This module
//! owns the only code that touches those files: creating/growing them,
//! and reading or writing one block at a block-aligned offset.
//!
//! No segment file handle is kept open between calls — each [`read_block`]
//! or [`write_block`] opens the file, does the I/O via `read_at`/`write_at`,
//! and closes it, so many concurrently-open series don't pressure the
//! process's file-descriptor table.


use std::fs::{self, File, OpenOptions};
use std::io;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;
use tracing::{debug, trace};

use crate::encoding::{self, Decode, EncodingError};
use crate::format::{BlockAddr, BlockHeader, Tier, SEGMENT_SIZE};

/// Errors raised by the segment file manager.
#[derive(Debug, Error)]
pub enum SegmentError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("encoding error: {0}")]
    Encoding(#[from] EncodingError),

    #[error("address {seg_offset} is not aligned to the {tier:?} block size ({block_size})")]
    AlignmentError {
        seg_offset: u32,
        block_size: usize,
        tier: Tier,
    },
}

/// An in-memory block: a decoded [`BlockHeader`] plus its payload bytes.
/// `payload.len()` is always `tier.block_size() - BLOCK_HEADER_LEN`, the
/// block's full capacity — `header.len` tracks how much of it is in use.
#[derive(Debug, Clone)]
pub struct Block {
    pub header: BlockHeader,
    pub payload: Vec<u8>,
}

impl Block {
    /// A freshly-allocated, empty block linking back to `prev` (or null for
    /// a head block).
    pub fn empty(tier: Tier, prev: BlockAddr) -> Self {
        Self {
            header: BlockHeader {
                prev,
                next: BlockAddr::NULL,
                len: 0,
            },
            payload: vec![0u8; tier.block_size() - crate::format::BLOCK_HEADER_LEN],
        }
    }
}

fn check_alignment(addr: BlockAddr, tier: Tier) -> Result<(), SegmentError> {
    let block_size = tier.block_size();
    if addr.seg_offset as usize % block_size != 0 {
        return Err(SegmentError::AlignmentError {
            seg_offset: addr.seg_offset,
            block_size,
            tier,
        });
    }
    Ok(())
}

/// Path of the segment file holding `seg_no` for `(table, tier)`.
pub fn segment_path(dir: &Path, table: &str, tier: Tier, seg_no: u32) -> PathBuf {
    dir.join(table)
        .join(format!("seg_{seg_no}.{}", tier.file_ext()))
}

/// Creates the segment file for `(table, tier, seg_no)` if it doesn't
/// already exist, and ensures it is truncated to exactly [`SEGMENT_SIZE`]
/// bytes (zero-filled by the filesystem on extension).
pub fn open_or_create_segment(
    dir: &Path,
    table: &str,
    tier: Tier,
    seg_no: u32,
) -> Result<(), SegmentError> {
    let table_dir = dir.join(table);
    fs::create_dir_all(&table_dir)?;

    let path = segment_path(dir, table, tier, seg_no);
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .open(&path)?;

    if file.metadata()?.len() != SEGMENT_SIZE {
        file.set_len(SEGMENT_SIZE)?;
        file.sync_all()?;
        debug!(path = %path.display(), size = SEGMENT_SIZE, "segment file created");
    }

    Ok(())
}

/// Reads exactly one block of `tier` at `addr`, decoding its header and
/// materialising the payload slice. Returns [`SegmentError::AlignmentError`]
/// if `addr.seg_offset` is not block-aligned.
pub fn read_block(
    dir: &Path,
    table: &str,
    tier: Tier,
    addr: BlockAddr,
    pools: &BufferPools,
) -> Result<Block, SegmentError> {
    check_alignment(addr, tier)?;

    let path = segment_path(dir, table, tier, addr.seg_no);
    let file = File::open(&path)?;

    let mut lease = pools.lease(tier);
    file.read_exact_at(&mut lease, u64::from(addr.seg_offset))?;

    let (header, n) = BlockHeader::decode_from(&lease)?;
    let payload = lease[n..].to_vec();

    trace!(?addr, tier = ?tier, len = header.len, "block read");
    Ok(Block { header, payload })
}

/// Writes `block`'s header and payload to `addr` in `tier`'s segment file.
/// Returns [`SegmentError::AlignmentError`] if `addr.seg_offset` is not
/// block-aligned.
pub fn write_block(
    dir: &Path,
    table: &str,
    tier: Tier,
    addr: BlockAddr,
    block: &Block,
) -> Result<(), SegmentError> {
    check_alignment(addr, tier)?;

    let path = segment_path(dir, table, tier, addr.seg_no);
    let file = OpenOptions::new().write(true).open(&path)?;

    let mut buf = encoding::encode_to_vec(&block.header)?;
    buf.extend_from_slice(&block.payload);
    debug_assert_eq!(buf.len(), tier.block_size());

    file.write_all_at(&buf, u64::from(addr.seg_offset))?;

    trace!(?addr, tier = ?tier, len = block.header.len, "block written");
    Ok(())
}

// ------------------------------------------------------------------------------------------------
// Buffer pools
// ------------------------------------------------------------------------------------------------

/// One pool of block-sized byte buffers per tier, used to avoid a fresh
/// allocation on every [`read_block`]. Purely a performance optimisation —
/// correctness holds identically without it (a miss just allocates fresh).
///
/// Modeled as a scoped-lease object: [`BufferPools::lease`] returns a
/// [`Lease`] whose buffer is returned to the pool on `Drop`.
pub struct BufferPools {
    ridx: Mutex<Vec<Vec<u8>>>,
    idx: Mutex<Vec<Vec<u8>>>,
    val: Mutex<Vec<Vec<u8>>>,
}

impl Default for BufferPools {
    fn default() -> Self {
        Self {
            ridx: Mutex::new(Vec::new()),
            idx: Mutex::new(Vec::new()),
            val: Mutex::new(Vec::new()),
        }
    }
}

impl BufferPools {
    fn pool_for(&self, tier: Tier) -> &Mutex<Vec<Vec<u8>>> {
        match tier {
            Tier::RIdx => &self.ridx,
            Tier::Idx => &self.idx,
            Tier::Val => &self.val,
        }
    }

    /// Borrows a block-sized buffer for `tier`, zero-filled, reusing a
    /// pooled one if available.
    pub fn lease(&self, tier: Tier) -> Lease<'_> {
        let block_size = tier.block_size();
        let mut buf = self
            .pool_for(tier)
            .lock()
            .ok()
            .and_then(|mut pool| pool.pop())
            .unwrap_or_default();
        buf.clear();
        buf.resize(block_size, 0);
        Lease {
            pools: self,
            tier,
            buf: Some(buf),
        }
    }

    fn give_back(&self, tier: Tier, buf: Vec<u8>) {
        if let Ok(mut pool) = self.pool_for(tier).lock() {
            pool.push(buf);
        }
    }
}

/// A leased block-sized buffer, returned to its [`BufferPools`] on drop.
pub struct Lease<'a> {
    pools: &'a BufferPools,
    tier: Tier,
    buf: Option<Vec<u8>>,
}

impl std::ops::Deref for Lease<'_> {
    type Target = Vec<u8>;
    fn deref(&self) -> &Vec<u8> {
        self.buf.as_ref().expect("lease buffer taken")
    }
}

impl std::ops::DerefMut for Lease<'_> {
    fn deref_mut(&mut self) -> &mut Vec<u8> {
        self.buf.as_mut().expect("lease buffer taken")
    }
}

impl Drop for Lease<'_> {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.pools.give_back(self.tier, buf);
        }
    }
}
