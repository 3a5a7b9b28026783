//! On-disk record layouts for the time-series block store.
//!
//! Every type in this module has a fixed, hand-written little-endian layout
//! encoded through [`crate::encoding`]'s `Encode`/`Decode` traits — the same
//! wire-format discipline the rest of this crate uses, so there is never a
//! dependency-driven change to an on-disk byte. [`Tier`] is the single place
//! that knows how R-IDX, IDX, and VAL differ; everything else programs
//! against it rather than against three near-identical types.


use crate::encoding::{Decode, Encode, EncodingError};

// ------------------------------------------------------------------------------------------------
// Compile-time layout constants
// ------------------------------------------------------------------------------------------------

/// Size in bytes of one range-index (R-IDX) block, header included.
pub const RIDX_BLOCK_SIZE: usize = 8 * 1024;
/// Size in bytes of one point-index (IDX) block, header included.
pub const IDX_BLOCK_SIZE: usize = 16 * 1024;
/// Size in bytes of one value (VAL) block, header included.
pub const VAL_BLOCK_SIZE: usize = 32 * 1024;
/// Size in bytes of every segment file, regardless of tier.
pub const SEGMENT_SIZE: u64 = 256 * 1024 * 1024;

/// On-disk size of [`BlockHeader`].
pub const BLOCK_HEADER_LEN: usize = 20;
/// On-disk size of [`TsdbRangIndex`].
pub const RIDX_RECORD_LEN: usize = 28;
/// On-disk size of [`TsdbIndex`].
pub const IDX_RECORD_LEN: usize = 16;
/// On-disk size of the `u32` length prefix written by the VAL write cache.
pub const VAL_LEN_PREFIX: usize = 4;

// ------------------------------------------------------------------------------------------------
// Tier
// ------------------------------------------------------------------------------------------------

/// The three block-store tiers. They differ only in block size and whether
/// their records are length-prefixed — modeled as a method table on this
/// enum rather than as a trait-object hierarchy, per one value type for one
/// closed set of variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    RIdx,
    Idx,
    Val,
}

impl Tier {
    /// Total block size in bytes, header included.
    pub const fn block_size(self) -> usize {
        match self {
            Tier::RIdx => RIDX_BLOCK_SIZE,
            Tier::Idx => IDX_BLOCK_SIZE,
            Tier::Val => VAL_BLOCK_SIZE,
        }
    }

    /// Whether records in this tier's payload area carry their own `u32`
    /// length prefix (`true` for VAL) or are fixed-width (`false` for the
    /// two index tiers).
    pub const fn is_length_prefixed(self) -> bool {
        matches!(self, Tier::Val)
    }

    /// Fixed on-disk record size for index tiers. `None` for VAL, whose
    /// records vary with payload length.
    pub const fn fixed_record_len(self) -> Option<usize> {
        match self {
            Tier::RIdx => Some(RIDX_RECORD_LEN),
            Tier::Idx => Some(IDX_RECORD_LEN),
            Tier::Val => None,
        }
    }

    /// Segment file extension for this tier, as used in
    /// `<table>/seg_<N>.<ext>`.
    pub const fn file_ext(self) -> &'static str {
        match self {
            Tier::RIdx => "ridx",
            Tier::Idx => "idx",
            Tier::Val => "leaf",
        }
    }

    /// MetaStore key suffix for this tier's allocator counter
    /// (`tsdb.<tier>.spb`).
    pub const fn spb_key(self) -> &'static str {
        match self {
            Tier::RIdx => "tsdb.ridx.spb",
            Tier::Idx => "tsdb.idx.spb",
            Tier::Val => "tsdb.leaf.spb",
        }
    }
}

// ------------------------------------------------------------------------------------------------
// BlockAddr
// ------------------------------------------------------------------------------------------------

/// Address of one block within a tier's segment files: a segment number and
/// a block-aligned byte offset within that segment.
///
/// `seg_no == 0` is the reserved null address — no real segment is ever
/// numbered zero (the allocator starts at 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockAddr {
    pub seg_no: u32,
    pub seg_offset: u32,
}

impl BlockAddr {
    pub const ENCODED_LEN: usize = 8;
    pub const NULL: BlockAddr = BlockAddr {
        seg_no: 0,
        seg_offset: 0,
    };

    pub const fn is_null(self) -> bool {
        self.seg_no == 0
    }

    /// Rounds `self` down to the start of its enclosing block for `tier`.
    pub fn block_aligned(self, tier: Tier) -> BlockAddr {
        let block_size = tier.block_size() as u32;
        BlockAddr {
            seg_no: self.seg_no,
            seg_offset: (self.seg_offset / block_size) * block_size,
        }
    }
}

impl Encode for BlockAddr {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        self.seg_no.encode_to(buf)?;
        self.seg_offset.encode_to(buf)?;
        Ok(())
    }
}

impl Decode for BlockAddr {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let mut offset = 0;
        let (seg_no, n) = u32::decode_from(&buf[offset..])?;
        offset += n;
        let (seg_offset, n) = u32::decode_from(&buf[offset..])?;
        offset += n;
        Ok((Self { seg_no, seg_offset }, offset))
    }
}

// ------------------------------------------------------------------------------------------------
// BlockHeader
// ------------------------------------------------------------------------------------------------

/// The 20-byte header that precedes every block's payload, in every tier.
///
/// `prev`/`next` link blocks of the same series-and-tier chain; `len` is the
/// number of payload bytes currently in use. This is the sole canonical
/// layout: fields are contiguous at offsets `0, 4, 8, 12, 16`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockHeader {
    pub prev: BlockAddr,
    pub next: BlockAddr,
    pub len: u32,
}

impl BlockHeader {
    pub const ENCODED_LEN: usize = BLOCK_HEADER_LEN;
}

impl Encode for BlockHeader {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        self.prev.encode_to(buf)?;
        self.next.encode_to(buf)?;
        self.len.encode_to(buf)?;
        Ok(())
    }
}

impl Decode for BlockHeader {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let mut offset = 0;
        let (prev, n) = BlockAddr::decode_from(&buf[offset..])?;
        offset += n;
        let (next, n) = BlockAddr::decode_from(&buf[offset..])?;
        offset += n;
        let (len, n) = u32::decode_from(&buf[offset..])?;
        offset += n;
        Ok((Self { prev, next, len }, offset))
    }
}

// ------------------------------------------------------------------------------------------------
// TsdbRangIndex (R-IDX record, 28 B)
// ------------------------------------------------------------------------------------------------

/// A range-index slot: "the IDX block at `addr` covers timestamps in
/// `[low, high)`". `off` is the slot's 1-based position within its R-IDX
/// block, used to rewrite it in place as `high` grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TsdbRangIndex {
    pub low: u64,
    pub high: u64,
    pub off: u32,
    pub addr: BlockAddr,
}

impl TsdbRangIndex {
    pub const ENCODED_LEN: usize = RIDX_RECORD_LEN;

    pub fn covers(&self, key: u64) -> bool {
        self.low <= key && key < self.high
    }
}

impl Encode for TsdbRangIndex {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        self.low.encode_to(buf)?;
        self.high.encode_to(buf)?;
        self.off.encode_to(buf)?;
        self.addr.encode_to(buf)?;
        Ok(())
    }
}

impl Decode for TsdbRangIndex {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let mut offset = 0;
        let (low, n) = u64::decode_from(&buf[offset..])?;
        offset += n;
        let (high, n) = u64::decode_from(&buf[offset..])?;
        offset += n;
        let (off, n) = u32::decode_from(&buf[offset..])?;
        offset += n;
        let (addr, n) = BlockAddr::decode_from(&buf[offset..])?;
        offset += n;
        Ok((
            Self {
                low,
                high,
                off,
                addr,
            },
            offset,
        ))
    }
}

// ------------------------------------------------------------------------------------------------
// TsdbIndex (IDX record, 16 B)
// ------------------------------------------------------------------------------------------------

/// A point-index record: timestamp `key` mapped to the absolute (non-block-
/// aligned) file offset of its `TsdbValue` inside some VAL block's payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TsdbIndex {
    pub key: u64,
    pub addr: BlockAddr,
}

impl TsdbIndex {
    pub const ENCODED_LEN: usize = IDX_RECORD_LEN;
}

impl Encode for TsdbIndex {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        self.key.encode_to(buf)?;
        self.addr.encode_to(buf)?;
        Ok(())
    }
}

impl Decode for TsdbIndex {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let mut offset = 0;
        let (key, n) = u64::decode_from(&buf[offset..])?;
        offset += n;
        let (addr, n) = BlockAddr::decode_from(&buf[offset..])?;
        offset += n;
        Ok((Self { key, addr }, offset))
    }
}

// ------------------------------------------------------------------------------------------------
// TsdbValue (VAL record: u64 timestamp || payload, length lives outside)
// ------------------------------------------------------------------------------------------------

/// One appended `(timestamp, payload)` pair. The `u32` length prefix that
/// delimits a `TsdbValue` on disk is written by the VAL write cache, not by
/// this type's own encoding — `encode_value`/`decode_value` only handle the
/// `timestamp || payload` body.
pub fn encode_value(timestamp: u64, payload: &[u8]) -> Result<Vec<u8>, EncodingError> {
    let mut buf = Vec::with_capacity(8 + payload.len());
    timestamp.encode_to(&mut buf)?;
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Decodes a `TsdbValue` body (as previously produced by [`encode_value`])
/// whose exact extent is `buf`. Returns `(timestamp, payload)`.
pub fn decode_value(buf: &[u8]) -> Result<(u64, Vec<u8>), EncodingError> {
    let (timestamp, offset) = u64::decode_from(buf)?;
    Ok((timestamp, buf[offset..].to_vec()))
}

// ------------------------------------------------------------------------------------------------
// TsdbLogValue (log journal record: u32 key_len||key || u64 timestamp || payload-to-end)
// ------------------------------------------------------------------------------------------------

/// One log-journal record. `payload` runs to the end of whatever frame
/// slice it was decoded from — it carries no length of its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TsdbLogValue {
    pub key: Vec<u8>,
    pub timestamp: u64,
    pub payload: Vec<u8>,
}

impl Encode for TsdbLogValue {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        self.key.encode_to(buf)?;
        self.timestamp.encode_to(buf)?;
        buf.extend_from_slice(&self.payload);
        Ok(())
    }
}

impl Decode for TsdbLogValue {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let mut offset = 0;
        let (key, n) = Vec::<u8>::decode_from(&buf[offset..])?;
        offset += n;
        let (timestamp, n) = u64::decode_from(&buf[offset..])?;
        offset += n;
        let payload = buf[offset..].to_vec();
        let total = buf.len();
        Ok((
            Self {
                key,
                timestamp,
                payload,
            },
            total,
        ))
    }
}

// ------------------------------------------------------------------------------------------------
// BlockAloc (allocator counter, 8 B)
// ------------------------------------------------------------------------------------------------

/// The segment allocator's persisted counter for one `(table, tier)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockAloc {
    pub seg_no: u32,
    pub alloc_len: u32,
}

impl BlockAloc {
    pub const ENCODED_LEN: usize = 8;
}

impl Encode for BlockAloc {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        self.seg_no.encode_to(buf)?;
        self.alloc_len.encode_to(buf)?;
        Ok(())
    }
}

impl Decode for BlockAloc {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let mut offset = 0;
        let (seg_no, n) = u32::decode_from(&buf[offset..])?;
        offset += n;
        let (alloc_len, n) = u32::decode_from(&buf[offset..])?;
        offset += n;
        Ok((Self { seg_no, alloc_len }, offset))
    }
}

/// Decodes a fixed number of [`TsdbRangIndex`] records packed back-to-back
/// in a block's payload, stopping at `len` payload bytes in use.
pub fn decode_ridx_records(payload: &[u8], len: u32) -> Result<Vec<TsdbRangIndex>, EncodingError> {
    decode_packed::<TsdbRangIndex>(payload, len as usize, RIDX_RECORD_LEN)
}

/// Decodes a fixed number of [`TsdbIndex`] records packed back-to-back in a
/// block's payload, stopping at `len` payload bytes in use.
pub fn decode_idx_records(payload: &[u8], len: u32) -> Result<Vec<TsdbIndex>, EncodingError> {
    decode_packed::<TsdbIndex>(payload, len as usize, IDX_RECORD_LEN)
}

fn decode_packed<T: Decode>(
    payload: &[u8],
    len: usize,
    record_len: usize,
) -> Result<Vec<T>, EncodingError> {
    let count = len / record_len;
    let mut out = Vec::with_capacity(count);
    for i in 0..count {
        let start = i * record_len;
        let (rec, _) = T::decode_from(&payload[start..start + record_len])?;
        out.push(rec);
    }
    Ok(out)
}
