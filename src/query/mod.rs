//! Query reader: resolves a timestamp key to its VAL block via
//! R-IDX → IDX → VAL, then streams results forward or backward.

#[cfg(test)]
mod tests;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::encoding::{Decode, EncodingError};
use crate::format::{
    decode_idx_records, decode_ridx_records, decode_value, BlockAddr, Tier, TsdbIndex,
    TsdbRangIndex, BLOCK_HEADER_LEN, VAL_BLOCK_SIZE, VAL_LEN_PREFIX,
};
use crate::metastore::{MetaStore, MetaStoreError};
use crate::segment::{self, Block, BufferPools, SegmentError};

/// Default cap on records emitted by a single [`Query::get_between`] call.
pub const DEFAULT_LIMIT: usize = 1000;

/// Errors raised by the query reader.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("segment error: {0}")]
    Segment(#[from] SegmentError),

    #[error("MetaStore error: {0}")]
    MetaStore(#[from] MetaStoreError),

    #[error("encoding error: {0}")]
    Encoding(#[from] EncodingError),

    #[error("pagination offset regressed")]
    OffsetRegression,
}

/// Distinguishes "found data" from the two expected no-data conditions so
/// callers can't accidentally `?`-propagate an empty result as a hard
/// error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    Found(T),
    Empty,
    Eof,
}

/// Resolved position: the VAL block containing the target record, and the
/// in-payload offset of the length prefix to start reading from.
type Resolved = (BlockAddr, Block, u32);

struct BetweenState {
    low: u64,
    high: u64,
    val_block: Block,
    read_off: u32,
    offset_counter: u64,
}

/// An open query session for one `(table, symbol)` series.
pub struct Query {
    data_dir: PathBuf,
    table: String,
    symbol: String,
    pools: BufferPools,
    top_ref: Option<BlockAddr>,
    between: Option<BetweenState>,
}

impl Query {
    /// Opens a query session, resolving the series' top reference (if any)
    /// once up front.
    pub fn open(
        data_dir: impl AsRef<Path>,
        table: impl Into<String>,
        symbol: impl Into<String>,
        metastore: Arc<MetaStore>,
    ) -> Result<Self, QueryError> {
        let table = table.into();
        let symbol = symbol.into();
        let top_ref = match metastore.get(&table, &symbol)? {
            Some(bytes) => Some(BlockAddr::decode_from(&bytes)?.0),
            None => None,
        };
        Ok(Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            table,
            symbol,
            pools: BufferPools::default(),
            top_ref,
            between: None,
        })
    }

    fn find_ridx_off(records: &[TsdbRangIndex], key: u64) -> TsdbRangIndex {
        let idx = match records.binary_search_by(|r| r.low.cmp(&key)) {
            Ok(i) => i,
            Err(0) => 0,
            Err(i) => i - 1,
        };
        records[idx.min(records.len() - 1)]
    }

    fn find_idx_off(records: &[TsdbIndex], key: u64) -> TsdbIndex {
        match records.binary_search_by(|r| r.key.cmp(&key)) {
            Ok(i) => records[i],
            Err(i) => records[i.min(records.len() - 1)],
        }
    }

    /// Resolves `key` to the VAL block containing (or immediately
    /// surrounding) it, via R-IDX → IDX → VAL.
    fn find_tid_off(&self, key: u64) -> Result<Outcome<Resolved>, QueryError> {
        let top_ref = match self.top_ref {
            Some(addr) => addr,
            None => return Ok(Outcome::Empty),
        };

        let mut addr = top_ref;
        let mut block = segment::read_block(&self.data_dir, &self.table, Tier::RIdx, addr, &self.pools)?;

        loop {
            let records = decode_ridx_records(&block.payload, block.header.len)?;
            let (first, last) = match (records.first(), records.last()) {
                (Some(f), Some(l)) => (*f, *l),
                _ => return Ok(Outcome::Empty),
            };

            if key < first.low {
                return Ok(Outcome::Empty);
            }
            if key >= last.high {
                if block.header.next.is_null() {
                    return Ok(Outcome::Empty);
                }
                addr = block.header.next;
                block = segment::read_block(&self.data_dir, &self.table, Tier::RIdx, addr, &self.pools)?;
                continue;
            }

            let tridx = Self::find_ridx_off(&records, key);

            let idx_block =
                segment::read_block(&self.data_dir, &self.table, Tier::Idx, tridx.addr, &self.pools)?;
            let idx_records = decode_idx_records(&idx_block.payload, idx_block.header.len)?;
            let tidx = match idx_records.is_empty() {
                true => return Ok(Outcome::Empty),
                false => Self::find_idx_off(&idx_records, key),
            };

            let val_block_size = VAL_BLOCK_SIZE as u32;
            let val_addr = BlockAddr {
                seg_no: tidx.addr.seg_no,
                seg_offset: (tidx.addr.seg_offset / val_block_size) * val_block_size,
            };
            let read_off = (tidx.addr.seg_offset % val_block_size) - BLOCK_HEADER_LEN as u32;
            let val_block =
                segment::read_block(&self.data_dir, &self.table, Tier::Val, val_addr, &self.pools)?;

            return Ok(Outcome::Found((val_addr, val_block, read_off)));
        }
    }

    /// Decodes length-prefixed VAL records in `block` from offset 0 up to
    /// `max_off` inclusive, keeping those with `timestamp <= key` and
    /// stopping as soon as a record with `timestamp >= key` is seen.
    fn scan_upto(block: &Block, max_off: u32, key: u64) -> Result<Vec<(u64, Vec<u8>)>, QueryError> {
        let mut out = Vec::new();
        let mut off = 0u32;
        while off <= max_off && off < block.header.len {
            let o = off as usize;
            let len = u32::from_le_bytes(block.payload[o..o + VAL_LEN_PREFIX].try_into().unwrap());
            let body_start = o + VAL_LEN_PREFIX;
            let body_end = body_start + len as usize;
            let (timestamp, payload) = decode_value(&block.payload[body_start..body_end])?;
            if timestamp <= key {
                out.push((timestamp, payload));
            }
            if timestamp >= key {
                break;
            }
            off = body_end as u32;
        }
        Ok(out)
    }

    /// Returns the last `limit` records at-or-before `key`, in ascending
    /// timestamp order. `Outcome::Empty` if the series has no data at all.
    pub fn get_last_n(&mut self, key: u64, limit: usize) -> Result<Outcome<Vec<(u64, Vec<u8>)>>, QueryError> {
        // Any GetLastN resets the open GetBetween cursor (§ query reuse).
        self.between = None;

        let (_, mut val_block, read_off) = match self.find_tid_off(key)? {
            Outcome::Empty => return Ok(Outcome::Empty),
            Outcome::Eof => return Ok(Outcome::Empty),
            Outcome::Found(r) => r,
        };

        let mut results = Self::scan_upto(&val_block, read_off, key)?;

        while results.len() < limit {
            if val_block.header.prev.is_null() {
                break;
            }
            let prev_addr = val_block.header.prev;
            let prev_block =
                segment::read_block(&self.data_dir, &self.table, Tier::Val, prev_addr, &self.pools)?;
            let prev_scanned = Self::scan_upto(&prev_block, prev_block.header.len, key)?;
            results = prev_scanned.into_iter().chain(results).collect();
            val_block = prev_block;
        }

        if results.len() > limit {
            results = results.split_off(results.len() - limit);
        }

        Ok(Outcome::Found(results))
    }

    /// Returns records with `low <= timestamp <= high`, skipping the first
    /// `offset` matching records, capped at [`DEFAULT_LIMIT`] per call. A
    /// subsequent call with the same `(low, high)` continues from where the
    /// previous call stopped; a call with different bounds (or an
    /// intervening `get_last_n`) starts over.
    pub fn get_between(
        &mut self,
        low: u64,
        high: u64,
        offset: u64,
    ) -> Result<Outcome<Vec<(u64, Vec<u8>)>>, QueryError> {
        let continuing = matches!(&self.between, Some(s) if s.low == low && s.high == high);

        if continuing {
            let state = self.between.as_ref().expect("continuing implies Some");
            if offset < state.offset_counter {
                return Err(QueryError::OffsetRegression);
            }
        } else {
            let (_, val_block, read_off) = match self.find_tid_off(low)? {
                Outcome::Empty => return Ok(Outcome::Empty),
                Outcome::Eof => return Ok(Outcome::Empty),
                Outcome::Found(r) => r,
            };
            self.between = Some(BetweenState {
                low,
                high,
                val_block,
                read_off,
                offset_counter: 0,
            });
        }

        let mut results = Vec::new();
        loop {
            if results.len() >= DEFAULT_LIMIT {
                break;
            }

            let state = self.between.as_mut().expect("set above");
            if state.read_off >= state.val_block.header.len {
                if state.val_block.header.next.is_null() {
                    break;
                }
                let next_addr = state.val_block.header.next;
                let next_block =
                    segment::read_block(&self.data_dir, &self.table, Tier::Val, next_addr, &self.pools)?;
                state.val_block = next_block;
                state.read_off = 0;
                continue;
            }

            let off = state.read_off as usize;
            let len =
                u32::from_le_bytes(state.val_block.payload[off..off + VAL_LEN_PREFIX].try_into().unwrap());
            let body_start = off + VAL_LEN_PREFIX;
            let body_end = body_start + len as usize;
            let (timestamp, payload) = decode_value(&state.val_block.payload[body_start..body_end])?;
            state.read_off = body_end as u32;

            if timestamp < low {
                continue;
            }
            if timestamp > high {
                break;
            }

            if offset > state.offset_counter {
                state.offset_counter += 1;
                continue;
            }
            state.offset_counter += 1;
            results.push((timestamp, payload));
        }

        if results.is_empty() {
            Ok(Outcome::Empty)
        } else {
            Ok(Outcome::Found(results))
        }
    }
}
