//! Log journal: a simple buffered, append-only log with file rotation.
//!
//! One journal per `table`, independent of the R-IDX/IDX/VAL series store.
//! Records are buffered in memory up to one VAL-block-sized frame; on
//! overflow the frame is written as a single length-prefixed blob and a
//! fresh buffer started. This keeps the write path to one `write_all` per
//! frame rather than one per record, at the cost of losing up to one
//! frame's worth of unflushed records on crash (acceptable for a side
//! journal — the authoritative state lives in the R-IDX/IDX/VAL chain).

#[cfg(test)]
mod tests;

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

use crate::encoding::{self, Decode, Encode, EncodingError};
use crate::format::{TsdbLogValue, SEGMENT_SIZE, VAL_BLOCK_SIZE};

const LEN_PREFIX: usize = 4;

/// Errors raised by the log journal.
#[derive(Debug, Error)]
pub enum LogJournalError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("encoding error: {0}")]
    Encoding(#[from] EncodingError),

    #[error("truncated frame in {path}: expected {expected} bytes, found {found}")]
    TruncatedFrame {
        path: PathBuf,
        expected: usize,
        found: usize,
    },
}

fn file_name(table: &str, seq: u32) -> String {
    format!("{table}-{seq:04}.log")
}

fn journal_dir(data_dir: &Path, table: &str) -> PathBuf {
    data_dir.join(table).join("dlog")
}

/// Parses the `NNNN` sequence number out of a `<table>-NNNN.log` file name.
fn parse_seq(table: &str, name: &str) -> Option<u32> {
    name.strip_prefix(table)?
        .strip_prefix('-')?
        .strip_suffix(".log")?
        .parse()
        .ok()
}

/// An open append journal for one `table`.
pub struct LogJournal {
    dir: PathBuf,
    table: String,
    seq: u32,
    file: File,
    file_len: u64,
    buffer: Vec<u8>,
}

impl LogJournal {
    /// Opens the journal for `table`, appending to the highest-numbered
    /// existing file or creating `<table>-0001.log` if none exists.
    pub fn open(data_dir: impl AsRef<Path>, table: impl Into<String>) -> Result<Self, LogJournalError> {
        let table = table.into();
        let dir = journal_dir(data_dir.as_ref(), &table);
        fs::create_dir_all(&dir)?;

        let mut max_seq = 0u32;
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if let Some(name) = entry.file_name().to_str() {
                if let Some(seq) = parse_seq(&table, name) {
                    max_seq = max_seq.max(seq);
                }
            }
        }
        let seq = max_seq.max(1);

        let path = dir.join(file_name(&table, seq));
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;
        let file_len = file.metadata()?.len();

        debug!(table = %table, seq, path = %path.display(), "log journal opened");

        Ok(Self {
            dir,
            table,
            seq,
            file,
            file_len,
            buffer: Vec::with_capacity(VAL_BLOCK_SIZE),
        })
    }

    /// Appends one record. Buffered until a frame fills or [`Self::close`]
    /// is called.
    pub fn append(&mut self, key: &[u8], timestamp: u64, payload: &[u8]) -> Result<(), LogJournalError> {
        let value = TsdbLogValue {
            key: key.to_vec(),
            timestamp,
            payload: payload.to_vec(),
        };
        let mut record_bytes = Vec::new();
        encoding::Encode::encode_to(&value, &mut record_bytes)?;

        let mut framed = Vec::with_capacity(LEN_PREFIX + record_bytes.len());
        (record_bytes.len() as u32).encode_to(&mut framed)?;
        framed.extend_from_slice(&record_bytes);

        if !self.buffer.is_empty() && self.buffer.len() + framed.len() > VAL_BLOCK_SIZE {
            self.flush_frame()?;
        }
        self.buffer.extend_from_slice(&framed);
        Ok(())
    }

    /// Writes the current buffer as one length-prefixed frame, rotating to
    /// a new file first if it would push the current file past
    /// [`SEGMENT_SIZE`].
    fn flush_frame(&mut self) -> Result<(), LogJournalError> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let frame_total = (LEN_PREFIX + self.buffer.len()) as u64;
        if self.file_len + frame_total > SEGMENT_SIZE {
            self.rotate()?;
        }

        let mut frame = Vec::with_capacity(frame_total as usize);
        (self.buffer.len() as u32).encode_to(&mut frame)?;
        frame.extend_from_slice(&self.buffer);

        self.file.write_all(&frame)?;
        self.file.sync_all()?;
        self.file_len += frame.len() as u64;
        self.buffer.clear();
        Ok(())
    }

    fn rotate(&mut self) -> Result<(), LogJournalError> {
        self.seq += 1;
        let path = self.dir.join(file_name(&self.table, self.seq));
        self.file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;
        self.file_len = 0;
        debug!(table = %self.table, seq = self.seq, "log journal rotated");
        Ok(())
    }

    /// Flushes any buffered partial frame.
    pub fn close(mut self) -> Result<(), LogJournalError> {
        self.flush_frame()
    }

    /// Replays every record across every file of this table's journal, in
    /// file and frame order, invoking `cb` for each. `cb` returning an
    /// error aborts iteration and is propagated to the caller.
    pub fn for_each<F>(data_dir: impl AsRef<Path>, table: &str, mut cb: F) -> Result<(), LogJournalError>
    where
        F: FnMut(TsdbLogValue) -> Result<(), LogJournalError>,
    {
        let dir = journal_dir(data_dir.as_ref(), table);
        if !dir.exists() {
            return Ok(());
        }

        let mut seqs: Vec<u32> = fs::read_dir(&dir)?
            .filter_map(|e| e.ok())
            .filter_map(|e| e.file_name().to_str().and_then(|n| parse_seq(table, n)))
            .collect();
        seqs.sort_unstable();

        for seq in seqs {
            let path = dir.join(file_name(table, seq));
            let mut file = File::open(&path)?;
            loop {
                let mut len_buf = [0u8; LEN_PREFIX];
                match file.read_exact(&mut len_buf) {
                    Ok(()) => {}
                    Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                    Err(e) => return Err(e.into()),
                }
                let (frame_len, _) = u32::decode_from(&len_buf)?;
                let mut frame = vec![0u8; frame_len as usize];
                if let Err(e) = file.read_exact(&mut frame) {
                    if e.kind() == io::ErrorKind::UnexpectedEof {
                        warn!(path = %path.display(), "log journal frame truncated, stopping replay");
                        break;
                    }
                    return Err(e.into());
                }

                let mut off = 0usize;
                while off < frame.len() {
                    if off + LEN_PREFIX > frame.len() {
                        return Err(LogJournalError::TruncatedFrame {
                            path: path.clone(),
                            expected: LEN_PREFIX,
                            found: frame.len() - off,
                        });
                    }
                    let (record_len, n) = u32::decode_from(&frame[off..])?;
                    off += n;
                    let record_len = record_len as usize;
                    if off + record_len > frame.len() {
                        return Err(LogJournalError::TruncatedFrame {
                            path: path.clone(),
                            expected: record_len,
                            found: frame.len() - off,
                        });
                    }
                    let (value, _) = TsdbLogValue::decode_from(&frame[off..off + record_len])?;
                    off += record_len;
                    cb(value)?;
                }
            }
        }
        Ok(())
    }
}
