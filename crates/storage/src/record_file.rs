//! Append-only record file.
//!
//! A record file owns one on-disk file of back-to-back stored entries
//! (see [`crate::format::entry`]). Appends go to the end of the file; reads
//! start at any entry position and scan forward.
//!
//! # Safe Read Limit
//!
//! The file tracks two ends. `append` writes past the readable end and moves
//! only the write end; `commit` then publishes everything written so far.
//! Readers never look past the readable end, so they observe neither a
//! partially written entry nor one whose owner may still cut it back.
//!
//! # Failure Policy
//!
//! I/O errors surface unmodified. A failed append truncates the file back to
//! its previous end, and an appended but uncommitted entry can be discarded
//! with `truncate` without any reader having seen it.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use gregor_core::{Error, Limits, Result};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::format::{encode_entry, EntryHeader, Record, StoredRecord, ENTRY_HEADER_LEN};
use crate::positional::{read_exact_at, write_all_at};

/// Durable append-only store of stored record entries.
///
/// Thread safety: implementations must allow reads concurrently with an
/// append. Appends themselves are serialized by the owning segment.
pub trait RecordStore: Send + Sync {
    /// Path of the backing file.
    fn path(&self) -> &Path;

    /// Write `record` under `offset`; returns the byte position of the entry.
    ///
    /// The entry stays invisible to readers until [`commit`](Self::commit).
    fn append(&self, offset: u64, record: &Record) -> Result<u64>;

    /// Publish every appended entry to readers.
    fn commit(&self);

    /// Read the single entry starting at `position`.
    ///
    /// Returns `Ok(None)` when `position` is at (or past) the readable end.
    fn read_entry(&self, position: u64) -> Result<Option<StoredRecord>>;

    /// Readable size of the file in bytes.
    fn size(&self) -> u64;

    /// Cut the file back to `position`, discarding every entry at or after it,
    /// committed or not.
    fn truncate(&self, position: u64) -> Result<()>;

    /// Force written entries to durable storage.
    fn sync(&self) -> Result<()>;

    /// Release the file handle and remove the file from storage.
    fn delete(self: Box<Self>) -> Result<()>;

    /// Read up to `max_count` entries starting at `position`.
    ///
    /// Stops at the readable end, after `max_count` entries, or before an
    /// entry that would push the framed bytes read past `max_bytes`. The first
    /// entry is always returned so that a small budget still makes progress.
    /// A decode error aborts the whole batch.
    fn read_from(
        &self,
        position: u64,
        max_count: usize,
        max_bytes: u64,
    ) -> Result<Vec<StoredRecord>> {
        let mut records = Vec::new();
        let mut position = position;
        let mut consumed = 0u64;

        while records.len() < max_count {
            let Some(stored) = self.read_entry(position)? else {
                break;
            };

            let entry_len = stored.entry_len();
            if !records.is_empty() && consumed + entry_len > max_bytes {
                break;
            }

            consumed += entry_len;
            position += entry_len;
            records.push(stored);
        }

        Ok(records)
    }
}

/// [`RecordStore`] backed by a single file.
pub struct RecordFile {
    /// File handle (positional reads and writes only)
    file: File,

    /// Path to the record file
    path: PathBuf,

    /// Size limits for records
    limits: Limits,

    /// Current end of file; held for the duration of a write
    write_end: Mutex<u64>,

    /// Safe read limit, advanced only by `commit`
    readable_end: AtomicU64,
}

impl RecordFile {
    /// Open or create a record file.
    ///
    /// Existing content is kept so a log can be restored after restart.
    pub fn open(path: impl AsRef<Path>, limits: Limits) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)?;

        let end = file.metadata()?.len();
        debug!(path = %path.display(), size = end, "Opened record file");

        Ok(RecordFile {
            file,
            path,
            limits,
            write_end: Mutex::new(end),
            readable_end: AtomicU64::new(end),
        })
    }

    /// Limits this file enforces.
    pub fn limits(&self) -> &Limits {
        &self.limits
    }
}

impl RecordStore for RecordFile {
    fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, offset: u64, record: &Record) -> Result<u64> {
        let entry = encode_entry(offset, record, &self.limits)?;

        let mut end = self.write_end.lock();
        let position = *end;

        if let Err(e) = write_all_at(&self.file, &entry, position) {
            // Drop whatever part of the entry reached the file
            if let Err(undo) = self.file.set_len(position) {
                warn!(
                    path = %self.path.display(),
                    position,
                    error = %undo,
                    "Failed to roll back partial record write"
                );
            }
            return Err(e.into());
        }

        *end = position + entry.len() as u64;
        Ok(position)
    }

    fn commit(&self) {
        let end = self.write_end.lock();
        self.readable_end.store(*end, Ordering::Release);
    }

    fn read_entry(&self, position: u64) -> Result<Option<StoredRecord>> {
        let limit = self.readable_end.load(Ordering::Acquire);
        if position >= limit {
            return Ok(None);
        }

        let available = limit - position;
        if available < ENTRY_HEADER_LEN as u64 {
            return Err(Error::TruncatedEntry {
                position,
                needed: ENTRY_HEADER_LEN as u64,
                available,
            });
        }

        let mut header_bytes = [0u8; ENTRY_HEADER_LEN];
        read_exact_at(&self.file, &mut header_bytes, position)?;
        let header = EntryHeader::from_bytes(&header_bytes);

        self.limits
            .check_record_size(header.length as usize, Some(header.offset))?;

        if header.entry_len() > available {
            return Err(Error::TruncatedEntry {
                position,
                needed: header.entry_len(),
                available,
            });
        }

        let mut body = vec![0u8; header.length as usize];
        read_exact_at(&self.file, &mut body, position + ENTRY_HEADER_LEN as u64)?;

        StoredRecord::decode(&header, &body).map(Some)
    }

    fn size(&self) -> u64 {
        self.readable_end.load(Ordering::Acquire)
    }

    fn truncate(&self, position: u64) -> Result<()> {
        let mut end = self.write_end.lock();
        if position >= *end {
            return Ok(());
        }

        // Shrink the readable window first so no reader chases removed bytes
        self.readable_end.store(position, Ordering::Release);
        self.file.set_len(position)?;
        *end = position;
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        self.file.sync_data()?;
        Ok(())
    }

    fn delete(self: Box<Self>) -> Result<()> {
        let path = self.path.clone();
        drop(self);
        fs::remove_file(&path)?;
        debug!(path = %path.display(), "Deleted record file");
        Ok(())
    }
}
