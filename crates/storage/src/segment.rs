//! Log segments.
//!
//! A segment binds one record file to one offset index and owns offset
//! assignment for the span of the log it covers. Segments are named after
//! their base offset:
//!
//! ```text
//! log_dir/
//!   00000000000000000000.log     # record file, base offset 0
//!   00000000000000000000.index   # offset index for it
//!   00000000000000001024.log     # next segment, base offset 1024
//!   00000000000000001024.index
//! ```
//!
//! # Append Atomicity
//!
//! Offset assignment, the record write, the index update, and any policy sync
//! run under a single writer lock. The entry is committed to readers only
//! after every step has succeeded. If any step fails the record file and the
//! index are cut back to where they were and the offset is not consumed.
//!
//! # State Machine
//!
//! `Open → Flushing → Open` while syncing, `Open → Closed` on close, and
//! deletion consumes the segment. Reads are allowed in every state.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use gregor_core::{Error, Result};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::config::{LogConfig, SyncPolicy};
use crate::format::{Record, StoredRecord};
use crate::offset_index::{FileOffsetIndex, OffsetIndex};
use crate::record_file::{RecordFile, RecordStore};

/// Extension of record files
pub const LOG_FILE_SUFFIX: &str = "log";

/// Extension of offset index files
pub const INDEX_FILE_SUFFIX: &str = "index";

/// Lifecycle state of a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentState {
    /// Accepting appends and reads
    Open,
    /// A sync is in progress; appends are still accepted
    Flushing,
    /// No further appends
    Closed,
}

/// The unit of log rotation.
pub trait LogSegment: Send + Sync {
    /// First offset this segment covers.
    fn base_offset(&self) -> u64;

    /// Offset the next append will receive.
    fn next_offset(&self) -> u64;

    /// Record file size in bytes.
    fn size(&self) -> u64;

    /// Current lifecycle state.
    fn state(&self) -> SegmentState;

    /// Append a record and return the offset assigned to it.
    fn append(&self, record: &Record) -> Result<u64>;

    /// Read up to `max_count` records with `start_offset ≤ offset ≤ max_offset`.
    ///
    /// At most `max_bytes` of framed entries are returned, except that the
    /// first qualifying entry is always included.
    fn read(
        &self,
        start_offset: u64,
        max_offset: u64,
        max_count: usize,
        max_bytes: u64,
    ) -> Result<Vec<StoredRecord>>;

    /// Force appended records to durable storage.
    fn sync(&self) -> Result<()>;

    /// Sync, then refuse further appends. Waits for an in-flight append.
    fn close(&self) -> Result<()>;

    /// Time of the last successful append.
    fn last_modified(&self) -> Option<SystemTime>;

    /// Time of the last successful sync.
    fn last_flush_time(&self) -> Option<SystemTime>;

    /// Remove the record file and the index together.
    fn delete(self: Box<Self>) -> Result<()>;
}

/// Generate the record file path for a segment.
///
/// Format: `NNNNNNNNNNNNNNNNNNNN.log` where N is the zero-padded base offset.
pub fn log_path(dir: &Path, base_offset: u64) -> PathBuf {
    dir.join(format!("{:020}.{}", base_offset, LOG_FILE_SUFFIX))
}

/// Generate the index file path for a segment.
pub fn index_path(dir: &Path, base_offset: u64) -> PathBuf {
    dir.join(format!("{:020}.{}", base_offset, INDEX_FILE_SUFFIX))
}

/// Extract the base offset from a record file name.
pub fn parse_base_offset(file_name: &str) -> Option<u64> {
    let stem = file_name.strip_suffix(LOG_FILE_SUFFIX)?.strip_suffix('.')?;
    if stem.len() != 20 || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    stem.parse().ok()
}

/// Writer-side bookkeeping, guarded by the append lock.
struct WriterState {
    /// Offset the next append receives
    next_offset: u64,
    /// Appends since the last indexed entry
    since_index: u64,
    /// Appends since the last sync
    unsynced: u64,
}

#[derive(Default)]
struct SegmentTimes {
    last_modified: Option<SystemTime>,
    last_flush: Option<SystemTime>,
}

/// Segment composed of a [`RecordStore`] and an [`OffsetIndex`].
pub struct Segment {
    /// First offset in this segment
    base_offset: u64,

    /// Record file
    store: Box<dyn RecordStore>,

    /// Offset index; read-locked by lookups, write-locked by the appender
    index: RwLock<Box<dyn OffsetIndex>>,

    /// Append lock
    writer: Mutex<WriterState>,

    /// Published next offset, readable without the append lock
    next_offset: AtomicU64,

    /// Lifecycle state
    state: Mutex<SegmentState>,

    /// Index one entry every N appends
    index_interval: u64,

    /// When appends are synced
    sync_policy: SyncPolicy,

    /// Metadata timestamps for rollover policy
    times: Mutex<SegmentTimes>,
}

impl Segment {
    /// Open (or create) the segment with `base_offset` in `dir`.
    ///
    /// Existing files are recovered: a stale index is rebuilt and a torn or
    /// corrupt tail is truncated.
    pub fn open(dir: &Path, base_offset: u64, config: &LogConfig) -> Result<Self> {
        let store = RecordFile::open(log_path(dir, base_offset), config.limits())?;
        let index = FileOffsetIndex::open(index_path(dir, base_offset))?;

        let last_modified = std::fs::metadata(store.path())
            .and_then(|m| m.modified())
            .ok()
            .filter(|_| store.size() > 0);

        let segment = Self::with_parts(base_offset, Box::new(store), Box::new(index), config)?;
        segment.times.lock().last_modified = last_modified;
        Ok(segment)
    }

    /// Assemble a segment from its parts and recover its state.
    pub fn with_parts(
        base_offset: u64,
        store: Box<dyn RecordStore>,
        index: Box<dyn OffsetIndex>,
        config: &LogConfig,
    ) -> Result<Self> {
        let segment = Segment {
            base_offset,
            store,
            index: RwLock::new(index),
            writer: Mutex::new(WriterState {
                next_offset: base_offset,
                since_index: 0,
                unsynced: 0,
            }),
            next_offset: AtomicU64::new(base_offset),
            state: Mutex::new(SegmentState::Open),
            index_interval: config.index_interval.max(1),
            sync_policy: config.sync_policy,
            times: Mutex::new(SegmentTimes::default()),
        };

        segment.recover()?;
        Ok(segment)
    }

    /// Rebuild the next offset (and, if needed, the index) from the record file.
    fn recover(&self) -> Result<()> {
        let mut writer = self.writer.lock();
        let mut index = self.index.write();

        // Resume after the last indexed entry, or rebuild from the start
        let (mut position, mut last_offset) = match self.validated_tail(index.as_ref())? {
            Some((offset, next_position)) => (next_position, Some(offset)),
            None => {
                if !index.is_empty() {
                    warn!(
                        base_offset = self.base_offset,
                        entries = index.len(),
                        "Offset index is stale, rebuilding from record file"
                    );
                    index.truncate_to_position(0)?;
                }
                (0, None)
            }
        };

        let mut since_index = 0u64;
        loop {
            let stored = match self.store.read_entry(position) {
                Ok(Some(stored)) => stored,
                Ok(None) => break,
                Err(e) if e.is_corruption() => {
                    warn!(
                        base_offset = self.base_offset,
                        position,
                        discarded = self.store.size() - position,
                        error = %e,
                        "Truncating corrupt record file tail"
                    );
                    self.store.truncate(position)?;
                    index.truncate_to_position(position)?;
                    break;
                }
                Err(e) => return Err(e),
            };

            let in_order = match last_offset {
                Some(last) => stored.offset > last,
                None => stored.offset >= self.base_offset,
            };
            if !in_order {
                warn!(
                    base_offset = self.base_offset,
                    position,
                    offset = stored.offset,
                    "Offset regression in record file, truncating"
                );
                self.store.truncate(position)?;
                index.truncate_to_position(position)?;
                break;
            }

            if index.is_empty() || since_index + 1 >= self.index_interval {
                index.index(stored.offset, position)?;
                since_index = 0;
            } else {
                since_index += 1;
            }

            last_offset = Some(stored.offset);
            position += stored.entry_len();
        }

        let next = last_offset.map_or(self.base_offset, |o| o + 1);
        writer.next_offset = next;
        writer.since_index = since_index;
        self.next_offset.store(next, Ordering::Release);

        debug!(
            base_offset = self.base_offset,
            next_offset = next,
            size = self.store.size(),
            index_entries = index.len(),
            "Recovered segment"
        );
        Ok(())
    }

    /// The last index entry's offset and the position just past it, if the
    /// entry still points at a decodable record with the indexed offset.
    fn validated_tail(&self, index: &dyn OffsetIndex) -> Result<Option<(u64, u64)>> {
        let Some(last) = index.last_entry() else {
            return Ok(None);
        };
        if last.offset < self.base_offset || last.position >= self.store.size() {
            return Ok(None);
        }

        match self.store.read_entry(last.position) {
            Ok(Some(stored)) if stored.offset == last.offset => {
                Ok(Some((last.offset, last.position + stored.entry_len())))
            }
            Ok(_) => Ok(None),
            Err(e) if e.is_corruption() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Cut the record file and index back to `position` after a failed append.
    fn roll_back(&self, index: &mut dyn OffsetIndex, position: u64) {
        if let Err(e) = index.truncate_to_position(position) {
            warn!(base_offset = self.base_offset, position, error = %e, "Failed to roll back index");
        }
        if let Err(e) = self.store.truncate(position) {
            warn!(base_offset = self.base_offset, position, error = %e, "Failed to roll back record file");
        }
    }

    fn sync_parts(&self) -> Result<()> {
        self.store.sync()?;
        self.index.read().sync()?;
        self.times.lock().last_flush = Some(SystemTime::now());
        Ok(())
    }

    /// Sync both files, reporting `Flushing` while the sync runs.
    fn flush_files(&self) -> Result<()> {
        {
            let mut state = self.state.lock();
            if *state == SegmentState::Open {
                *state = SegmentState::Flushing;
            }
        }

        let result = self.sync_parts();

        let mut state = self.state.lock();
        if *state == SegmentState::Flushing {
            *state = SegmentState::Open;
        }
        result
    }
}

impl LogSegment for Segment {
    fn base_offset(&self) -> u64 {
        self.base_offset
    }

    fn next_offset(&self) -> u64 {
        self.next_offset.load(Ordering::Acquire)
    }

    fn size(&self) -> u64 {
        self.store.size()
    }

    fn state(&self) -> SegmentState {
        *self.state.lock()
    }

    fn append(&self, record: &Record) -> Result<u64> {
        let mut writer = self.writer.lock();
        if self.state() == SegmentState::Closed {
            return Err(Error::SegmentClosed {
                base_offset: self.base_offset,
            });
        }

        let offset = writer.next_offset;
        let position = self.store.append(offset, record)?;

        let mut index = self.index.write();
        let should_index = index.is_empty() || writer.since_index + 1 >= self.index_interval;
        if should_index {
            if let Err(e) = index.index(offset, position) {
                self.roll_back(index.as_mut(), position);
                return Err(e);
            }
        }

        let unsynced = writer.unsynced + 1;
        let synced = self.sync_policy.should_sync(unsynced);
        if synced {
            if let Err(e) = self.store.sync().and_then(|()| index.sync()) {
                self.roll_back(index.as_mut(), position);
                return Err(e);
            }
        }
        self.store.commit();
        drop(index);

        writer.since_index = if should_index { 0 } else { writer.since_index + 1 };
        writer.unsynced = if synced { 0 } else { unsynced };
        writer.next_offset = offset + 1;
        self.next_offset.store(offset + 1, Ordering::Release);

        let now = SystemTime::now();
        let mut times = self.times.lock();
        times.last_modified = Some(now);
        if synced {
            times.last_flush = Some(now);
        }

        Ok(offset)
    }

    fn read(
        &self,
        start_offset: u64,
        max_offset: u64,
        max_count: usize,
        max_bytes: u64,
    ) -> Result<Vec<StoredRecord>> {
        let mut records = Vec::new();
        if start_offset > max_offset || max_count == 0 {
            return Ok(records);
        }

        let mut position = self.index.read().lookup(start_offset);
        let mut consumed = 0u64;

        while records.len() < max_count {
            let Some(stored) = self.store.read_entry(position)? else {
                break;
            };
            let entry_len = stored.entry_len();
            position += entry_len;

            // The index may land before the target
            if stored.offset < start_offset {
                continue;
            }
            if stored.offset > max_offset {
                break;
            }
            if !records.is_empty() && consumed + entry_len > max_bytes {
                break;
            }

            consumed += entry_len;
            let last = stored.offset == max_offset;
            records.push(stored);
            if last {
                break;
            }
        }

        Ok(records)
    }

    fn sync(&self) -> Result<()> {
        let result = self.flush_files();
        if result.is_ok() {
            self.writer.lock().unsynced = 0;
            debug!(base_offset = self.base_offset, "Synced segment");
        }
        result
    }

    fn close(&self) -> Result<()> {
        // No append may land between the final sync and the state change
        let mut writer = self.writer.lock();
        let result = self.flush_files();
        if result.is_ok() {
            writer.unsynced = 0;
        }
        *self.state.lock() = SegmentState::Closed;
        drop(writer);

        debug!(base_offset = self.base_offset, "Closed segment");
        result
    }

    fn last_modified(&self) -> Option<SystemTime> {
        self.times.lock().last_modified
    }

    fn last_flush_time(&self) -> Option<SystemTime> {
        self.times.lock().last_flush
    }

    fn delete(self: Box<Self>) -> Result<()> {
        let Segment {
            base_offset,
            store,
            index,
            ..
        } = *self;

        let store_result = store.delete();
        let index_result = index.into_inner().delete();
        debug!(base_offset, "Deleted segment");

        store_result.and(index_result)
    }
}
