//! The commit log.
//!
//! A log is a directory of segments. The segment with the highest base offset
//! is active and takes every append; the rest are closed and serve reads.
//!
//! # Lifecycle
//!
//! ```text
//! Log::open(dir) ──▶ restore() ──▶ append / read / flush ──▶ close() or delete()
//!                                        │
//!                                        └── roll() swaps in a new active segment
//! ```
//!
//! Appends and reads share the segment set through a read lock. `roll` and
//! `restore` take the write lock, so a roll waits for in-flight appends and the
//! swap is atomic to everyone else.

use std::collections::BTreeMap;
use std::fs;
use std::iter;
use std::path::{Path, PathBuf};

use gregor_core::Result;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::config::LogConfig;
use crate::format::{Record, StoredRecord, ENTRY_HEADER_LEN};
use crate::segment::{parse_base_offset, LogSegment, Segment};

/// Segments of a log, keyed by base offset.
struct SegmentSet {
    /// Segments that no longer take appends
    closed: BTreeMap<u64, Box<dyn LogSegment>>,

    /// Segment taking appends
    active: Box<dyn LogSegment>,
}

impl SegmentSet {
    /// All segments in offset order.
    fn iter(&self) -> impl Iterator<Item = &Box<dyn LogSegment>> + '_ {
        self.closed.values().chain(iter::once(&self.active))
    }

    /// Segments that can hold offsets ≥ `start`, in offset order.
    ///
    /// Starts at the segment with the greatest base offset ≤ `start`, or at the
    /// first segment when `start` is below every base offset.
    fn starting_at(&self, start: u64) -> impl Iterator<Item = &Box<dyn LogSegment>> + '_ {
        let first = self
            .iter()
            .take_while(|s| s.base_offset() <= start)
            .last()
            .map_or(0, |s| s.base_offset());
        self.iter().filter(move |s| s.base_offset() >= first)
    }

    fn len(&self) -> usize {
        self.closed.len() + 1
    }
}

/// Append-only commit log over a directory of segments.
pub struct Log {
    /// Directory holding the segment files
    dir: PathBuf,

    /// Configuration shared by every segment
    config: LogConfig,

    /// Active and closed segments
    segments: RwLock<SegmentSet>,
}

impl Log {
    /// Open the log in `dir`, creating the directory if needed.
    ///
    /// Existing segment files are restored; an empty directory starts a fresh
    /// log at offset 0.
    pub fn open(dir: impl AsRef<Path>, config: LogConfig) -> Result<Self> {
        config.validate()?;

        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let segments = load_segments(&dir, &config)?;
        let log = Log {
            dir,
            config,
            segments: RwLock::new(segments),
        };

        info!(
            dir = %log.dir.display(),
            segments = log.segment_count(),
            next_offset = log.next_offset(),
            "Opened log"
        );
        Ok(log)
    }

    /// Rebuild the in-memory segment set from the files in the log directory.
    ///
    /// Every segment's next offset is recovered from its record file (a
    /// stale index is rebuilt and a torn tail cut off), and the most recent
    /// segment becomes active. The current active segment is synced first.
    pub fn restore(&self) -> Result<()> {
        let mut segments = self.segments.write();
        segments.active.sync()?;

        *segments = load_segments(&self.dir, &self.config)?;

        info!(
            dir = %self.dir.display(),
            segments = segments.len(),
            next_offset = segments.active.next_offset(),
            "Restored log"
        );
        Ok(())
    }

    /// Append a record to the active segment and return its offset.
    ///
    /// With `segment_bytes` configured, an append that would grow a non-empty
    /// active segment past that size rolls to a new segment first.
    pub fn append(&self, record: &Record) -> Result<u64> {
        if let Some(limit) = self.config.segment_bytes {
            let entry_len = (ENTRY_HEADER_LEN + record.encoded_len()) as u64;
            let full = {
                let segments = self.segments.read();
                let size = segments.active.size();
                size > 0 && size + entry_len > limit
            };
            if full {
                self.roll()?;
            }
        }

        self.segments.read().active.append(record)
    }

    /// Read up to `max_count` records starting at offset `start`.
    ///
    /// Never returns a record with an offset below `start`. Offsets missing
    /// from the log (below the first segment, or cut off by recovery) are
    /// skipped rather than counted. Reading past the end of the log (or from
    /// an empty log) returns an empty batch.
    pub fn read(&self, start: u64, max_count: usize) -> Result<Vec<StoredRecord>> {
        let mut records = Vec::new();
        let segments = self.segments.read();

        for segment in segments.starting_at(start) {
            if records.len() >= max_count {
                break;
            }
            let wanted = max_count - records.len();
            records.extend(segment.read(start, u64::MAX, wanted, u64::MAX)?);
        }

        Ok(records)
    }

    /// Read records with `start ≤ offset ≤ max_offset`, bounded by bytes.
    ///
    /// At most `max_bytes` of framed entries are returned, except that the
    /// first record is always included so a small budget still makes progress.
    pub fn read_bytes(
        &self,
        start: u64,
        max_offset: u64,
        max_bytes: u64,
    ) -> Result<Vec<StoredRecord>> {
        let mut records: Vec<StoredRecord> = Vec::new();
        let mut remaining = max_bytes;
        let segments = self.segments.read();

        for segment in segments.starting_at(start) {
            if segment.base_offset() > max_offset {
                break;
            }

            let batch = segment.read(start, max_offset, usize::MAX, remaining)?;
            let end = segment.next_offset().min(max_offset.saturating_add(1));
            let exhausted = batch.last().map_or(true, |s| s.offset + 1 >= end);

            for stored in batch {
                let entry_len = stored.entry_len();
                if !records.is_empty() && entry_len > remaining {
                    return Ok(records);
                }
                remaining = remaining.saturating_sub(entry_len);
                records.push(stored);
            }

            // Stopped on the byte budget inside this segment
            if !exhausted {
                break;
            }
        }

        Ok(records)
    }

    /// Start a new active segment at the current next offset.
    ///
    /// The old active segment is closed (synced, then sealed against appends)
    /// and kept for reads. Rolling an empty active segment is a no-op. Returns
    /// the base offset of the active segment.
    pub fn roll(&self) -> Result<u64> {
        let mut segments = self.segments.write();

        let base_offset = segments.active.next_offset();
        if base_offset == segments.active.base_offset() {
            debug!(base_offset, "Active segment is empty, not rolling");
            return Ok(base_offset);
        }

        let next: Box<dyn LogSegment> =
            Box::new(Segment::open(&self.dir, base_offset, &self.config)?);
        let previous = std::mem::replace(&mut segments.active, next);

        // The old segment is sealed even if its final sync fails
        let closed = previous.close();
        segments.closed.insert(previous.base_offset(), previous);

        info!(
            previous_base = segments.closed.keys().next_back().copied(),
            base_offset,
            segments = segments.len(),
            "Rolled log segment"
        );

        closed.map(|()| base_offset)
    }

    /// Sync the active segment to durable storage.
    pub fn flush(&self) -> Result<()> {
        self.segments.read().active.sync()
    }

    /// Sync and close every segment. Further appends fail.
    pub fn close(&self) -> Result<()> {
        let segments = self.segments.read();

        let mut result = Ok(());
        for segment in segments.iter() {
            if let Err(e) = segment.close() {
                warn!(base_offset = segment.base_offset(), error = %e, "Failed to close segment");
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }

        info!(dir = %self.dir.display(), "Closed log");
        result
    }

    /// Remove every segment's files.
    ///
    /// All segments are attempted; the first failure is returned.
    pub fn delete(self) -> Result<()> {
        let SegmentSet { closed, active } = self.segments.into_inner();

        let mut result = Ok(());
        for segment in closed.into_values().chain(iter::once(active)) {
            let base_offset = segment.base_offset();
            if let Err(e) = segment.delete() {
                warn!(base_offset, error = %e, "Failed to delete segment");
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }

        info!(dir = %self.dir.display(), "Deleted log");
        result
    }

    /// Offset the next append will receive.
    pub fn next_offset(&self) -> u64 {
        self.segments.read().active.next_offset()
    }

    /// Number of segments, including the active one.
    pub fn segment_count(&self) -> usize {
        self.segments.read().len()
    }

    /// Base offsets of all segments in order.
    pub fn base_offsets(&self) -> Vec<u64> {
        self.segments.read().iter().map(|s| s.base_offset()).collect()
    }

    /// Total size of all record files in bytes.
    pub fn size_bytes(&self) -> u64 {
        self.segments.read().iter().map(|s| s.size()).sum()
    }

    /// Directory holding the segment files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Configuration this log was opened with.
    pub fn config(&self) -> &LogConfig {
        &self.config
    }
}

/// Base offsets of every record file in `dir`, sorted.
fn list_segments(dir: &Path) -> Result<Vec<u64>> {
    let mut bases = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if let Some(base) = entry.file_name().to_str().and_then(parse_base_offset) {
            bases.push(base);
        }
    }
    bases.sort_unstable();
    Ok(bases)
}

/// Open every segment in `dir`; the last becomes active.
fn load_segments(dir: &Path, config: &LogConfig) -> Result<SegmentSet> {
    let mut bases = list_segments(dir)?;
    let active_base = bases.pop().unwrap_or(0);

    let mut closed: BTreeMap<u64, Box<dyn LogSegment>> = BTreeMap::new();
    let mut expected: Option<u64> = None;
    for base in bases {
        let segment = Segment::open(dir, base, config)?;
        check_continuity(expected, base);
        expected = Some(segment.next_offset());

        segment.close()?;
        closed.insert(base, Box::new(segment));
    }

    let active = Segment::open(dir, active_base, config)?;
    check_continuity(expected, active_base);

    debug!(
        dir = %dir.display(),
        closed = closed.len(),
        active_base,
        "Loaded segments"
    );

    Ok(SegmentSet {
        closed,
        active: Box::new(active),
    })
}

fn check_continuity(expected: Option<u64>, base_offset: u64) {
    if let Some(expected) = expected {
        if expected != base_offset {
            warn!(expected, base_offset, "Segment does not continue the previous one");
        }
    }
}
