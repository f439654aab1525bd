//! Sparse offset index.
//!
//! Maps logical offsets to byte positions in a segment's record file so a read
//! can seek close to its target instead of scanning from the start. Entries
//! are recorded only for a subset of appends; a lookup returns the greatest
//! indexed offset at or below the target and the reader scans forward from
//! there.
//!
//! The index is a cache. It is persisted next to the record file as
//! `{base_offset:020}.index` but can always be rebuilt from the record file.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use gregor_core::{Error, Result};
use tracing::{debug, warn};

use crate::format::{IndexEntry, INDEX_ENTRY_LEN};
use crate::positional::write_all_at;

/// Offset → position index for one segment.
pub trait OffsetIndex: Send + Sync {
    /// Record that `offset` starts at byte `position`.
    ///
    /// Both values must be greater than those of the last entry; repeating
    /// the last pair exactly is a no-op. Anything else fails with
    /// [`Error::IndexContractViolation`].
    fn index(&mut self, offset: u64, position: u64) -> Result<()>;

    /// Position of the entry with the greatest offset ≤ `target`, or 0.
    fn lookup(&self, target: u64) -> u64;

    /// Most recently indexed entry.
    fn last_entry(&self) -> Option<IndexEntry>;

    /// Number of indexed entries.
    fn len(&self) -> usize;

    /// Whether nothing has been indexed.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry whose position is ≥ `position`.
    fn truncate_to_position(&mut self, position: u64) -> Result<()>;

    /// Force indexed entries to durable storage.
    fn sync(&self) -> Result<()>;

    /// Release the index and remove any persisted artifact.
    fn delete(self: Box<Self>) -> Result<()>;
}

/// [`OffsetIndex`] kept in memory and mirrored to an append-only file.
pub struct FileOffsetIndex {
    /// In-memory entries, strictly increasing in both fields
    entries: Vec<IndexEntry>,

    /// Backing `.index` file
    file: File,

    /// Path to the index file
    path: PathBuf,
}

impl FileOffsetIndex {
    /// Open or create an index file and load its entries.
    ///
    /// A torn trailing entry is cut off. Entries that are not strictly
    /// increasing make the whole file untrustworthy; it is emptied so the
    /// owner can rebuild it.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)?;

        let bytes = fs::read(&path)?;
        let (entries, torn) = IndexEntry::decode_all(&bytes);

        let mut index = FileOffsetIndex {
            entries,
            file,
            path,
        };

        if !is_strictly_increasing(&index.entries) {
            warn!(path = %index.path.display(), "Offset index out of order, discarding");
            index.clear()?;
        } else if torn {
            warn!(
                path = %index.path.display(),
                entries = index.entries.len(),
                "Offset index has a torn tail entry, truncating"
            );
            index
                .file
                .set_len((index.entries.len() * INDEX_ENTRY_LEN) as u64)?;
        }

        debug!(path = %index.path.display(), entries = index.entries.len(), "Opened offset index");
        Ok(index)
    }

    /// Remove every entry, in memory and on disk.
    pub fn clear(&mut self) -> Result<()> {
        self.file.set_len(0)?;
        self.entries.clear();
        Ok(())
    }

    /// All entries in order.
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Path to the index file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn is_strictly_increasing(entries: &[IndexEntry]) -> bool {
    entries
        .windows(2)
        .all(|w| w[0].offset < w[1].offset && w[0].position < w[1].position)
}

impl OffsetIndex for FileOffsetIndex {
    fn index(&mut self, offset: u64, position: u64) -> Result<()> {
        if let Some(last) = self.entries.last().copied() {
            if last.offset == offset && last.position == position {
                return Ok(());
            }
            if offset <= last.offset || position <= last.position {
                return Err(Error::IndexContractViolation {
                    last_offset: last.offset,
                    last_position: last.position,
                    offset,
                    position,
                });
            }
        }

        let entry = IndexEntry::new(offset, position);
        let file_end = (self.entries.len() * INDEX_ENTRY_LEN) as u64;
        if let Err(e) = write_all_at(&self.file, &entry.to_bytes(), file_end) {
            if let Err(undo) = self.file.set_len(file_end) {
                warn!(path = %self.path.display(), error = %undo, "Failed to roll back partial index write");
            }
            return Err(e.into());
        }

        self.entries.push(entry);
        Ok(())
    }

    fn lookup(&self, target: u64) -> u64 {
        let idx = self.entries.partition_point(|e| e.offset <= target);
        match idx {
            0 => 0,
            i => self.entries[i - 1].position,
        }
    }

    fn last_entry(&self) -> Option<IndexEntry> {
        self.entries.last().copied()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn truncate_to_position(&mut self, position: u64) -> Result<()> {
        let keep = self.entries.partition_point(|e| e.position < position);
        if keep < self.entries.len() {
            self.file.set_len((keep * INDEX_ENTRY_LEN) as u64)?;
            self.entries.truncate(keep);
        }
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
        debug!(path = %path.display(), "Deleted offset index");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FileCorruptor;
    use tempfile::tempdir;

    fn open(dir: &Path) -> FileOffsetIndex {
        FileOffsetIndex::open(dir.join("00000000000000000000.index")).unwrap()
    }

    #[test]
    fn test_lookup_empty_index() {
        let dir = tempdir().unwrap();
        let index = open(dir.path());

        assert!(index.is_empty());
        assert_eq!(index.lookup(0), 0);
        assert_eq!(index.lookup(1000), 0);
    }

    #[test]
    fn test_lookup_nearest_lower_entry() {
        let dir = tempdir().unwrap();
        let mut index = open(dir.path());

        index.index(10, 100).unwrap();
        index.index(20, 250).unwrap();
        index.index(30, 400).unwrap();

        assert_eq!(index.lookup(5), 0);
        assert_eq!(index.lookup(10), 100);
        assert_eq!(index.lookup(19), 100);
        assert_eq!(index.lookup(20), 250);
        assert_eq!(index.lookup(29), 250);
        assert_eq!(index.lookup(30), 400);
        assert_eq!(index.lookup(u64::MAX), 400);
    }

    #[test]
    fn test_contract_violation() {
        let dir = tempdir().unwrap();
        let mut index = open(dir.path());

        index.index(10, 100).unwrap();

        assert!(matches!(
            index.index(9, 200),
            Err(Error::IndexContractViolation {
                last_offset: 10,
                offset: 9,
                ..
            })
        ));
        assert!(matches!(
            index.index(11, 50),
            Err(Error::IndexContractViolation { .. })
        ));

        // Repeating the last pair is tolerated
        index.index(10, 100).unwrap();
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_persisted_across_reopen() {
        let dir = tempdir().unwrap();
        {
            let mut index = open(dir.path());
            index.index(0, 0).unwrap();
            index.index(8, 320).unwrap();
            index.sync().unwrap();
        }

        let index = open(dir.path());
        assert_eq!(
            index.entries(),
            &[IndexEntry::new(0, 0), IndexEntry::new(8, 320)]
        );
        assert_eq!(index.last_entry(), Some(IndexEntry::new(8, 320)));
    }

    #[test]
    fn test_torn_tail_is_cut() {
        let dir = tempdir().unwrap();
        let path = {
            let mut index = open(dir.path());
            index.index(0, 0).unwrap();
            index.index(4, 160).unwrap();
            index.path().to_path_buf()
        };

        FileCorruptor::new(&path).truncate_tail(3).unwrap();

        let mut index = open(dir.path());
        assert_eq!(index.len(), 1);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), INDEX_ENTRY_LEN as u64);

        // Appends land after the surviving entry
        index.index(4, 160).unwrap();
        drop(index);
        assert_eq!(open(dir.path()).len(), 2);
    }

    #[test]
    fn test_out_of_order_file_is_discarded() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("00000000000000000000.index");

        let mut bytes = Vec::new();
        bytes.extend_from_slice(&IndexEntry::new(5, 500).to_bytes());
        bytes.extend_from_slice(&IndexEntry::new(3, 600).to_bytes());
        std::fs::write(&path, bytes).unwrap();

        let index = open(dir.path());
        assert!(index.is_empty());
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
    }

    #[test]
    fn test_truncate_to_position() {
        let dir = tempdir().unwrap();
        let mut index = open(dir.path());

        index.index(0, 0).unwrap();
        index.index(4, 160).unwrap();
        index.index(8, 320).unwrap();

        index.truncate_to_position(160).unwrap();
        assert_eq!(index.entries(), &[IndexEntry::new(0, 0)]);

        drop(index);
        assert_eq!(open(dir.path()).len(), 1);
    }

    #[test]
    fn test_delete_removes_file() {
        let dir = tempdir().unwrap();
        let index = open(dir.path());
        let path = index.path().to_path_buf();

        Box::new(index).delete().unwrap();
        assert!(!path.exists());
    }
}
