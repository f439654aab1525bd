//! Record file corruption utilities
//!
//! Provides utilities for simulating various types of on-disk damage to a
//! record file (or index file) to test read-time detection and restore.
//!
//! # Corruption Types
//!
//! - Overwrite: Replaces bytes at a position (simulates misdirected writes)
//! - Bit rot: Flips bits in a single byte (simulates storage degradation)
//! - Truncation: Removes bytes from the tail (simulates crash during write)
//! - Garbage: Appends invalid bytes (simulates partial write)
//!
//! # Example
//!
//! ```ignore
//! use gregor_storage::testing::FileCorruptor;
//!
//! let corruptor = FileCorruptor::new(dir.join("00000000000000000000.log"));
//! corruptor.truncate_tail(5)?;
//! // Restore should cut the torn entry
//! ```

use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Corruption test utilities for a single file
pub struct FileCorruptor {
    /// File to damage
    path: PathBuf,
}

impl FileCorruptor {
    /// Create a corruptor for the given file
    pub fn new(path: impl AsRef<Path>) -> Self {
        FileCorruptor {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Get the target path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current file size in bytes
    pub fn size(&self) -> std::io::Result<u64> {
        Ok(std::fs::metadata(&self.path)?.len())
    }

    /// Overwrite bytes starting at `position`
    pub fn overwrite(&self, position: u64, bytes: &[u8]) -> std::io::Result<()> {
        let mut file = OpenOptions::new().write(true).open(&self.path)?;
        file.seek(SeekFrom::Start(position))?;
        file.write_all(bytes)?;
        file.sync_all()
    }

    /// XOR the byte at `position` with `mask`
    ///
    /// A zero mask is replaced by `0xFF` so at least one bit flips.
    pub fn flip_byte(&self, position: u64, mask: u8) -> std::io::Result<()> {
        let mut file = OpenOptions::new().read(true).write(true).open(&self.path)?;

        file.seek(SeekFrom::Start(position))?;
        let mut buf = [0u8; 1];
        file.read_exact(&mut buf)?;

        buf[0] ^= if mask == 0 { 0xFF } else { mask };

        file.seek(SeekFrom::Start(position))?;
        file.write_all(&buf)?;
        file.sync_all()
    }

    /// Remove `bytes_to_remove` bytes from the tail
    ///
    /// Returns the new size. Removing more than the file holds empties it.
    pub fn truncate_tail(&self, bytes_to_remove: u64) -> std::io::Result<u64> {
        let original_size = self.size()?;
        let new_size = original_size.saturating_sub(bytes_to_remove);

        let file = OpenOptions::new().write(true).open(&self.path)?;
        file.set_len(new_size)?;
        Ok(new_size)
    }

    /// Append garbage bytes to the tail
    ///
    /// Returns the new size.
    pub fn append_garbage(&self, garbage: &[u8]) -> std::io::Result<u64> {
        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        file.write_all(garbage)?;
        file.sync_all()?;
        self.size()
    }
}
