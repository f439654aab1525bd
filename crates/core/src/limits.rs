//! Size limits for records
//!
//! A single serialized record (checksum through value) must never exceed
//! [`RECORD_SIZE_LIMIT`]. The limit is enforced when a record is appended and
//! again when a stored length field is read back, so a foreign or corrupt file
//! cannot make a reader allocate an arbitrarily large buffer.
//!
//! Callers may lower the limit (useful in tests), never raise it.

use crate::error::{Error, Result};

/// Hard upper bound on a serialized record: 4 MiB
pub const RECORD_SIZE_LIMIT: usize = 4 * 1024 * 1024;

/// Size limits applied by the codec and the record file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Maximum serialized record size in bytes (default: 4 MiB)
    pub max_record_bytes: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            max_record_bytes: RECORD_SIZE_LIMIT,
        }
    }
}

impl Limits {
    /// Create limits with a custom record size.
    ///
    /// Values above [`RECORD_SIZE_LIMIT`] are clamped to it.
    pub fn with_max_record_bytes(max_record_bytes: usize) -> Self {
        Limits {
            max_record_bytes: max_record_bytes.min(RECORD_SIZE_LIMIT),
        }
    }

    /// Create limits with small values for testing
    pub fn with_small_limits() -> Self {
        Limits {
            max_record_bytes: 1024,
        }
    }

    /// Validate a serialized record size.
    ///
    /// `offset` is attached to the error when the size came from a stored entry.
    pub fn check_record_size(&self, size: usize, offset: Option<u64>) -> Result<()> {
        if size > self.max_record_bytes {
            return Err(Error::RecordTooLarge {
                offset,
                size: size as u64,
                limit: self.max_record_bytes as u64,
            });
        }
        Ok(())
    }
}
