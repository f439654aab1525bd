//! Error types for the commit log
//!
//! This module defines the error taxonomy shared by every storage layer.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! Corruption errors raised while reading carry the logical offset of the
//! failing entry (or its byte position when the entry header itself could not
//! be read) so consumers can decide whether to skip, alert, or stop.

use std::io;
use thiserror::Error;

/// Result type alias for log operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the commit log
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from the storage layer, propagated unmodified
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A serialized record, or a stored length field, exceeds the size limit
    #[error("record too large{}: {size} bytes exceeds limit of {limit} bytes", fmt_offset(.offset))]
    RecordTooLarge {
        /// Offset of the stored entry, when known
        offset: Option<u64>,
        /// Serialized (or declared) size in bytes
        size: u64,
        /// Active size limit in bytes
        limit: u64,
    },

    /// The recomputed CRC-32 disagrees with the stored checksum
    #[error("checksum mismatch at offset {offset}: stored {stored:08x}, computed {computed:08x}")]
    ChecksumMismatch {
        /// Offset of the corrupt entry
        offset: u64,
        /// Checksum read from disk
        stored: u32,
        /// Checksum recomputed over the record bytes
        computed: u32,
    },

    /// Checksum is valid but the record's field lengths are inconsistent
    #[error("malformed record at offset {offset}: {reason}")]
    MalformedRecord {
        /// Offset of the malformed entry
        offset: u64,
        /// What was wrong with it
        reason: String,
    },

    /// Record carries a format version this build cannot encode or decode
    #[error("unsupported record format version {version}{}", fmt_offset(.offset))]
    UnsupportedVersion {
        /// Offset of the stored entry, when known
        offset: Option<u64>,
        /// Version byte found on disk
        version: u8,
    },

    /// An entry extends past the readable end of the record file
    #[error("truncated entry at position {position}: needed {needed} bytes, {available} available")]
    TruncatedEntry {
        /// Byte position where the entry starts
        position: u64,
        /// Bytes the entry claims to occupy
        needed: u64,
        /// Bytes actually readable from `position`
        available: u64,
    },

    /// Offset index received a non-monotonic (offset, position) pair.
    ///
    /// This is a programming error; correct callers never trigger it.
    #[error(
        "index contract violation: ({offset}, {position}) after ({last_offset}, {last_position})"
    )]
    IndexContractViolation {
        /// Last indexed offset
        last_offset: u64,
        /// Last indexed position
        last_position: u64,
        /// Rejected offset
        offset: u64,
        /// Rejected position
        position: u64,
    },

    /// Append attempted on a segment that has been closed
    #[error("segment {base_offset} is closed")]
    SegmentClosed {
        /// Base offset of the closed segment
        base_offset: u64,
    },

    /// Configuration rejected by validation
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

fn fmt_offset(offset: &Option<u64>) -> String {
    match offset {
        Some(offset) => format!(" at offset {offset}"),
        None => String::new(),
    }
}

impl Error {
    /// Whether the error indicates on-disk corruption.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Error::ChecksumMismatch { .. }
                | Error::MalformedRecord { .. }
                | Error::TruncatedEntry { .. }
                | Error::RecordTooLarge {
                    offset: Some(_),
                    ..
                }
        )
    }

    /// Whether a caller may reasonably retry the operation.
    ///
    /// Only I/O errors qualify; the log never retries on its own.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Io(_))
    }

    /// Logical offset the error refers to, if any.
    pub fn offset(&self) -> Option<u64> {
        match self {
            Error::RecordTooLarge { offset, .. } | Error::UnsupportedVersion { offset, .. } => {
                *offset
            }
            Error::ChecksumMismatch { offset, .. } | Error::MalformedRecord { offset, .. } => {
                Some(*offset)
            }
            Error::IndexContractViolation { offset, .. } => Some(*offset),
            _ => None,
        }
    }
}
