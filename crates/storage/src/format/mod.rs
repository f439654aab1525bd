//! On-disk byte formats for records, entries, and the offset index.
//!
//! This module centralizes all serialization logic for persistent storage.
//! Keeping serialization separate from operational logic (how record files
//! and segments are managed) makes format evolution easier to manage.
//!
//! # Module Structure
//!
//! - `record`: Checksummed key/value record format
//! - `entry`: Offset + length framing around a serialized record
//! - `index_entry`: Fixed-size (offset, position) pairs in `.index` files

pub mod entry;
pub mod index_entry;
pub mod record;

pub use entry::{encode_entry, EntryHeader, StoredRecord, ENTRY_HEADER_LEN};
pub use index_entry::{IndexEntry, INDEX_ENTRY_LEN};
pub use record::{Record, KEY_ABSENT, RECORD_FORMAT_VERSION, RECORD_OVERHEAD};
