//! Offset index entry format.
//!
//! `.index` files hold back-to-back 16-byte entries:
//!
//! ```text
//! ┌──────────────┬──────────────┐
//! │ Offset (8)   │ Position (8) │
//! └──────────────┴──────────────┘
//! ```
//!
//! Both fields are big-endian. A file whose length is not a multiple of
//! [`INDEX_ENTRY_LEN`] has a torn tail.

use byteorder::{BigEndian, ByteOrder};

/// Size of one index entry
pub const INDEX_ENTRY_LEN: usize = 16;

/// An (offset, position) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct IndexEntry {
    /// Logical offset of an indexed record
    pub offset: u64,
    /// Byte position of that record's entry in the record file
    pub position: u64,
}

impl IndexEntry {
    /// Create a new index entry.
    pub fn new(offset: u64, position: u64) -> Self {
        IndexEntry { offset, position }
    }

    /// Serialize entry to bytes.
    pub fn to_bytes(&self) -> [u8; INDEX_ENTRY_LEN] {
        let mut bytes = [0u8; INDEX_ENTRY_LEN];
        BigEndian::write_u64(&mut bytes[0..8], self.offset);
        BigEndian::write_u64(&mut bytes[8..16], self.position);
        bytes
    }

    /// Decode every whole entry in `bytes`.
    ///
    /// Returns the entries and whether a partial trailing entry was ignored.
    pub fn decode_all(bytes: &[u8]) -> (Vec<IndexEntry>, bool) {
        let entries = bytes
            .chunks_exact(INDEX_ENTRY_LEN)
            .map(|chunk| IndexEntry {
                offset: BigEndian::read_u64(&chunk[0..8]),
                position: BigEndian::read_u64(&chunk[8..16]),
            })
            .collect();
        (entries, bytes.len() % INDEX_ENTRY_LEN != 0)
    }
}
