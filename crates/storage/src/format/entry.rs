//! Stored record entry framing.
//!
//! Each entry in a record file wraps one serialized [`Record`] with the
//! logical offset assigned by the segment and the record's byte length.
//! Entries are packed back-to-back with no padding.
//!
//! # Entry Layout
//!
//! ```text
//! ┌──────────────┬─────────────┬───────────────────────────────┐
//! │ Offset (8)   │ Length (4)  │ Serialized record (Length)    │
//! └──────────────┴─────────────┴───────────────────────────────┘
//! ```
//!
//! The byte position of the offset field is the entry's "position", the value
//! recorded by the offset index.

use byteorder::{BigEndian, ByteOrder};
use gregor_core::{Limits, Result};

use super::record::{Record, CHECKSUM_LEN};

/// Size of the entry header (offset + length)
pub const ENTRY_HEADER_LEN: usize = 12;

/// Fixed header preceding each serialized record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryHeader {
    /// Logical offset of the record
    pub offset: u64,
    /// Byte length of the serialized record that follows
    pub length: u32,
}

impl EntryHeader {
    /// Serialize header to bytes.
    pub fn to_bytes(&self) -> [u8; ENTRY_HEADER_LEN] {
        let mut bytes = [0u8; ENTRY_HEADER_LEN];
        BigEndian::write_u64(&mut bytes[0..8], self.offset);
        BigEndian::write_u32(&mut bytes[8..12], self.length);
        bytes
    }

    /// Deserialize header from bytes.
    pub fn from_bytes(bytes: &[u8; ENTRY_HEADER_LEN]) -> Self {
        EntryHeader {
            offset: BigEndian::read_u64(&bytes[0..8]),
            length: BigEndian::read_u32(&bytes[8..12]),
        }
    }

    /// Total framed size: header plus record.
    pub fn entry_len(&self) -> u64 {
        ENTRY_HEADER_LEN as u64 + self.length as u64
    }
}

/// A record together with the offset the segment assigned to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
    /// Logical offset
    pub offset: u64,
    /// CRC32 of the serialized record; for entries read from a file, the
    /// value stored on disk
    pub checksum: u32,
    /// The record
    pub record: Record,
}

impl StoredRecord {
    /// Pair a record with its offset, computing its checksum.
    pub fn new(offset: u64, record: Record) -> Self {
        StoredRecord {
            offset,
            checksum: record.checksum(),
            record,
        }
    }

    /// Decode the serialized record that follows `header`.
    ///
    /// The checksum is verified by [`Record::from_bytes`] and kept as read.
    pub fn decode(header: &EntryHeader, body: &[u8]) -> Result<Self> {
        let record = Record::from_bytes(body, header.offset)?;
        Ok(StoredRecord {
            offset: header.offset,
            checksum: BigEndian::read_u32(&body[0..CHECKSUM_LEN]),
            record,
        })
    }

    /// Size of the framed entry on disk.
    pub fn entry_len(&self) -> u64 {
        (ENTRY_HEADER_LEN + self.record.encoded_len()) as u64
    }
}

/// Frame a record as a complete on-disk entry.
pub fn encode_entry(offset: u64, record: &Record, limits: &Limits) -> Result<Vec<u8>> {
    let body = record.to_bytes(limits)?;
    let header = EntryHeader {
        offset,
        length: body.len() as u32,
    };

    let mut entry = Vec::with_capacity(ENTRY_HEADER_LEN + body.len());
    entry.extend_from_slice(&header.to_bytes());
    entry.extend_from_slice(&body);
    Ok(entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::record::RECORD_OVERHEAD;

    #[test]
    fn test_header_roundtrip() {
        let header = EntryHeader {
            offset: 0x0102_0304_0506_0708,
            length: 26,
        };

        let bytes = header.to_bytes();
        assert_eq!(&bytes[0..8], &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(&bytes[8..12], &[0, 0, 0, 26]);
        assert_eq!(EntryHeader::from_bytes(&bytes), header);
        assert_eq!(header.entry_len(), 38);
    }

    #[test]
    fn test_encode_entry_framing() {
        let record = Record::unkeyed(b"hello world!".to_vec());
        let entry = encode_entry(7, &record, &Limits::default()).unwrap();

        let header = EntryHeader::from_bytes(entry[..ENTRY_HEADER_LEN].try_into().unwrap());
        assert_eq!(header.offset, 7);
        assert_eq!(header.length as usize, RECORD_OVERHEAD + 12);
        assert_eq!(entry.len() as u64, header.entry_len());

        let parsed = Record::from_bytes(&entry[ENTRY_HEADER_LEN..], header.offset).unwrap();
        assert_eq!(parsed, record);
        assert_eq!(StoredRecord::new(7, parsed).entry_len(), entry.len() as u64);
    }

    #[test]
    fn test_decode_keeps_stored_checksum() {
        let record = Record::new(b"k".to_vec(), b"v".to_vec());
        let entry = encode_entry(3, &record, &Limits::default()).unwrap();
        let header = EntryHeader::from_bytes(entry[..ENTRY_HEADER_LEN].try_into().unwrap());

        let stored = StoredRecord::decode(&header, &entry[ENTRY_HEADER_LEN..]).unwrap();
        assert_eq!(stored.offset, 3);
        assert_eq!(
            stored.checksum,
            BigEndian::read_u32(&entry[ENTRY_HEADER_LEN..ENTRY_HEADER_LEN + 4])
        );
        assert_eq!(stored, StoredRecord::new(3, record));
    }

    #[test]
    fn test_encode_entry_respects_limit() {
        let record = Record::unkeyed(vec![0u8; 2048]);
        assert!(encode_entry(0, &record, &Limits::with_small_limits()).is_err());
    }
}
