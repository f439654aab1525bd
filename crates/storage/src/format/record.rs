//! Record format.
//!
//! A record is the atomic, immutable unit of the log. Its serialized form is
//! self-contained and checksummed; the logical offset is NOT part of it (the
//! offset lives in the entry framing, see [`super::entry`]).
//!
//! # Record Layout
//!
//! ```text
//! ┌──────────┬─────────┬────────────┬────────────┬─────────┬──────────────┬─────────┐
//! │ CRC32 (4)│ Ver (1) │ Attrs (1)  │ KeyLen (4) │ Key (K) │ ValueLen (4) │ Value(V)│
//! └──────────┴─────────┴────────────┴────────────┴─────────┴──────────────┴─────────┘
//! ```
//!
//! All integers are big-endian. `KeyLen == 0xFFFFFFFF` means the key is absent
//! and no key bytes follow. A present, zero-length key is written as
//! `KeyLen == 0`; the two round-trip distinctly.
//!
//! The CRC32 (IEEE) covers every byte from the version field to the end of the
//! value. A [`Record`] is the logical payload and does not hold its checksum;
//! the value read from disk travels with the decoded entry as
//! [`StoredRecord::checksum`](super::StoredRecord::checksum).
//!
//! Only [`RECORD_FORMAT_VERSION`] is written or read. Encoding a record that
//! carries any other version fails, so a caller can never persist an entry the
//! log itself would refuse to decode.

use byteorder::{BigEndian, ByteOrder};
use crc32fast::Hasher;
use gregor_core::{Error, Limits, Result};

/// Current record format version
pub const RECORD_FORMAT_VERSION: u8 = 1;

/// Key length sentinel marking an absent key
pub const KEY_ABSENT: u32 = 0xFFFF_FFFF;

/// Size of the checksum field
pub const CHECKSUM_LEN: usize = 4;

/// Fixed bytes in every serialized record: crc + version + attributes + key len + value len
pub const RECORD_OVERHEAD: usize = CHECKSUM_LEN + 1 + 1 + 4 + 4;

const VERSION_POS: usize = 4;
const ATTRIBUTES_POS: usize = 5;
const KEY_LEN_POS: usize = 6;
const KEY_POS: usize = 10;

/// A single key/value record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Format version
    pub version: u8,

    /// Opaque annotation bitmask, passed through unchanged
    pub attributes: u8,

    /// Optional key; `None` and `Some(vec![])` are distinct
    pub key: Option<Vec<u8>>,

    /// Payload
    pub value: Vec<u8>,
}

impl Record {
    /// Create a record with a key.
    pub fn new(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Record {
            version: RECORD_FORMAT_VERSION,
            attributes: 0,
            key: Some(key.into()),
            value: value.into(),
        }
    }

    /// Create a record without a key.
    pub fn unkeyed(value: impl Into<Vec<u8>>) -> Self {
        Record {
            version: RECORD_FORMAT_VERSION,
            attributes: 0,
            key: None,
            value: value.into(),
        }
    }

    /// Set the attributes byte (builder pattern).
    pub fn with_attributes(mut self, attributes: u8) -> Self {
        self.attributes = attributes;
        self
    }

    /// Size of the serialized record in bytes.
    pub fn encoded_len(&self) -> usize {
        RECORD_OVERHEAD + self.key.as_ref().map_or(0, Vec::len) + self.value.len()
    }

    /// CRC32 this record serializes with.
    pub fn checksum(&self) -> u32 {
        let mut buf = vec![0u8; self.encoded_len()];
        self.write_body(&mut buf);
        compute_crc(&buf[VERSION_POS..])
    }

    /// Serialize the record.
    ///
    /// Fails with [`Error::UnsupportedVersion`] unless `version` is
    /// [`RECORD_FORMAT_VERSION`], and with [`Error::RecordTooLarge`] if the
    /// serialized size exceeds `limits.max_record_bytes`.
    pub fn to_bytes(&self, limits: &Limits) -> Result<Vec<u8>> {
        if self.version != RECORD_FORMAT_VERSION {
            return Err(Error::UnsupportedVersion {
                offset: None,
                version: self.version,
            });
        }

        let len = self.encoded_len();
        limits.check_record_size(len, None)?;

        let mut buf = vec![0u8; len];
        self.write_body(&mut buf);

        let crc = compute_crc(&buf[VERSION_POS..]);
        BigEndian::write_u32(&mut buf[0..CHECKSUM_LEN], crc);
        Ok(buf)
    }

    /// Write every field except the checksum. `buf` must be `encoded_len()` long.
    fn write_body(&self, buf: &mut [u8]) {
        buf[VERSION_POS] = self.version;
        buf[ATTRIBUTES_POS] = self.attributes;

        let mut pos = KEY_POS;
        match &self.key {
            Some(key) => {
                BigEndian::write_u32(&mut buf[KEY_LEN_POS..KEY_POS], key.len() as u32);
                buf[pos..pos + key.len()].copy_from_slice(key);
                pos += key.len();
            }
            None => BigEndian::write_u32(&mut buf[KEY_LEN_POS..KEY_POS], KEY_ABSENT),
        }

        BigEndian::write_u32(&mut buf[pos..pos + 4], self.value.len() as u32);
        pos += 4;
        buf[pos..pos + self.value.len()].copy_from_slice(&self.value);
    }

    /// Deserialize a record stored at logical `offset`.
    ///
    /// `bytes` must hold exactly one serialized record. The checksum is
    /// verified before any length field is trusted.
    pub fn from_bytes(bytes: &[u8], offset: u64) -> Result<Self> {
        if bytes.len() < RECORD_OVERHEAD {
            return Err(malformed(
                offset,
                format!(
                    "record is {} bytes, shorter than the {RECORD_OVERHEAD} byte header",
                    bytes.len()
                ),
            ));
        }

        let stored = BigEndian::read_u32(&bytes[0..CHECKSUM_LEN]);
        let computed = compute_crc(&bytes[VERSION_POS..]);
        if stored != computed {
            return Err(Error::ChecksumMismatch {
                offset,
                stored,
                computed,
            });
        }

        let version = bytes[VERSION_POS];
        if version != RECORD_FORMAT_VERSION {
            return Err(Error::UnsupportedVersion {
                offset: Some(offset),
                version,
            });
        }
        let attributes = bytes[ATTRIBUTES_POS];

        let key_len = BigEndian::read_u32(&bytes[KEY_LEN_POS..KEY_POS]);
        let (key, value_len_pos) = if key_len == KEY_ABSENT {
            (None, KEY_POS)
        } else {
            let end = KEY_POS
                .checked_add(key_len as usize)
                .filter(|end| end + 4 <= bytes.len())
                .ok_or_else(|| {
                    malformed(offset, format!("key length {key_len} overruns record"))
                })?;
            (Some(bytes[KEY_POS..end].to_vec()), end)
        };

        let value_pos = value_len_pos + 4;
        let value_len = BigEndian::read_u32(&bytes[value_len_pos..value_pos]) as usize;
        if value_pos + value_len != bytes.len() {
            return Err(malformed(
                offset,
                format!(
                    "value length {value_len} does not match the {} remaining bytes",
                    bytes.len() - value_pos
                ),
            ));
        }

        Ok(Record {
            version,
            attributes,
            key,
            value: bytes[value_pos..].to_vec(),
        })
    }
}

fn malformed(offset: u64, reason: String) -> Error {
    Error::MalformedRecord { offset, reason }
}

/// Compute CRC32 (IEEE) of data.
fn compute_crc(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use gregor_core::RECORD_SIZE_LIMIT;
    use proptest::prelude::*;

    fn encode(record: &Record) -> Vec<u8> {
        record.to_bytes(&Limits::default()).unwrap()
    }

    #[test]
    fn test_record_roundtrip() {
        let record = Record::new(b"k1".to_vec(), b"v1".to_vec()).with_attributes(0x05);

        let bytes = encode(&record);
        assert_eq!(bytes.len(), record.encoded_len());

        let parsed = Record::from_bytes(&bytes, 0).unwrap();
        assert_eq!(parsed, record);
        assert_eq!(parsed.attributes, 0x05);
    }

    #[test]
    fn test_layout_is_big_endian() {
        let record = Record::new(b"ab".to_vec(), b"xyz".to_vec());
        let bytes = encode(&record);

        assert_eq!(bytes[4], RECORD_FORMAT_VERSION);
        assert_eq!(bytes[5], 0);
        assert_eq!(&bytes[6..10], &[0, 0, 0, 2]);
        assert_eq!(&bytes[10..12], b"ab");
        assert_eq!(&bytes[12..16], &[0, 0, 0, 3]);
        assert_eq!(&bytes[16..], b"xyz");
        assert_eq!(
            BigEndian::read_u32(&bytes[0..4]),
            crc32fast::hash(&bytes[4..])
        );
        assert_eq!(BigEndian::read_u32(&bytes[0..4]), record.checksum());
    }

    #[test]
    fn test_absent_key_uses_sentinel() {
        let record = Record::unkeyed(b"hello world!".to_vec());
        let bytes = encode(&record);

        assert_eq!(&bytes[6..10], &[0xFF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(bytes.len(), RECORD_OVERHEAD + 12);

        let parsed = Record::from_bytes(&bytes, 0).unwrap();
        assert_eq!(parsed.key, None);
    }

    #[test]
    fn test_empty_key_is_distinct_from_absent() {
        let empty = Record::new(Vec::new(), b"v".to_vec());
        let absent = Record::unkeyed(b"v".to_vec());

        let empty_bytes = encode(&empty);
        let absent_bytes = encode(&absent);
        assert_ne!(empty_bytes, absent_bytes);
        assert_eq!(&empty_bytes[6..10], &[0, 0, 0, 0]);

        assert_eq!(Record::from_bytes(&empty_bytes, 0).unwrap().key, Some(Vec::new()));
        assert_eq!(Record::from_bytes(&absent_bytes, 0).unwrap().key, None);
    }

    #[test]
    fn test_empty_value() {
        let record = Record::new(b"k".to_vec(), Vec::new());
        let parsed = Record::from_bytes(&encode(&record), 0).unwrap();
        assert!(parsed.value.is_empty());
    }

    #[test]
    fn test_checksum_failure_reports_offset() {
        let mut bytes = encode(&Record::new(b"k1".to_vec(), b"v1".to_vec()));
        bytes[11] ^= 0xFF;

        match Record::from_bytes(&bytes, 42) {
            Err(Error::ChecksumMismatch { offset, .. }) => assert_eq!(offset, 42),
            other => panic!("expected ChecksumMismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_corrupt_key_length_is_caught_by_checksum() {
        let mut bytes = encode(&Record::new(b"k1".to_vec(), b"v1".to_vec()));
        bytes[6..10].copy_from_slice(&[0x7F, 0, 0, 0]);

        assert!(matches!(
            Record::from_bytes(&bytes, 0),
            Err(Error::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_too_short() {
        assert!(matches!(
            Record::from_bytes(&[0u8; 5], 1),
            Err(Error::MalformedRecord { offset: 1, .. })
        ));
    }

    #[test]
    fn test_trailing_bytes_are_malformed() {
        let mut bytes = encode(&Record::unkeyed(b"v".to_vec()));
        bytes.push(0);
        // Re-seal so only the structural check can fail
        let crc = compute_crc(&bytes[VERSION_POS..]);
        BigEndian::write_u32(&mut bytes[0..4], crc);

        assert!(matches!(
            Record::from_bytes(&bytes, 0),
            Err(Error::MalformedRecord { .. })
        ));
    }

    #[test]
    fn test_unsupported_version_on_decode() {
        let mut bytes = encode(&Record::unkeyed(b"v".to_vec()));
        bytes[VERSION_POS] = 9;
        let crc = compute_crc(&bytes[VERSION_POS..]);
        BigEndian::write_u32(&mut bytes[0..4], crc);

        assert!(matches!(
            Record::from_bytes(&bytes, 3),
            Err(Error::UnsupportedVersion {
                offset: Some(3),
                version: 9
            })
        ));
    }

    #[test]
    fn test_unsupported_version_on_encode() {
        let mut record = Record::unkeyed(b"v".to_vec());
        record.version = 9;

        assert!(matches!(
            record.to_bytes(&Limits::default()),
            Err(Error::UnsupportedVersion {
                offset: None,
                version: 9
            })
        ));
    }

    #[test]
    fn test_size_limit_boundary() {
        let limits = Limits::default();

        let at_limit = Record::unkeyed(vec![0u8; RECORD_SIZE_LIMIT - RECORD_OVERHEAD]);
        assert_eq!(at_limit.encoded_len(), RECORD_SIZE_LIMIT);
        assert!(at_limit.to_bytes(&limits).is_ok());

        let over = Record::unkeyed(vec![0u8; RECORD_SIZE_LIMIT - RECORD_OVERHEAD + 1]);
        assert!(matches!(
            over.to_bytes(&limits),
            Err(Error::RecordTooLarge { offset: None, .. })
        ));
    }

    fn arb_record() -> impl Strategy<Value = Record> {
        (
            any::<u8>(),
            proptest::option::of(proptest::collection::vec(any::<u8>(), 0..64)),
            proptest::collection::vec(any::<u8>(), 0..256),
        )
            .prop_map(|(attributes, key, value)| Record {
                version: RECORD_FORMAT_VERSION,
                attributes,
                key,
                value,
            })
    }

    proptest! {
        #[test]
        fn prop_roundtrip(record in arb_record()) {
            let bytes = encode(&record);
            prop_assert_eq!(Record::from_bytes(&bytes, 0).unwrap(), record);
        }

        #[test]
        fn prop_single_byte_flip_is_detected(record in arb_record(), idx in any::<prop::sample::Index>(), flip in 1u8..=255) {
            let mut bytes = encode(&record);
            let pos = VERSION_POS + idx.index(bytes.len() - VERSION_POS);
            bytes[pos] ^= flip;

            let is_checksum_mismatch = matches!(
                Record::from_bytes(&bytes, 0),
                Err(Error::ChecksumMismatch { .. })
            );
            prop_assert!(is_checksum_mismatch);
        }
    }
}
