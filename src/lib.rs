//! Gregor - segmented, append-only commit log storage
//!
//! Gregor stores an ordered sequence of key/value records on local disk. Each
//! record is assigned a monotonically increasing offset and protected by a
//! CRC-32 checksum; reads seek through a sparse offset index and scan forward.
//!
//! # Quick Start
//!
//! ```no_run
//! use gregor::{Log, LogConfig, Record};
//!
//! # fn main() -> gregor::Result<()> {
//! let log = Log::open("/var/lib/gregor/topic-0", LogConfig::default())?;
//!
//! let offset = log.append(&Record::new("user:123", "signed-up"))?;
//! log.flush()?;
//!
//! for stored in log.read(offset, 10)? {
//!     println!("{} => {:?}", stored.offset, stored.record.value);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! The [`Log`] owns a directory of segments. Appends go to the active segment,
//! which writes a framed entry to its `.log` file and, every few appends, an
//! (offset, position) pair to its `.index` file. [`Log::roll`] seals the
//! active segment and starts a new one at the next offset.
//!
//! Internal layering (record files, indexes, segments) is reachable through
//! [`storage`] for callers that manage segments themselves.

pub use gregor_core::{Error, Limits, Result, RECORD_SIZE_LIMIT};
pub use gregor_storage::{Log, LogConfig, Record, StoredRecord, SyncPolicy};

/// Lower-level storage building blocks.
pub use gregor_storage as storage;
