//! Storage layer for the gregor commit log
//!
//! This crate implements the on-disk log:
//! - Record codec with CRC-32 corruption detection (`format`)
//! - Append-only record files with a safe read limit (`record_file`)
//! - Sparse offset → position index (`offset_index`)
//! - Segments that own offset assignment and recovery (`segment`)
//! - The log over a directory of segments (`log`)
//!
//! # Layering
//!
//! ```text
//! Log ──▶ LogSegment ──▶ RecordStore   (.log file)
//!                   └──▶ OffsetIndex   (.index file)
//! ```
//!
//! Each arrow is a trait seam; `Segment`, `RecordFile`, and `FileOffsetIndex`
//! are the file-backed implementations.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod format;
pub mod log;
pub mod offset_index;
mod positional;
pub mod record_file;
pub mod segment;
pub mod testing;

pub use config::{ConfigError, LogConfig, SyncPolicy};
pub use format::{Record, StoredRecord};
pub use log::Log;
pub use offset_index::{FileOffsetIndex, OffsetIndex};
pub use record_file::{RecordFile, RecordStore};
pub use segment::{LogSegment, Segment, SegmentState};
