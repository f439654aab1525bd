//! Core types for Gregor
//!
//! This crate defines the foundational pieces shared by every layer of the log:
//! - Error: Error taxonomy (I/O, size limit, corruption, index contract)
//! - Limits: Record size limit (4 MiB hard ceiling)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod limits;

pub use error::{Error, Result};
pub use limits::{Limits, RECORD_SIZE_LIMIT};
