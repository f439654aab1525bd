//! Testing utilities for corruption detection and restore
//!
//! - **Corruption**: Byte-level damage to record and index files
//!
//! # Example
//!
//! ```ignore
//! use gregor_storage::testing::FileCorruptor;
//!
//! let corruptor = FileCorruptor::new(log_dir.join("00000000000000000000.log"));
//! corruptor.flip_byte(20, 0x01)?;
//! assert!(log.read(0, 1).is_err());
//! ```

mod corruption;

pub use corruption::FileCorruptor;
