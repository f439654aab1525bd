//! Log configuration.
//!
//! This module provides configuration for segments and the log that owns them.

use gregor_core::{Error, Limits, RECORD_SIZE_LIMIT};

use crate::format::{ENTRY_HEADER_LEN, RECORD_OVERHEAD};

/// When appended entries are forced to durable storage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SyncPolicy {
    /// Only explicit `flush`/`close` calls sync (default)
    #[default]
    OnDemand,
    /// Sync after every append - maximum durability
    EveryAppend,
    /// Sync after every N appends to a segment
    EveryN(u64),
}

impl SyncPolicy {
    /// Whether a segment holding `unsynced` appends should sync now.
    pub fn should_sync(&self, unsynced: u64) -> bool {
        match *self {
            SyncPolicy::OnDemand => false,
            SyncPolicy::EveryAppend => unsynced >= 1,
            SyncPolicy::EveryN(n) => unsynced >= n,
        }
    }
}

/// Log configuration parameters.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Maximum serialized record size in bytes (default: 4MB).
    ///
    /// May be lowered; values above 4MB are rejected by `validate`.
    pub max_record_bytes: usize,

    /// Index one entry every N appends (default: 8).
    ///
    /// 1 gives a dense index. The first append to a segment is always indexed.
    pub index_interval: u64,

    /// Record file size that triggers automatic rollover (default: none).
    ///
    /// When set, an append that would grow the active segment past this size
    /// rolls to a new segment first.
    pub segment_bytes: Option<u64>,

    /// Sync policy for appends (default: on demand).
    pub sync_policy: SyncPolicy,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            max_record_bytes: RECORD_SIZE_LIMIT,
            index_interval: 8,
            segment_bytes: None,
            sync_policy: SyncPolicy::OnDemand,
        }
    }
}

impl LogConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the record size limit (builder pattern).
    pub fn with_max_record_bytes(mut self, bytes: usize) -> Self {
        self.max_record_bytes = bytes;
        self
    }

    /// Set the index interval (builder pattern).
    pub fn with_index_interval(mut self, interval: u64) -> Self {
        self.index_interval = interval;
        self
    }

    /// Set the rollover size (builder pattern).
    pub fn with_segment_bytes(mut self, bytes: u64) -> Self {
        self.segment_bytes = Some(bytes);
        self
    }

    /// Set the sync policy (builder pattern).
    pub fn with_sync_policy(mut self, policy: SyncPolicy) -> Self {
        self.sync_policy = policy;
        self
    }

    /// Record limits derived from this configuration.
    pub fn limits(&self) -> Limits {
        Limits::with_max_record_bytes(self.max_record_bytes)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_record_bytes <= RECORD_OVERHEAD || self.max_record_bytes > RECORD_SIZE_LIMIT {
            return Err(ConfigError::RecordLimitOutOfRange(self.max_record_bytes));
        }
        if self.index_interval == 0 {
            return Err(ConfigError::ZeroIndexInterval);
        }
        if self.sync_policy == SyncPolicy::EveryN(0) {
            return Err(ConfigError::ZeroSyncInterval);
        }
        if let Some(bytes) = self.segment_bytes {
            let smallest_entry = (ENTRY_HEADER_LEN + RECORD_OVERHEAD) as u64;
            if bytes < smallest_entry {
                return Err(ConfigError::SegmentTooSmall(bytes));
            }
        }
        Ok(())
    }

    /// Create a configuration optimized for testing (small limits, dense index).
    pub fn for_testing() -> Self {
        LogConfig {
            max_record_bytes: 64 * 1024,
            index_interval: 2,
            segment_bytes: None,
            sync_policy: SyncPolicy::OnDemand,
        }
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Record limit outside `(RECORD_OVERHEAD, 4MB]`.
    #[error("Record size limit {0} is out of range")]
    RecordLimitOutOfRange(usize),

    /// Index interval must be at least 1.
    #[error("Index interval must be at least 1")]
    ZeroIndexInterval,

    /// `SyncPolicy::EveryN` needs N ≥ 1.
    #[error("Sync interval must be at least 1")]
    ZeroSyncInterval,

    /// Rollover size cannot hold even an empty record.
    #[error("Segment size {0} cannot hold a single entry")]
    SegmentTooSmall(u64),
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::InvalidConfig(e.to_string())
    }
}
