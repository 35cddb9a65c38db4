//! Health snapshot of an observability context.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Health signals for external health checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservabilityStatus {
    /// Directory holding the log files.
    pub log_dir: PathBuf,
    /// Both active files are open and the last write succeeded.
    pub log_writable: bool,
    /// Entries that could not be written since startup.
    pub write_failures: u64,
    /// Size of the active machine sink in bytes.
    pub active_log_bytes: u64,
    /// Machine archives currently retained.
    pub archive_count: usize,
    /// Rules in the diagnostic table.
    pub rules_loaded: usize,
    /// Operations with at least one recorded call.
    pub operations_tracked: usize,
    /// Calls recorded across all operations.
    pub total_calls: u64,
    /// Diagnoses currently held in history.
    pub history_len: usize,
    /// History capacity.
    pub history_capacity: usize,
    /// Time since the context was opened.
    #[serde(with = "humantime_serde")]
    pub uptime: Duration,
}

impl ObservabilityStatus {
    /// Returns true when logging is healthy.
    #[must_use]
    pub const fn is_healthy(&self) -> bool {
        self.log_writable && self.write_failures == 0
    }
}
