//! Storage usage reporting types

use serde::{Deserialize, Serialize};

/// Per-category byte usage of the offline stores.
///
/// The binary cache is intentionally absent: it manages its own cap and is
/// reported only through the overall usage number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StorageBreakdown {
    pub chapter_bytes: u64,
    pub image_bytes: u64,
    pub sync_queue_bytes: u64,
    pub progress_bytes: u64,
    pub book_metadata_bytes: u64,
    pub book_count: u64,
    pub chapter_count: u64,
    pub image_count: u64,
    pub progress_count: u64,
    pub sync_entry_count: u64,
}

impl StorageBreakdown {
    pub fn total(&self) -> u64 {
        self.chapter_bytes
            + self.image_bytes
            + self.sync_queue_bytes
            + self.progress_bytes
            + self.book_metadata_bytes
    }
}

/// Snapshot of overall storage state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StorageInfo {
    /// Bytes in use, from the platform estimate when available
    pub usage_bytes: u64,
    /// Total quota, from the platform estimate or the configured fallback
    pub quota_bytes: u64,
    /// `usage / quota` as a percentage
    pub percent_used: f64,
    /// Whether the platform has granted persistent storage
    pub persisted: bool,
    pub breakdown: StorageBreakdown,
}

impl StorageInfo {
    pub fn free_bytes(&self) -> u64 {
        self.quota_bytes.saturating_sub(self.usage_bytes)
    }
}

/// Outcome of one staged cleanup run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CleanupReport {
    pub bytes_freed: u64,
    pub items_removed: u64,
    /// Whether the requested number of bytes was actually recovered
    pub target_reached: bool,
}

impl CleanupReport {
    pub(crate) fn record(&mut self, bytes: u64) {
        self.bytes_freed += bytes;
        self.items_removed += 1;
    }
}
