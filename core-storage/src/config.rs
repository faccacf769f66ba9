//! Storage configuration

use std::time::Duration;

use crate::error::{Result, StorageError};

const DAY_SECS: u64 = 24 * 60 * 60;

/// Tuning knobs for the binary cache and the quota manager.
///
/// The defaults match the shipped behavior: a 200 MB binary cache with a
/// 30 day TTL, LRU eviction kicking in at 90% occupancy, and storage
/// pressure warnings at 80% / 95% of the platform quota.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Byte cap for the whole-book binary cache
    pub binary_cache_max_bytes: u64,

    /// Fixed lifetime of a cached binary, measured from when it was cached
    pub binary_ttl: Duration,

    /// Chapters not accessed for this long are eligible for staged cleanup
    pub chapter_ttl: Duration,

    /// Occupancy fraction of the binary cache above which bulk LRU
    /// eviction runs during cleanup
    pub lru_trigger_fraction: f64,

    /// Fraction of cached binaries removed by one bulk LRU pass
    pub lru_evict_fraction: f64,

    /// Upper bound on rows examined per staged-cleanup scan
    pub cleanup_scan_window: u32,

    /// Quota occupancy percent at which a pressure warning is emitted
    pub warning_threshold_percent: f64,

    /// Quota occupancy percent at which the warning becomes critical
    pub critical_threshold_percent: f64,

    /// Safety multiplier applied to a download's size estimate before
    /// comparing against free space
    pub download_headroom: f64,

    /// Assumed quota when the platform cannot provide an estimate
    pub fallback_quota_bytes: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            binary_cache_max_bytes: 200 * 1024 * 1024,
            binary_ttl: Duration::from_secs(30 * DAY_SECS),
            chapter_ttl: Duration::from_secs(30 * DAY_SECS),
            lru_trigger_fraction: 0.9,
            lru_evict_fraction: 0.2,
            cleanup_scan_window: 50,
            warning_threshold_percent: 80.0,
            critical_threshold_percent: 95.0,
            download_headroom: 1.2,
            fallback_quota_bytes: 1024 * 1024 * 1024,
        }
    }
}

impl StorageConfig {
    /// Set the binary cache byte cap
    pub fn with_binary_cache_max_bytes(mut self, bytes: u64) -> Self {
        self.binary_cache_max_bytes = bytes;
        self
    }

    /// Set the binary TTL
    pub fn with_binary_ttl(mut self, ttl: Duration) -> Self {
        self.binary_ttl = ttl;
        self
    }

    /// Set the chapter TTL
    pub fn with_chapter_ttl(mut self, ttl: Duration) -> Self {
        self.chapter_ttl = ttl;
        self
    }

    /// Set the staged-cleanup scan window
    pub fn with_cleanup_scan_window(mut self, window: u32) -> Self {
        self.cleanup_scan_window = window;
        self
    }

    /// Set the download headroom multiplier
    pub fn with_download_headroom(mut self, headroom: f64) -> Self {
        self.download_headroom = headroom;
        self
    }

    /// Set the fallback quota used when the platform has no estimate
    pub fn with_fallback_quota_bytes(mut self, bytes: u64) -> Self {
        self.fallback_quota_bytes = bytes;
        self
    }

    /// Validate configuration consistency.
    pub fn validate(&self) -> Result<()> {
        if self.binary_cache_max_bytes == 0 {
            return Err(StorageError::Config(
                "Binary cache cap must be non-zero".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.lru_trigger_fraction) {
            return Err(StorageError::Config(format!(
                "LRU trigger fraction {} outside 0..=1",
                self.lru_trigger_fraction
            )));
        }
        if !(0.0..=1.0).contains(&self.lru_evict_fraction) {
            return Err(StorageError::Config(format!(
                "LRU evict fraction {} outside 0..=1",
                self.lru_evict_fraction
            )));
        }
        if self.cleanup_scan_window == 0 {
            return Err(StorageError::Config(
                "Cleanup scan window must be non-zero".to_string(),
            ));
        }
        if self.warning_threshold_percent >= self.critical_threshold_percent {
            return Err(StorageError::Config(format!(
                "Warning threshold {}% must be below critical threshold {}%",
                self.warning_threshold_percent, self.critical_threshold_percent
            )));
        }
        if self.download_headroom < 1.0 {
            return Err(StorageError::Config(format!(
                "Download headroom {} must be at least 1.0",
                self.download_headroom
            )));
        }
        Ok(())
    }

    pub(crate) fn binary_ttl_secs(&self) -> i64 {
        self.binary_ttl.as_secs() as i64
    }

    pub(crate) fn chapter_ttl_secs(&self) -> i64 {
        self.chapter_ttl.as_secs() as i64
    }
}
