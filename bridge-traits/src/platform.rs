//! Platform Storage Abstraction
//!
//! Quota estimation, persistence grants, foreground visibility and bulk
//! cache-storage purge. Backed by the StorageManager/visibility APIs on web
//! hosts and by filesystem statistics on native hosts.

use async_trait::async_trait;

use crate::error::Result;

/// Platform storage usage estimate.
///
/// Either field may be absent when the platform cannot answer; callers fall
/// back to their own accounting in that case.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QuotaEstimate {
    /// Bytes currently used by this origin/application
    pub usage: Option<u64>,
    /// Upper bound the platform will allow
    pub quota: Option<u64>,
}

/// Platform-level storage capabilities consumed by the storage quota
/// manager and the binary content cache.
#[async_trait]
pub trait PlatformStorage: Send + Sync {
    /// Estimate current usage and quota for this origin.
    async fn estimate(&self) -> Result<QuotaEstimate>;

    /// Whether the platform has already granted storage persistence.
    async fn is_persisted(&self) -> Result<bool>;

    /// Ask the platform not to evict this origin's storage under pressure.
    /// Returns whether persistence is granted after the request.
    async fn request_persistence(&self) -> Result<bool>;

    /// Whether the host application is currently foregrounded/visible.
    ///
    /// Writes to the binary cache are skipped while backgrounded to avoid
    /// corrupting the store during suspended execution.
    fn is_foreground(&self) -> bool;

    /// Enumerate and delete platform-level cache storage (e.g. CacheStorage
    /// buckets). Returns the bytes reclaimed, best effort.
    async fn purge_cache_storage(&self) -> Result<u64>;
}
