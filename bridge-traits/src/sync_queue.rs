//! Write-Behind Sync Queue Abstraction
//!
//! The sync queue replays local mutations to the server when connectivity
//! returns. The core does not own it: it only inspects entries for storage
//! accounting and may delete entries that are failed with an exhausted
//! retry budget. Pending and in-flight entries represent unsynced user
//! mutations and must never be removed by the core.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Lifecycle state of a queued mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncEntryStatus {
    /// Waiting to be replayed
    Pending,
    /// Currently being replayed
    InFlight,
    /// Replay failed; will be retried while the budget lasts
    Failed,
}

/// One queued mutation, as visible to the core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncQueueEntry {
    pub id: String,
    pub status: SyncEntryStatus,
    pub retries: u32,
    pub max_retries: u32,
    /// Serialized payload size, for storage accounting
    pub payload_bytes: u64,
}

impl SyncQueueEntry {
    /// Whether the storage manager is allowed to evict this entry.
    ///
    /// Only failed entries with an exhausted retry budget qualify.
    pub fn is_evictable(&self) -> bool {
        self.status == SyncEntryStatus::Failed && self.retries >= self.max_retries
    }
}

/// Read-mostly view over the sync queue.
#[async_trait]
pub trait SyncQueue: Send + Sync {
    /// Number of entries still waiting to be replayed.
    async fn pending_count(&self) -> Result<usize>;

    /// Snapshot of all entries.
    async fn entries(&self) -> Result<Vec<SyncQueueEntry>>;

    /// Remove a single entry by id. Implementations must reject removal of
    /// entries that are not evictable.
    async fn remove(&self, id: &str) -> Result<()>;
}
