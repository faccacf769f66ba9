//! Whole-book binary cache
//!
//! Bounded content cache over the binary repository. Policy:
//!
//! - Fixed byte cap; writes evict least-recently-used entries to fit.
//! - Fixed TTL measured from `cached_at`; reads never revive an expired
//!   entry, its deletion is spawned off the read path.
//! - Payload integrity is checked against a SHA-256 hash on every read.
//! - Writes are skipped while the host is backgrounded.
//!
//! Cache failures are not caller errors: the public surface returns
//! `Option` / `bool` and logs the underlying cause.

use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::{debug, instrument, warn};

use core_library::models::{now_ts, BookKey, CachedBinary};
use core_library::repositories::BinaryRepository;

use bridge_traits::PlatformStorage;

use crate::config::StorageConfig;
use crate::error::Result;

/// Hex SHA-256 of a payload.
pub fn content_hash(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    digest.iter().fold(String::with_capacity(64), |mut acc, b| {
        use std::fmt::Write;
        let _ = write!(acc, "{:02x}", b);
        acc
    })
}

/// TTL + LRU bounded cache for whole-book binaries.
pub struct BinaryContentCache {
    repo: Arc<dyn BinaryRepository>,
    platform: Arc<dyn PlatformStorage>,
    config: StorageConfig,
}

impl BinaryContentCache {
    pub fn new(
        repo: Arc<dyn BinaryRepository>,
        platform: Arc<dyn PlatformStorage>,
        config: StorageConfig,
    ) -> Self {
        Self {
            repo,
            platform,
            config,
        }
    }

    /// Whether a live (unexpired) entry exists for the key.
    ///
    /// An expired entry reports `false` and its deletion is spawned off the
    /// check, same as on a read.
    pub async fn has(&self, key: &BookKey) -> bool {
        match self.repo.find(key).await {
            Ok(Some(binary)) => {
                if binary.is_expired(now_ts(), self.config.binary_ttl_secs()) {
                    debug!(key = %key, "Cached binary expired");
                    self.spawn_delete(key.clone());
                    return false;
                }
                true
            }
            Ok(None) => false,
            Err(e) => {
                warn!(key = %key, error = %e, "Binary cache lookup failed");
                false
            }
        }
    }

    /// Fetch a cached binary.
    ///
    /// Returns `None` on miss, expiry, integrity failure or storage error.
    /// Expired and corrupt entries are deleted off the read path.
    #[instrument(skip(self), fields(key = %key))]
    pub async fn get(&self, key: &BookKey) -> Option<Vec<u8>> {
        match self.try_get(key).await {
            Ok(payload) => payload,
            Err(e) => {
                warn!(key = %key, error = %e, "Binary cache read failed");
                None
            }
        }
    }

    async fn try_get(&self, key: &BookKey) -> Result<Option<Vec<u8>>> {
        let Some(binary) = self.repo.find(key).await? else {
            return Ok(None);
        };

        if binary.is_expired(now_ts(), self.config.binary_ttl_secs()) {
            debug!(key = %key, "Cached binary expired");
            self.spawn_delete(key.clone());
            return Ok(None);
        }

        if content_hash(&binary.payload) != binary.content_hash {
            warn!(key = %key, "Cached binary failed integrity check");
            self.spawn_delete(key.clone());
            return Ok(None);
        }

        self.repo.touch(key, now_ts()).await?;
        Ok(Some(binary.payload))
    }

    /// Store a binary, evicting to stay under the cap.
    ///
    /// Returns `false` when the write was skipped: host backgrounded,
    /// payload larger than the whole cache, or a storage error.
    #[instrument(skip(self, payload), fields(key = %key, bytes = payload.len()))]
    pub async fn set(&self, key: &BookKey, payload: Vec<u8>) -> bool {
        if !self.platform.is_foreground() {
            debug!(key = %key, "Skipping binary cache write while backgrounded");
            return false;
        }
        if payload.len() as u64 > self.config.binary_cache_max_bytes {
            warn!(
                key = %key,
                bytes = payload.len(),
                cap = self.config.binary_cache_max_bytes,
                "Payload exceeds binary cache cap"
            );
            return false;
        }

        match self.try_set(key, payload).await {
            Ok(()) => true,
            Err(e) => {
                warn!(key = %key, error = %e, "Binary cache write failed");
                false
            }
        }
    }

    async fn try_set(&self, key: &BookKey, payload: Vec<u8>) -> Result<()> {
        self.ensure_capacity(payload.len() as u64).await?;

        let now = now_ts();
        let binary = CachedBinary {
            key: key.clone(),
            byte_size: payload.len() as u64,
            content_hash: content_hash(&payload),
            payload,
            cached_at: now,
            last_accessed_at: now,
        };
        self.repo.upsert(&binary).await?;
        Ok(())
    }

    /// Drop the entry for a key.
    pub async fn remove(&self, key: &BookKey) -> bool {
        match self.repo.delete(key).await {
            Ok(bytes) => bytes > 0,
            Err(e) => {
                warn!(key = %key, error = %e, "Binary cache delete failed");
                false
            }
        }
    }

    /// Maintenance pass: drop expired entries, then bulk-evict the least
    /// recently used entries when occupancy is above the trigger fraction.
    ///
    /// Returns bytes freed.
    #[instrument(skip(self))]
    pub async fn cleanup(&self) -> u64 {
        match self.try_cleanup().await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "Binary cache cleanup failed");
                0
            }
        }
    }

    async fn try_cleanup(&self) -> Result<u64> {
        let mut freed = self.evict_expired().await?;

        let total = self.repo.total_bytes().await? as u64;
        let trigger =
            (self.config.binary_cache_max_bytes as f64 * self.config.lru_trigger_fraction) as u64;
        if total > trigger {
            let count = self.repo.count().await?;
            let evict_count =
                ((count as f64 * self.config.lru_evict_fraction).ceil() as u32).max(1);
            for entry in self.repo.find_lru(evict_count).await? {
                let key = BookKey::new(entry.user_id, entry.book_id)?;
                freed += self.repo.delete(&key).await? as u64;
            }
        }

        Ok(freed)
    }

    async fn evict_expired(&self) -> Result<u64> {
        let cutoff = now_ts() - self.config.binary_ttl_secs();
        let mut freed = 0u64;
        for entry in self.repo.find_expired(cutoff).await? {
            let key = BookKey::new(entry.user_id, entry.book_id)?;
            freed += self.repo.delete(&key).await? as u64;
        }
        Ok(freed)
    }

    /// Make room for an incoming payload: expired entries first, then LRU
    /// eviction until the write fits under the cap.
    async fn ensure_capacity(&self, incoming: u64) -> Result<()> {
        let mut total = self.repo.total_bytes().await? as u64;
        if total + incoming <= self.config.binary_cache_max_bytes {
            return Ok(());
        }

        self.evict_expired().await?;
        total = self.repo.total_bytes().await? as u64;

        while total + incoming > self.config.binary_cache_max_bytes {
            let victims = self.repo.find_lru(8).await?;
            if victims.is_empty() {
                break;
            }
            for victim in victims {
                let key = BookKey::new(victim.user_id, victim.book_id)?;
                let bytes = self.repo.delete(&key).await? as u64;
                debug!(key = %key, bytes, "Evicted binary for capacity");
                total = total.saturating_sub(bytes);
                if total + incoming <= self.config.binary_cache_max_bytes {
                    break;
                }
            }
        }

        Ok(())
    }

    fn spawn_delete(&self, key: BookKey) {
        let repo = Arc::clone(&self.repo);
        tokio::spawn(async move {
            if let Err(e) = repo.delete(&key).await {
                warn!(key = %key, error = %e, "Deferred binary delete failed");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;
    use bridge_traits::{QuotaEstimate, Result as BridgeResult};
    use core_library::db::create_test_pool;
    use core_library::repositories::{BinaryRepository as _, SqliteBinaryRepository};

    struct TestPlatform {
        foreground: bool,
    }

    #[async_trait]
    impl PlatformStorage for TestPlatform {
        async fn estimate(&self) -> BridgeResult<QuotaEstimate> {
            Ok(QuotaEstimate {
                usage: None,
                quota: None,
            })
        }

        async fn is_persisted(&self) -> BridgeResult<bool> {
            Ok(false)
        }

        async fn request_persistence(&self) -> BridgeResult<bool> {
            Ok(false)
        }

        fn is_foreground(&self) -> bool {
            self.foreground
        }

        async fn purge_cache_storage(&self) -> BridgeResult<u64> {
            Ok(0)
        }
    }

    async fn cache_with(config: StorageConfig, foreground: bool) -> (BinaryContentCache, Arc<SqliteBinaryRepository>) {
        let pool = create_test_pool().await.unwrap();
        let repo = Arc::new(SqliteBinaryRepository::new(pool));
        repo.initialize().await.unwrap();
        let cache = BinaryContentCache::new(
            repo.clone(),
            Arc::new(TestPlatform { foreground }),
            config,
        );
        (cache, repo)
    }

    fn key(book: &str) -> BookKey {
        BookKey::new("u1", book).unwrap()
    }

    #[tokio::test]
    async fn set_then_get_roundtrip() {
        let (cache, _repo) = cache_with(StorageConfig::default(), true).await;
        let k = key("b1");
        assert!(cache.set(&k, vec![1, 2, 3]).await);
        assert!(cache.has(&k).await);
        assert_eq!(cache.get(&k).await, Some(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn miss_returns_none() {
        let (cache, _repo) = cache_with(StorageConfig::default(), true).await;
        assert_eq!(cache.get(&key("missing")).await, None);
        assert!(!cache.has(&key("missing")).await);
    }

    #[tokio::test]
    async fn background_writes_are_skipped() {
        let (cache, repo) = cache_with(StorageConfig::default(), false).await;
        assert!(!cache.set(&key("b1"), vec![1]).await);
        assert_eq!(repo.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn oversized_payload_is_rejected() {
        let config = StorageConfig::default().with_binary_cache_max_bytes(16);
        let (cache, _repo) = cache_with(config, true).await;
        assert!(!cache.set(&key("b1"), vec![0; 17]).await);
    }

    #[tokio::test]
    async fn capacity_is_enforced_by_lru_eviction() {
        let config = StorageConfig::default().with_binary_cache_max_bytes(100);
        let (cache, repo) = cache_with(config, true).await;

        assert!(cache.set(&key("a"), vec![0; 40]).await);
        assert!(cache.set(&key("b"), vec![0; 40]).await);

        // Freshen "a" so "b" is the LRU victim
        repo.touch(&key("a"), now_ts() + 10).await.unwrap();

        assert!(cache.set(&key("c"), vec![0; 40]).await);

        assert!(repo.total_bytes().await.unwrap() <= 100);
        assert!(cache.has(&key("a")).await);
        assert!(!cache.has(&key("b")).await);
        assert!(cache.has(&key("c")).await);
    }

    #[tokio::test]
    async fn expired_entry_is_invisible_and_deleted() {
        let config = StorageConfig::default().with_binary_ttl(Duration::from_secs(100));
        let (cache, repo) = cache_with(config, true).await;
        let k = key("old");

        let stale = CachedBinary {
            key: k.clone(),
            payload: vec![7; 4],
            byte_size: 4,
            content_hash: content_hash(&[7; 4]),
            cached_at: now_ts() - 200,
            last_accessed_at: now_ts(),
        };
        repo.upsert(&stale).await.unwrap();

        assert_eq!(cache.get(&k).await, None);
        assert!(!cache.has(&k).await);

        // Let the deferred delete run
        let mut deleted = false;
        for _ in 0..50 {
            tokio::task::yield_now().await;
            if repo.find(&k).await.unwrap().is_none() {
                deleted = true;
                break;
            }
        }
        assert!(deleted);
    }

    #[tokio::test]
    async fn has_alone_deletes_expired_entry() {
        let config = StorageConfig::default().with_binary_ttl(Duration::from_secs(100));
        let (cache, repo) = cache_with(config, true).await;
        let k = key("old");

        let stale = CachedBinary {
            key: k.clone(),
            payload: vec![9; 4],
            byte_size: 4,
            content_hash: content_hash(&[9; 4]),
            cached_at: now_ts() - 200,
            last_accessed_at: now_ts(),
        };
        repo.upsert(&stale).await.unwrap();

        // Only the existence check runs, never a read
        assert!(!cache.has(&k).await);

        let mut deleted = false;
        for _ in 0..50 {
            tokio::task::yield_now().await;
            if repo.find(&k).await.unwrap().is_none() {
                deleted = true;
                break;
            }
        }
        assert!(deleted);
    }

    #[tokio::test]
    async fn corrupt_entry_is_invisible() {
        let (cache, repo) = cache_with(StorageConfig::default(), true).await;
        let k = key("bad");

        let corrupt = CachedBinary {
            key: k.clone(),
            payload: vec![1, 2, 3],
            byte_size: 3,
            content_hash: "not-the-right-hash".to_string(),
            cached_at: now_ts(),
            last_accessed_at: now_ts(),
        };
        repo.upsert(&corrupt).await.unwrap();

        assert_eq!(cache.get(&k).await, None);
    }

    #[tokio::test]
    async fn cleanup_drops_expired_then_bulk_evicts() {
        let config = StorageConfig::default()
            .with_binary_cache_max_bytes(100)
            .with_binary_ttl(Duration::from_secs(1_000));
        let (cache, repo) = cache_with(config, true).await;

        let expired = CachedBinary {
            key: key("expired"),
            payload: vec![0; 30],
            byte_size: 30,
            content_hash: content_hash(&[0; 30]),
            cached_at: now_ts() - 2_000,
            last_accessed_at: now_ts(),
        };
        repo.upsert(&expired).await.unwrap();
        assert!(cache.set(&key("live"), vec![0; 40]).await);

        let freed = cache.cleanup().await;
        assert!(freed >= 30);
        assert!(repo.find(&key("expired")).await.unwrap().is_none());
        assert!(cache.has(&key("live")).await);
    }
}
