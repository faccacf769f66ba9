//! Whole-book binary repository trait and implementation
//!
//! Backing store for the binary content cache: one payload per (user, book),
//! with the access and age metadata the cache's TTL and LRU policies run on.

use async_trait::async_trait;
use sqlx::{query, query_as, FromRow, SqlitePool};

use crate::error::Result;
use crate::models::{BookKey, CachedBinary};

/// Lightweight binary reference for eviction scans; carries no payload.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct BinaryRef {
    pub user_id: String,
    pub book_id: String,
    pub byte_size: i64,
    pub cached_at: i64,
    pub last_accessed_at: i64,
}

/// Whole-book binary access, one row per (user, book).
#[async_trait]
pub trait BinaryRepository: Send + Sync {
    /// Create the `cached_binaries` table and its indexes.
    async fn initialize(&self) -> Result<()>;

    /// Insert or replace the binary for its key.
    async fn upsert(&self, binary: &CachedBinary) -> Result<()>;

    /// Find a cached binary.
    async fn find(&self, key: &BookKey) -> Result<Option<CachedBinary>>;

    /// Delete a binary.
    ///
    /// # Returns
    /// Bytes freed, 0 if no binary was cached for the key.
    async fn delete(&self, key: &BookKey) -> Result<i64>;

    /// Binaries cached before `cutoff`, regardless of access time.
    async fn find_expired(&self, cutoff: i64) -> Result<Vec<BinaryRef>>;

    /// Least recently accessed binaries first, up to `limit`.
    async fn find_lru(&self, limit: u32) -> Result<Vec<BinaryRef>>;

    /// Refresh the access timestamp.
    async fn touch(&self, key: &BookKey, now: i64) -> Result<()>;

    /// Total bytes of cached binary payloads.
    async fn total_bytes(&self) -> Result<i64>;

    /// Count all cached binaries.
    async fn count(&self) -> Result<i64>;
}

#[derive(FromRow)]
struct BinaryRow {
    user_id: String,
    book_id: String,
    payload: Vec<u8>,
    byte_size: i64,
    content_hash: String,
    cached_at: i64,
    last_accessed_at: i64,
}

impl TryFrom<BinaryRow> for CachedBinary {
    type Error = crate::error::LibraryError;

    fn try_from(row: BinaryRow) -> Result<Self> {
        Ok(CachedBinary {
            key: BookKey::new(row.user_id, row.book_id)?,
            payload: row.payload,
            byte_size: row.byte_size as u64,
            content_hash: row.content_hash,
            cached_at: row.cached_at,
            last_accessed_at: row.last_accessed_at,
        })
    }
}

/// SQLite implementation of BinaryRepository
pub struct SqliteBinaryRepository {
    pool: SqlitePool,
}

impl SqliteBinaryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BinaryRepository for SqliteBinaryRepository {
    async fn initialize(&self) -> Result<()> {
        query(
            r#"
            CREATE TABLE IF NOT EXISTS cached_binaries (
                user_id TEXT NOT NULL,
                book_id TEXT NOT NULL,
                payload BLOB NOT NULL,
                byte_size INTEGER NOT NULL,
                content_hash TEXT NOT NULL,
                cached_at INTEGER NOT NULL,
                last_accessed_at INTEGER NOT NULL,
                PRIMARY KEY (user_id, book_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        query(
            "CREATE INDEX IF NOT EXISTS idx_cached_binaries_accessed
             ON cached_binaries (last_accessed_at)",
        )
        .execute(&self.pool)
        .await?;

        query(
            "CREATE INDEX IF NOT EXISTS idx_cached_binaries_cached
             ON cached_binaries (cached_at)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn upsert(&self, binary: &CachedBinary) -> Result<()> {
        query(
            r#"
            INSERT OR REPLACE INTO cached_binaries (
                user_id, book_id, payload, byte_size, content_hash,
                cached_at, last_accessed_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&binary.key.user_id)
        .bind(&binary.key.book_id)
        .bind(&binary.payload)
        .bind(binary.byte_size as i64)
        .bind(&binary.content_hash)
        .bind(binary.cached_at)
        .bind(binary.last_accessed_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find(&self, key: &BookKey) -> Result<Option<CachedBinary>> {
        let row = query_as::<_, BinaryRow>(
            "SELECT * FROM cached_binaries WHERE user_id = ? AND book_id = ?",
        )
        .bind(&key.user_id)
        .bind(&key.book_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(CachedBinary::try_from).transpose()
    }

    async fn delete(&self, key: &BookKey) -> Result<i64> {
        let size: Option<(i64,)> = query_as(
            "SELECT byte_size FROM cached_binaries WHERE user_id = ? AND book_id = ?",
        )
        .bind(&key.user_id)
        .bind(&key.book_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some((byte_size,)) = size else {
            return Ok(0);
        };

        query("DELETE FROM cached_binaries WHERE user_id = ? AND book_id = ?")
            .bind(&key.user_id)
            .bind(&key.book_id)
            .execute(&self.pool)
            .await?;

        Ok(byte_size)
    }

    async fn find_expired(&self, cutoff: i64) -> Result<Vec<BinaryRef>> {
        let refs = query_as::<_, BinaryRef>(
            "SELECT user_id, book_id, byte_size, cached_at, last_accessed_at
             FROM cached_binaries
             WHERE cached_at <= ?
             ORDER BY cached_at ASC",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        Ok(refs)
    }

    async fn find_lru(&self, limit: u32) -> Result<Vec<BinaryRef>> {
        let refs = query_as::<_, BinaryRef>(
            "SELECT user_id, book_id, byte_size, cached_at, last_accessed_at
             FROM cached_binaries
             ORDER BY last_accessed_at ASC
             LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(refs)
    }

    async fn touch(&self, key: &BookKey, now: i64) -> Result<()> {
        query(
            "UPDATE cached_binaries SET last_accessed_at = ?
             WHERE user_id = ? AND book_id = ?",
        )
        .bind(now)
        .bind(&key.user_id)
        .bind(&key.book_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn total_bytes(&self) -> Result<i64> {
        let size: Option<i64> = query_as("SELECT SUM(byte_size) FROM cached_binaries")
            .fetch_one(&self.pool)
            .await
            .map(|row: (Option<i64>,)| row.0)?;

        Ok(size.unwrap_or(0))
    }

    async fn count(&self) -> Result<i64> {
        let count: i64 = query_as("SELECT COUNT(*) FROM cached_binaries")
            .fetch_one(&self.pool)
            .await
            .map(|row: (i64,)| row.0)?;

        Ok(count)
    }
}
