//! Cached image repository trait and implementation

use async_trait::async_trait;
use sqlx::{query, query_as, FromRow, SqlitePool};

use crate::error::Result;
use crate::models::CachedImage;

/// Lightweight image reference for eviction scans; carries no pixel data.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct ImageRef {
    pub user_id: String,
    pub book_id: String,
    pub image_id: String,
    pub byte_size: i64,
    pub cached_at: i64,
}

/// Generated illustration access, one row per (user, book, image).
#[async_trait]
pub trait ImageRepository: Send + Sync {
    /// Create the `cached_images` table and its indexes.
    async fn initialize(&self) -> Result<()>;

    /// Insert or replace an image.
    async fn insert(&self, image: &CachedImage) -> Result<()>;

    /// Find a cached image.
    async fn find(
        &self,
        user_id: &str,
        book_id: &str,
        image_id: &str,
    ) -> Result<Option<CachedImage>>;

    /// Oldest cached images first, up to `limit`.
    async fn find_oldest(&self, limit: u32) -> Result<Vec<ImageRef>>;

    /// Delete an image.
    ///
    /// # Returns
    /// Bytes freed, 0 if no image was cached for the key.
    async fn delete(&self, user_id: &str, book_id: &str, image_id: &str) -> Result<i64>;

    /// Refresh the access timestamp.
    async fn touch(&self, user_id: &str, book_id: &str, image_id: &str, now: i64) -> Result<()>;

    /// Total bytes of cached image data.
    async fn total_bytes(&self) -> Result<i64>;

    /// Count all cached images.
    async fn count(&self) -> Result<i64>;
}

/// SQLite implementation of ImageRepository
pub struct SqliteImageRepository {
    pool: SqlitePool,
}

impl SqliteImageRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ImageRepository for SqliteImageRepository {
    async fn initialize(&self) -> Result<()> {
        query(
            r#"
            CREATE TABLE IF NOT EXISTS cached_images (
                user_id TEXT NOT NULL,
                book_id TEXT NOT NULL,
                image_id TEXT NOT NULL,
                data BLOB NOT NULL,
                byte_size INTEGER NOT NULL,
                cached_at INTEGER NOT NULL,
                last_accessed_at INTEGER NOT NULL,
                PRIMARY KEY (user_id, book_id, image_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        query(
            "CREATE INDEX IF NOT EXISTS idx_cached_images_cached
             ON cached_images (cached_at)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn insert(&self, image: &CachedImage) -> Result<()> {
        query(
            r#"
            INSERT OR REPLACE INTO cached_images (
                user_id, book_id, image_id, data, byte_size, cached_at, last_accessed_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&image.user_id)
        .bind(&image.book_id)
        .bind(&image.image_id)
        .bind(&image.data)
        .bind(image.byte_size as i64)
        .bind(image.cached_at)
        .bind(image.last_accessed_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find(
        &self,
        user_id: &str,
        book_id: &str,
        image_id: &str,
    ) -> Result<Option<CachedImage>> {
        let row: Option<(Vec<u8>, i64, i64, i64)> = query_as(
            "SELECT data, byte_size, cached_at, last_accessed_at FROM cached_images
             WHERE user_id = ? AND book_id = ? AND image_id = ?",
        )
        .bind(user_id)
        .bind(book_id)
        .bind(image_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(data, byte_size, cached_at, last_accessed_at)| CachedImage {
            user_id: user_id.to_string(),
            book_id: book_id.to_string(),
            image_id: image_id.to_string(),
            data,
            byte_size: byte_size as u64,
            cached_at,
            last_accessed_at,
        }))
    }

    async fn find_oldest(&self, limit: u32) -> Result<Vec<ImageRef>> {
        let refs = query_as::<_, ImageRef>(
            "SELECT user_id, book_id, image_id, byte_size, cached_at
             FROM cached_images
             ORDER BY cached_at ASC
             LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(refs)
    }

    async fn delete(&self, user_id: &str, book_id: &str, image_id: &str) -> Result<i64> {
        let size: Option<(i64,)> = query_as(
            "SELECT byte_size FROM cached_images
             WHERE user_id = ? AND book_id = ? AND image_id = ?",
        )
        .bind(user_id)
        .bind(book_id)
        .bind(image_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some((byte_size,)) = size else {
            return Ok(0);
        };

        query(
            "DELETE FROM cached_images
             WHERE user_id = ? AND book_id = ? AND image_id = ?",
        )
        .bind(user_id)
        .bind(book_id)
        .bind(image_id)
        .execute(&self.pool)
        .await?;

        Ok(byte_size)
    }

    async fn touch(&self, user_id: &str, book_id: &str, image_id: &str, now: i64) -> Result<()> {
        query(
            "UPDATE cached_images SET last_accessed_at = ?
             WHERE user_id = ? AND book_id = ? AND image_id = ?",
        )
        .bind(now)
        .bind(user_id)
        .bind(book_id)
        .bind(image_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn total_bytes(&self) -> Result<i64> {
        let size: Option<i64> = query_as("SELECT SUM(byte_size) FROM cached_images")
            .fetch_one(&self.pool)
            .await
            .map(|row: (Option<i64>,)| row.0)?;

        Ok(size.unwrap_or(0))
    }

    async fn count(&self) -> Result<i64> {
        let count: i64 = query_as("SELECT COUNT(*) FROM cached_images")
            .fetch_one(&self.pool)
            .await
            .map(|row: (i64,)| row.0)?;

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;

    async fn setup() -> SqliteImageRepository {
        let pool = create_test_pool().await.unwrap();
        let repo = SqliteImageRepository::new(pool);
        repo.initialize().await.unwrap();
        repo
    }

    #[tokio::test]
    async fn insert_and_find_roundtrip() {
        let repo = setup().await;
        let image = CachedImage::new("u1", "b1", "img-1", vec![9, 8, 7]);
        repo.insert(&image).await.unwrap();

        let found = repo.find("u1", "b1", "img-1").await.unwrap().unwrap();
        assert_eq!(found, image);
        assert_eq!(found.byte_size, 3);
    }

    #[tokio::test]
    async fn oldest_scan_is_bounded_and_ordered() {
        let repo = setup().await;
        for (id, cached_at) in [("a", 300), ("b", 100), ("c", 200)] {
            let mut image = CachedImage::new("u1", "b1", id, vec![0; 4]);
            image.cached_at = cached_at;
            repo.insert(&image).await.unwrap();
        }

        let oldest = repo.find_oldest(2).await.unwrap();
        assert_eq!(oldest.len(), 2);
        assert_eq!(oldest[0].image_id, "b");
        assert_eq!(oldest[1].image_id, "c");
    }

    #[tokio::test]
    async fn delete_returns_bytes_freed() {
        let repo = setup().await;
        let image = CachedImage::new("u1", "b1", "img-1", vec![0; 16]);
        repo.insert(&image).await.unwrap();

        assert_eq!(repo.delete("u1", "b1", "img-1").await.unwrap(), 16);
        assert_eq!(repo.delete("u1", "b1", "img-1").await.unwrap(), 0);
        assert_eq!(repo.count().await.unwrap(), 0);
    }
}
