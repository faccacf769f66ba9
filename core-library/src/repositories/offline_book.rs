//! Offline book repository trait and implementation

use std::str::FromStr;

use async_trait::async_trait;
use sqlx::{query, query_as, FromRow, SqlitePool};

use crate::error::{LibraryError, Result};
use crate::models::{BookKey, BookMetadata, BookStatus, OfflineBookRecord};

/// Offline book record access, one record per (user, book).
#[async_trait]
pub trait OfflineBookRepository: Send + Sync {
    /// Create the `offline_books` table and its indexes.
    async fn initialize(&self) -> Result<()>;

    /// Insert or replace the record for its key.
    async fn upsert(&self, record: &OfflineBookRecord) -> Result<()>;

    /// Find a record by key.
    async fn find(&self, key: &BookKey) -> Result<Option<OfflineBookRecord>>;

    /// All records for a user, most recently downloaded first.
    async fn find_all(&self, user_id: &str) -> Result<Vec<OfflineBookRecord>>;

    /// Keys of every record, across all users.
    async fn keys(&self) -> Result<Vec<BookKey>>;

    /// Update progress and status together.
    ///
    /// The two always move in one statement so a crash between them cannot
    /// leave a record claiming progress under the wrong status.
    async fn update_progress(&self, key: &BookKey, progress: u8, status: BookStatus)
        -> Result<()>;

    /// Set the status, replacing the stored failure message.
    async fn set_status(
        &self,
        key: &BookKey,
        status: BookStatus,
        last_error: Option<&str>,
    ) -> Result<()>;

    /// Refresh the access timestamp.
    async fn touch(&self, key: &BookKey, now: i64) -> Result<()>;

    /// Delete the record.
    ///
    /// # Returns
    /// - `Ok(true)` if a record was deleted
    /// - `Ok(false)` if no record existed for the key
    async fn delete(&self, key: &BookKey) -> Result<bool>;

    /// Count all records.
    async fn count(&self) -> Result<i64>;

    /// Total bytes of stored catalog metadata across all records.
    async fn metadata_bytes(&self) -> Result<i64>;
}

#[derive(FromRow)]
struct OfflineBookRow {
    user_id: String,
    book_id: String,
    metadata_json: String,
    download_progress: i64,
    status: String,
    last_error: Option<String>,
    downloaded_at: i64,
    last_accessed_at: i64,
}

impl TryFrom<OfflineBookRow> for OfflineBookRecord {
    type Error = LibraryError;

    fn try_from(row: OfflineBookRow) -> Result<Self> {
        let metadata: BookMetadata = serde_json::from_str(&row.metadata_json)?;
        Ok(OfflineBookRecord {
            key: BookKey::new(row.user_id, row.book_id)?,
            metadata,
            download_progress: row.download_progress.clamp(0, 100) as u8,
            status: BookStatus::from_str(&row.status)?,
            last_error: row.last_error,
            downloaded_at: row.downloaded_at,
            last_accessed_at: row.last_accessed_at,
        })
    }
}

/// SQLite implementation of OfflineBookRepository
pub struct SqliteOfflineBookRepository {
    pool: SqlitePool,
}

impl SqliteOfflineBookRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OfflineBookRepository for SqliteOfflineBookRepository {
    async fn initialize(&self) -> Result<()> {
        query(
            r#"
            CREATE TABLE IF NOT EXISTS offline_books (
                user_id TEXT NOT NULL,
                book_id TEXT NOT NULL,
                metadata_json TEXT NOT NULL,
                download_progress INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL,
                last_error TEXT,
                downloaded_at INTEGER NOT NULL,
                last_accessed_at INTEGER NOT NULL,
                PRIMARY KEY (user_id, book_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        query(
            "CREATE INDEX IF NOT EXISTS idx_offline_books_accessed
             ON offline_books (last_accessed_at)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn upsert(&self, record: &OfflineBookRecord) -> Result<()> {
        let metadata_json = serde_json::to_string(&record.metadata)?;

        query(
            r#"
            INSERT OR REPLACE INTO offline_books (
                user_id, book_id, metadata_json, download_progress,
                status, last_error, downloaded_at, last_accessed_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.key.user_id)
        .bind(&record.key.book_id)
        .bind(&metadata_json)
        .bind(record.download_progress as i64)
        .bind(record.status.as_str())
        .bind(&record.last_error)
        .bind(record.downloaded_at)
        .bind(record.last_accessed_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find(&self, key: &BookKey) -> Result<Option<OfflineBookRecord>> {
        let row = query_as::<_, OfflineBookRow>(
            "SELECT * FROM offline_books WHERE user_id = ? AND book_id = ?",
        )
        .bind(&key.user_id)
        .bind(&key.book_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(OfflineBookRecord::try_from).transpose()
    }

    async fn find_all(&self, user_id: &str) -> Result<Vec<OfflineBookRecord>> {
        let rows = query_as::<_, OfflineBookRow>(
            "SELECT * FROM offline_books WHERE user_id = ? ORDER BY downloaded_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(OfflineBookRecord::try_from)
            .collect()
    }

    async fn keys(&self) -> Result<Vec<BookKey>> {
        let rows: Vec<(String, String)> =
            query_as("SELECT user_id, book_id FROM offline_books")
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter()
            .map(|(user_id, book_id)| BookKey::new(user_id, book_id))
            .collect()
    }

    async fn update_progress(
        &self,
        key: &BookKey,
        progress: u8,
        status: BookStatus,
    ) -> Result<()> {
        let result = query(
            "UPDATE offline_books SET download_progress = ?, status = ?
             WHERE user_id = ? AND book_id = ?",
        )
        .bind(progress as i64)
        .bind(status.as_str())
        .bind(&key.user_id)
        .bind(&key.book_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(LibraryError::NotFound {
                entity_type: "OfflineBook".to_string(),
                key: key.composite(),
            });
        }

        Ok(())
    }

    async fn set_status(
        &self,
        key: &BookKey,
        status: BookStatus,
        last_error: Option<&str>,
    ) -> Result<()> {
        let result = query(
            "UPDATE offline_books SET status = ?, last_error = ?
             WHERE user_id = ? AND book_id = ?",
        )
        .bind(status.as_str())
        .bind(last_error)
        .bind(&key.user_id)
        .bind(&key.book_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(LibraryError::NotFound {
                entity_type: "OfflineBook".to_string(),
                key: key.composite(),
            });
        }

        Ok(())
    }

    async fn touch(&self, key: &BookKey, now: i64) -> Result<()> {
        query(
            "UPDATE offline_books SET last_accessed_at = ?
             WHERE user_id = ? AND book_id = ?",
        )
        .bind(now)
        .bind(&key.user_id)
        .bind(&key.book_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, key: &BookKey) -> Result<bool> {
        let result = query("DELETE FROM offline_books WHERE user_id = ? AND book_id = ?")
            .bind(&key.user_id)
            .bind(&key.book_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn count(&self) -> Result<i64> {
        let count: i64 = query_as("SELECT COUNT(*) FROM offline_books")
            .fetch_one(&self.pool)
            .await
            .map(|row: (i64,)| row.0)?;

        Ok(count)
    }

    async fn metadata_bytes(&self) -> Result<i64> {
        let size: Option<i64> = query_as("SELECT SUM(LENGTH(metadata_json)) FROM offline_books")
            .fetch_one(&self.pool)
            .await
            .map(|row: (Option<i64>,)| row.0)?;

        Ok(size.unwrap_or(0))
    }
}
