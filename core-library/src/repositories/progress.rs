//! Reading progress repository trait and implementation

use async_trait::async_trait;
use sqlx::{query, query_as, FromRow, SqlitePool};

use crate::error::Result;
use crate::models::ReadingProgressRecord;

/// Locally recorded reading positions, one row per (user, book).
#[async_trait]
pub trait ReadingProgressRepository: Send + Sync {
    /// Create the `reading_progress` table.
    async fn initialize(&self) -> Result<()>;

    /// Insert or replace the position for its key.
    async fn upsert(&self, record: &ReadingProgressRecord) -> Result<()>;

    /// Find the recorded position.
    async fn find(&self, user_id: &str, book_id: &str) -> Result<Option<ReadingProgressRecord>>;

    /// Delete the recorded position.
    ///
    /// # Returns
    /// - `Ok(true)` if a record was deleted
    /// - `Ok(false)` if none existed for the key
    async fn delete(&self, user_id: &str, book_id: &str) -> Result<bool>;

    /// Total bytes of stored locators.
    async fn total_bytes(&self) -> Result<i64>;

    /// Count all records.
    async fn count(&self) -> Result<i64>;
}

#[derive(FromRow)]
struct ProgressRow {
    user_id: String,
    book_id: String,
    locator: String,
    progress_percent: f64,
    updated_at: i64,
}

impl From<ProgressRow> for ReadingProgressRecord {
    fn from(row: ProgressRow) -> Self {
        ReadingProgressRecord {
            user_id: row.user_id,
            book_id: row.book_id,
            locator: row.locator,
            progress_percent: row.progress_percent,
            updated_at: row.updated_at,
        }
    }
}

/// SQLite implementation of ReadingProgressRepository
pub struct SqliteReadingProgressRepository {
    pool: SqlitePool,
}

impl SqliteReadingProgressRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReadingProgressRepository for SqliteReadingProgressRepository {
    async fn initialize(&self) -> Result<()> {
        query(
            r#"
            CREATE TABLE IF NOT EXISTS reading_progress (
                user_id TEXT NOT NULL,
                book_id TEXT NOT NULL,
                locator TEXT NOT NULL,
                progress_percent REAL NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (user_id, book_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn upsert(&self, record: &ReadingProgressRecord) -> Result<()> {
        query(
            r#"
            INSERT OR REPLACE INTO reading_progress (
                user_id, book_id, locator, progress_percent, updated_at
            )
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.user_id)
        .bind(&record.book_id)
        .bind(&record.locator)
        .bind(record.progress_percent)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find(&self, user_id: &str, book_id: &str) -> Result<Option<ReadingProgressRecord>> {
        let row = query_as::<_, ProgressRow>(
            "SELECT * FROM reading_progress WHERE user_id = ? AND book_id = ?",
        )
        .bind(user_id)
        .bind(book_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(ReadingProgressRecord::from))
    }

    async fn delete(&self, user_id: &str, book_id: &str) -> Result<bool> {
        let result = query("DELETE FROM reading_progress WHERE user_id = ? AND book_id = ?")
            .bind(user_id)
            .bind(book_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn total_bytes(&self) -> Result<i64> {
        let size: Option<i64> = query_as("SELECT SUM(LENGTH(locator)) FROM reading_progress")
            .fetch_one(&self.pool)
            .await
            .map(|row: (Option<i64>,)| row.0)?;

        Ok(size.unwrap_or(0))
    }

    async fn count(&self) -> Result<i64> {
        let count: i64 = query_as("SELECT COUNT(*) FROM reading_progress")
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
    use crate::models::now_ts;

    async fn setup() -> SqliteReadingProgressRepository {
        let pool = create_test_pool().await.unwrap();
        let repo = SqliteReadingProgressRepository::new(pool);
        repo.initialize().await.unwrap();
        repo
    }

    fn sample(user: &str, book: &str, percent: f64) -> ReadingProgressRecord {
        ReadingProgressRecord {
            user_id: user.to_string(),
            book_id: book.to_string(),
            locator: "epubcfi(/6/4!/4/2/14)".to_string(),
            progress_percent: percent,
            updated_at: now_ts(),
        }
    }

    #[tokio::test]
    async fn upsert_and_find_roundtrip() {
        let repo = setup().await;
        let record = sample("u1", "b1", 42.5);
        repo.upsert(&record).await.unwrap();

        let found = repo.find("u1", "b1").await.unwrap().unwrap();
        assert_eq!(found, record);
    }

    #[tokio::test]
    async fn upsert_overwrites_previous_position() {
        let repo = setup().await;
        repo.upsert(&sample("u1", "b1", 10.0)).await.unwrap();
        repo.upsert(&sample("u1", "b1", 55.0)).await.unwrap();

        let found = repo.find("u1", "b1").await.unwrap().unwrap();
        assert_eq!(found.progress_percent, 55.0);
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn delete_reports_whether_record_existed() {
        let repo = setup().await;
        repo.upsert(&sample("u1", "b1", 10.0)).await.unwrap();

        assert!(repo.delete("u1", "b1").await.unwrap());
        assert!(!repo.delete("u1", "b1").await.unwrap());
    }
}
