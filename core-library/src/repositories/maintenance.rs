//! Maintenance repository: the multi-table deletes that must be atomic.
//!
//! Removing a book touches five tables; clearing a user's offline data
//! touches all of them. Either every table reflects the removal or none
//! does, so both operations run inside a single SQLite transaction.

use async_trait::async_trait;
use sqlx::{query, query_as, Sqlite, SqlitePool, Transaction};
use tracing::{info, instrument};

use crate::error::Result;

/// Outcome of removing one book's offline data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BookPurge {
    pub chapters_removed: u64,
    pub images_removed: u64,
    pub record_removed: bool,
    pub binary_removed: bool,
    pub progress_removed: bool,
    pub bytes_freed: u64,
}

/// Outcome of clearing all offline data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClearReport {
    pub books_removed: u64,
    pub chapters_removed: u64,
    pub images_removed: u64,
    pub binaries_removed: u64,
    pub progress_removed: u64,
    pub bytes_freed: u64,
}

/// Cross-table cleanup operations.
#[async_trait]
pub trait MaintenanceRepository: Send + Sync {
    /// Remove every stored artifact of one book in a single transaction:
    /// book record, chapters, images, binary and reading position.
    async fn delete_book_data(&self, user_id: &str, book_id: &str) -> Result<BookPurge>;

    /// Remove all offline data across every table in a single transaction.
    async fn clear_offline_data(&self) -> Result<ClearReport>;
}

/// SQLite implementation of MaintenanceRepository
pub struct SqliteMaintenanceRepository {
    pool: SqlitePool,
}

impl SqliteMaintenanceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn book_bytes(
        tx: &mut Transaction<'_, Sqlite>,
        user_id: &str,
        book_id: &str,
    ) -> Result<i64> {
        let (chapter_bytes,): (Option<i64>,) = query_as(
            "SELECT SUM(byte_size) FROM cached_chapters WHERE user_id = ? AND book_id = ?",
        )
        .bind(user_id)
        .bind(book_id)
        .fetch_one(&mut **tx)
        .await?;

        let (image_bytes,): (Option<i64>,) = query_as(
            "SELECT SUM(byte_size) FROM cached_images WHERE user_id = ? AND book_id = ?",
        )
        .bind(user_id)
        .bind(book_id)
        .fetch_one(&mut **tx)
        .await?;

        let (binary_bytes,): (Option<i64>,) = query_as(
            "SELECT SUM(byte_size) FROM cached_binaries WHERE user_id = ? AND book_id = ?",
        )
        .bind(user_id)
        .bind(book_id)
        .fetch_one(&mut **tx)
        .await?;

        let (metadata_bytes,): (Option<i64>,) = query_as(
            "SELECT SUM(LENGTH(metadata_json)) FROM offline_books
             WHERE user_id = ? AND book_id = ?",
        )
        .bind(user_id)
        .bind(book_id)
        .fetch_one(&mut **tx)
        .await?;

        Ok(chapter_bytes.unwrap_or(0)
            + image_bytes.unwrap_or(0)
            + binary_bytes.unwrap_or(0)
            + metadata_bytes.unwrap_or(0))
    }
}

#[async_trait]
impl MaintenanceRepository for SqliteMaintenanceRepository {
    #[instrument(skip(self))]
    async fn delete_book_data(&self, user_id: &str, book_id: &str) -> Result<BookPurge> {
        let mut tx = self.pool.begin().await?;

        let bytes_freed = Self::book_bytes(&mut tx, user_id, book_id).await?;

        let chapters = query("DELETE FROM cached_chapters WHERE user_id = ? AND book_id = ?")
            .bind(user_id)
            .bind(book_id)
            .execute(&mut *tx)
            .await?;

        let images = query("DELETE FROM cached_images WHERE user_id = ? AND book_id = ?")
            .bind(user_id)
            .bind(book_id)
            .execute(&mut *tx)
            .await?;

        let binary = query("DELETE FROM cached_binaries WHERE user_id = ? AND book_id = ?")
            .bind(user_id)
            .bind(book_id)
            .execute(&mut *tx)
            .await?;

        let record = query("DELETE FROM offline_books WHERE user_id = ? AND book_id = ?")
            .bind(user_id)
            .bind(book_id)
            .execute(&mut *tx)
            .await?;

        let progress = query("DELETE FROM reading_progress WHERE user_id = ? AND book_id = ?")
            .bind(user_id)
            .bind(book_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        let purge = BookPurge {
            chapters_removed: chapters.rows_affected(),
            images_removed: images.rows_affected(),
            record_removed: record.rows_affected() > 0,
            binary_removed: binary.rows_affected() > 0,
            progress_removed: progress.rows_affected() > 0,
            bytes_freed: bytes_freed as u64,
        };

        info!(
            user_id,
            book_id,
            chapters = purge.chapters_removed,
            images = purge.images_removed,
            bytes_freed = purge.bytes_freed,
            "Removed offline book data"
        );

        Ok(purge)
    }

    #[instrument(skip(self))]
    async fn clear_offline_data(&self) -> Result<ClearReport> {
        let mut tx = self.pool.begin().await?;

        let (chapter_bytes,): (Option<i64>,) =
            query_as("SELECT SUM(byte_size) FROM cached_chapters")
                .fetch_one(&mut *tx)
                .await?;
        let (image_bytes,): (Option<i64>,) =
            query_as("SELECT SUM(byte_size) FROM cached_images")
                .fetch_one(&mut *tx)
                .await?;
        let (binary_bytes,): (Option<i64>,) =
            query_as("SELECT SUM(byte_size) FROM cached_binaries")
                .fetch_one(&mut *tx)
                .await?;
        let (metadata_bytes,): (Option<i64>,) =
            query_as("SELECT SUM(LENGTH(metadata_json)) FROM offline_books")
                .fetch_one(&mut *tx)
                .await?;

        let chapters = query("DELETE FROM cached_chapters").execute(&mut *tx).await?;
        let images = query("DELETE FROM cached_images").execute(&mut *tx).await?;
        let binaries = query("DELETE FROM cached_binaries").execute(&mut *tx).await?;
        let books = query("DELETE FROM offline_books").execute(&mut *tx).await?;
        let progress = query("DELETE FROM reading_progress").execute(&mut *tx).await?;

        tx.commit().await?;

        let report = ClearReport {
            books_removed: books.rows_affected(),
            chapters_removed: chapters.rows_affected(),
            images_removed: images.rows_affected(),
            binaries_removed: binaries.rows_affected(),
            progress_removed: progress.rows_affected(),
            bytes_freed: (chapter_bytes.unwrap_or(0)
                + image_bytes.unwrap_or(0)
                + binary_bytes.unwrap_or(0)
                + metadata_bytes.unwrap_or(0)) as u64,
        };

        info!(
            books = report.books_removed,
            chapters = report.chapters_removed,
            bytes_freed = report.bytes_freed,
            "Cleared all offline data"
        );

        Ok(report)
    }
}
