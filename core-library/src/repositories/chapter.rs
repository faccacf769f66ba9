//! Cached chapter repository trait and implementation
//!
//! Chapter content is immutable once cached: `insert` uses
//! `INSERT OR IGNORE`, so re-downloading an already-cached chapter is a
//! no-op and resumed downloads never rewrite existing rows.

use async_trait::async_trait;
use sqlx::{query, query_as, FromRow, SqlitePool};

use crate::error::Result;
use crate::models::{CachedChapter, ChapterDescription};

/// Lightweight chapter reference for eviction scans; carries no content.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct ChapterRef {
    pub user_id: String,
    pub book_id: String,
    pub chapter_number: i64,
    pub byte_size: i64,
    pub last_accessed_at: i64,
}

/// Cached chapter access, one row per (user, book, chapter number).
#[async_trait]
pub trait ChapterRepository: Send + Sync {
    /// Create the `cached_chapters` table and its indexes.
    async fn initialize(&self) -> Result<()>;

    /// Insert a chapter unless one is already cached for the key.
    ///
    /// # Returns
    /// - `Ok(true)` if the chapter was newly written
    /// - `Ok(false)` if a cached chapter already existed (left untouched)
    async fn insert(&self, chapter: &CachedChapter) -> Result<bool>;

    /// Whether a chapter is cached.
    async fn exists(&self, user_id: &str, book_id: &str, chapter_number: u32) -> Result<bool>;

    /// Find a cached chapter.
    async fn find(
        &self,
        user_id: &str,
        book_id: &str,
        chapter_number: u32,
    ) -> Result<Option<CachedChapter>>;

    /// Number of cached chapters for one book.
    async fn count_for_book(&self, user_id: &str, book_id: &str) -> Result<i64>;

    /// Delete a chapter.
    ///
    /// # Returns
    /// Bytes freed, 0 if no chapter was cached for the key.
    async fn delete(&self, user_id: &str, book_id: &str, chapter_number: u32) -> Result<i64>;

    /// Chapters not accessed since `cutoff`, least recently accessed first.
    async fn find_stale(&self, cutoff: i64, limit: u32) -> Result<Vec<ChapterRef>>;

    /// Refresh the access timestamp.
    async fn touch(
        &self,
        user_id: &str,
        book_id: &str,
        chapter_number: u32,
        now: i64,
    ) -> Result<()>;

    /// Total bytes of cached chapter content across all books.
    async fn total_bytes(&self) -> Result<i64>;

    /// Count all cached chapters.
    async fn count(&self) -> Result<i64>;
}

#[derive(FromRow)]
struct ChapterRow {
    user_id: String,
    book_id: String,
    chapter_number: i64,
    title: Option<String>,
    content: String,
    descriptions_json: String,
    word_count: i64,
    cached_at: i64,
    last_accessed_at: i64,
}

impl TryFrom<ChapterRow> for CachedChapter {
    type Error = crate::error::LibraryError;

    fn try_from(row: ChapterRow) -> Result<Self> {
        let descriptions: Vec<ChapterDescription> = serde_json::from_str(&row.descriptions_json)?;
        Ok(CachedChapter {
            user_id: row.user_id,
            book_id: row.book_id,
            chapter_number: row.chapter_number as u32,
            title: row.title,
            content: row.content,
            descriptions,
            word_count: row.word_count as u32,
            cached_at: row.cached_at,
            last_accessed_at: row.last_accessed_at,
        })
    }
}

/// SQLite implementation of ChapterRepository
pub struct SqliteChapterRepository {
    pool: SqlitePool,
}

impl SqliteChapterRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChapterRepository for SqliteChapterRepository {
    async fn initialize(&self) -> Result<()> {
        query(
            r#"
            CREATE TABLE IF NOT EXISTS cached_chapters (
                user_id TEXT NOT NULL,
                book_id TEXT NOT NULL,
                chapter_number INTEGER NOT NULL,
                title TEXT,
                content TEXT NOT NULL,
                descriptions_json TEXT NOT NULL,
                word_count INTEGER NOT NULL,
                byte_size INTEGER NOT NULL,
                cached_at INTEGER NOT NULL,
                last_accessed_at INTEGER NOT NULL,
                PRIMARY KEY (user_id, book_id, chapter_number)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        query(
            "CREATE INDEX IF NOT EXISTS idx_cached_chapters_accessed
             ON cached_chapters (last_accessed_at)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn insert(&self, chapter: &CachedChapter) -> Result<bool> {
        let descriptions_json = serde_json::to_string(&chapter.descriptions)?;
        let byte_size = (chapter.content.len() + descriptions_json.len()) as i64;

        let result = query(
            r#"
            INSERT OR IGNORE INTO cached_chapters (
                user_id, book_id, chapter_number, title, content,
                descriptions_json, word_count, byte_size, cached_at, last_accessed_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&chapter.user_id)
        .bind(&chapter.book_id)
        .bind(chapter.chapter_number as i64)
        .bind(&chapter.title)
        .bind(&chapter.content)
        .bind(&descriptions_json)
        .bind(chapter.word_count as i64)
        .bind(byte_size)
        .bind(chapter.cached_at)
        .bind(chapter.last_accessed_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn exists(&self, user_id: &str, book_id: &str, chapter_number: u32) -> Result<bool> {
        let row: Option<(i64,)> = query_as(
            "SELECT 1 FROM cached_chapters
             WHERE user_id = ? AND book_id = ? AND chapter_number = ?",
        )
        .bind(user_id)
        .bind(book_id)
        .bind(chapter_number as i64)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.is_some())
    }

    async fn find(
        &self,
        user_id: &str,
        book_id: &str,
        chapter_number: u32,
    ) -> Result<Option<CachedChapter>> {
        let row = query_as::<_, ChapterRow>(
            "SELECT user_id, book_id, chapter_number, title, content,
                    descriptions_json, word_count, cached_at, last_accessed_at
             FROM cached_chapters
             WHERE user_id = ? AND book_id = ? AND chapter_number = ?",
        )
        .bind(user_id)
        .bind(book_id)
        .bind(chapter_number as i64)
        .fetch_optional(&self.pool)
        .await?;

        row.map(CachedChapter::try_from).transpose()
    }

    async fn count_for_book(&self, user_id: &str, book_id: &str) -> Result<i64> {
        let count: i64 = query_as(
            "SELECT COUNT(*) FROM cached_chapters WHERE user_id = ? AND book_id = ?",
        )
        .bind(user_id)
        .bind(book_id)
        .fetch_one(&self.pool)
        .await
        .map(|row: (i64,)| row.0)?;

        Ok(count)
    }

    async fn delete(&self, user_id: &str, book_id: &str, chapter_number: u32) -> Result<i64> {
        let size: Option<(i64,)> = query_as(
            "SELECT byte_size FROM cached_chapters
             WHERE user_id = ? AND book_id = ? AND chapter_number = ?",
        )
        .bind(user_id)
        .bind(book_id)
        .bind(chapter_number as i64)
        .fetch_optional(&self.pool)
        .await?;

        let Some((byte_size,)) = size else {
            return Ok(0);
        };

        query(
            "DELETE FROM cached_chapters
             WHERE user_id = ? AND book_id = ? AND chapter_number = ?",
        )
        .bind(user_id)
        .bind(book_id)
        .bind(chapter_number as i64)
        .execute(&self.pool)
        .await?;

        Ok(byte_size)
    }

    async fn find_stale(&self, cutoff: i64, limit: u32) -> Result<Vec<ChapterRef>> {
        let refs = query_as::<_, ChapterRef>(
            "SELECT user_id, book_id, chapter_number, byte_size, last_accessed_at
             FROM cached_chapters
             WHERE last_accessed_at < ?
             ORDER BY last_accessed_at ASC
             LIMIT ?",
        )
        .bind(cutoff)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(refs)
    }

    async fn touch(
        &self,
        user_id: &str,
        book_id: &str,
        chapter_number: u32,
        now: i64,
    ) -> Result<()> {
        query(
            "UPDATE cached_chapters SET last_accessed_at = ?
             WHERE user_id = ? AND book_id = ? AND chapter_number = ?",
        )
        .bind(now)
        .bind(user_id)
        .bind(book_id)
        .bind(chapter_number as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn total_bytes(&self) -> Result<i64> {
        let size: Option<i64> = query_as("SELECT SUM(byte_size) FROM cached_chapters")
            .fetch_one(&self.pool)
            .await
            .map(|row: (Option<i64>,)| row.0)?;

        Ok(size.unwrap_or(0))
    }

    async fn count(&self) -> Result<i64> {
        let count: i64 = query_as("SELECT COUNT(*) FROM cached_chapters")
            .fetch_one(&self.pool)
            .await
            .map(|row: (i64,)| row.0)?;

        Ok(count)
    }
}
