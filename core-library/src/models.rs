//! Domain models for the offline reading library
//!
//! Rich domain models with validation, state-transition helpers and database
//! mapping. All timestamps are Unix epoch seconds (`chrono::Utc`).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::LibraryError;

/// Current Unix timestamp in seconds.
pub fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}

// =============================================================================
// Book Key
// =============================================================================

/// Composite identity of an offline book: one record per (user, book).
///
/// The composite form `userId:bookId` is what external callers pass around,
/// so the user id may not contain the separator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BookKey {
    pub user_id: String,
    pub book_id: String,
}

impl BookKey {
    pub fn new(user_id: impl Into<String>, book_id: impl Into<String>) -> Result<Self, LibraryError> {
        let key = Self {
            user_id: user_id.into(),
            book_id: book_id.into(),
        };
        key.validate()?;
        Ok(key)
    }

    /// Parse the composite `userId:bookId` form.
    pub fn from_composite(s: &str) -> Result<Self, LibraryError> {
        match s.split_once(':') {
            Some((user, book)) => Self::new(user, book),
            None => Err(LibraryError::InvalidKey(format!(
                "Expected userId:bookId, got {:?}",
                s
            ))),
        }
    }

    /// The composite `userId:bookId` form.
    pub fn composite(&self) -> String {
        format!("{}:{}", self.user_id, self.book_id)
    }

    fn validate(&self) -> Result<(), LibraryError> {
        if self.user_id.is_empty() || self.book_id.is_empty() {
            return Err(LibraryError::InvalidKey(
                "User id and book id cannot be empty".to_string(),
            ));
        }
        if self.user_id.contains(':') {
            return Err(LibraryError::InvalidKey(format!(
                "User id {:?} contains the key separator",
                self.user_id
            )));
        }
        Ok(())
    }
}

impl fmt::Display for BookKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.user_id, self.book_id)
    }
}

// =============================================================================
// Offline Book Record
// =============================================================================

/// Download lifecycle state of an offline book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookStatus {
    /// No download has started
    Idle,
    /// Chapters are being fetched
    Downloading,
    /// Download paused by the host
    Paused,
    /// Some but not all chapters cached; stable, resumable state
    Partial,
    /// All declared chapters cached
    Complete,
    /// Download stopped by a failure; cached chapters are kept
    Error,
}

impl BookStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookStatus::Idle => "idle",
            BookStatus::Downloading => "downloading",
            BookStatus::Paused => "paused",
            BookStatus::Partial => "partial",
            BookStatus::Complete => "complete",
            BookStatus::Error => "error",
        }
    }

    /// Whether a new download call is allowed to pick this record up.
    pub fn is_resumable(&self) -> bool {
        !matches!(self, BookStatus::Downloading)
    }
}

impl FromStr for BookStatus {
    type Err = LibraryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(BookStatus::Idle),
            "downloading" => Ok(BookStatus::Downloading),
            "paused" => Ok(BookStatus::Paused),
            "partial" => Ok(BookStatus::Partial),
            "complete" => Ok(BookStatus::Complete),
            "error" => Ok(BookStatus::Error),
            _ => Err(LibraryError::InvalidStatus(format!(
                "Unknown book status: {}",
                s
            ))),
        }
    }
}

impl fmt::Display for BookStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Catalog metadata captured when a download starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookMetadata {
    pub title: String,
    pub author: String,
    /// Reference to a cover image, when the catalog has one
    pub cover_ref: Option<String>,
    /// Declared chapter count
    pub total_chapters: u32,
    /// Declared whole-book file size in bytes
    pub file_size: u64,
    pub genre: Option<String>,
    pub language: Option<String>,
}

/// One offline book per (user, book).
///
/// The download orchestrator exclusively owns writes to `status` and
/// `download_progress`; the storage quota manager owns eviction-driven
/// demotion and deletion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfflineBookRecord {
    pub key: BookKey,
    pub metadata: BookMetadata,
    /// 0-100, non-decreasing while `status == Downloading`
    pub download_progress: u8,
    pub status: BookStatus,
    /// Failure message from the most recent errored download
    pub last_error: Option<String>,
    pub downloaded_at: i64,
    pub last_accessed_at: i64,
}

impl OfflineBookRecord {
    pub fn new(key: BookKey, metadata: BookMetadata) -> Self {
        let now = now_ts();
        Self {
            key,
            metadata,
            download_progress: 0,
            status: BookStatus::Idle,
            last_error: None,
            downloaded_at: now,
            last_accessed_at: now,
        }
    }

    pub fn mark_downloading(&mut self) {
        self.status = BookStatus::Downloading;
        self.last_error = None;
    }

    pub fn mark_partial(&mut self) {
        self.status = BookStatus::Partial;
    }

    pub fn mark_complete(&mut self) {
        self.status = BookStatus::Complete;
        self.download_progress = 100;
        self.downloaded_at = now_ts();
    }

    pub fn mark_error(&mut self, message: impl Into<String>) {
        self.status = BookStatus::Error;
        self.last_error = Some(message.into());
    }

    /// Progress after `completed` of `total` chapters, rounded to the
    /// nearest percent. A book with no declared chapters is complete.
    pub fn progress_for(completed: u32, total: u32) -> u8 {
        if total == 0 {
            return 100;
        }
        ((completed as f64 / total as f64) * 100.0).round() as u8
    }
}

// =============================================================================
// Cached Chapter
// =============================================================================

/// Internal semantic kind of an extracted description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DescriptionKind {
    Scene,
    Character,
    Setting,
    Object,
}

impl DescriptionKind {
    /// Map the catalog's external category taxonomy onto the internal kinds.
    /// Returns `None` for categories the core does not recognize.
    pub fn from_external(external: &str) -> Option<Self> {
        match external.to_ascii_lowercase().as_str() {
            "scene" | "action" | "event" => Some(DescriptionKind::Scene),
            "character" | "person" | "figure" => Some(DescriptionKind::Character),
            "setting" | "location" | "place" | "environment" => Some(DescriptionKind::Setting),
            "object" | "item" | "artifact" => Some(DescriptionKind::Object),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DescriptionKind::Scene => "scene",
            DescriptionKind::Character => "character",
            DescriptionKind::Setting => "setting",
            DescriptionKind::Object => "object",
        }
    }
}

/// Generation state of a description's illustration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IllustrationStatus {
    Pending,
    Ready,
    Failed,
}

/// One extracted description attached to a cached chapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterDescription {
    pub id: String,
    pub content: String,
    pub kind: DescriptionKind,
    pub confidence: Option<f64>,
    pub illustration_ref: Option<String>,
    pub illustration_status: Option<IllustrationStatus>,
}

/// One cached chapter per (user, book, chapter number).
///
/// Content is immutable once written; re-downloading an already-cached
/// chapter is a no-op at the repository layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedChapter {
    pub user_id: String,
    pub book_id: String,
    /// 1-based chapter number
    pub chapter_number: u32,
    pub title: Option<String>,
    pub content: String,
    /// Ordered as delivered by the catalog
    pub descriptions: Vec<ChapterDescription>,
    pub word_count: u32,
    pub cached_at: i64,
    pub last_accessed_at: i64,
}

impl CachedChapter {
    pub fn new(
        user_id: impl Into<String>,
        book_id: impl Into<String>,
        chapter_number: u32,
        content: impl Into<String>,
    ) -> Self {
        let content = content.into();
        let word_count = content.split_whitespace().count() as u32;
        let now = now_ts();
        Self {
            user_id: user_id.into(),
            book_id: book_id.into(),
            chapter_number,
            title: None,
            content,
            descriptions: Vec::new(),
            word_count,
            cached_at: now,
            last_accessed_at: now,
        }
    }
}

// =============================================================================
// Cached Binary (whole-book file)
// =============================================================================

/// One whole-book binary per (user, book), TTL-expired and LRU-evicted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedBinary {
    pub key: BookKey,
    pub payload: Vec<u8>,
    pub byte_size: u64,
    /// SHA-256 of the payload, verified on read
    pub content_hash: String,
    pub cached_at: i64,
    pub last_accessed_at: i64,
}

impl CachedBinary {
    /// Whether this entry's fixed TTL has elapsed, independent of access.
    pub fn is_expired(&self, now: i64, ttl_secs: i64) -> bool {
        now - self.cached_at >= ttl_secs
    }
}

// =============================================================================
// Cached Image
// =============================================================================

/// One generated illustration binary per (user, book, image).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedImage {
    pub user_id: String,
    pub book_id: String,
    pub image_id: String,
    pub data: Vec<u8>,
    pub byte_size: u64,
    pub cached_at: i64,
    pub last_accessed_at: i64,
}

impl CachedImage {
    pub fn new(
        user_id: impl Into<String>,
        book_id: impl Into<String>,
        image_id: impl Into<String>,
        data: Vec<u8>,
    ) -> Self {
        let now = now_ts();
        let byte_size = data.len() as u64;
        Self {
            user_id: user_id.into(),
            book_id: book_id.into(),
            image_id: image_id.into(),
            data,
            byte_size,
            cached_at: now,
            last_accessed_at: now,
        }
    }
}

// =============================================================================
// Reading Progress
// =============================================================================

/// Locally recorded reading position, one per (user, book).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingProgressRecord {
    pub user_id: String,
    pub book_id: String,
    /// Content-fragment locator (e.g. CFI or paragraph anchor)
    pub locator: String,
    pub progress_percent: f64,
    pub updated_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn book_key_roundtrip() {
        let key = BookKey::new("user-1", "book-9").unwrap();
        assert_eq!(key.composite(), "user-1:book-9");
        assert_eq!(BookKey::from_composite("user-1:book-9").unwrap(), key);
    }

    #[test]
    fn book_key_rejects_malformed_input() {
        assert!(BookKey::new("", "book").is_err());
        assert!(BookKey::new("user", "").is_err());
        assert!(BookKey::new("us:er", "book").is_err());
        assert!(BookKey::from_composite("no-separator").is_err());
    }

    #[test]
    fn book_key_allows_separator_in_book_id() {
        // Book ids may contain ':'; split_once keeps the remainder intact.
        let key = BookKey::from_composite("user:shelf:42").unwrap();
        assert_eq!(key.user_id, "user");
        assert_eq!(key.book_id, "shelf:42");
    }

    #[test]
    fn status_string_roundtrip() {
        for status in [
            BookStatus::Idle,
            BookStatus::Downloading,
            BookStatus::Paused,
            BookStatus::Partial,
            BookStatus::Complete,
            BookStatus::Error,
        ] {
            assert_eq!(status.as_str().parse::<BookStatus>().unwrap(), status);
        }
        assert!("finished".parse::<BookStatus>().is_err());
    }

    #[test]
    fn progress_rounds_to_nearest_percent() {
        assert_eq!(OfflineBookRecord::progress_for(0, 3), 0);
        assert_eq!(OfflineBookRecord::progress_for(1, 3), 33);
        assert_eq!(OfflineBookRecord::progress_for(2, 3), 67);
        assert_eq!(OfflineBookRecord::progress_for(3, 3), 100);
        assert_eq!(OfflineBookRecord::progress_for(0, 0), 100);
    }

    #[test]
    fn record_transitions() {
        let key = BookKey::new("u", "b").unwrap();
        let metadata = BookMetadata {
            title: "T".to_string(),
            author: "A".to_string(),
            cover_ref: None,
            total_chapters: 4,
            file_size: 1024,
            genre: None,
            language: None,
        };
        let mut record = OfflineBookRecord::new(key, metadata);
        assert_eq!(record.status, BookStatus::Idle);

        record.mark_error("network down");
        assert_eq!(record.status, BookStatus::Error);
        assert!(record.last_error.is_some());

        // Resuming clears the previous failure
        record.mark_downloading();
        assert_eq!(record.status, BookStatus::Downloading);
        assert!(record.last_error.is_none());

        record.mark_complete();
        assert_eq!(record.status, BookStatus::Complete);
        assert_eq!(record.download_progress, 100);
    }

    #[test]
    fn external_description_categories_map_to_kinds() {
        assert_eq!(
            DescriptionKind::from_external("Character"),
            Some(DescriptionKind::Character)
        );
        assert_eq!(
            DescriptionKind::from_external("location"),
            Some(DescriptionKind::Setting)
        );
        assert_eq!(
            DescriptionKind::from_external("artifact"),
            Some(DescriptionKind::Object)
        );
        assert_eq!(DescriptionKind::from_external("weather"), None);
    }

    #[test]
    fn chapter_word_count_from_content() {
        let chapter = CachedChapter::new("u", "b", 1, "It was a dark and stormy night");
        assert_eq!(chapter.word_count, 7);
    }

    #[test]
    fn binary_expiry_is_age_based() {
        let thirty_days = 30 * 24 * 60 * 60;
        let binary = CachedBinary {
            key: BookKey::new("u", "b").unwrap(),
            payload: vec![1, 2, 3],
            byte_size: 3,
            content_hash: String::new(),
            cached_at: 1_000,
            last_accessed_at: 5_000_000,
        };
        assert!(!binary.is_expired(1_000 + thirty_days - 1, thirty_days));
        assert!(binary.is_expired(1_000 + thirty_days, thirty_days));
    }
}
