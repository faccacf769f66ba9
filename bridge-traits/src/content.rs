//! Remote Content API Abstraction
//!
//! Contract for fetching book metadata and chapter bodies from the remote
//! catalog. Both calls accept a cancellation token so an in-flight request
//! can be abandoned cooperatively; implementations should observe it at
//! their own await points but are not required to abort mid-transfer.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// One chapter entry in a book's table of contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterSummary {
    /// 1-based chapter number
    pub number: u32,
    /// Chapter title as declared by the catalog
    pub title: String,
}

/// Book-level metadata returned by the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookDetails {
    pub book_id: String,
    pub title: String,
    pub author: String,
    /// Whether the catalog has a cover image for this book
    pub has_cover: bool,
    /// Declared whole-book file size in bytes
    pub file_size: u64,
    pub genre: Option<String>,
    pub language: Option<String>,
    /// Declared chapter count; the table of contents below may be shorter
    /// if the catalog truncates it, in which case this count wins.
    pub total_chapters: u32,
    pub chapters: Vec<ChapterSummary>,
}

/// One extracted description attached to a chapter.
///
/// `external_type` is the catalog's own category taxonomy; the core maps it
/// to its internal semantic kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DescriptionPayload {
    pub id: String,
    pub content: String,
    pub external_type: String,
    pub confidence: Option<f64>,
    /// Reference to a generated illustration, when one exists
    pub illustration: Option<String>,
}

/// Chapter body plus its extracted descriptions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterPayload {
    pub content: String,
    pub title: Option<String>,
    pub word_count: Option<u32>,
    pub descriptions: Vec<DescriptionPayload>,
}

/// Remote content API consumed by the download orchestrator.
///
/// Timeout and retry policy belong to the implementation, not to the core;
/// the core treats any `Err` as a single failed attempt.
#[async_trait]
pub trait ContentApi: Send + Sync {
    /// Fetch book-level metadata and the chapter listing.
    async fn get_book_details(
        &self,
        book_id: &str,
        cancel: &CancellationToken,
    ) -> Result<BookDetails>;

    /// Fetch one chapter's content and extracted descriptions.
    async fn get_chapter_content(
        &self,
        book_id: &str,
        chapter_number: u32,
        cancel: &CancellationToken,
    ) -> Result<ChapterPayload>;
}
