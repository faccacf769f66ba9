//! Download progress reporting types

use serde::{Deserialize, Serialize};

use core_library::models::BookStatus;

/// Snapshot sent to per-download subscribers: one per settled chapter
/// (fetched or skipped on resume) plus a final terminal snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadProgress {
    pub user_id: String,
    pub book_id: String,
    pub total_chapters: u32,
    pub downloaded_chapters: u32,
    /// Chapter that just settled (1-based); 0 before the first chapter
    pub current_chapter: u32,
    /// 0-100, non-decreasing within one download
    pub percent: u8,
    pub status: BookStatus,
    /// Failure message, only on an `Error` snapshot
    pub error: Option<String>,
}

/// Terminal outcome of a download that did not fail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DownloadOutcome {
    /// Every declared chapter is cached.
    Completed { total_chapters: u32 },
    /// Cancelled cooperatively; the book rests in a resumable partial
    /// state with `downloaded_chapters` chapters cached.
    Cancelled { downloaded_chapters: u32 },
}
