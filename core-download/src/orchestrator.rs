//! Download orchestrator
//!
//! One active download per (user, book). The active-download map is the
//! sole admission gate: a key present in the map means a download is
//! running, and its cancellation token and progress channel live there
//! until the download reaches a terminal state.
//!
//! Chapters are fetched strictly in order. Each settled chapter persists
//! the chapter row and the book's progress before the next fetch begins,
//! so a crash at any point leaves a consistent, resumable record.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use bridge_traits::{BridgeError, BookDetails, ChapterPayload, ContentApi};
use core_library::models::{
    BookKey, BookMetadata, BookStatus, CachedChapter, ChapterDescription, DescriptionKind,
    IllustrationStatus, OfflineBookRecord,
};
use core_library::repositories::{
    BookPurge, ChapterRepository, MaintenanceRepository, OfflineBookRepository,
};
use core_library::LibraryError;
use core_runtime::events::{CoreEvent, DownloadEvent, EventBus};

use crate::config::DownloadConfig;
use crate::error::{DownloadError, Result};
use crate::progress::{DownloadOutcome, DownloadProgress};

struct ActiveDownload {
    token: CancellationToken,
    progress_tx: broadcast::Sender<DownloadProgress>,
}

/// Drives whole-book downloads against the remote catalog.
pub struct DownloadOrchestrator {
    content: Arc<dyn ContentApi>,
    books: Arc<dyn OfflineBookRepository>,
    chapters: Arc<dyn ChapterRepository>,
    maintenance: Arc<dyn MaintenanceRepository>,
    event_bus: EventBus,
    config: DownloadConfig,
    active: Mutex<HashMap<BookKey, ActiveDownload>>,
}

impl DownloadOrchestrator {
    pub fn new(
        content: Arc<dyn ContentApi>,
        books: Arc<dyn OfflineBookRepository>,
        chapters: Arc<dyn ChapterRepository>,
        maintenance: Arc<dyn MaintenanceRepository>,
        event_bus: EventBus,
        config: DownloadConfig,
    ) -> Self {
        Self {
            content,
            books,
            chapters,
            maintenance,
            event_bus,
            config,
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Download a book: metadata, then every chapter in order.
    ///
    /// Resumes transparently: chapters already cached are skipped without a
    /// network call but still counted toward progress. Returns
    /// [`DownloadOutcome::Cancelled`] when the token fires; failures other
    /// than cancellation persist an `error` status and propagate.
    #[instrument(skip(self))]
    pub async fn download(&self, user_id: &str, book_id: &str) -> Result<DownloadOutcome> {
        let key = BookKey::new(user_id, book_id)?;

        let token = {
            let mut active = self.active.lock().await;
            if active.contains_key(&key) {
                return Err(DownloadError::AlreadyInProgress {
                    user_id: user_id.to_string(),
                    book_id: book_id.to_string(),
                });
            }
            let token = CancellationToken::new();
            let (progress_tx, _) = broadcast::channel(self.config.progress_buffer_size);
            active.insert(
                key.clone(),
                ActiveDownload {
                    token: token.clone(),
                    progress_tx,
                },
            );
            token
        };

        let result = self.run_download(&key, &token).await;

        // Terminal state: release the token and subscriber set for the key
        self.active.lock().await.remove(&key);

        result
    }

    /// Trigger the cancellation token for an active download.
    ///
    /// # Returns
    /// `true` if a download was active for the key, `false` otherwise.
    pub async fn cancel(&self, user_id: &str, book_id: &str) -> bool {
        let Ok(key) = BookKey::new(user_id, book_id) else {
            return false;
        };
        let active = self.active.lock().await;
        match active.get(&key) {
            Some(download) => {
                download.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Whether a download is currently active for the key.
    pub async fn is_downloading(&self, user_id: &str, book_id: &str) -> bool {
        match BookKey::new(user_id, book_id) {
            Ok(key) => self.active.lock().await.contains_key(&key),
            Err(_) => false,
        }
    }

    /// Subscribe to per-chapter progress of an active download.
    ///
    /// Returns `None` when no download is active for the key. The channel
    /// closes when the download reaches a terminal state.
    pub async fn subscribe(
        &self,
        user_id: &str,
        book_id: &str,
    ) -> Option<broadcast::Receiver<DownloadProgress>> {
        let key = BookKey::new(user_id, book_id).ok()?;
        let active = self.active.lock().await;
        active.get(&key).map(|d| d.progress_tx.subscribe())
    }

    /// Read the stored record for a book. Pure read, no side effects.
    pub async fn get_status(
        &self,
        user_id: &str,
        book_id: &str,
    ) -> Result<Option<OfflineBookRecord>> {
        let key = BookKey::new(user_id, book_id)?;
        Ok(self.books.find(&key).await?)
    }

    /// Cancel any active download for the key, then atomically remove the
    /// book record, its chapters, images, binary and reading position.
    #[instrument(skip(self))]
    pub async fn delete_offline_book(&self, user_id: &str, book_id: &str) -> Result<BookPurge> {
        self.cancel(user_id, book_id).await;
        Ok(self.maintenance.delete_book_data(user_id, book_id).await?)
    }

    async fn run_download(&self, key: &BookKey, token: &CancellationToken) -> Result<DownloadOutcome> {
        let details = match self.content.get_book_details(&key.book_id, token).await {
            Ok(details) => details,
            Err(BridgeError::Cancelled) => {
                return self.settle_cancelled(key, 0).await;
            }
            Err(e) => {
                self.settle_failed(key, 0, 0, 0, &e.to_string()).await;
                return Err(DownloadError::Metadata(e.to_string()));
            }
        };

        // Token polled immediately after the metadata fetch
        if token.is_cancelled() {
            return self.settle_cancelled(key, 0).await;
        }

        let total = details.total_chapters;
        let mut record = match self.books.find(key).await {
            Ok(Some(mut existing)) => {
                existing.metadata = metadata_from(&details);
                existing
            }
            Ok(None) => OfflineBookRecord::new(key.clone(), metadata_from(&details)),
            Err(e) => return self.settle_store_error(key, token, total, 0, 0, e).await,
        };
        record.mark_downloading();
        if let Err(e) = self.books.upsert(&record).await {
            return self.settle_store_error(key, token, total, 0, 0, e).await;
        }

        self.event_bus
            .emit(CoreEvent::Download(DownloadEvent::Started {
                user_id: key.user_id.clone(),
                book_id: key.book_id.clone(),
                total_chapters: total,
            }))
            .ok();

        let mut completed = 0u32;
        for number in 1..=total {
            // Token polled at the top of the per-chapter loop
            if token.is_cancelled() {
                return self.settle_cancelled(key, completed).await;
            }

            let already_cached = match self
                .chapters
                .exists(&key.user_id, &key.book_id, number)
                .await
            {
                Ok(cached) => cached,
                Err(e) => {
                    return self
                        .settle_store_error(key, token, total, completed, number, e)
                        .await
                }
            };
            if already_cached {
                completed += 1;
                if let Err(e) = self.publish_progress(key, total, completed, number).await {
                    return self
                        .settle_store_error(key, token, total, completed, number, e)
                        .await;
                }
                continue;
            }

            let payload = match self
                .content
                .get_chapter_content(&key.book_id, number, token)
                .await
            {
                Ok(payload) => payload,
                Err(BridgeError::Cancelled) => {
                    return self.settle_cancelled(key, completed).await;
                }
                Err(e) => {
                    self.settle_failed(key, total, completed, number, &e.to_string())
                        .await;
                    return Err(DownloadError::Chapter {
                        number,
                        message: e.to_string(),
                    });
                }
            };

            let chapter = chapter_from(key, number, payload, &details);
            if let Err(e) = self.chapters.insert(&chapter).await {
                return self
                    .settle_store_error(key, token, total, completed, number, e)
                    .await;
            }

            completed += 1;
            if let Err(e) = self.publish_progress(key, total, completed, number).await {
                return self
                    .settle_store_error(key, token, total, completed, number, e)
                    .await;
            }
        }

        if let Err(e) = self
            .books
            .update_progress(key, 100, BookStatus::Complete)
            .await
        {
            return self
                .settle_store_error(key, token, total, total, total, e)
                .await;
        }

        self.send_snapshot(
            key,
            DownloadProgress {
                user_id: key.user_id.clone(),
                book_id: key.book_id.clone(),
                total_chapters: total,
                downloaded_chapters: total,
                current_chapter: total,
                percent: 100,
                status: BookStatus::Complete,
                error: None,
            },
        )
        .await;

        self.event_bus
            .emit(CoreEvent::Download(DownloadEvent::Completed {
                user_id: key.user_id.clone(),
                book_id: key.book_id.clone(),
                total_chapters: total,
            }))
            .ok();

        info!(key = %key, total_chapters = total, "Download complete");
        Ok(DownloadOutcome::Completed {
            total_chapters: total,
        })
    }

    /// Persist the partial state and report cancellation as its own
    /// outcome, never as an error.
    async fn settle_cancelled(&self, key: &BookKey, completed: u32) -> Result<DownloadOutcome> {
        if let Some(record) = self.books.find(key).await? {
            let total = record.metadata.total_chapters;
            let progress = OfflineBookRecord::progress_for(completed, total);
            // The record can vanish between the find and the update when the
            // book is deleted while settling; that is not a failure
            match self
                .books
                .update_progress(key, progress, BookStatus::Partial)
                .await
            {
                Ok(()) | Err(LibraryError::NotFound { .. }) => {}
                Err(e) => return Err(e.into()),
            }

            self.send_snapshot(
                key,
                DownloadProgress {
                    user_id: key.user_id.clone(),
                    book_id: key.book_id.clone(),
                    total_chapters: total,
                    downloaded_chapters: completed,
                    current_chapter: completed,
                    percent: progress,
                    status: BookStatus::Partial,
                    error: None,
                },
            )
            .await;
        }

        self.event_bus
            .emit(CoreEvent::Download(DownloadEvent::Cancelled {
                user_id: key.user_id.clone(),
                book_id: key.book_id.clone(),
                downloaded_chapters: completed,
            }))
            .ok();

        info!(key = %key, downloaded_chapters = completed, "Download cancelled");
        Ok(DownloadOutcome::Cancelled {
            downloaded_chapters: completed,
        })
    }

    /// Route a persistent-store failure to a terminal state.
    ///
    /// A missing record after the token fired means the book was deleted out
    /// from under the download, which settles as a cancellation. Any other
    /// store failure persists the error status, notifies both subscriber
    /// surfaces and re-raises.
    async fn settle_store_error(
        &self,
        key: &BookKey,
        token: &CancellationToken,
        total: u32,
        completed: u32,
        current: u32,
        error: LibraryError,
    ) -> Result<DownloadOutcome> {
        if token.is_cancelled() && matches!(error, LibraryError::NotFound { .. }) {
            return self.settle_cancelled(key, completed).await;
        }
        self.settle_failed(key, total, completed, current, &error.to_string())
            .await;
        Err(error.into())
    }

    async fn publish_progress(
        &self,
        key: &BookKey,
        total: u32,
        completed: u32,
        current: u32,
    ) -> std::result::Result<(), LibraryError> {
        let percent = OfflineBookRecord::progress_for(completed, total);
        self.books
            .update_progress(key, percent, BookStatus::Downloading)
            .await?;

        self.send_snapshot(
            key,
            DownloadProgress {
                user_id: key.user_id.clone(),
                book_id: key.book_id.clone(),
                total_chapters: total,
                downloaded_chapters: completed,
                current_chapter: current,
                percent,
                status: BookStatus::Downloading,
                error: None,
            },
        )
        .await;

        self.event_bus
            .emit(CoreEvent::Download(DownloadEvent::Progress {
                user_id: key.user_id.clone(),
                book_id: key.book_id.clone(),
                total_chapters: total,
                downloaded_chapters: completed,
                current_chapter: current,
                percent,
            }))
            .ok();

        Ok(())
    }

    /// Persist the error status and notify both subscriber surfaces.
    /// Already-cached chapters are deliberately kept: no rollback.
    async fn settle_failed(
        &self,
        key: &BookKey,
        total: u32,
        completed: u32,
        current: u32,
        message: &str,
    ) {
        match self
            .books
            .set_status(key, BookStatus::Error, Some(message))
            .await
        {
            Ok(()) => {}
            Err(LibraryError::NotFound { .. }) => {}
            Err(e) => warn!(key = %key, error = %e, "Failed to persist error status"),
        }

        self.send_snapshot(
            key,
            DownloadProgress {
                user_id: key.user_id.clone(),
                book_id: key.book_id.clone(),
                total_chapters: total,
                downloaded_chapters: completed,
                current_chapter: current,
                percent: OfflineBookRecord::progress_for(completed, total.max(1)),
                status: BookStatus::Error,
                error: Some(message.to_string()),
            },
        )
        .await;

        self.event_bus
            .emit(CoreEvent::Download(DownloadEvent::Failed {
                user_id: key.user_id.clone(),
                book_id: key.book_id.clone(),
                message: message.to_string(),
                downloaded_chapters: completed,
            }))
            .ok();
    }

    async fn send_snapshot(&self, key: &BookKey, snapshot: DownloadProgress) {
        if let Some(download) = self.active.lock().await.get(key) {
            download.progress_tx.send(snapshot).ok();
        }
    }
}

fn metadata_from(details: &BookDetails) -> BookMetadata {
    BookMetadata {
        title: details.title.clone(),
        author: details.author.clone(),
        cover_ref: details.has_cover.then(|| details.book_id.clone()),
        total_chapters: details.total_chapters,
        file_size: details.file_size,
        genre: details.genre.clone(),
        language: details.language.clone(),
    }
}

fn chapter_from(
    key: &BookKey,
    number: u32,
    payload: ChapterPayload,
    details: &BookDetails,
) -> CachedChapter {
    let descriptions = payload
        .descriptions
        .into_iter()
        .map(|d| {
            let kind = DescriptionKind::from_external(&d.external_type).unwrap_or_else(|| {
                warn!(
                    external_type = %d.external_type,
                    "Unknown description category, treating as scene"
                );
                DescriptionKind::Scene
            });
            let illustration_status = Some(if d.illustration.is_some() {
                IllustrationStatus::Ready
            } else {
                IllustrationStatus::Pending
            });
            ChapterDescription {
                id: d.id,
                content: d.content,
                kind,
                confidence: d.confidence,
                illustration_ref: d.illustration,
                illustration_status,
            }
        })
        .collect();

    let mut chapter = CachedChapter::new(&key.user_id, &key.book_id, number, payload.content);
    // The chapter body may arrive untitled; the table of contents entry
    // declared by the catalog still names it
    chapter.title = payload.title.or_else(|| {
        details
            .chapters
            .iter()
            .find(|c| c.number == number)
            .map(|c| c.title.clone())
    });
    if let Some(word_count) = payload.word_count {
        chapter.word_count = word_count;
    }
    chapter.descriptions = descriptions;
    chapter
}
