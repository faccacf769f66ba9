//! Storage quota manager
//!
//! Quota inspection against the platform estimate, persistence requests,
//! the staged cleanup pipeline and the atomic clear operations.
//!
//! Cleanup removes data in strict priority order and stops as soon as the
//! requested bytes are freed:
//!
//! 1. Oldest cached images, inside a bounded scan window.
//! 2. Chapters past their TTL, least recently accessed first.
//! 3. Sync queue entries that are failed with retries exhausted. Pending
//!    entries are never touched: they carry unsynced user data.
//!
//! After chapter removal, the affected book records are re-derived so no
//! book claims `Complete` without all of its chapters on disk.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use bridge_traits::{PlatformStorage, SyncQueue};
use core_library::models::{now_ts, BookStatus, OfflineBookRecord};
use core_library::repositories::{
    BinaryRepository, ChapterRepository, ImageRepository, MaintenanceRepository,
    OfflineBookRepository, ReadingProgressRepository,
};
use core_library::repositories::{BookPurge, ClearReport};
use core_library::LibraryError;
use core_runtime::events::{CoreEvent, EventBus, StorageEvent};

use crate::config::StorageConfig;
use crate::error::Result;
use crate::stats::{CleanupReport, StorageBreakdown, StorageInfo};

/// Quota inspection and staged cleanup over the offline stores.
pub struct StorageQuotaManager {
    platform: Arc<dyn PlatformStorage>,
    sync_queue: Arc<dyn SyncQueue>,
    books: Arc<dyn OfflineBookRepository>,
    chapters: Arc<dyn ChapterRepository>,
    images: Arc<dyn ImageRepository>,
    binaries: Arc<dyn BinaryRepository>,
    progress: Arc<dyn ReadingProgressRepository>,
    maintenance: Arc<dyn MaintenanceRepository>,
    event_bus: EventBus,
    config: StorageConfig,
}

impl StorageQuotaManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        platform: Arc<dyn PlatformStorage>,
        sync_queue: Arc<dyn SyncQueue>,
        books: Arc<dyn OfflineBookRepository>,
        chapters: Arc<dyn ChapterRepository>,
        images: Arc<dyn ImageRepository>,
        binaries: Arc<dyn BinaryRepository>,
        progress: Arc<dyn ReadingProgressRepository>,
        maintenance: Arc<dyn MaintenanceRepository>,
        event_bus: EventBus,
        config: StorageConfig,
    ) -> Self {
        Self {
            platform,
            sync_queue,
            books,
            chapters,
            images,
            binaries,
            progress,
            maintenance,
            event_bus,
            config,
        }
    }

    /// Per-category byte usage and entry counts of the offline stores.
    pub async fn breakdown(&self) -> Result<StorageBreakdown> {
        let (sync_queue_bytes, sync_entry_count) = match self.sync_queue.entries().await {
            Ok(entries) => (
                entries.iter().map(|e| e.payload_bytes).sum(),
                entries.len() as u64,
            ),
            Err(e) => {
                warn!(error = %e, "Sync queue unavailable for breakdown");
                (0, 0)
            }
        };

        Ok(StorageBreakdown {
            chapter_bytes: self.chapters.total_bytes().await? as u64,
            image_bytes: self.images.total_bytes().await? as u64,
            sync_queue_bytes,
            progress_bytes: self.progress.total_bytes().await? as u64,
            book_metadata_bytes: self.books.metadata_bytes().await? as u64,
            book_count: self.books.count().await? as u64,
            chapter_count: self.chapters.count().await? as u64,
            image_count: self.images.count().await? as u64,
            progress_count: self.progress.count().await? as u64,
            sync_entry_count,
        })
    }

    /// Snapshot of storage state.
    ///
    /// Usage and quota come from the platform estimate when available;
    /// otherwise usage is derived from the stores and the configured
    /// fallback quota applies. Crossing the warning or critical threshold
    /// emits a pressure event.
    #[instrument(skip(self))]
    pub async fn storage_info(&self) -> Result<StorageInfo> {
        let breakdown = self.breakdown().await?;

        let estimate = match self.platform.estimate().await {
            Ok(estimate) => estimate,
            Err(e) => {
                warn!(error = %e, "Platform storage estimate unavailable");
                bridge_traits::QuotaEstimate {
                    usage: None,
                    quota: None,
                }
            }
        };

        let derived_usage = breakdown.total() + self.binaries.total_bytes().await? as u64;
        let usage_bytes = estimate.usage.unwrap_or(derived_usage);
        let quota_bytes = estimate.quota.unwrap_or(self.config.fallback_quota_bytes);

        let percent_used = if quota_bytes == 0 {
            100.0
        } else {
            usage_bytes as f64 / quota_bytes as f64 * 100.0
        };

        if percent_used >= self.config.warning_threshold_percent {
            let critical = percent_used >= self.config.critical_threshold_percent;
            self.event_bus
                .emit(CoreEvent::Storage(StorageEvent::PressureWarning {
                    percent_used,
                    critical,
                }))
                .ok();
        }

        let persisted = self.platform.is_persisted().await.unwrap_or(false);

        Ok(StorageInfo {
            usage_bytes,
            quota_bytes,
            percent_used,
            persisted,
            breakdown,
        })
    }

    /// Whether a download of `estimated_bytes` fits with headroom to spare.
    pub async fn can_download(&self, estimated_bytes: u64) -> Result<bool> {
        let info = self.storage_info().await?;
        let required = estimated_bytes as f64 * self.config.download_headroom;
        Ok((info.free_bytes() as f64) > required)
    }

    /// Ask the platform to persist our storage. Checks the current state
    /// first; already-persisted storage is not re-requested.
    pub async fn request_persistence(&self) -> Result<bool> {
        if self.platform.is_persisted().await? {
            return Ok(true);
        }
        Ok(self.platform.request_persistence().await?)
    }

    /// Free at least `target_bytes` by removing data in priority order.
    ///
    /// Stops early once the target is reached. Never removes pending sync
    /// entries or the binary cache's live entries; the binary cache runs
    /// its own maintenance.
    #[instrument(skip(self))]
    pub async fn perform_cleanup(&self, target_bytes: u64) -> Result<CleanupReport> {
        self.event_bus
            .emit(CoreEvent::Storage(StorageEvent::CleanupStarted {
                target_bytes,
            }))
            .ok();

        let mut report = CleanupReport::default();

        self.evict_images(target_bytes, &mut report).await?;

        if report.bytes_freed < target_bytes {
            self.evict_stale_chapters(target_bytes, &mut report).await?;
        }

        if report.bytes_freed < target_bytes {
            self.evict_exhausted_sync_entries(target_bytes, &mut report)
                .await?;
        }

        self.rederive_book_statuses().await?;

        report.target_reached = report.bytes_freed >= target_bytes;

        self.event_bus
            .emit(CoreEvent::Storage(StorageEvent::CleanupCompleted {
                bytes_freed: report.bytes_freed,
                items_removed: report.items_removed,
                target_reached: report.target_reached,
            }))
            .ok();

        info!(
            bytes_freed = report.bytes_freed,
            items_removed = report.items_removed,
            target_reached = report.target_reached,
            "Cleanup finished"
        );

        Ok(report)
    }

    /// Remove every stored artifact of one book atomically.
    pub async fn clear_book_data(&self, user_id: &str, book_id: &str) -> Result<BookPurge> {
        Ok(self.maintenance.delete_book_data(user_id, book_id).await?)
    }

    /// Remove all offline data atomically, then purge platform-level cache
    /// storage. The sync queue is deliberately left alone.
    #[instrument(skip(self))]
    pub async fn clear_all_offline_data(&self) -> Result<ClearReport> {
        let mut report = self.maintenance.clear_offline_data().await?;

        match self.platform.purge_cache_storage().await {
            Ok(purged) => report.bytes_freed += purged,
            Err(e) => warn!(error = %e, "Platform cache purge failed"),
        }

        Ok(report)
    }

    async fn evict_images(&self, target: u64, report: &mut CleanupReport) -> Result<()> {
        let oldest = self
            .images
            .find_oldest(self.config.cleanup_scan_window)
            .await?;
        for image in oldest {
            if report.bytes_freed >= target {
                break;
            }
            let freed = self
                .images
                .delete(&image.user_id, &image.book_id, &image.image_id)
                .await?;
            if freed > 0 {
                report.record(freed as u64);
            }
        }
        Ok(())
    }

    async fn evict_stale_chapters(&self, target: u64, report: &mut CleanupReport) -> Result<()> {
        let cutoff = now_ts() - self.config.chapter_ttl_secs();
        let stale = self
            .chapters
            .find_stale(cutoff, self.config.cleanup_scan_window)
            .await?;
        for chapter in stale {
            if report.bytes_freed >= target {
                break;
            }
            let freed = self
                .chapters
                .delete(
                    &chapter.user_id,
                    &chapter.book_id,
                    chapter.chapter_number as u32,
                )
                .await?;
            if freed > 0 {
                report.record(freed as u64);
            }
        }
        Ok(())
    }

    async fn evict_exhausted_sync_entries(
        &self,
        target: u64,
        report: &mut CleanupReport,
    ) -> Result<()> {
        let entries = match self.sync_queue.entries().await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "Sync queue unavailable for cleanup");
                return Ok(());
            }
        };

        for entry in entries {
            if report.bytes_freed >= target {
                break;
            }
            if !entry.is_evictable() {
                continue;
            }
            match self.sync_queue.remove(&entry.id).await {
                Ok(()) => report.record(entry.payload_bytes),
                Err(e) => warn!(id = %entry.id, error = %e, "Sync entry removal failed"),
            }
        }
        Ok(())
    }

    /// Walk every book record and re-derive its status from the chapters
    /// actually on disk. Also heals records left inconsistent by a crash.
    async fn rederive_book_statuses(&self) -> Result<()> {
        for key in self.books.keys().await? {
            let Some(record) = self.books.find(&key).await? else {
                continue;
            };

            let cached = self
                .chapters
                .count_for_book(&key.user_id, &key.book_id)
                .await? as u32;

            // Evicting the last chapter removes the record itself
            if cached == 0 {
                debug!(key = %key, "Last chapter evicted, removing book record");
                self.books.delete(&key).await?;
                continue;
            }

            let total = record.metadata.total_chapters;
            let progress = OfflineBookRecord::progress_for(cached.min(total), total);
            let status = if cached >= total {
                BookStatus::Complete
            } else {
                BookStatus::Partial
            };

            if status != record.status || progress != record.download_progress {
                debug!(key = %key, ?status, progress, "Rederived book status after cleanup");
                match self.books.update_progress(&key, progress, status).await {
                    Ok(()) | Err(LibraryError::NotFound { .. }) => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }
        Ok(())
    }
}
