//! Core service façade and bootstrap helpers.
//!
//! Wires host-provided bridge implementations (content API, platform
//! storage, sync queue) and a SQLite pool into the offline reading core:
//! repositories are created and initialized, then the download
//! orchestrator, binary cache, storage quota manager and position
//! reconciler are built over them and exposed as one handle.

pub mod error;

pub use error::{CoreError, Result};

use std::sync::Arc;

use sqlx::SqlitePool;
use tracing::info;

use bridge_traits::{ContentApi, PlatformStorage, SyncQueue};
use core_download::{DownloadConfig, DownloadOrchestrator};
use core_library::repositories::{
    BinaryRepository, ChapterRepository, ImageRepository, OfflineBookRepository,
    ReadingProgressRepository, SqliteBinaryRepository, SqliteChapterRepository,
    SqliteImageRepository, SqliteMaintenanceRepository, SqliteOfflineBookRepository,
    SqliteReadingProgressRepository,
};
use core_position::PositionReconciler;
use core_runtime::events::{CoreEvent, EventBus, Receiver};
use core_storage::{BinaryContentCache, StorageConfig, StorageQuotaManager};

/// Aggregated handle to the bridge dependencies the core requires.
pub struct CoreDependencies {
    pub content_api: Arc<dyn ContentApi>,
    pub platform: Arc<dyn PlatformStorage>,
    pub sync_queue: Arc<dyn SyncQueue>,
}

impl CoreDependencies {
    pub fn new(
        content_api: Arc<dyn ContentApi>,
        platform: Arc<dyn PlatformStorage>,
        sync_queue: Arc<dyn SyncQueue>,
    ) -> Self {
        Self {
            content_api,
            platform,
            sync_queue,
        }
    }
}

/// Combined configuration for the offline core.
#[derive(Debug, Clone, Default)]
pub struct OfflineCoreConfig {
    pub storage: StorageConfig,
    pub download: DownloadConfig,
}

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct OfflineCoreService {
    downloads: Arc<DownloadOrchestrator>,
    quota: Arc<StorageQuotaManager>,
    binary_cache: Arc<BinaryContentCache>,
    progress: Arc<dyn ReadingProgressRepository>,
    reconciler: PositionReconciler,
    event_bus: EventBus,
}

impl OfflineCoreService {
    /// Build the full service over an open pool.
    ///
    /// Creates every table the core needs; safe to call on an existing
    /// database.
    pub async fn initialize(
        pool: SqlitePool,
        deps: CoreDependencies,
        config: OfflineCoreConfig,
        event_bus: EventBus,
    ) -> Result<Self> {
        config.storage.validate()?;
        config.download.validate()?;

        let books = Arc::new(SqliteOfflineBookRepository::new(pool.clone()));
        let chapters = Arc::new(SqliteChapterRepository::new(pool.clone()));
        let images = Arc::new(SqliteImageRepository::new(pool.clone()));
        let binaries = Arc::new(SqliteBinaryRepository::new(pool.clone()));
        let progress = Arc::new(SqliteReadingProgressRepository::new(pool.clone()));
        let maintenance = Arc::new(SqliteMaintenanceRepository::new(pool));

        books.initialize().await?;
        chapters.initialize().await?;
        images.initialize().await?;
        binaries.initialize().await?;
        progress.initialize().await?;

        let downloads = Arc::new(DownloadOrchestrator::new(
            deps.content_api,
            books.clone(),
            chapters.clone(),
            maintenance.clone(),
            event_bus.clone(),
            config.download,
        ));

        let binary_cache = Arc::new(BinaryContentCache::new(
            binaries.clone(),
            deps.platform.clone(),
            config.storage.clone(),
        ));

        let quota = Arc::new(StorageQuotaManager::new(
            deps.platform,
            deps.sync_queue,
            books,
            chapters,
            images,
            binaries,
            progress.clone(),
            maintenance,
            event_bus.clone(),
            config.storage,
        ));

        info!("Offline core initialized");

        Ok(Self {
            downloads,
            quota,
            binary_cache,
            progress,
            reconciler: PositionReconciler::default(),
            event_bus,
        })
    }

    /// Download orchestration: start, cancel, observe, delete.
    pub fn downloads(&self) -> &DownloadOrchestrator {
        &self.downloads
    }

    /// Quota inspection and staged cleanup.
    pub fn quota(&self) -> &StorageQuotaManager {
        &self.quota
    }

    /// Whole-book binary cache.
    pub fn binary_cache(&self) -> &BinaryContentCache {
        &self.binary_cache
    }

    /// Locally recorded reading positions.
    pub fn reading_progress(&self) -> &Arc<dyn ReadingProgressRepository> {
        &self.progress
    }

    /// Position comparison against the server-reported state.
    pub fn reconciler(&self) -> &PositionReconciler {
        &self.reconciler
    }

    /// The shared event bus.
    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Subscribe to all core events.
    pub fn subscribe_events(&self) -> Receiver<CoreEvent> {
        self.event_bus.subscribe()
    }
}
