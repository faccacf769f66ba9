//! End-to-end orchestrator tests over in-memory SQLite and a scripted
//! content API.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use bridge_traits::{
    BookDetails, BridgeError, ChapterPayload, ChapterSummary, ContentApi, DescriptionPayload,
    Result as BridgeResult,
};
use core_download::{
    DownloadConfig, DownloadError, DownloadOrchestrator, DownloadOutcome,
};
use core_library::db::create_test_pool;
use core_library::models::{BookStatus, CachedChapter, DescriptionKind, IllustrationStatus};
use core_library::repositories::{
    ChapterRef, ChapterRepository, OfflineBookRepository, SqliteChapterRepository,
    SqliteImageRepository, SqliteMaintenanceRepository, SqliteOfflineBookRepository,
    SqliteReadingProgressRepository, SqliteBinaryRepository,
};
use core_library::{LibraryError, Result as LibraryResult};
use core_library::repositories::{BinaryRepository, ImageRepository, ReadingProgressRepository};
use core_runtime::events::{CoreEvent, DownloadEvent, EventBus};

struct ScriptedContent {
    total_chapters: u32,
    /// Chapter numbers that return an error
    fail_on: Mutex<Vec<u32>>,
    /// Chapter number at which the fake cancels the token
    cancel_on: Option<u32>,
    /// Chapter number whose fetch blocks until notified
    block_on: Option<(u32, Arc<Notify>)>,
    /// Every chapter number actually fetched, in order
    calls: Mutex<Vec<u32>>,
    descriptions: Vec<DescriptionPayload>,
    /// When set, chapter payloads carry no title of their own
    omit_titles: bool,
}

impl ScriptedContent {
    fn new(total_chapters: u32) -> Self {
        Self {
            total_chapters,
            fail_on: Mutex::new(Vec::new()),
            cancel_on: None,
            block_on: None,
            calls: Mutex::new(Vec::new()),
            descriptions: Vec::new(),
            omit_titles: false,
        }
    }

    fn calls(&self) -> Vec<u32> {
        self.calls.lock().unwrap().clone()
    }

    fn clear_failures(&self) {
        self.fail_on.lock().unwrap().clear();
    }
}

#[async_trait]
impl ContentApi for ScriptedContent {
    async fn get_book_details(
        &self,
        book_id: &str,
        _cancel: &CancellationToken,
    ) -> BridgeResult<BookDetails> {
        Ok(BookDetails {
            book_id: book_id.to_string(),
            title: "Scripted Book".to_string(),
            author: "Fixture".to_string(),
            has_cover: true,
            file_size: 4_096,
            genre: Some("test".to_string()),
            language: Some("en".to_string()),
            total_chapters: self.total_chapters,
            chapters: (1..=self.total_chapters)
                .map(|n| ChapterSummary {
                    number: n,
                    title: format!("Chapter {}", n),
                })
                .collect(),
        })
    }

    async fn get_chapter_content(
        &self,
        _book_id: &str,
        chapter_number: u32,
        cancel: &CancellationToken,
    ) -> BridgeResult<ChapterPayload> {
        self.calls.lock().unwrap().push(chapter_number);

        if let Some((blocked, notify)) = &self.block_on {
            if *blocked == chapter_number {
                notify.notified().await;
            }
        }

        if self.cancel_on == Some(chapter_number) {
            cancel.cancel();
            return Err(BridgeError::Cancelled);
        }

        if self.fail_on.lock().unwrap().contains(&chapter_number) {
            return Err(BridgeError::Network("connection reset".to_string()));
        }

        Ok(ChapterPayload {
            content: format!("Body of chapter {}", chapter_number),
            title: (!self.omit_titles).then(|| format!("Chapter {}", chapter_number)),
            word_count: Some(4),
            descriptions: self.descriptions.clone(),
        })
    }
}

/// Chapter store that fails writes for one chapter number.
struct FlakyChapterStore {
    inner: Arc<SqliteChapterRepository>,
    fail_insert_on: u32,
}

#[async_trait]
impl ChapterRepository for FlakyChapterStore {
    async fn initialize(&self) -> LibraryResult<()> {
        self.inner.initialize().await
    }

    async fn insert(&self, chapter: &CachedChapter) -> LibraryResult<bool> {
        if chapter.chapter_number == self.fail_insert_on {
            return Err(LibraryError::Database(sqlx::Error::PoolClosed));
        }
        self.inner.insert(chapter).await
    }

    async fn exists(
        &self,
        user_id: &str,
        book_id: &str,
        chapter_number: u32,
    ) -> LibraryResult<bool> {
        self.inner.exists(user_id, book_id, chapter_number).await
    }

    async fn find(
        &self,
        user_id: &str,
        book_id: &str,
        chapter_number: u32,
    ) -> LibraryResult<Option<CachedChapter>> {
        self.inner.find(user_id, book_id, chapter_number).await
    }

    async fn count_for_book(&self, user_id: &str, book_id: &str) -> LibraryResult<i64> {
        self.inner.count_for_book(user_id, book_id).await
    }

    async fn delete(
        &self,
        user_id: &str,
        book_id: &str,
        chapter_number: u32,
    ) -> LibraryResult<i64> {
        self.inner.delete(user_id, book_id, chapter_number).await
    }

    async fn find_stale(&self, cutoff: i64, limit: u32) -> LibraryResult<Vec<ChapterRef>> {
        self.inner.find_stale(cutoff, limit).await
    }

    async fn touch(
        &self,
        user_id: &str,
        book_id: &str,
        chapter_number: u32,
        now: i64,
    ) -> LibraryResult<()> {
        self.inner.touch(user_id, book_id, chapter_number, now).await
    }

    async fn total_bytes(&self) -> LibraryResult<i64> {
        self.inner.total_bytes().await
    }

    async fn count(&self) -> LibraryResult<i64> {
        self.inner.count().await
    }
}

struct Fixture {
    orchestrator: Arc<DownloadOrchestrator>,
    content: Arc<ScriptedContent>,
    books: Arc<SqliteOfflineBookRepository>,
    chapters: Arc<SqliteChapterRepository>,
    progress: Arc<SqliteReadingProgressRepository>,
    event_bus: EventBus,
}

async fn setup(content: ScriptedContent) -> Fixture {
    let pool = create_test_pool().await.unwrap();
    let books = Arc::new(SqliteOfflineBookRepository::new(pool.clone()));
    let chapters = Arc::new(SqliteChapterRepository::new(pool.clone()));
    let images = Arc::new(SqliteImageRepository::new(pool.clone()));
    let binaries = Arc::new(SqliteBinaryRepository::new(pool.clone()));
    let progress = Arc::new(SqliteReadingProgressRepository::new(pool.clone()));
    let maintenance = Arc::new(SqliteMaintenanceRepository::new(pool));

    books.initialize().await.unwrap();
    chapters.initialize().await.unwrap();
    images.initialize().await.unwrap();
    binaries.initialize().await.unwrap();
    progress.initialize().await.unwrap();

    let content = Arc::new(content);
    let event_bus = EventBus::default();
    let orchestrator = Arc::new(DownloadOrchestrator::new(
        content.clone(),
        books.clone(),
        chapters.clone(),
        maintenance,
        event_bus.clone(),
        DownloadConfig::default(),
    ));

    Fixture {
        orchestrator,
        content,
        books,
        chapters,
        progress,
        event_bus,
    }
}

#[tokio::test]
async fn download_completes_and_progress_is_monotonic() {
    let fixture = setup(ScriptedContent::new(3)).await;
    let mut events = fixture.event_bus.subscribe();

    let outcome = fixture.orchestrator.download("u1", "b1").await.unwrap();
    assert_eq!(outcome, DownloadOutcome::Completed { total_chapters: 3 });

    let record = fixture
        .orchestrator
        .get_status("u1", "b1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, BookStatus::Complete);
    assert_eq!(record.download_progress, 100);
    assert_eq!(fixture.chapters.count_for_book("u1", "b1").await.unwrap(), 3);
    assert_eq!(fixture.content.calls(), vec![1, 2, 3]);

    // Started, three Progress events with rounded monotonic percents, Completed
    let mut percents = Vec::new();
    loop {
        match events.try_recv().unwrap() {
            CoreEvent::Download(DownloadEvent::Progress { percent, .. }) => {
                percents.push(percent)
            }
            CoreEvent::Download(DownloadEvent::Completed { .. }) => break,
            _ => {}
        }
    }
    assert_eq!(percents, vec![33, 67, 100]);
}

#[tokio::test]
async fn chapter_failure_persists_error_and_keeps_earlier_chapters() {
    let content = ScriptedContent::new(3);
    content.fail_on.lock().unwrap().push(3);
    let fixture = setup(content).await;

    let result = fixture.orchestrator.download("u1", "b1").await;
    assert!(matches!(
        result,
        Err(DownloadError::Chapter { number: 3, .. })
    ));

    let record = fixture
        .orchestrator
        .get_status("u1", "b1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, BookStatus::Error);
    assert!(record.last_error.as_deref().unwrap().contains("connection reset"));
    assert_eq!(fixture.chapters.count_for_book("u1", "b1").await.unwrap(), 2);
}

#[tokio::test]
async fn resume_fetches_only_missing_chapters() {
    let content = ScriptedContent::new(3);
    content.fail_on.lock().unwrap().push(3);
    let fixture = setup(content).await;

    fixture.orchestrator.download("u1", "b1").await.unwrap_err();
    assert_eq!(fixture.content.calls(), vec![1, 2, 3]);

    fixture.content.clear_failures();
    let outcome = fixture.orchestrator.download("u1", "b1").await.unwrap();
    assert_eq!(outcome, DownloadOutcome::Completed { total_chapters: 3 });

    // Chapters 1 and 2 were skipped from cache, only 3 was re-fetched
    assert_eq!(fixture.content.calls(), vec![1, 2, 3, 3]);

    let record = fixture
        .orchestrator
        .get_status("u1", "b1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, BookStatus::Complete);
    assert_eq!(record.download_progress, 100);
}

#[tokio::test]
async fn cancellation_is_a_distinguished_outcome_not_an_error() {
    let mut content = ScriptedContent::new(3);
    content.cancel_on = Some(2);
    let fixture = setup(content).await;

    let outcome = fixture.orchestrator.download("u1", "b1").await.unwrap();
    assert_eq!(
        outcome,
        DownloadOutcome::Cancelled {
            downloaded_chapters: 1
        }
    );

    let record = fixture
        .orchestrator
        .get_status("u1", "b1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, BookStatus::Partial);
    assert_eq!(record.download_progress, 33);
    assert!(!fixture.orchestrator.is_downloading("u1", "b1").await);
}

#[tokio::test]
async fn second_download_for_same_key_is_rejected() {
    let mut content = ScriptedContent::new(2);
    let notify = Arc::new(Notify::new());
    content.block_on = Some((1, notify.clone()));
    let fixture = setup(content).await;

    let orchestrator = fixture.orchestrator.clone();
    let first = tokio::spawn(async move { orchestrator.download("u1", "b1").await });

    while !fixture.orchestrator.is_downloading("u1", "b1").await {
        tokio::task::yield_now().await;
    }

    let second = fixture.orchestrator.download("u1", "b1").await;
    assert!(matches!(
        second,
        Err(DownloadError::AlreadyInProgress { .. })
    ));

    // A different book is admitted while the first is still running
    assert!(!fixture.orchestrator.is_downloading("u1", "other").await);

    notify.notify_one();
    let outcome = first.await.unwrap().unwrap();
    assert_eq!(outcome, DownloadOutcome::Completed { total_chapters: 2 });
}

#[tokio::test]
async fn subscribe_reports_per_chapter_progress() {
    let mut content = ScriptedContent::new(2);
    let notify = Arc::new(Notify::new());
    content.block_on = Some((1, notify.clone()));
    let fixture = setup(content).await;

    let orchestrator = fixture.orchestrator.clone();
    let download = tokio::spawn(async move { orchestrator.download("u1", "b1").await });

    while !fixture.orchestrator.is_downloading("u1", "b1").await {
        tokio::task::yield_now().await;
    }
    let mut rx = fixture.orchestrator.subscribe("u1", "b1").await.unwrap();
    notify.notify_one();

    let first = rx.recv().await.unwrap();
    assert_eq!(first.current_chapter, 1);
    assert_eq!(first.percent, 50);
    assert_eq!(first.status, BookStatus::Downloading);

    let second = rx.recv().await.unwrap();
    assert_eq!(second.current_chapter, 2);
    assert_eq!(second.percent, 100);
    assert_eq!(second.status, BookStatus::Downloading);

    let terminal = rx.recv().await.unwrap();
    assert_eq!(terminal.status, BookStatus::Complete);
    assert_eq!(terminal.error, None);

    download.await.unwrap().unwrap();

    // Terminal state released the subscriber set
    assert!(fixture.orchestrator.subscribe("u1", "b1").await.is_none());
}

#[tokio::test]
async fn delete_removes_record_chapters_and_position() {
    let fixture = setup(ScriptedContent::new(2)).await;
    fixture.orchestrator.download("u1", "b1").await.unwrap();

    fixture
        .progress
        .upsert(&core_library::models::ReadingProgressRecord {
            user_id: "u1".to_string(),
            book_id: "b1".to_string(),
            locator: "loc".to_string(),
            progress_percent: 20.0,
            updated_at: 0,
        })
        .await
        .unwrap();

    let purge = fixture
        .orchestrator
        .delete_offline_book("u1", "b1")
        .await
        .unwrap();

    assert_eq!(purge.chapters_removed, 2);
    assert!(purge.record_removed);
    assert!(purge.progress_removed);
    assert!(fixture
        .orchestrator
        .get_status("u1", "b1")
        .await
        .unwrap()
        .is_none());
    assert_eq!(fixture.chapters.count().await.unwrap(), 0);
}

#[tokio::test]
async fn store_failure_persists_error_and_emits_failed() {
    let pool = create_test_pool().await.unwrap();
    let books = Arc::new(SqliteOfflineBookRepository::new(pool.clone()));
    let chapters = Arc::new(SqliteChapterRepository::new(pool.clone()));
    let maintenance = Arc::new(SqliteMaintenanceRepository::new(pool));
    books.initialize().await.unwrap();
    chapters.initialize().await.unwrap();

    let event_bus = EventBus::default();
    let mut events = event_bus.subscribe();
    let orchestrator = DownloadOrchestrator::new(
        Arc::new(ScriptedContent::new(3)),
        books.clone(),
        Arc::new(FlakyChapterStore {
            inner: chapters.clone(),
            fail_insert_on: 2,
        }),
        maintenance,
        event_bus.clone(),
        DownloadConfig::default(),
    );

    let result = orchestrator.download("u1", "b1").await;
    assert!(matches!(result, Err(DownloadError::Repository(_))));

    // A write failure surfaces exactly like a network failure
    let record = orchestrator
        .get_status("u1", "b1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, BookStatus::Error);
    assert!(record.last_error.is_some());
    assert_eq!(chapters.count_for_book("u1", "b1").await.unwrap(), 1);

    let mut failed = false;
    while let Ok(event) = events.try_recv() {
        if matches!(event, CoreEvent::Download(DownloadEvent::Failed { .. })) {
            failed = true;
        }
    }
    assert!(failed);
}

#[tokio::test]
async fn delete_during_download_settles_as_cancellation() {
    let mut content = ScriptedContent::new(3);
    let notify = Arc::new(Notify::new());
    content.block_on = Some((2, notify.clone()));
    let fixture = setup(content).await;

    let orchestrator = fixture.orchestrator.clone();
    let download = tokio::spawn(async move { orchestrator.download("u1", "b1").await });

    while fixture.chapters.count_for_book("u1", "b1").await.unwrap() < 1 {
        tokio::task::yield_now().await;
    }

    let purge = fixture
        .orchestrator
        .delete_offline_book("u1", "b1")
        .await
        .unwrap();
    assert!(purge.record_removed);

    // The in-flight download finds its record gone and settles as cancelled
    notify.notify_one();
    let outcome = download.await.unwrap().unwrap();
    assert!(matches!(outcome, DownloadOutcome::Cancelled { .. }));
    assert!(fixture
        .orchestrator
        .get_status("u1", "b1")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn untitled_chapter_takes_title_from_table_of_contents() {
    let mut content = ScriptedContent::new(2);
    content.omit_titles = true;
    let fixture = setup(content).await;

    fixture.orchestrator.download("u1", "b1").await.unwrap();

    let chapter = fixture
        .chapters
        .find("u1", "b1", 1)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(chapter.title.as_deref(), Some("Chapter 1"));
}

#[tokio::test]
async fn unknown_description_category_defaults_to_scene() {
    let mut content = ScriptedContent::new(1);
    content.descriptions = vec![
        DescriptionPayload {
            id: "d1".to_string(),
            content: "A mysterious fog".to_string(),
            external_type: "weather".to_string(),
            confidence: Some(0.4),
            illustration: None,
        },
        DescriptionPayload {
            id: "d2".to_string(),
            content: "The lighthouse keeper".to_string(),
            external_type: "person".to_string(),
            confidence: Some(0.9),
            illustration: Some("ill-7".to_string()),
        },
    ];
    let fixture = setup(content).await;

    fixture.orchestrator.download("u1", "b1").await.unwrap();

    let chapter = fixture
        .chapters
        .find("u1", "b1", 1)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(chapter.descriptions.len(), 2);

    assert_eq!(chapter.descriptions[0].kind, DescriptionKind::Scene);
    assert_eq!(
        chapter.descriptions[0].illustration_status,
        Some(IllustrationStatus::Pending)
    );

    assert_eq!(chapter.descriptions[1].kind, DescriptionKind::Character);
    assert_eq!(chapter.descriptions[1].illustration_ref.as_deref(), Some("ill-7"));
    assert_eq!(
        chapter.descriptions[1].illustration_status,
        Some(IllustrationStatus::Ready)
    );
}
