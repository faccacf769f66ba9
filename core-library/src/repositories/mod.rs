//! Repository traits and SQLite implementations for the offline stores.
//!
//! Every repository owns its table: `initialize` creates the table and the
//! indexes the repository's queries depend on, so callers can bring up a
//! fresh database by initializing the repositories they use.

pub mod binary;
pub mod chapter;
pub mod image;
pub mod maintenance;
pub mod offline_book;
pub mod progress;

pub use binary::{BinaryRef, BinaryRepository, SqliteBinaryRepository};
pub use chapter::{ChapterRef, ChapterRepository, SqliteChapterRepository};
pub use image::{ImageRef, ImageRepository, SqliteImageRepository};
pub use maintenance::{
    BookPurge, ClearReport, MaintenanceRepository, SqliteMaintenanceRepository,
};
pub use offline_book::{OfflineBookRepository, SqliteOfflineBookRepository};
pub use progress::{ReadingProgressRepository, SqliteReadingProgressRepository};
