//! Domain models and SQLite persistence for the offline reading library.
//!
//! The library keeps five persistent stores: offline book records, cached
//! chapters, cached images, cached whole-book binaries and reading-progress
//! records. Each store has a repository trait plus a `Sqlite*Repository`
//! implementation over a shared `sqlx` pool, and the maintenance repository
//! performs the multi-table deletes that must be atomic.

pub mod db;
pub mod error;
pub mod models;
pub mod repositories;

pub use error::{LibraryError, Result};
