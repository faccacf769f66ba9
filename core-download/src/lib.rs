//! Download orchestration for the offline reading core.
//!
//! The [`DownloadOrchestrator`] drives whole-book downloads: metadata
//! first, then chapters strictly in order, persisting each chapter and the
//! book's progress as it goes. Downloads are cancellable mid-flight and
//! resumable; already-cached chapters are never re-fetched or rewritten.
//!
//! Cancellation is a distinguished non-error outcome
//! ([`DownloadOutcome::Cancelled`]), never an `Err`.

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod progress;

pub use config::DownloadConfig;
pub use error::{DownloadError, Result};
pub use orchestrator::DownloadOrchestrator;
pub use progress::{DownloadOutcome, DownloadProgress};
