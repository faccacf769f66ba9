//! # Host Bridge Traits
//!
//! Narrow contracts between the offline reading core and its external
//! collaborators. Each trait represents a capability the core consumes but
//! does not own, implemented differently per host platform (desktop, mobile,
//! web).
//!
//! ## Traits
//!
//! - [`ContentApi`](content::ContentApi) - Remote book/chapter retrieval with
//!   cooperative cancellation
//! - [`PlatformStorage`](platform::PlatformStorage) - Quota estimation,
//!   persistence grants, foreground visibility, cache-storage purge
//! - [`SyncQueue`](sync_queue::SyncQueue) - Read-only view over the
//!   write-behind mutation queue (the core may delete exhausted failures only)
//!
//! ## Error Handling
//!
//! All bridge traits use the [`BridgeError`](error::BridgeError) type.
//! Platform implementations should convert platform-specific errors to
//! `BridgeError` and provide actionable messages.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` bounds to support safe concurrent
//! usage across async tasks.

pub mod content;
pub mod error;
pub mod platform;
pub mod sync_queue;

pub use error::{BridgeError, Result};

// Re-export commonly used types
pub use content::{BookDetails, ChapterPayload, ChapterSummary, ContentApi, DescriptionPayload};
pub use platform::{PlatformStorage, QuotaEstimate};
pub use sync_queue::{SyncEntryStatus, SyncQueue, SyncQueueEntry};
