//! # Event Bus System
//!
//! Event-driven architecture for the offline reading core using
//! `tokio::sync::broadcast`. Modules publish typed events; any number of
//! subscribers listen independently.
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{EventBus, CoreEvent, StorageEvent};
//!
//! let event_bus = EventBus::new(100);
//! let mut stream = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::Storage(StorageEvent::PressureWarning {
//!         percent_used: 87.5,
//!         critical: false,
//!     }))
//!     .ok();
//! ```
//!
//! ## Error Handling
//!
//! `tokio::sync::broadcast` produces two receiver errors:
//!
//! - `RecvError::Lagged(n)`: the subscriber missed `n` events. Non-fatal;
//!   the subscriber keeps receiving new events.
//! - `RecvError::Closed`: all senders dropped. Treat as shutdown.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

// Re-export commonly used types
pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
///
/// Subscribers that can't keep up will receive `RecvError::Lagged`.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum encompassing all event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Offline download lifecycle events
    Download(DownloadEvent),
    /// Storage quota and cleanup events
    Storage(StorageEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Download(e) => e.description(),
            CoreEvent::Storage(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Download(DownloadEvent::Failed { .. }) => EventSeverity::Error,
            CoreEvent::Storage(StorageEvent::PressureWarning { critical: true, .. }) => {
                EventSeverity::Warning
            }
            CoreEvent::Download(DownloadEvent::Completed { .. }) => EventSeverity::Info,
            CoreEvent::Storage(StorageEvent::CleanupCompleted { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    /// Debug-level events (verbose)
    Debug,
    /// Informational events
    Info,
    /// Warning events
    Warning,
    /// Error events
    Error,
}

// ============================================================================
// Download Events
// ============================================================================

/// Events emitted by the download orchestrator.
///
/// Cancellation is a distinguished non-error outcome: it is never reported
/// through `Failed`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event")]
pub enum DownloadEvent {
    /// Download accepted and metadata fetched.
    Started {
        user_id: String,
        book_id: String,
        total_chapters: u32,
    },
    /// One chapter finished (fetched or skipped on resume).
    Progress {
        user_id: String,
        book_id: String,
        total_chapters: u32,
        downloaded_chapters: u32,
        current_chapter: u32,
        /// Progress percentage (0-100), non-decreasing per download
        percent: u8,
    },
    /// All declared chapters are cached.
    Completed {
        user_id: String,
        book_id: String,
        total_chapters: u32,
    },
    /// Download stopped by an error; already-cached chapters are kept.
    Failed {
        user_id: String,
        book_id: String,
        message: String,
        downloaded_chapters: u32,
    },
    /// Download cancelled by the user; the book rests in partial state.
    Cancelled {
        user_id: String,
        book_id: String,
        downloaded_chapters: u32,
    },
}

impl DownloadEvent {
    fn description(&self) -> &str {
        match self {
            DownloadEvent::Started { .. } => "Download started",
            DownloadEvent::Progress { .. } => "Download in progress",
            DownloadEvent::Completed { .. } => "Download completed successfully",
            DownloadEvent::Failed { .. } => "Download failed",
            DownloadEvent::Cancelled { .. } => "Download cancelled",
        }
    }
}

// ============================================================================
// Storage Events
// ============================================================================

/// Events emitted by the storage quota manager.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event")]
pub enum StorageEvent {
    /// A prioritized cleanup pass began.
    CleanupStarted {
        /// Bytes the caller asked to free
        target_bytes: u64,
    },
    /// A cleanup pass finished.
    CleanupCompleted {
        bytes_freed: u64,
        items_removed: u64,
        target_reached: bool,
    },
    /// Usage crossed the warning or critical threshold.
    PressureWarning { percent_used: f64, critical: bool },
}

impl StorageEvent {
    fn description(&self) -> &str {
        match self {
            StorageEvent::CleanupStarted { .. } => "Storage cleanup started",
            StorageEvent::CleanupCompleted { .. } => "Storage cleanup completed",
            StorageEvent::PressureWarning { .. } => "Storage pressure warning",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central broadcast channel for publishing [`CoreEvent`]s.
///
/// Fully thread-safe; share across tasks with `Arc`.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an
    /// error when there are no active subscribers.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber receiving all future events.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}
