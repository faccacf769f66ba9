//! Runtime services shared by the offline reading core.
//!
//! - `events`: typed event bus over `tokio::sync::broadcast`
//! - `logging`: tracing-subscriber bootstrap
//! - `error`: runtime error type

pub mod error;
pub mod events;
pub mod logging;

pub use error::{Result, RuntimeError};
pub use events::{CoreEvent, DownloadEvent, EventBus, StorageEvent};
pub use logging::{init_logging, LogFormat, LogLevel, LoggingConfig};
