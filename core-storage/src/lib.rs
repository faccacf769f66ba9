//! Storage management for the offline reading core.
//!
//! Two cooperating services:
//!
//! - [`BinaryContentCache`]: whole-book binaries under a fixed byte cap,
//!   with a fixed TTL and least-recently-used eviction. Cache misses are
//!   never errors at the public surface.
//! - [`StorageQuotaManager`]: quota inspection against the platform's
//!   storage estimate, persistence requests, the staged cleanup pipeline
//!   and the atomic clear operations.

pub mod binary_cache;
pub mod config;
pub mod error;
pub mod quota;
pub mod stats;

pub use binary_cache::BinaryContentCache;
pub use config::StorageConfig;
pub use error::{Result, StorageError};
pub use quota::StorageQuotaManager;
pub use stats::{CleanupReport, StorageBreakdown, StorageInfo};
