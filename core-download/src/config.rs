//! Download configuration

use crate::error::{DownloadError, Result};

/// Tuning knobs for the download orchestrator.
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Buffer size of each per-download progress channel. Slow subscribers
    /// lag rather than block the download.
    pub progress_buffer_size: usize,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            progress_buffer_size: 32,
        }
    }
}

impl DownloadConfig {
    /// Set the per-download progress buffer size
    pub fn with_progress_buffer_size(mut self, size: usize) -> Self {
        self.progress_buffer_size = size;
        self
    }

    /// Validate configuration consistency.
    pub fn validate(&self) -> Result<()> {
        if self.progress_buffer_size == 0 {
            return Err(DownloadError::Config(
                "Progress buffer size must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}
