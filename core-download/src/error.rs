use core_library::LibraryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("Invalid download configuration: {0}")]
    Config(String),

    #[error("Download already in progress for {user_id}:{book_id}")]
    AlreadyInProgress { user_id: String, book_id: String },

    #[error("Metadata fetch failed: {0}")]
    Metadata(String),

    #[error("Chapter {number} fetch failed: {message}")]
    Chapter { number: u32, message: String },

    #[error("Library error: {0}")]
    Repository(#[from] LibraryError),
}

pub type Result<T> = std::result::Result<T, DownloadError>;
