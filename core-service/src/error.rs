use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Core initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Library error: {0}")]
    Library(#[from] core_library::LibraryError),

    #[error("Storage error: {0}")]
    Storage(#[from] core_storage::StorageError),

    #[error("Download error: {0}")]
    Download(#[from] core_download::DownloadError),

    #[error("Runtime error: {0}")]
    Runtime(#[from] core_runtime::RuntimeError),
}

pub type Result<T> = std::result::Result<T, CoreError>;
