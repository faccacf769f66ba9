use thiserror::Error;

#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid book key: {0}")]
    InvalidKey(String),

    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Entity not found: {entity_type} with key {key}")]
    NotFound { entity_type: String, key: String },
}

pub type Result<T> = std::result::Result<T, LibraryError>;
