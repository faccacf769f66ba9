use thiserror::Error;

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Event bus error: {0}")]
    EventBus(String),
}

pub type Result<T> = std::result::Result<T, RuntimeError>;
