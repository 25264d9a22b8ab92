// src/persistence/error.rs
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("failed to write backends file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize backend roster: {0}")]
    Serialize(#[from] serde_json::Error),
}
