//! Error types for the collection store.

use thiserror::Error;

/// Main error type for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Record without a string `id` field in collection {collection}")]
    MissingId { collection: String },

    #[error("Duplicate id {id} in collection {collection}")]
    DuplicateId { collection: String, id: String },

    #[error("Invalid patch: {0}")]
    InvalidPatch(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
