//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid todo id: {0}")]
    InvalidTodoId(String),

    #[error("invalid chunk id: {0}")]
    InvalidChunkId(String),

    #[error("invalid chunk size: {size} (must be between {min} and {max})")]
    InvalidChunkSize { size: u64, min: u64, max: u64 },

    #[error("invalid attachment state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("invalid file name: {0}")]
    InvalidFileName(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
