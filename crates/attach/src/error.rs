//! Attachment operation errors.

use satchel_core::{ChunkId, TodoId};
use satchel_metadata::MetadataError;
use satchel_storage::StorageError;
use thiserror::Error;

/// Attachment operation errors.
#[derive(Debug, Error)]
pub enum AttachError {
    /// The hierarchical file area was not available when the session opened.
    #[error("file area unavailable: {0}")]
    CapabilityUnavailable(String),

    /// A chunk referenced by a media reference is not stored.
    #[error("missing chunk: {0}")]
    MissingChunk(ChunkId),

    /// Blob persistence failed while creating a todo; no record was committed.
    #[error("failed to write attachment for todo {id}: {reason}")]
    WriteFailure { id: TodoId, reason: String },

    /// Blob cleanup failed while deleting a todo; the record was kept.
    #[error("failed to delete attachment of todo {id}: {reason}")]
    DeletionFailure { id: TodoId, reason: String },

    #[error("todo not found: {0}")]
    NotFound(TodoId),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid attachment state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("metadata error: {0}")]
    Metadata(#[from] MetadataError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("core error: {0}")]
    Core(satchel_core::Error),
}

impl From<satchel_core::Error> for AttachError {
    fn from(err: satchel_core::Error) -> Self {
        match err {
            satchel_core::Error::InvalidTransition { from, to } => {
                Self::InvalidTransition { from, to }
            }
            other => Self::Core(other),
        }
    }
}

impl AttachError {
    /// Whether retrying the failed operation may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Storage(e) => e.is_transient(),
            Self::Metadata(e) => e.is_transient(),
            _ => false,
        }
    }

    /// Whether the error means "the target does not exist".
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_)
                | Self::Storage(StorageError::NotFound(_))
                | Self::Metadata(MetadataError::NotFound(_))
        )
    }
}

/// Result type for attachment operations.
pub type AttachResult<T> = std::result::Result<T, AttachError>;
