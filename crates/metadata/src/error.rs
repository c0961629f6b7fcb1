//! Metadata store error types.

use thiserror::Error;

/// SQLite primary result codes that mean "try again later".
const SQLITE_BUSY: &str = "5";
const SQLITE_LOCKED: &str = "6";

/// Metadata store operation errors.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt record: {0}")]
    Corrupt(#[from] satchel_core::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl MetadataError {
    /// Whether retrying the operation may succeed (database busy or locked).
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Database(sqlx::Error::PoolTimedOut) => true,
            Self::Database(sqlx::Error::Database(db)) => {
                let busy_code = db.code().is_some_and(|code| {
                    // Extended codes carry the primary code in the low byte.
                    code.parse::<u32>()
                        .map(|c| (c & 0xff).to_string())
                        .is_ok_and(|primary| primary == SQLITE_BUSY || primary == SQLITE_LOCKED)
                });
                busy_code || db.message().contains("database is locked")
            }
            _ => false,
        }
    }
}

/// Result type for metadata operations.
pub type MetadataResult<T> = std::result::Result<T, MetadataError>;
