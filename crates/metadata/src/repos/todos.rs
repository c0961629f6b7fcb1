//! Todo record repository.

use crate::error::MetadataResult;
use async_trait::async_trait;
use satchel_core::{ChunkId, TodoId, TodoRecord};

/// Repository for todo records.
#[async_trait]
pub trait TodoRepo: Send + Sync {
    /// Insert a new record. Fails with `AlreadyExists` if the id is taken.
    async fn insert_todo(&self, record: &TodoRecord) -> MetadataResult<()>;

    /// Get a record by id.
    async fn get_todo(&self, id: TodoId) -> MetadataResult<Option<TodoRecord>>;

    /// All records in ascending id order, tombstoned ones included.
    async fn list_todos(&self) -> MetadataResult<Vec<TodoRecord>>;

    /// Tombstone a record before its blob data is removed.
    ///
    /// Fails with `NotFound` if the record does not exist. Tombstoning an
    /// already tombstoned record succeeds.
    async fn mark_pending_delete(&self, id: TodoId) -> MetadataResult<()>;

    /// Delete a record. Fails with `NotFound` if it does not exist.
    async fn delete_todo(&self, id: TodoId) -> MetadataResult<()>;

    /// Delete the given chunks and then the record in a single transaction.
    ///
    /// Chunks that are already gone are skipped. If any statement fails the
    /// transaction rolls back and every chunk and the record stay intact.
    /// Returns the number of chunk rows removed.
    async fn delete_todo_with_chunks(&self, id: TodoId, chunks: &[ChunkId])
    -> MetadataResult<u64>;

    /// Largest id ever stored, used to seed the id generator.
    async fn max_todo_id(&self) -> MetadataResult<Option<i64>>;
}
