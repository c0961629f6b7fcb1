//! Chunk repository.

use crate::error::MetadataResult;
use async_trait::async_trait;
use satchel_core::ChunkId;

/// Repository for attachment chunks (the keyed chunk store).
#[async_trait]
pub trait ChunkRepo: Send + Sync {
    /// Create or replace a chunk.
    async fn put_chunk(&self, id: &ChunkId, data: &[u8]) -> MetadataResult<()>;

    /// Get a chunk's payload.
    async fn get_chunk(&self, id: &ChunkId) -> MetadataResult<Option<Vec<u8>>>;

    /// Check if a chunk exists.
    async fn chunk_exists(&self, id: &ChunkId) -> MetadataResult<bool>;

    /// Delete chunks in one transaction. Missing ids are skipped.
    ///
    /// Returns the number of rows removed.
    async fn delete_chunks(&self, ids: &[ChunkId]) -> MetadataResult<u64>;

    /// Every stored chunk id, ordered by file id then sequence.
    async fn list_chunk_ids(&self) -> MetadataResult<Vec<ChunkId>>;

    /// Get total chunk count and size.
    async fn chunk_stats(&self) -> MetadataResult<ChunkStats>;
}

/// Chunk statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkStats {
    /// Total number of chunks.
    pub count: u64,
    /// Total size in bytes.
    pub total_size: u64,
    /// Number of distinct files the chunks belong to.
    pub files: u64,
}
