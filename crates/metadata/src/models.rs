//! Database models mapping to the metadata schema.

use crate::error::MetadataResult;
use satchel_core::media::{MEDIA_SCHEMA_VERSION, MediaRef};
use satchel_core::{ChunkId, RecordState, TodoId, TodoRecord};
use sqlx::FromRow;
use time::OffsetDateTime;

// =============================================================================
// Todos
// =============================================================================

/// Todo record row. `media` holds the tagged JSON encoding of [`MediaRef`].
#[derive(Debug, Clone, FromRow)]
pub struct TodoRow {
    pub id: i64,
    pub text: String,
    pub media: Option<String>,
    pub state: String,
    pub schema_version: i64,
    pub created_at: OffsetDateTime,
}

impl TodoRow {
    /// Encode a domain record for storage.
    pub fn from_record(record: &TodoRecord) -> MetadataResult<Self> {
        let media = record.media.as_ref().map(MediaRef::to_json).transpose()?;
        Ok(Self {
            id: record.id.as_i64(),
            text: record.text.clone(),
            media,
            state: record.state.as_str().to_string(),
            schema_version: MEDIA_SCHEMA_VERSION,
            created_at: record.created_at,
        })
    }

    /// Decode into a domain record. Rows older than the current schema
    /// version are read through the legacy media decoder.
    pub fn into_record(self) -> MetadataResult<TodoRecord> {
        let media = self
            .media
            .as_deref()
            .map(MediaRef::from_json)
            .transpose()?;
        Ok(TodoRecord {
            id: TodoId::from_raw(self.id),
            text: self.text,
            media,
            state: RecordState::parse(&self.state)?,
            created_at: self.created_at,
        })
    }
}

// =============================================================================
// Chunks
// =============================================================================

/// Chunk row without its payload.
#[derive(Debug, Clone, FromRow)]
pub struct ChunkRow {
    pub chunk_id: String,
    pub file_id: i64,
    pub seq: i64,
    pub size_bytes: i64,
    pub created_at: OffsetDateTime,
}

impl ChunkRow {
    pub fn id(&self) -> ChunkId {
        ChunkId::new(TodoId::from_raw(self.file_id), self.seq as u32)
    }
}
