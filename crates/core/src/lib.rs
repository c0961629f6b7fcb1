//! Core domain types for Satchel, a local todo list with binary attachments.
//!
//! This crate defines the canonical data model used across all other crates:
//! - Todo ids, records and the attachment lifecycle
//! - Media references for the chunked, file-area and inline strategies
//! - Chunk ids and range arithmetic
//! - Media-type classification for display
//! - Configuration

pub mod chunk;
pub mod config;
pub mod error;
pub mod media;
pub mod todo;

pub use chunk::{ChunkId, ChunkRange};
pub use error::{Error, Result};
pub use media::{MediaKind, MediaRef, Strategy};
pub use todo::{AttachmentState, IdGenerator, RecordState, TodoId, TodoRecord};

/// Default chunk size: 1 MiB
pub const CHUNK_SIZE: u64 = 1024 * 1024;

/// Maximum chunk size: 64 MiB
pub const MAX_CHUNK_SIZE: u64 = 64 * 1024 * 1024;

/// Minimum configurable chunk size: 1 KiB
pub const MIN_CHUNK_SIZE: u64 = 1024;
