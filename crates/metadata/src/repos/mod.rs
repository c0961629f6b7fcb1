//! Repository traits for metadata operations.

pub mod chunks;
pub mod todos;

pub use chunks::{ChunkRepo, ChunkStats};
pub use todos::TodoRepo;
