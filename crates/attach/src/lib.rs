//! Attachment orchestration for Satchel.
//!
//! This crate ties the metadata store and the file area together:
//! - [`StorageSession`]: explicitly owned stores and detected capabilities
//! - [`ChunkingEngine`]: fixed-size chunking with ordered progress
//! - [`FileArea`]: path-addressed files with timeouts and retries
//! - [`AttachmentManager`]: write-then-link creates, consistent deletes, sweep
//! - [`BlobRenderer`]: cancellable materialization for display

pub mod chunking;
pub mod error;
pub mod file_area;
pub mod handle;
pub mod manager;
pub mod metrics;
pub mod render;
pub mod retry;
pub mod session;

pub use chunking::{ChunkWriteError, ChunkingEngine};
pub use error::{AttachError, AttachResult};
pub use file_area::FileArea;
pub use handle::{DisplayHandle, HandleRegistry};
pub use manager::{
    AttachmentManager, BlobInventory, IntegrityProblem, IntegrityReport, NewAttachment,
    SweepReport,
};
pub use render::{BlobRenderer, PLACEHOLDER_MESSAGE, Presentation, RenderOutcome, RenderedMedia};
pub use session::StorageSession;
pub use tokio_util::sync::CancellationToken;
