//! Object storage abstraction for Satchel's file area.
//!
//! This crate provides:
//! - The [`ObjectStore`] trait for path-addressed blobs
//! - A local filesystem backend with atomic writes and traversal protection

pub mod backends;
pub mod error;
pub mod traits;

pub use backends::filesystem::FilesystemBackend;
pub use error::{StorageError, StorageResult};
pub use traits::ObjectStore;

use satchel_core::config::FileAreaConfig;
use std::sync::Arc;

/// Create an object store from file area configuration.
///
/// Fails with `StorageError::Config` when the file area is disabled or the
/// configuration is invalid.
pub async fn from_config(config: &FileAreaConfig) -> StorageResult<Arc<dyn ObjectStore>> {
    config.validate().map_err(StorageError::Config)?;
    if !config.enabled {
        return Err(StorageError::Config("file area is disabled".to_string()));
    }

    let backend = FilesystemBackend::new(&config.path).await?;
    backend.health_check().await?;
    Ok(Arc::new(backend))
}
