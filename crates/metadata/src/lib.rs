//! Metadata store abstraction and implementation for Satchel.
//!
//! This crate persists:
//! - Todo records with their tagged media references and tombstone state
//! - Attachment chunks for the chunked strategy, so chunk and record deletes
//!   can share one transaction

pub mod error;
pub mod models;
pub mod repos;
pub mod store;

pub use error::{MetadataError, MetadataResult};
pub use repos::{ChunkRepo, ChunkStats, TodoRepo};
pub use store::{MetadataStore, SqliteStore};

use satchel_core::config::MetadataConfig;
use std::sync::Arc;

/// Create a metadata store from configuration.
pub async fn from_config(config: &MetadataConfig) -> MetadataResult<Arc<dyn MetadataStore>> {
    let store = SqliteStore::new(&config.path, config.busy_timeout_secs).await?;
    Ok(Arc::new(store) as Arc<dyn MetadataStore>)
}
