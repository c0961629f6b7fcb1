//! Explicitly owned storage session.

use crate::error::{AttachError, AttachResult};
use crate::file_area::FileArea;
use crate::handle::HandleRegistry;
use crate::metrics;
use satchel_core::config::AppConfig;
use satchel_core::{IdGenerator, TodoId};
use satchel_metadata::MetadataStore;
use satchel_storage::ObjectStore;
use std::sync::Arc;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Open stores plus the capabilities detected when the session opened.
///
/// Creates and deletes hold the mutation gate shared; the orphan sweep holds
/// it exclusively so it never sees chunks of a create that has not committed.
pub struct StorageSession {
    config: AppConfig,
    metadata: Arc<dyn MetadataStore>,
    file_area: Result<FileArea, String>,
    ids: IdGenerator,
    handles: HandleRegistry,
    mutation_gate: RwLock<()>,
}

impl StorageSession {
    /// Open the metadata store and detect the file area.
    ///
    /// A missing file area is not an error: file-backed attachments are
    /// disabled for the lifetime of the session.
    pub async fn open(config: AppConfig) -> AttachResult<Arc<Self>> {
        config.validate().map_err(AttachError::InvalidInput)?;

        let metadata = satchel_metadata::from_config(&config.metadata).await?;
        let file_area_store = if config.file_area.enabled {
            match satchel_storage::from_config(&config.file_area).await {
                Ok(store) => Ok(store),
                Err(e) => Err(e.to_string()),
            }
        } else {
            Err("disabled by configuration".to_string())
        };

        Self::with_stores(config, metadata, file_area_store).await
    }

    /// Build a session over already opened stores.
    ///
    /// `file_area` is the detection result: the store, or why it is missing.
    pub async fn with_stores(
        config: AppConfig,
        metadata: Arc<dyn MetadataStore>,
        file_area: Result<Arc<dyn ObjectStore>, String>,
    ) -> AttachResult<Arc<Self>> {
        metrics::register_metrics();
        metadata.health_check().await?;

        let handles = HandleRegistry::new();
        let file_area = file_area.map(|store| {
            FileArea::new(
                store,
                config.file_area.op_timeout(),
                config.retry.clone(),
                handles.clone(),
            )
        });
        match &file_area {
            Ok(area) => tracing::info!(
                backend = area.backend_name(),
                path = %config.file_area.path.display(),
                "file area available"
            ),
            Err(reason) => tracing::warn!(
                reason = %reason,
                "file area unavailable; file-backed attachments are disabled"
            ),
        }

        let floor = metadata.max_todo_id().await?.unwrap_or(0);

        Ok(Arc::new(Self {
            config,
            metadata,
            file_area,
            ids: IdGenerator::starting_after(floor),
            handles,
            mutation_gate: RwLock::new(()),
        }))
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn metadata(&self) -> &Arc<dyn MetadataStore> {
        &self.metadata
    }

    /// The file area, or `CapabilityUnavailable`.
    pub fn file_area(&self) -> AttachResult<&FileArea> {
        self.file_area
            .as_ref()
            .map_err(|reason| AttachError::CapabilityUnavailable(reason.clone()))
    }

    pub fn has_file_area(&self) -> bool {
        self.file_area.is_ok()
    }

    /// Registry counting display handles handed out by this session.
    pub fn handles(&self) -> &HandleRegistry {
        &self.handles
    }

    pub fn next_id(&self) -> TodoId {
        self.ids.next_id()
    }

    pub(crate) async fn mutation_shared(&self) -> RwLockReadGuard<'_, ()> {
        self.mutation_gate.read().await
    }

    pub(crate) async fn mutation_exclusive(&self) -> RwLockWriteGuard<'_, ()> {
        self.mutation_gate.write().await
    }

    /// Close the metadata store. Later operations fail.
    pub async fn close(&self) {
        self.metadata.close().await;
        tracing::debug!("storage session closed");
    }
}
