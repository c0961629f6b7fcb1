//! Hierarchical file area: one path-addressed file per attachment.

use crate::error::{AttachError, AttachResult};
use crate::handle::{DisplayHandle, HandleRegistry};
use crate::retry::{with_retry, with_timeout};
use bytes::Bytes;
use satchel_core::config::RetryConfig;
use satchel_core::media::FILE_AREA_PREFIX;
use satchel_storage::{ObjectStore, StorageError};
use std::sync::Arc;
use std::time::Duration;

/// File-area operations bounded by a timeout and retried on transient errors.
pub struct FileArea {
    store: Arc<dyn ObjectStore>,
    op_timeout: Duration,
    retry: RetryConfig,
    handles: HandleRegistry,
}

impl FileArea {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        op_timeout: Duration,
        retry: RetryConfig,
        handles: HandleRegistry,
    ) -> Self {
        Self {
            store,
            op_timeout,
            retry,
            handles,
        }
    }

    /// Backend name, for logging.
    pub fn backend_name(&self) -> &'static str {
        self.store.backend_name()
    }

    /// Create or replace the entry at `name`. The bytes are durable and
    /// readable once this returns.
    pub async fn save_file(&self, name: &str, data: Bytes) -> AttachResult<()> {
        validate_entry_name(name)?;
        with_retry(&self.retry, "file_area.save", || {
            let data = data.clone();
            with_timeout(self.op_timeout, "file_area.save", async move {
                self.store.put(name, data).await.map_err(AttachError::from)
            })
        })
        .await?;
        tracing::debug!(name, "file area entry saved");
        Ok(())
    }

    /// Remove the entry at `name`. A missing entry counts as removed.
    ///
    /// Returns `true` if an entry was deleted by this call.
    pub async fn delete_file(&self, name: &str) -> AttachResult<bool> {
        validate_entry_name(name)?;
        with_retry(&self.retry, "file_area.delete", || {
            with_timeout(self.op_timeout, "file_area.delete", async move {
                match self.store.delete(name).await {
                    Ok(()) => Ok(true),
                    Err(StorageError::NotFound(_)) => Ok(false),
                    Err(e) => Err(e.into()),
                }
            })
        })
        .await
    }

    /// Read the entry at `name` into a display handle owned by the caller.
    pub async fn read_file(&self, name: &str) -> AttachResult<DisplayHandle> {
        validate_entry_name(name)?;
        let bytes = with_retry(&self.retry, "file_area.read", || {
            with_timeout(self.op_timeout, "file_area.read", async move {
                self.store.get(name).await.map_err(AttachError::from)
            })
        })
        .await?;
        Ok(self.handles.acquire(bytes))
    }

    /// Whether an entry exists at `name`.
    pub async fn exists(&self, name: &str) -> AttachResult<bool> {
        validate_entry_name(name)?;
        with_retry(&self.retry, "file_area.exists", || {
            with_timeout(self.op_timeout, "file_area.exists", async move {
                self.store.exists(name).await.map_err(AttachError::from)
            })
        })
        .await
    }

    /// Every entry under the attachments prefix.
    pub async fn list_files(&self) -> AttachResult<Vec<String>> {
        let prefix = FILE_AREA_PREFIX.trim_end_matches('/');
        with_retry(&self.retry, "file_area.list", || {
            with_timeout(self.op_timeout, "file_area.list", async move {
                self.store.list(prefix).await.map_err(AttachError::from)
            })
        })
        .await
    }

    pub async fn health_check(&self) -> AttachResult<()> {
        with_timeout(self.op_timeout, "file_area.health_check", async {
            self.store.health_check().await.map_err(AttachError::from)
        })
        .await
    }
}

/// Accept `attachments/<entry>` or a bare `<entry>` written by older versions,
/// where `<entry>` is a single path component.
pub fn validate_entry_name(name: &str) -> AttachResult<()> {
    let entry = name.strip_prefix(FILE_AREA_PREFIX).unwrap_or(name);
    let bad = entry.is_empty()
        || entry == "."
        || entry == ".."
        || entry.contains(['/', '\\'])
        || entry.contains('\0');
    if bad {
        return Err(AttachError::InvalidInput(format!(
            "invalid file area entry name: {name:?}"
        )));
    }
    Ok(())
}
