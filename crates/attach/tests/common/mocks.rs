use async_trait::async_trait;
use bytes::Bytes;
use satchel_core::{ChunkId, TodoId, TodoRecord};
use satchel_metadata::{
    ChunkRepo, ChunkStats, MetadataError, MetadataResult, MetadataStore, SqliteStore, TodoRepo,
};
use satchel_storage::{
    FilesystemBackend, ObjectStore, StorageError, StorageResult,
};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use tokio::time::Duration;

fn injected() -> MetadataError {
    MetadataError::Internal("injected failure".to_string())
}

/// SQLite store with switchable failures and delays.
#[allow(dead_code)]
pub struct FaultyMetadata {
    inner: SqliteStore,
    /// Fail the put_chunk call with this 1-based index (0 = never).
    pub fail_put_chunk_at: AtomicU32,
    put_chunk_calls: AtomicU32,
    pub fail_insert: AtomicBool,
    pub fail_delete_with_chunks: AtomicBool,
    /// Delay applied after a chunk is read.
    pub get_chunk_delay_ms: AtomicU64,
}

#[allow(dead_code)]
impl FaultyMetadata {
    pub async fn open(path: &std::path::Path) -> Self {
        Self {
            inner: SqliteStore::new(path, 1).await.unwrap(),
            fail_put_chunk_at: AtomicU32::new(0),
            put_chunk_calls: AtomicU32::new(0),
            fail_insert: AtomicBool::new(false),
            fail_delete_with_chunks: AtomicBool::new(false),
            get_chunk_delay_ms: AtomicU64::new(0),
        }
    }

    pub fn inner(&self) -> &SqliteStore {
        &self.inner
    }
}

#[async_trait]
impl TodoRepo for FaultyMetadata {
    async fn insert_todo(&self, record: &TodoRecord) -> MetadataResult<()> {
        if self.fail_insert.load(Ordering::SeqCst) {
            return Err(injected());
        }
        self.inner.insert_todo(record).await
    }

    async fn get_todo(&self, id: TodoId) -> MetadataResult<Option<TodoRecord>> {
        self.inner.get_todo(id).await
    }

    async fn list_todos(&self) -> MetadataResult<Vec<TodoRecord>> {
        self.inner.list_todos().await
    }

    async fn mark_pending_delete(&self, id: TodoId) -> MetadataResult<()> {
        self.inner.mark_pending_delete(id).await
    }

    async fn delete_todo(&self, id: TodoId) -> MetadataResult<()> {
        self.inner.delete_todo(id).await
    }

    async fn delete_todo_with_chunks(
        &self,
        id: TodoId,
        chunks: &[ChunkId],
    ) -> MetadataResult<u64> {
        if self.fail_delete_with_chunks.load(Ordering::SeqCst) {
            return Err(injected());
        }
        self.inner.delete_todo_with_chunks(id, chunks).await
    }

    async fn max_todo_id(&self) -> MetadataResult<Option<i64>> {
        self.inner.max_todo_id().await
    }
}

#[async_trait]
impl ChunkRepo for FaultyMetadata {
    async fn put_chunk(&self, id: &ChunkId, data: &[u8]) -> MetadataResult<()> {
        let call = self.put_chunk_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.fail_put_chunk_at.load(Ordering::SeqCst) {
            return Err(injected());
        }
        self.inner.put_chunk(id, data).await
    }

    async fn get_chunk(&self, id: &ChunkId) -> MetadataResult<Option<Vec<u8>>> {
        let data = self.inner.get_chunk(id).await?;
        let delay = self.get_chunk_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        Ok(data)
    }

    async fn chunk_exists(&self, id: &ChunkId) -> MetadataResult<bool> {
        self.inner.chunk_exists(id).await
    }

    async fn delete_chunks(&self, ids: &[ChunkId]) -> MetadataResult<u64> {
        self.inner.delete_chunks(ids).await
    }

    async fn list_chunk_ids(&self) -> MetadataResult<Vec<ChunkId>> {
        self.inner.list_chunk_ids().await
    }

    async fn chunk_stats(&self) -> MetadataResult<ChunkStats> {
        self.inner.chunk_stats().await
    }
}

#[async_trait]
impl MetadataStore for FaultyMetadata {
    async fn migrate(&self) -> MetadataResult<()> {
        self.inner.migrate().await
    }

    async fn health_check(&self) -> MetadataResult<()> {
        self.inner.health_check().await
    }

    async fn close(&self) {
        self.inner.close().await
    }
}

/// Filesystem backend with switchable failures and delays.
#[allow(dead_code)]
pub struct FaultyObjectStore {
    inner: FilesystemBackend,
    /// Every delete fails with a permanent I/O error while set.
    pub fail_deletes: AtomicBool,
    /// Every put fails with a permanent I/O error while set.
    pub fail_puts: AtomicBool,
    /// The next N puts fail with a transient error.
    pub transient_put_failures: AtomicU32,
    /// Delay applied after an object is read.
    pub get_delay_ms: AtomicU64,
    /// Health checks fail while set.
    pub fail_health: AtomicBool,
}

#[allow(dead_code)]
impl FaultyObjectStore {
    pub async fn new(root: &std::path::Path) -> Self {
        Self {
            inner: FilesystemBackend::new(root).await.unwrap(),
            fail_deletes: AtomicBool::new(false),
            fail_puts: AtomicBool::new(false),
            transient_put_failures: AtomicU32::new(0),
            get_delay_ms: AtomicU64::new(0),
            fail_health: AtomicBool::new(false),
        }
    }
}

fn permanent() -> StorageError {
    StorageError::Io(std::io::Error::new(
        std::io::ErrorKind::PermissionDenied,
        "injected failure",
    ))
}

#[async_trait]
impl ObjectStore for FaultyObjectStore {
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        self.inner.exists(key).await
    }

    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        let data = self.inner.get(key).await?;
        let delay = self.get_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        Ok(data)
    }

    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(permanent());
        }
        let pending = self.transient_put_failures.load(Ordering::SeqCst);
        if pending > 0 {
            self.transient_put_failures
                .store(pending - 1, Ordering::SeqCst);
            return Err(StorageError::Io(std::io::Error::from(
                std::io::ErrorKind::Interrupted,
            )));
        }
        self.inner.put(key, data).await
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(permanent());
        }
        self.inner.delete(key).await
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        self.inner.list(prefix).await
    }

    fn backend_name(&self) -> &'static str {
        "faulty-filesystem"
    }

    async fn health_check(&self) -> StorageResult<()> {
        if self.fail_health.load(Ordering::SeqCst) {
            return Err(permanent());
        }
        self.inner.health_check().await
    }
}
