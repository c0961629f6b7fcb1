//! Create, delete and list todos while keeping records and blob data consistent.
//!
//! Blob data is always written before the record that references it is
//! committed, and removed before (or together with) the record on delete.

use crate::chunking::{ChunkWriteError, ChunkingEngine};
use crate::error::{AttachError, AttachResult};
use crate::metrics;
use crate::retry::with_retry;
use crate::session::StorageSession;
use bytes::Bytes;
use satchel_core::media::{self, MediaRef, Strategy};
use satchel_core::{AttachmentState, ChunkId, TodoId, TodoRecord};
use satchel_metadata::{ChunkStats, MetadataError};
use std::collections::HashSet;
use std::sync::Arc;

/// A file submitted together with a todo.
#[derive(Clone, Debug)]
pub struct NewAttachment {
    /// Original file name.
    pub name: String,
    /// MIME type; may be empty.
    pub content_type: String,
    pub data: Bytes,
}

impl NewAttachment {
    pub fn new(name: impl Into<String>, content_type: impl Into<String>, data: Bytes) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            data,
        }
    }
}

/// Every blob currently stored, referenced or not.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlobInventory {
    pub chunks: Vec<ChunkId>,
    pub files: Vec<String>,
}

impl BlobInventory {
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty() && self.files.is_empty()
    }
}

/// Outcome of an orphan sweep.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Orphaned chunks removed (or that would be removed in a dry run).
    pub chunks_removed: u64,
    /// Orphaned file-area entries removed (or that would be removed).
    pub files_removed: u64,
    pub errors: u64,
    pub dry_run: bool,
}

/// A record whose media points at data that is not stored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IntegrityProblem {
    MissingChunk { id: TodoId, chunk: ChunkId },
    MissingFile { id: TodoId, name: String },
    FileAreaUnavailable { id: TodoId, name: String },
    /// Tombstoned by a delete that did not finish.
    PendingDelete { id: TodoId },
}

/// Outcome of an integrity check.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IntegrityReport {
    pub records_checked: u64,
    pub problems: Vec<IntegrityProblem>,
    /// Chunk store totals at the time of the check.
    pub chunks: ChunkStats,
    /// False when the file area is missing or failed its health check.
    pub file_area_healthy: bool,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.problems.is_empty()
    }
}

/// Orchestrates record and blob persistence for todos.
pub struct AttachmentManager {
    session: Arc<StorageSession>,
    engine: ChunkingEngine,
}

impl AttachmentManager {
    pub fn new(session: Arc<StorageSession>) -> AttachResult<Self> {
        let config = session.config();
        let engine = ChunkingEngine::new(config.attachments.chunk_size, config.retry.clone())?;
        Ok(Self { session, engine })
    }

    pub fn session(&self) -> &Arc<StorageSession> {
        &self.session
    }

    /// Create a todo with the configured strategy and no progress reporting.
    pub async fn create_attachment(
        &self,
        text: &str,
        file: Option<NewAttachment>,
    ) -> AttachResult<TodoId> {
        let strategy = self.session.config().attachments.strategy;
        self.create_attachment_with(text, file, strategy, |_| {})
            .await
    }

    /// Create a todo, persisting `file` with `strategy`.
    ///
    /// Blob data is written first; the record is committed only once every
    /// byte is stored. On failure no record exists and whatever was written
    /// is removed on a best-effort basis.
    pub async fn create_attachment_with<P>(
        &self,
        text: &str,
        file: Option<NewAttachment>,
        strategy: Strategy,
        progress: P,
    ) -> AttachResult<TodoId>
    where
        P: FnMut(u8) + Send,
    {
        let text = text.trim();
        if text.is_empty() {
            return Err(AttachError::InvalidInput("todo text is empty".to_string()));
        }

        let _gate = self.session.mutation_shared().await;
        let id = self.session.next_id();

        let Some(file) = file else {
            self.commit(TodoRecord::new(id, text, None)).await?;
            metrics::ATTACHMENTS_CREATED
                .with_label_values(&["none"])
                .inc();
            tracing::info!(todo_id = %id, "todo created");
            return Ok(id);
        };

        // Preconditions that must fail before anything is written.
        match strategy {
            Strategy::FileArea => {
                self.session.file_area()?;
            }
            Strategy::Inline => {
                let max = self.session.config().attachments.inline_max_bytes;
                if file.data.len() as u64 > max {
                    return Err(AttachError::InvalidInput(format!(
                        "inline attachment of {} bytes exceeds the {max} byte limit",
                        file.data.len()
                    )));
                }
            }
            Strategy::Chunked => {}
        }

        let state = AttachmentState::Absent.transition(AttachmentState::PendingWrite)?;
        let size = file.data.len() as u64;

        let media = match self.write_blob(id, &file, strategy, progress).await {
            Ok(media) => media,
            Err(e) => {
                state.transition(AttachmentState::Absent)?;
                metrics::WRITE_FAILURES.inc();
                return Err(e);
            }
        };

        if let Err(e) = self.commit(TodoRecord::new(id, text, Some(media.clone()))).await {
            tracing::warn!(todo_id = %id, error = %e, "record commit failed, removing blob data");
            self.discard_blob(&media).await;
            state.transition(AttachmentState::Absent)?;
            metrics::WRITE_FAILURES.inc();
            return Err(e);
        }
        state.transition(AttachmentState::Committed)?;

        metrics::ATTACHMENTS_CREATED
            .with_label_values(&[strategy.as_str()])
            .inc();
        metrics::BYTES_WRITTEN.inc_by(size);
        tracing::info!(
            todo_id = %id,
            strategy = %strategy,
            size,
            kind = media.kind().as_str(),
            "todo created with attachment"
        );
        Ok(id)
    }

    async fn write_blob<P>(
        &self,
        id: TodoId,
        file: &NewAttachment,
        strategy: Strategy,
        mut progress: P,
    ) -> AttachResult<MediaRef>
    where
        P: FnMut(u8) + Send,
    {
        let size = file.data.len() as u64;
        match strategy {
            Strategy::Chunked => {
                let metadata = self.session.metadata();
                match self
                    .engine
                    .write(&file.data, id, &**metadata, progress)
                    .await
                {
                    Ok(chunk_ids) => Ok(MediaRef::Chunked {
                        content_type: file.content_type.clone(),
                        name: file.name.clone(),
                        size,
                        chunk_ids,
                    }),
                    Err(ChunkWriteError { error, written }) => {
                        if let Err(cleanup) = metadata.delete_chunks(&written).await {
                            tracing::warn!(
                                todo_id = %id,
                                chunks = written.len(),
                                error = %cleanup,
                                "could not remove partial chunks; the sweep will reclaim them"
                            );
                        }
                        Err(AttachError::WriteFailure {
                            id,
                            reason: error.to_string(),
                        })
                    }
                }
            }
            Strategy::FileArea => {
                let area = self.session.file_area()?;
                let key = media::file_area_key(id, &file.name);
                if let Err(error) = area.save_file(&key, file.data.clone()).await {
                    if let Err(cleanup) = area.delete_file(&key).await {
                        tracing::warn!(
                            todo_id = %id,
                            name = %key,
                            error = %cleanup,
                            "could not remove partial file; the sweep will reclaim it"
                        );
                    }
                    return Err(AttachError::WriteFailure {
                        id,
                        reason: error.to_string(),
                    });
                }
                if size > 0 {
                    progress(100);
                }
                Ok(MediaRef::FileArea {
                    content_type: file.content_type.clone(),
                    name: key,
                    size,
                })
            }
            Strategy::Inline => {
                if size > 0 {
                    progress(100);
                }
                Ok(MediaRef::Inline {
                    content_type: file.content_type.clone(),
                    name: file.name.clone(),
                    size,
                    data: file.data.to_vec(),
                })
            }
        }
    }

    async fn commit(&self, record: TodoRecord) -> AttachResult<()> {
        let metadata = self.session.metadata();
        with_retry(&self.session.config().retry, "todo.insert", || async {
            metadata.insert_todo(&record).await.map_err(AttachError::from)
        })
        .await
    }

    /// Best-effort removal of blob data that never got a committed record.
    async fn discard_blob(&self, media: &MediaRef) {
        let result = match media {
            MediaRef::Chunked { chunk_ids, .. } => self
                .session
                .metadata()
                .delete_chunks(chunk_ids)
                .await
                .map(|_| ())
                .map_err(AttachError::from),
            MediaRef::FileArea { name, .. } => match self.session.file_area() {
                Ok(area) => area.delete_file(name).await.map(|_| ()),
                Err(e) => Err(e),
            },
            MediaRef::Inline { .. } => Ok(()),
        };
        if let Err(e) = result {
            tracing::warn!(error = %e, "could not discard blob data; the sweep will reclaim it");
        }
    }

    /// Delete a todo and its blob data.
    ///
    /// Chunked attachments are removed together with the record in one
    /// transaction. File-area attachments are tombstoned first; if the file
    /// cannot be removed the tombstoned record stays and a repeated delete
    /// resumes. Returns `NotFound` for an unknown id.
    pub async fn delete_attachment(&self, id: TodoId) -> AttachResult<()> {
        let _gate = self.session.mutation_shared().await;
        let metadata = self.session.metadata();
        let retry = &self.session.config().retry;

        let record = with_retry(retry, "todo.get", || async {
            metadata.get_todo(id).await.map_err(AttachError::from)
        })
        .await?
        .ok_or(AttachError::NotFound(id))?;

        let state = AttachmentState::from_record(record.state)
            .transition(AttachmentState::PendingDelete)?;

        let result = match &record.media {
            Some(MediaRef::Chunked { chunk_ids, .. }) => {
                self.delete_chunked(id, chunk_ids).await
            }
            Some(MediaRef::FileArea { name, .. }) => self.delete_file_backed(id, name).await,
            Some(MediaRef::Inline { .. }) | None => {
                with_retry(retry, "todo.delete", || async {
                    metadata.delete_todo(id).await.map_err(AttachError::from)
                })
                .await
            }
        };

        match result {
            Ok(()) => {
                state.transition(AttachmentState::Absent)?;
                metrics::ATTACHMENTS_DELETED.inc();
                tracing::info!(todo_id = %id, "todo deleted");
                Ok(())
            }
            Err(AttachError::Metadata(MetadataError::NotFound(_))) => {
                Err(AttachError::NotFound(id))
            }
            Err(e) => {
                state.transition(AttachmentState::Inconsistent)?;
                metrics::DELETE_FAILURES.inc();
                tracing::error!(todo_id = %id, error = %e, "todo delete failed; record kept");
                Err(e)
            }
        }
    }

    async fn delete_chunked(&self, id: TodoId, chunk_ids: &[ChunkId]) -> AttachResult<()> {
        let metadata = self.session.metadata();
        let result = with_retry(&self.session.config().retry, "todo.delete_with_chunks", || {
            async {
                metadata
                    .delete_todo_with_chunks(id, chunk_ids)
                    .await
                    .map_err(AttachError::from)
            }
        })
        .await;

        match result {
            Ok(removed) => {
                tracing::debug!(todo_id = %id, chunks = removed, "chunks deleted with record");
                Ok(())
            }
            Err(e) if e.is_not_found() => Err(e),
            Err(e) => Err(AttachError::DeletionFailure {
                id,
                reason: e.to_string(),
            }),
        }
    }

    async fn delete_file_backed(&self, id: TodoId, name: &str) -> AttachResult<()> {
        let area = self.session.file_area()?;
        let metadata = self.session.metadata();
        let retry = &self.session.config().retry;

        with_retry(retry, "todo.tombstone", || async {
            metadata.mark_pending_delete(id).await.map_err(AttachError::from)
        })
        .await?;

        let removed = area
            .delete_file(name)
            .await
            .map_err(|e| AttachError::DeletionFailure {
                id,
                reason: e.to_string(),
            })?;
        tracing::debug!(todo_id = %id, name, removed, "file area entry deleted");

        with_retry(retry, "todo.delete", || async {
            metadata.delete_todo(id).await.map_err(AttachError::from)
        })
        .await
        .map_err(|e| {
            if e.is_not_found() {
                e
            } else {
                AttachError::DeletionFailure {
                    id,
                    reason: e.to_string(),
                }
            }
        })
    }

    /// All todos in ascending id order, tombstoned ones included.
    pub async fn list_attachments(&self) -> AttachResult<Vec<TodoRecord>> {
        let metadata = self.session.metadata();
        with_retry(&self.session.config().retry, "todo.list", || async {
            metadata.list_todos().await.map_err(AttachError::from)
        })
        .await
    }

    /// One todo, or `NotFound`.
    pub async fn get_attachment(&self, id: TodoId) -> AttachResult<TodoRecord> {
        let metadata = self.session.metadata();
        with_retry(&self.session.config().retry, "todo.get", || async {
            metadata.get_todo(id).await.map_err(AttachError::from)
        })
        .await?
        .ok_or(AttachError::NotFound(id))
    }

    /// Every stored chunk id and file-area entry.
    pub async fn blob_inventory(&self) -> AttachResult<BlobInventory> {
        let chunks = self.session.metadata().list_chunk_ids().await?;
        let files = match self.session.file_area() {
            Ok(area) => area.list_files().await?,
            Err(_) => Vec::new(),
        };
        Ok(BlobInventory { chunks, files })
    }

    /// Remove blobs that no record references.
    ///
    /// Runs exclusively with creates and deletes of this session.
    pub async fn sweep_orphans(&self, dry_run: bool) -> AttachResult<SweepReport> {
        let _gate = self.session.mutation_exclusive().await;

        let records = self.session.metadata().list_todos().await?;
        let mut referenced_chunks = HashSet::new();
        let mut referenced_files = HashSet::new();
        for record in &records {
            match &record.media {
                Some(MediaRef::Chunked { chunk_ids, .. }) => {
                    referenced_chunks.extend(chunk_ids.iter().copied())
                }
                Some(MediaRef::FileArea { name, .. }) => {
                    referenced_files.insert(name.clone());
                }
                Some(MediaRef::Inline { .. }) | None => {}
            }
        }

        let inventory = self.blob_inventory().await?;
        let orphan_chunks: Vec<ChunkId> = inventory
            .chunks
            .into_iter()
            .filter(|id| !referenced_chunks.contains(id))
            .collect();
        let orphan_files: Vec<String> = inventory
            .files
            .into_iter()
            .filter(|name| !referenced_files.contains(name))
            .collect();

        let mut report = SweepReport {
            dry_run,
            ..SweepReport::default()
        };

        if dry_run {
            report.chunks_removed = orphan_chunks.len() as u64;
            report.files_removed = orphan_files.len() as u64;
            tracing::info!(
                chunks = report.chunks_removed,
                files = report.files_removed,
                "orphan sweep dry run"
            );
            return Ok(report);
        }

        if !orphan_chunks.is_empty() {
            match self.session.metadata().delete_chunks(&orphan_chunks).await {
                Ok(removed) => {
                    report.chunks_removed = removed;
                    metrics::ORPHANS_REMOVED
                        .with_label_values(&["chunk"])
                        .inc_by(removed);
                }
                Err(e) => {
                    tracing::warn!(chunks = orphan_chunks.len(), error = %e, "orphan chunk removal failed");
                    report.errors += 1;
                }
            }
        }

        if !orphan_files.is_empty() {
            let area = self.session.file_area()?;
            for name in &orphan_files {
                match area.delete_file(name).await {
                    Ok(_) => {
                        report.files_removed += 1;
                        metrics::ORPHANS_REMOVED.with_label_values(&["file"]).inc();
                    }
                    Err(e) => {
                        tracing::warn!(name = %name, error = %e, "orphan file removal failed");
                        report.errors += 1;
                    }
                }
            }
        }

        tracing::info!(
            chunks = report.chunks_removed,
            files = report.files_removed,
            errors = report.errors,
            "orphan sweep finished"
        );
        Ok(report)
    }

    /// Report records whose media references data that is not stored.
    pub async fn check_integrity(&self) -> AttachResult<IntegrityReport> {
        let metadata = self.session.metadata();
        let records = metadata.list_todos().await?;
        let mut report = IntegrityReport {
            chunks: metadata.chunk_stats().await?,
            ..IntegrityReport::default()
        };

        let area = match self.session.file_area() {
            Ok(area) => match area.health_check().await {
                Ok(()) => Some(area),
                Err(e) => {
                    tracing::warn!(error = %e, "file area failed its health check");
                    None
                }
            },
            Err(_) => None,
        };
        report.file_area_healthy = area.is_some();

        for record in &records {
            report.records_checked += 1;
            let id = record.id;
            if record.is_pending_delete() {
                report.problems.push(IntegrityProblem::PendingDelete { id });
            }

            match &record.media {
                Some(MediaRef::Chunked { chunk_ids, .. }) => {
                    for chunk in chunk_ids {
                        if !metadata.chunk_exists(chunk).await? {
                            report.problems.push(IntegrityProblem::MissingChunk {
                                id,
                                chunk: *chunk,
                            });
                        }
                    }
                }
                Some(MediaRef::FileArea { name, .. }) => match area {
                    Some(area) => {
                        if !area.exists(name).await? {
                            report.problems.push(IntegrityProblem::MissingFile {
                                id,
                                name: name.clone(),
                            });
                        }
                    }
                    None => report.problems.push(IntegrityProblem::FileAreaUnavailable {
                        id,
                        name: name.clone(),
                    }),
                },
                Some(MediaRef::Inline { .. }) | None => {}
            }
        }

        if !report.is_clean() {
            tracing::warn!(
                records = report.records_checked,
                problems = report.problems.len(),
                "integrity check found problems"
            );
        }
        Ok(report)
    }
}
