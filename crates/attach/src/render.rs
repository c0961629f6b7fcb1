//! Resolve a todo's media to displayable bytes.

use crate::chunking::ChunkingEngine;
use crate::error::{AttachError, AttachResult};
use crate::handle::DisplayHandle;
use crate::metrics;
use crate::session::StorageSession;
use bytes::Bytes;
use satchel_core::media::{self, MediaKind, MediaRef, Strategy};
use satchel_core::{TodoId, TodoRecord};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Message shown in place of media that could not be loaded.
pub const PLACEHOLDER_MESSAGE: &str = "Error loading media";

/// How a display should present materialized media.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Presentation {
    Image,
    Audio { muted: bool },
    Video { muted: bool },
    /// Generic file info and download, e.g. `File: report.pdf (1.50 MB)`.
    File { label: String },
}

/// Media ready to be shown.
#[derive(Debug)]
pub struct RenderedMedia {
    pub id: TodoId,
    pub kind: MediaKind,
    pub presentation: Presentation,
    pub content_type: String,
    pub name: String,
    pub handle: DisplayHandle,
}

/// Result of one render attempt.
#[derive(Debug)]
pub enum RenderOutcome {
    Ready(RenderedMedia),
    /// The todo has no attachment.
    NoMedia,
    /// Loading failed; show [`PLACEHOLDER_MESSAGE`].
    Placeholder { message: &'static str, cause: String },
    /// Cancelled, or the todo was deleted; nothing may be applied to the display.
    Discarded,
}

impl RenderOutcome {
    pub fn is_discarded(&self) -> bool {
        matches!(self, Self::Discarded)
    }
}

/// Materializes attachments for display, one cancellable render per item.
pub struct BlobRenderer {
    session: Arc<StorageSession>,
    engine: ChunkingEngine,
}

impl BlobRenderer {
    pub fn new(session: Arc<StorageSession>) -> AttachResult<Self> {
        let config = session.config();
        let engine = ChunkingEngine::new(config.attachments.chunk_size, config.retry.clone())?;
        Ok(Self { session, engine })
    }

    /// Presentation for `media` without loading any bytes.
    pub fn presentation(&self, media: &MediaRef) -> Presentation {
        let muted = media.strategy() == Strategy::FileArea
            && self.session.config().render.mute_file_area_playback;
        match media.kind() {
            MediaKind::Image => Presentation::Image,
            MediaKind::Audio => Presentation::Audio { muted },
            MediaKind::Video => Presentation::Video { muted },
            MediaKind::File => Presentation::File {
                label: media::file_info_label(display_name(media), media.size()),
            },
        }
    }

    /// Render todo `id`.
    ///
    /// Never fails: load errors become a placeholder. If `cancel` fires or
    /// the todo is deleted (or tombstoned) before the bytes are ready, the
    /// materialized handle is dropped and `Discarded` is returned.
    pub async fn render(&self, id: TodoId, cancel: &CancellationToken) -> RenderOutcome {
        let outcome = self.render_inner(id, cancel).await;
        match &outcome {
            RenderOutcome::Ready(_) => metrics::RENDERS_COMPLETED.inc(),
            RenderOutcome::Discarded => metrics::RENDERS_DISCARDED.inc(),
            RenderOutcome::Placeholder { cause, .. } => {
                metrics::RENDER_FAILURES.inc();
                tracing::warn!(todo_id = %id, cause = %cause, "media failed to load");
            }
            RenderOutcome::NoMedia => {}
        }
        outcome
    }

    async fn render_inner(&self, id: TodoId, cancel: &CancellationToken) -> RenderOutcome {
        if cancel.is_cancelled() {
            return RenderOutcome::Discarded;
        }

        let record = match self.live_record(id).await {
            Ok(Some(record)) => record,
            Ok(None) => return RenderOutcome::Discarded,
            Err(e) => return placeholder(e),
        };
        let Some(media) = record.media else {
            return RenderOutcome::NoMedia;
        };

        let handle = tokio::select! {
            biased;
            _ = cancel.cancelled() => return RenderOutcome::Discarded,
            loaded = self.materialize(&media) => match loaded {
                Ok(handle) => handle,
                Err(_) if cancel.is_cancelled() => return RenderOutcome::Discarded,
                Err(e) => return placeholder(e),
            },
        };

        // The display may have gone away, or the todo been deleted, while loading.
        if cancel.is_cancelled() {
            drop(handle);
            return RenderOutcome::Discarded;
        }
        match self.live_record(id).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                drop(handle);
                tracing::debug!(todo_id = %id, "todo deleted during render, discarding");
                return RenderOutcome::Discarded;
            }
            Err(e) => return placeholder(e),
        }

        RenderOutcome::Ready(RenderedMedia {
            id,
            kind: media.kind(),
            presentation: self.presentation(&media),
            content_type: media.content_type().to_string(),
            name: display_name(&media).to_string(),
            handle,
        })
    }

    /// The record, unless it is missing or tombstoned.
    async fn live_record(&self, id: TodoId) -> AttachResult<Option<TodoRecord>> {
        let record = self.session.metadata().get_todo(id).await?;
        Ok(record.filter(|r| !r.is_pending_delete()))
    }

    /// Load the full payload of `media`. Chunked media is reassembled in memory.
    pub async fn materialize(&self, media: &MediaRef) -> AttachResult<DisplayHandle> {
        let handles = self.session.handles();
        match media {
            MediaRef::Chunked { chunk_ids, size, .. } => {
                let metadata = self.session.metadata();
                let bytes = self.engine.read(chunk_ids, *size, &**metadata).await?;
                Ok(handles.acquire(bytes))
            }
            MediaRef::FileArea { name, .. } => self.session.file_area()?.read_file(name).await,
            MediaRef::Inline { data, .. } => Ok(handles.acquire(Bytes::copy_from_slice(data))),
        }
    }
}

fn placeholder(cause: AttachError) -> RenderOutcome {
    RenderOutcome::Placeholder {
        message: PLACEHOLDER_MESSAGE,
        cause: cause.to_string(),
    }
}

/// File-area media stores `attachments/<id>_<name>`; show just the entry.
fn display_name(media: &MediaRef) -> &str {
    match media {
        MediaRef::FileArea { name, .. } => name
            .strip_prefix(media::FILE_AREA_PREFIX)
            .unwrap_or(name),
        _ => media.name(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use satchel_core::config::AppConfig;

    async fn renderer(dir: &std::path::Path) -> BlobRenderer {
        let session = StorageSession::open(AppConfig::for_testing(dir)).await.unwrap();
        BlobRenderer::new(session).unwrap()
    }

    fn file_area_media(content_type: &str, name: &str) -> MediaRef {
        MediaRef::FileArea {
            content_type: content_type.to_string(),
            name: format!("attachments/1_{name}"),
            size: 1_572_864,
        }
    }

    #[tokio::test]
    async fn test_presentation_by_kind() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = renderer(dir.path()).await;

        assert_eq!(
            renderer.presentation(&file_area_media("image/png", "a.png")),
            Presentation::Image
        );
        assert_eq!(
            renderer.presentation(&file_area_media("video/mp4", "a.mp4")),
            Presentation::Video { muted: true }
        );
        assert_eq!(
            renderer.presentation(&file_area_media("application/x-matroska", "a.mkv")),
            Presentation::Video { muted: true }
        );
        assert_eq!(
            renderer.presentation(&file_area_media("application/pdf", "report.pdf")),
            Presentation::File {
                label: "File: 1_report.pdf (1.50 MB)".to_string()
            }
        );

        let inline_audio = MediaRef::Inline {
            content_type: "audio/ogg".to_string(),
            name: "a.ogg".to_string(),
            size: 1,
            data: vec![0],
        };
        assert_eq!(
            renderer.presentation(&inline_audio),
            Presentation::Audio { muted: false }
        );
    }

    #[tokio::test]
    async fn test_cancelled_before_start_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = renderer(dir.path()).await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = renderer.render(TodoId::from_raw(1), &cancel).await;
        assert!(outcome.is_discarded());
    }

    #[tokio::test]
    async fn test_unknown_todo_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = renderer(dir.path()).await;
        let outcome = renderer
            .render(TodoId::from_raw(404), &CancellationToken::new())
            .await;
        assert!(outcome.is_discarded());
    }
}
