//! Splitting payloads into keyed chunks and reassembling them.

use crate::error::{AttachError, AttachResult};
use crate::metrics;
use crate::retry::with_retry;
use bytes::{Bytes, BytesMut};
use satchel_core::chunk::{self, ChunkRange};
use satchel_core::config::RetryConfig;
use satchel_core::{ChunkId, MAX_CHUNK_SIZE, TodoId};
use satchel_metadata::ChunkRepo;

/// A chunk write that stopped early.
///
/// `written` lists the chunks persisted before the failure so the caller can
/// remove them.
#[derive(Debug)]
pub struct ChunkWriteError {
    pub error: AttachError,
    pub written: Vec<ChunkId>,
}

/// Chunking with a fixed chunk size.
#[derive(Clone, Debug)]
pub struct ChunkingEngine {
    chunk_size: u64,
    retry: RetryConfig,
}

impl ChunkingEngine {
    /// Create an engine. Rejects a zero or oversized chunk size.
    pub fn new(chunk_size: u64, retry: RetryConfig) -> AttachResult<Self> {
        if chunk_size == 0 || chunk_size > MAX_CHUNK_SIZE {
            return Err(satchel_core::Error::InvalidChunkSize {
                size: chunk_size,
                min: 1,
                max: MAX_CHUNK_SIZE,
            }
            .into());
        }
        Ok(Self { chunk_size, retry })
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// Byte ranges of each chunk for a payload of `size` bytes.
    pub fn split(&self, size: u64) -> AttachResult<Vec<ChunkRange>> {
        Ok(chunk::split(size, self.chunk_size)?)
    }

    /// `ceil(size / chunk_size)`.
    pub fn total_chunks(&self, size: u64) -> AttachResult<u32> {
        Ok(chunk::total_chunks(size, self.chunk_size)?)
    }

    /// Persist `payload` as chunks `<file_id>_0 .. <file_id>_{n-1}` in order.
    ///
    /// `progress` receives a strictly increasing sequence of percentages that
    /// ends at exactly 100; it is not called for an empty payload.
    pub async fn write<S, P>(
        &self,
        payload: &[u8],
        file_id: TodoId,
        sink: &S,
        mut progress: P,
    ) -> Result<Vec<ChunkId>, ChunkWriteError>
    where
        S: ChunkRepo + ?Sized,
        P: FnMut(u8) + Send,
    {
        let ranges = self
            .split(payload.len() as u64)
            .map_err(|error| ChunkWriteError {
                error,
                written: Vec::new(),
            })?;
        let total = ranges.len() as u32;

        let mut written = Vec::with_capacity(ranges.len());
        let mut last_reported = 0u8;
        for range in &ranges {
            let id = ChunkId::new(file_id, range.index);
            let data = &payload[range.as_slice_range()];

            let result = with_retry(&self.retry, "chunk.put", || async {
                sink.put_chunk(&id, data).await.map_err(AttachError::from)
            })
            .await;
            if let Err(error) = result {
                tracing::warn!(
                    file_id = %file_id,
                    chunk = %id,
                    written = written.len(),
                    error = %error,
                    "chunk write failed"
                );
                return Err(ChunkWriteError { error, written });
            }

            written.push(id);
            metrics::CHUNKS_WRITTEN.inc();

            let percent = chunk::progress_percent(range.index + 1, total);
            if percent > last_reported {
                last_reported = percent;
                progress(percent);
            }
        }

        tracing::debug!(file_id = %file_id, chunks = written.len(), "chunks written");
        Ok(written)
    }

    /// Fetch `chunk_ids` in order and concatenate them.
    ///
    /// `size` is the payload size recorded with the media and only sizes the
    /// buffer. Fails with `MissingChunk` on the first absent chunk.
    pub async fn read<S>(&self, chunk_ids: &[ChunkId], size: u64, source: &S) -> AttachResult<Bytes>
    where
        S: ChunkRepo + ?Sized,
    {
        let upper = (chunk_ids.len() as u64).saturating_mul(self.chunk_size);
        let capacity = usize::try_from(size.min(upper)).unwrap_or(0);
        let mut buf = BytesMut::with_capacity(capacity);
        for id in chunk_ids {
            let data = with_retry(&self.retry, "chunk.get", || async {
                source.get_chunk(id).await.map_err(AttachError::from)
            })
            .await?;
            match data {
                Some(data) => buf.extend_from_slice(&data),
                None => return Err(AttachError::MissingChunk(*id)),
            }
        }
        Ok(buf.freeze())
    }
}
