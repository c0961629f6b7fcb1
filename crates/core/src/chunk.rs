//! Chunk identifiers and range arithmetic.

use crate::todo::TodoId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

/// Identifier of one stored chunk: `"<fileId>_<sequenceIndex>"`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkId {
    file_id: TodoId,
    seq: u32,
}

impl ChunkId {
    /// Create a chunk id for position `seq` of file `file_id`.
    pub fn new(file_id: TodoId, seq: u32) -> Self {
        Self { file_id, seq }
    }

    /// The file (todo) this chunk belongs to.
    pub fn file_id(&self) -> TodoId {
        self.file_id
    }

    /// Zero-based position of the chunk within its file.
    pub fn seq(&self) -> u32 {
        self.seq
    }

    /// Parse from the `"<fileId>_<seq>"` form.
    pub fn parse(s: &str) -> crate::Result<Self> {
        let (file, seq) = s
            .rsplit_once('_')
            .ok_or_else(|| crate::Error::InvalidChunkId(s.to_string()))?;
        let file_id = TodoId::parse(file).map_err(|_| crate::Error::InvalidChunkId(s.to_string()))?;
        let seq = seq
            .parse::<u32>()
            .map_err(|_| crate::Error::InvalidChunkId(s.to_string()))?;
        Ok(Self { file_id, seq })
    }
}

impl fmt::Debug for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChunkId({self})")
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.file_id, self.seq)
    }
}

impl Serialize for ChunkId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ChunkId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Byte range covered by one chunk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChunkRange {
    /// Position in the file (0-indexed).
    pub index: u32,
    /// Inclusive start offset.
    pub start: u64,
    /// Exclusive end offset.
    pub end: u64,
}

impl ChunkRange {
    /// Length of the range in bytes.
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    /// Whether the range is empty.
    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }

    /// The range as `usize` offsets for slicing an in-memory payload.
    pub fn as_slice_range(&self) -> Range<usize> {
        self.start as usize..self.end as usize
    }
}

/// Number of chunks needed for `size` bytes: `ceil(size / chunk_size)`.
///
/// Any non-zero chunk size is accepted; configured engines bound it further.
pub fn total_chunks(size: u64, chunk_size: u64) -> crate::Result<u32> {
    if chunk_size == 0 {
        return Err(crate::Error::InvalidChunkSize {
            size: chunk_size,
            min: 1,
            max: u64::MAX,
        });
    }
    u32::try_from(size.div_ceil(chunk_size)).map_err(|_| crate::Error::InvalidChunkSize {
        size: chunk_size,
        min: size.div_ceil(u64::from(u32::MAX)),
        max: u64::MAX,
    })
}

/// Split `size` bytes into ordered ranges of at most `chunk_size` bytes.
///
/// Range `i` covers `[i * chunk_size, min((i + 1) * chunk_size, size))`.
pub fn split(size: u64, chunk_size: u64) -> crate::Result<Vec<ChunkRange>> {
    let total = total_chunks(size, chunk_size)?;
    Ok((0..total)
        .map(|index| {
            let start = u64::from(index) * chunk_size;
            ChunkRange {
                index,
                start,
                end: start.saturating_add(chunk_size).min(size),
            }
        })
        .collect())
}

/// Upload progress after `completed` of `total` chunks, as `ceil(100 * completed / total)`.
pub fn progress_percent(completed: u32, total: u32) -> u8 {
    if total == 0 {
        return 100;
    }
    let completed = u64::from(completed.min(total));
    (completed * 100).div_ceil(u64::from(total)) as u8
}
