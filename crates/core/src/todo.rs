//! Todo records and the attachment lifecycle.

use crate::media::MediaRef;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use time::OffsetDateTime;

/// Identifier of a todo item.
///
/// Ids are wall-clock milliseconds forced strictly increasing by [`IdGenerator`],
/// so ascending id order is creation order.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TodoId(i64);

impl TodoId {
    /// Wrap a raw id value.
    pub fn from_raw(raw: i64) -> Self {
        Self(raw)
    }

    /// The raw id value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }

    /// Parse from a decimal string.
    pub fn parse(s: &str) -> crate::Result<Self> {
        let raw = s
            .trim()
            .parse::<i64>()
            .map_err(|e| crate::Error::InvalidTodoId(format!("{s}: {e}")))?;
        if raw <= 0 {
            return Err(crate::Error::InvalidTodoId(format!("{s}: must be positive")));
        }
        Ok(Self(raw))
    }
}

impl fmt::Debug for TodoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TodoId({})", self.0)
    }
}

impl fmt::Display for TodoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonic id source: `max(now_ms, last + 1)`.
#[derive(Debug, Default)]
pub struct IdGenerator {
    last: AtomicI64,
}

impl IdGenerator {
    /// Create a generator that will never return an id at or below `floor`.
    pub fn starting_after(floor: i64) -> Self {
        Self {
            last: AtomicI64::new(floor),
        }
    }

    /// Produce the next id.
    pub fn next_id(&self) -> TodoId {
        let now_ms = (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64;
        let mut last = self.last.load(Ordering::SeqCst);
        loop {
            let candidate = now_ms.max(last + 1);
            match self
                .last
                .compare_exchange(last, candidate, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return TodoId(candidate),
                Err(actual) => last = actual,
            }
        }
    }
}

/// Persisted state of a todo record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordState {
    /// Visible, blob data fully written.
    Committed,
    /// Tombstoned: blob removal started but has not been confirmed.
    PendingDelete,
}

impl RecordState {
    /// Column value used by the metadata store.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Committed => "committed",
            Self::PendingDelete => "pending_delete",
        }
    }

    /// Parse a column value.
    pub fn parse(s: &str) -> crate::Result<Self> {
        match s {
            "committed" => Ok(Self::Committed),
            "pending_delete" => Ok(Self::PendingDelete),
            other => Err(crate::Error::Serialization(format!(
                "unknown record state: {other}"
            ))),
        }
    }
}

/// Lifecycle of a todo's attachment.
///
/// ```text
/// absent -> pending-write -> committed -> pending-delete -> absent
///                 |                            |
///                 +-> absent                   +-> inconsistent
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentState {
    Absent,
    PendingWrite,
    Committed,
    PendingDelete,
    /// A blob deletion step failed; the record is left tombstoned.
    Inconsistent,
}

impl AttachmentState {
    /// Whether `self -> to` is a legal transition.
    pub fn can_transition(self, to: Self) -> bool {
        use AttachmentState::*;
        matches!(
            (self, to),
            (Absent, PendingWrite)
                | (PendingWrite, Committed)
                | (PendingWrite, Absent)
                | (Committed, PendingDelete)
                | (PendingDelete, Absent)
                | (PendingDelete, Inconsistent)
                // a repeated delete resumes reconciliation
                | (Inconsistent, PendingDelete)
        )
    }

    /// Move to `to`, rejecting illegal transitions.
    pub fn transition(self, to: Self) -> crate::Result<Self> {
        if self.can_transition(to) {
            Ok(to)
        } else {
            Err(crate::Error::InvalidTransition {
                from: format!("{self:?}"),
                to: format!("{to:?}"),
            })
        }
    }

    /// Lifecycle state implied by a persisted record state.
    pub fn from_record(state: RecordState) -> Self {
        match state {
            RecordState::Committed => Self::Committed,
            RecordState::PendingDelete => Self::Inconsistent,
        }
    }
}

/// A todo item as persisted by the metadata store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TodoRecord {
    pub id: TodoId,
    pub text: String,
    pub media: Option<MediaRef>,
    pub state: RecordState,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl TodoRecord {
    /// Create a committed record.
    pub fn new(id: TodoId, text: impl Into<String>, media: Option<MediaRef>) -> Self {
        Self {
            id,
            text: text.into(),
            media,
            state: RecordState::Committed,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    /// Whether the record has been tombstoned.
    pub fn is_pending_delete(&self) -> bool {
        self.state == RecordState::PendingDelete
    }
}
