//! Display handles over materialized attachment bytes.

use crate::metrics;
use bytes::Bytes;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Counts live [`DisplayHandle`]s for one session.
#[derive(Clone, Debug, Default)]
pub struct HandleRegistry {
    live: Arc<AtomicUsize>,
}

impl HandleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap materialized bytes in a counted handle.
    pub fn acquire(&self, bytes: Bytes) -> DisplayHandle {
        self.live.fetch_add(1, Ordering::SeqCst);
        metrics::LIVE_DISPLAY_HANDLES.inc();
        DisplayHandle {
            bytes,
            live: self.live.clone(),
        }
    }

    /// Number of handles not yet released.
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

/// Bytes handed to a display. Dropping the handle releases it.
pub struct DisplayHandle {
    bytes: Bytes,
    live: Arc<AtomicUsize>,
}

impl DisplayHandle {
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl Drop for DisplayHandle {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
        metrics::LIVE_DISPLAY_HANDLES.dec();
    }
}

impl fmt::Debug for DisplayHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DisplayHandle")
            .field("len", &self.bytes.len())
            .finish()
    }
}
