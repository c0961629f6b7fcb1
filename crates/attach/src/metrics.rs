//! Prometheus metrics for attachment operations.

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::{LazyLock, Once};

/// Process registry for all Satchel metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

pub static ATTACHMENTS_CREATED: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "satchel_todos_created_total",
            "Total number of todos created, by attachment strategy",
        ),
        &["strategy"],
    )
    .expect("metric creation failed")
});

pub static ATTACHMENTS_DELETED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("satchel_todos_deleted_total", "Total number of todos deleted")
        .expect("metric creation failed")
});

pub static BYTES_WRITTEN: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "satchel_attachment_bytes_written_total",
        "Total attachment bytes persisted",
    )
    .expect("metric creation failed")
});

pub static CHUNKS_WRITTEN: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("satchel_chunks_written_total", "Total chunks persisted")
        .expect("metric creation failed")
});

pub static WRITE_FAILURES: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "satchel_attachment_write_failures_total",
        "Creates aborted because blob data could not be written",
    )
    .expect("metric creation failed")
});

pub static DELETE_FAILURES: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "satchel_attachment_delete_failures_total",
        "Deletes that left a record behind because blob cleanup failed",
    )
    .expect("metric creation failed")
});

pub static RENDERS_COMPLETED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("satchel_renders_completed_total", "Renders delivered to a display")
        .expect("metric creation failed")
});

pub static RENDERS_DISCARDED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "satchel_renders_discarded_total",
        "Renders dropped because they were cancelled or their todo was deleted",
    )
    .expect("metric creation failed")
});

pub static RENDER_FAILURES: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "satchel_render_failures_total",
        "Renders that produced an error placeholder",
    )
    .expect("metric creation failed")
});

pub static LIVE_DISPLAY_HANDLES: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "satchel_live_display_handles",
        "Materialized attachment buffers currently held by displays",
    )
    .expect("metric creation failed")
});

pub static ORPHANS_REMOVED: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "satchel_orphans_removed_total",
            "Unreferenced blobs removed by the sweep",
        ),
        &["kind"],
    )
    .expect("metric creation failed")
});

static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the process registry.
///
/// Idempotent; sessions call it on open.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        REGISTRY
            .register(Box::new(ATTACHMENTS_CREATED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(ATTACHMENTS_DELETED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(BYTES_WRITTEN.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(CHUNKS_WRITTEN.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(WRITE_FAILURES.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(DELETE_FAILURES.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(RENDERS_COMPLETED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(RENDERS_DISCARDED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(RENDER_FAILURES.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(LIVE_DISPLAY_HANDLES.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(ORPHANS_REMOVED.clone()))
            .expect("metric registration failed");
    });
}

/// Encode the registry in the Prometheus text format.
pub fn encode_text() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&REGISTRY.gather(), &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}
