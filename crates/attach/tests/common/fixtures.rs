use super::mocks::{FaultyMetadata, FaultyObjectStore};
use bytes::Bytes;
use satchel_attach::{AttachmentManager, BlobRenderer, StorageSession};
use satchel_core::config::AppConfig;
use std::sync::Arc;
use tempfile::TempDir;

/// Generate deterministic test data using a seeded pseudo-random generator
/// Same seed produces same output (reproducible tests)
pub fn seeded_bytes(seed: u64, len: usize) -> Bytes {
    let mut data = vec![0u8; len];
    let mut state = seed;

    // Simple LCG (Linear Congruential Generator)
    for chunk in data.chunks_mut(8) {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        let bytes = state.to_le_bytes();
        for (i, byte) in chunk.iter_mut().enumerate() {
            *byte = bytes[i % 8];
        }
    }

    Bytes::from(data)
}

/// A session over fault-injecting stores, plus handles to flip the faults.
#[allow(dead_code)]
pub struct Harness {
    pub dir: TempDir,
    pub session: Arc<StorageSession>,
    pub manager: AttachmentManager,
    pub renderer: BlobRenderer,
    pub metadata: Arc<FaultyMetadata>,
    pub files: Arc<FaultyObjectStore>,
}

#[allow(dead_code)]
impl Harness {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    pub async fn with_config(adjust: impl FnOnce(&mut AppConfig)) -> Self {
        let dir = TempDir::new().unwrap();
        let mut config = AppConfig::for_testing(dir.path());
        adjust(&mut config);

        let metadata = Arc::new(FaultyMetadata::open(&config.metadata.path).await);
        let files = Arc::new(FaultyObjectStore::new(&config.file_area.path).await);
        let session = StorageSession::with_stores(config, metadata.clone(), Ok(files.clone()))
            .await
            .unwrap();

        Self {
            manager: AttachmentManager::new(session.clone()).unwrap(),
            renderer: BlobRenderer::new(session.clone()).unwrap(),
            session,
            metadata,
            files,
            dir,
        }
    }

    /// A session whose file area was not detected.
    pub async fn without_file_area() -> Self {
        let dir = TempDir::new().unwrap();
        let config = AppConfig::for_testing(dir.path());

        let metadata = Arc::new(FaultyMetadata::open(&config.metadata.path).await);
        let files = Arc::new(FaultyObjectStore::new(&dir.path().join("unused")).await);
        let session = StorageSession::with_stores(
            config,
            metadata.clone(),
            Err("no file area in this environment".to_string()),
        )
        .await
        .unwrap();

        Self {
            manager: AttachmentManager::new(session.clone()).unwrap(),
            renderer: BlobRenderer::new(session.clone()).unwrap(),
            session,
            metadata,
            files,
            dir,
        }
    }
}
