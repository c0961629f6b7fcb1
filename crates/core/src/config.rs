//! Configuration types shared across crates.

use crate::media::Strategy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Metadata store configuration (SQLite).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MetadataConfig {
    /// Database file path, or `:memory:` for a throwaway store.
    #[serde(default = "default_metadata_path")]
    pub path: PathBuf,
    /// How long a writer waits on a locked database before failing.
    #[serde(default = "default_busy_timeout_secs")]
    pub busy_timeout_secs: u64,
}

fn default_metadata_path() -> PathBuf {
    PathBuf::from("./data/satchel.db")
}

fn default_busy_timeout_secs() -> u64 {
    5
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            path: default_metadata_path(),
            busy_timeout_secs: default_busy_timeout_secs(),
        }
    }
}

/// Hierarchical file area configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FileAreaConfig {
    /// Whether to probe for the file area at all. When false the capability
    /// is reported unavailable.
    #[serde(default = "default_file_area_enabled")]
    pub enabled: bool,
    /// Root directory of the file area.
    #[serde(default = "default_file_area_path")]
    pub path: PathBuf,
    /// Upper bound for a single file-area operation, in milliseconds.
    #[serde(default = "default_op_timeout_ms")]
    pub op_timeout_ms: u64,
}

fn default_file_area_enabled() -> bool {
    true
}

fn default_file_area_path() -> PathBuf {
    PathBuf::from("./data/files")
}

fn default_op_timeout_ms() -> u64 {
    30_000
}

impl Default for FileAreaConfig {
    fn default() -> Self {
        Self {
            enabled: default_file_area_enabled(),
            path: default_file_area_path(),
            op_timeout_ms: default_op_timeout_ms(),
        }
    }
}

impl FileAreaConfig {
    pub fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.op_timeout_ms)
    }

    /// Validate file area configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        if self.op_timeout_ms == 0 {
            return Err("file_area.op_timeout_ms must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Attachment persistence configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AttachmentConfig {
    /// Backend used for new attachments.
    #[serde(default)]
    pub strategy: Strategy,
    /// Chunk size in bytes for the chunked strategy.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,
    /// Largest payload accepted by the inline strategy.
    #[serde(default = "default_inline_max_bytes")]
    pub inline_max_bytes: u64,
}

fn default_chunk_size() -> u64 {
    crate::CHUNK_SIZE
}

fn default_inline_max_bytes() -> u64 {
    1024 * 1024
}

impl Default for AttachmentConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::default(),
            chunk_size: default_chunk_size(),
            inline_max_bytes: default_inline_max_bytes(),
        }
    }
}

impl AttachmentConfig {
    /// Validate attachment configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        if !(crate::MIN_CHUNK_SIZE..=crate::MAX_CHUNK_SIZE).contains(&self.chunk_size) {
            return Err(format!(
                "attachments.chunk_size {} must be between {} and {}",
                self.chunk_size,
                crate::MIN_CHUNK_SIZE,
                crate::MAX_CHUNK_SIZE
            ));
        }
        Ok(())
    }
}

/// Retry policy for transient storage errors.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt (0 disables retrying).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each further retry.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    50
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `attempt` (1-based): `base * 2^(attempt - 1)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor))
    }

    /// Validate retry configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_retries > 10 {
            return Err(format!(
                "retry.max_retries {} is too large (max 10)",
                self.max_retries
            ));
        }
        Ok(())
    }
}

/// Presentation settings for rendered attachments.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Start audio/video from the file area muted.
    #[serde(default = "default_mute_file_area_playback")]
    pub mute_file_area_playback: bool,
}

fn default_mute_file_area_playback() -> bool {
    true
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            mute_file_area_playback: default_mute_file_area_playback(),
        }
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub metadata: MetadataConfig,
    #[serde(default)]
    pub file_area: FileAreaConfig,
    #[serde(default)]
    pub attachments: AttachmentConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub render: RenderConfig,
}

impl AppConfig {
    /// Validate every section.
    pub fn validate(&self) -> Result<(), String> {
        self.file_area.validate()?;
        self.attachments.validate()?;
        self.retry.validate()?;
        Ok(())
    }

    /// Create a test configuration rooted at `dir`.
    ///
    /// **For testing only.** Uses a database and file area inside `dir` and
    /// retries without delay.
    pub fn for_testing(dir: &std::path::Path) -> Self {
        Self {
            metadata: MetadataConfig {
                path: dir.join("satchel.db"),
                busy_timeout_secs: default_busy_timeout_secs(),
            },
            file_area: FileAreaConfig {
                enabled: true,
                path: dir.join("files"),
                op_timeout_ms: 5_000,
            },
            attachments: AttachmentConfig::default(),
            retry: RetryConfig {
                max_retries: 2,
                base_delay_ms: 0,
            },
            render: RenderConfig::default(),
        }
    }
}
