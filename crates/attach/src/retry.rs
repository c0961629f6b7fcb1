//! Bounded retries with exponential backoff, and per-operation timeouts.

use crate::error::{AttachError, AttachResult};
use satchel_core::config::RetryConfig;
use satchel_storage::StorageError;
use std::future::Future;
use std::time::Duration;

/// Run `op` until it succeeds, fails with a non-transient error, or the retry
/// budget is spent. Delays follow `RetryConfig::delay_for`.
pub async fn with_retry<T, F, Fut>(policy: &RetryConfig, what: &str, mut op: F) -> AttachResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AttachResult<T>>,
{
    let mut attempt = 0;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < policy.max_retries => {
                attempt += 1;
                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    operation = what,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Bound `fut` by `limit`. An elapsed timeout is reported as a transient
/// `TimedOut` storage error so it takes part in retries.
pub async fn with_timeout<T, Fut>(limit: Duration, what: &str, fut: Fut) -> AttachResult<T>
where
    Fut: Future<Output = AttachResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(AttachError::Storage(StorageError::Io(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            format!("{what} timed out after {}ms", limit.as_millis()),
        )))),
    }
}
