use std::future::Future;
use std::time::Duration;

use udb_core::models::settings::DownloaderSettings;

use crate::core::error::{PipelineError, PipelineResult};

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn from_settings(settings: &DownloaderSettings) -> Self {
        Self::new(
            settings.max_retries,
            Duration::from_millis(settings.retry_base_delay_ms),
        )
    }

    /// Linear backoff with up to 50% random jitter on top.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.base_delay.as_millis() as u64 * (attempt as u64 + 1);
        let jitter = rand::random::<u64>() % (base / 2 + 1);
        Duration::from_millis(base + jitter)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(500))
    }
}

/// Runs `op` until it succeeds, returns a non-retryable error, or the policy
/// runs out of attempts. The last error is returned on exhaustion.
pub async fn retry<T, F, Fut>(policy: RetryPolicy, label: &str, mut op: F) -> PipelineResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = PipelineResult<T>>,
{
    let mut last_err = None;
    for attempt in 0..policy.max_attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) => {
                tracing::debug!(
                    "[retry] {} attempt {}/{} failed: {}",
                    label,
                    attempt + 1,
                    policy.max_attempts,
                    e
                );
                last_err = Some(e);
            }
        }
        if attempt + 1 < policy.max_attempts {
            tokio::time::sleep(policy.delay_for(attempt)).await;
        }
    }
    Err(last_err.unwrap_or_else(|| {
        PipelineError::fetch(label, format!("failed after {} attempts", policy.max_attempts))
    }))
}
