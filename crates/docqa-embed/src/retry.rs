use std::future::Future;
use std::time::Duration;

use anyhow::anyhow;
use tracing::debug;

use docqa_core::config::EmbeddingSettings;

/// Hard ceiling on attempts per item.
pub const MAX_ATTEMPTS: u32 = 3;

/// Bounded retry with exponential backoff; every attempt is bounded by `timeout`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    timeout: Duration,
}

impl RetryPolicy {
    /// `max_attempts` is clamped to `1..=MAX_ATTEMPTS`.
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration, timeout: Duration) -> Self {
        Self { max_attempts: max_attempts.clamp(1, MAX_ATTEMPTS), base_delay, max_delay: max_delay.max(base_delay), timeout }
    }

    pub fn from_settings(settings: &EmbeddingSettings) -> Self {
        Self::new(
            settings.max_attempts,
            Duration::from_millis(settings.base_backoff_ms),
            Duration::from_millis(settings.max_backoff_ms),
            Duration::from_millis(settings.timeout_ms),
        )
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Delay after the `attempt`-th failure (1-based): `base * 2^(attempt-1)`, capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Runs `op` until it succeeds or attempts are exhausted; returns the last error.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> anyhow::Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let mut last_err = None;
        for attempt in 1..=self.max_attempts {
            match tokio::time::timeout(self.timeout, op(attempt)).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => {
                    debug!(attempt, error = %e, "attempt failed");
                    last_err = Some(e);
                }
                Err(_) => {
                    debug!(attempt, timeout_ms = self.timeout.as_millis() as u64, "attempt timed out");
                    last_err = Some(anyhow!("timed out after {:?}", self.timeout));
                }
            }
            if attempt < self.max_attempts {
                tokio::time::sleep(self.backoff(attempt)).await;
            }
        }
        Err(last_err.unwrap_or_else(|| anyhow!("no attempts made")))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&EmbeddingSettings::default())
    }
}
