//! Retry helpers: backoff with jitter for the supervisor's successor
//! jobs, and a generic async retry loop for blob-store writes (audio and
//! render uploads) that should survive a transient outage without
//! burning a whole job attempt.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::debug;

/// Exponential backoff with full jitter for job attempt `attempt`
/// (1-based: the delay before attempt 2 uses `attempt = 1`).
pub fn backoff_delay(attempt: u32, base_s: u64, jitter_s: u64) -> Duration {
    let exp = base_s.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)));
    let jitter = if jitter_s > 0 {
        rand::rng().random_range(0..=jitter_s)
    } else {
        0
    };
    Duration::from_secs(exp + jitter)
}

/// Configuration for in-handler retries of flaky operations.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the initial attempt
    pub max_retries: u32,
    /// Base delay, doubled each attempt
    pub base_delay: Duration,
    /// Delay cap
    pub max_delay: Duration,
    /// Operation name for logging
    pub operation_name: String,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            operation_name: "operation".to_string(),
        }
    }
}

impl RetryConfig {
    pub fn new(operation_name: impl Into<String>) -> Self {
        Self {
            operation_name: operation_name.into(),
            ..Default::default()
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.base_delay.saturating_mul(2u32.saturating_pow(attempt));
        delay.min(self.max_delay)
    }
}

/// Execute an async operation with retry.
pub async fn retry_async<F, Fut, T, E>(config: &RetryConfig, operation: F) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0u32;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < config.max_retries => {
                attempt += 1;
                let delay = config.delay_for_attempt(attempt);
                debug!(
                    "{} attempt {} failed, retrying in {:?}: {}",
                    config.operation_name, attempt, delay, e
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn backoff_grows_exponentially() {
        // No jitter makes the schedule deterministic
        assert_eq!(backoff_delay(1, 60, 0), Duration::from_secs(60));
        assert_eq!(backoff_delay(2, 60, 0), Duration::from_secs(120));
        assert_eq!(backoff_delay(3, 60, 0), Duration::from_secs(240));
    }

    #[test]
    fn backoff_jitter_stays_in_bounds() {
        for _ in 0..50 {
            let delay = backoff_delay(1, 60, 30);
            assert!(delay >= Duration::from_secs(60));
            assert!(delay <= Duration::from_secs(90));
        }
    }

    #[tokio::test]
    async fn retry_async_eventual_success() {
        let config = RetryConfig::new("test").with_max_retries(3);
        let calls = AtomicU32::new(0);

        let result = retry_async(&config, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err("transient")
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_async_exhausts() {
        let config = RetryConfig {
            max_retries: 1,
            base_delay: Duration::from_millis(1),
            ..RetryConfig::new("test")
        };
        let result: Result<(), _> = retry_async(&config, || async { Err("always") }).await;
        assert!(result.is_err());
    }
}
