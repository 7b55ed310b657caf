//! Bounded retry for administrative identity calls
//!
//! Lifecycle operations never retry; only calls that the remote identity
//! service is known to reject spuriously go through [`retry_transient`].

use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, sleep};

use crate::error::{CloudError, Result};
use crate::poll::deadline_after;

/// Retry configuration for provider operations
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,

    /// Initial delay between retries
    pub initial_delay: Duration,

    /// Maximum delay between retries
    pub max_delay: Duration,

    /// Backoff multiplier
    pub backoff_multiplier: f64,

    /// No attempt is started after this much time has passed
    pub deadline: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            deadline: Duration::from_secs(60),
        }
    }
}

impl RetryConfig {
    pub fn with_max_attempts(attempts: u32) -> Self {
        Self {
            max_attempts: attempts,
            ..Default::default()
        }
    }

    /// Next delay, capped at `max_delay`; a multiplier below 1.0 counts as 1.0
    fn next_delay(&self, delay: Duration) -> Duration {
        let multiplier = if self.backoff_multiplier.is_finite() {
            self.backoff_multiplier.max(1.0)
        } else {
            1.0
        };
        let scaled = delay.as_secs_f64() * multiplier;
        Duration::try_from_secs_f64(scaled)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Retry `operation` while it fails with a transient error
///
/// Non-transient errors return immediately. Running out of attempts or
/// crossing the deadline yields [`CloudError::TransientRemoteFailure`]
/// carrying the last error.
pub async fn retry_transient<F, Fut, T>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let started = Instant::now();
    let deadline = deadline_after(started, config.deadline);
    let mut attempt = 0u32;
    let mut delay = config.initial_delay;

    loop {
        attempt += 1;

        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_transient() => return Err(e),
            Err(e) => e,
        };

        let now = Instant::now();
        let past_deadline = now.checked_add(delay).is_none_or(|next| next > deadline);
        if attempt >= config.max_attempts.max(1) || past_deadline {
            tracing::error!(
                operation = %operation_name,
                attempt = attempt,
                error = %err,
                "Operation failed after bounded retries"
            );
            return Err(CloudError::TransientRemoteFailure(format!(
                "{} failed after {} attempts in {}s: {}",
                operation_name,
                attempt,
                now.duration_since(started).as_secs(),
                err
            )));
        }

        tracing::warn!(
            operation = %operation_name,
            attempt = attempt,
            error = %err,
            delay_ms = delay.as_millis() as u64,
            "Operation failed, retrying"
        );

        sleep(delay).await;
        delay = config.next_delay(delay);
    }
}
