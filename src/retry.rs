//! Bounded retry with exponential backoff and a per-call timeout.
//!
//! Every model and tool call made by a step goes through [`call_with_retry`].
//! Only transient failures (timeouts, connection errors, rate limits, server
//! errors) are retried; anything else is returned on the first attempt.

use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::ResearchError;

/// Retry policy for transient call failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum retry attempts after the first call
    pub max_retries: usize,

    /// Base delay for exponential backoff
    pub backoff_base: Duration,

    /// Maximum delay between retries
    pub backoff_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff_base: Duration::from_millis(500),
            backoff_max: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Create a new retry policy
    pub fn new(max_retries: usize) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    /// Set backoff base duration
    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    /// Calculate delay for a given retry attempt (exponential backoff)
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let multiplier = 2u32.saturating_pow(attempt as u32);
        let delay = self.backoff_base.saturating_mul(multiplier);
        delay.min(self.backoff_max)
    }

    /// Check if more retries are allowed
    pub fn should_retry(&self, retries_done: usize) -> bool {
        retries_done < self.max_retries
    }

    /// Create a no-retry policy
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }
}

/// Run `call` under `call_timeout`, retrying transient failures per `policy`.
///
/// Returns [`ResearchError::Cancelled`] as soon as `cancel` fires, whether a
/// call or a backoff sleep is in flight. When retries run out the last error
/// is wrapped in [`ResearchError::RetriesExhausted`]; with a no-retry policy
/// the error is returned as is.
pub async fn call_with_retry<T, E, F, Fut>(
    operation: &str,
    policy: &RetryPolicy,
    call_timeout: Duration,
    cancel: &CancellationToken,
    mut call: F,
) -> Result<T, ResearchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Into<ResearchError>,
{
    let mut retries_done = 0;

    loop {
        let outcome = tokio::select! {
            _ = cancel.cancelled() => return Err(ResearchError::Cancelled),
            outcome = timeout(call_timeout, call()) => outcome,
        };

        let error = match outcome {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => e.into(),
            Err(_) => ResearchError::timeout(operation, call_timeout),
        };

        if !error.is_retryable() {
            return Err(error);
        }

        if !policy.should_retry(retries_done) {
            if retries_done == 0 {
                return Err(error);
            }
            return Err(ResearchError::RetriesExhausted {
                operation: operation.to_string(),
                attempts: retries_done + 1,
                last: Box::new(error),
            });
        }

        let delay = policy.delay_for_attempt(retries_done);
        warn!(
            operation,
            attempt = retries_done + 1,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Transient failure, retrying"
        );

        tokio::select! {
            _ = cancel.cancelled() => return Err(ResearchError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
        retries_done += 1;
    }
}
