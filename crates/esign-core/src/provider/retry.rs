use super::error::ProviderError;
use crate::config::ProviderConfig;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Whether repeating a call can duplicate a provider-side effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallSafety {
    /// Reads, deletes, uploads, and creates carrying an idempotency key.
    Idempotent,
    /// Creates without an idempotency key. Any failure after the request may have been sent,
    /// including every 5xx answer, is reported as [`ProviderError::Ambiguous`] instead of
    /// being retried.
    NonIdempotent,
}

/// Exponential backoff retry budget for provider calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &ProviderConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms.max(config.base_delay_ms)),
        }
    }

    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// `base_delay * 2^attempt`, capped at `max_delay`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Runs `op` until it succeeds, fails permanently, or the budget is spent.
    ///
    /// Exhausted transient failures become [`ProviderError::Unavailable`].
    pub async fn run<T, F, Fut>(
        &self,
        operation: &'static str,
        safety: CallSafety,
        mut op: F,
    ) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if safety == CallSafety::NonIdempotent && err.may_have_reached_provider() {
                warn!(operation, attempt, error = %err, "non-idempotent provider call has unknown outcome");
                return Err(ProviderError::Ambiguous { operation });
            }

            if !err.is_transient() {
                return Err(err);
            }

            if attempt >= self.max_retries {
                return Err(ProviderError::Unavailable {
                    operation,
                    attempts: attempt + 1,
                    last_error: err.to_string(),
                });
            }

            let mut delay = self.backoff(attempt);
            if let ProviderError::RateLimited {
                retry_after: Some(retry_after),
            } = &err
            {
                delay = delay.max(*retry_after);
            }

            warn!(
                operation,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "provider call failed; retrying"
            );
            sleep(delay).await;
            attempt += 1;
        }
    }
}
