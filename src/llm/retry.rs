//! Bounded exponential backoff for LLM calls.
//!
//! Only transient errors (`RequestFailed`, `RateLimited`) are retried. The
//! default performs a single attempt.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::LlmError;

/// Configuration for exponential backoff retry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryConfig {
    /// Retries after the initial attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Cap for exponential growth.
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
}

impl RetryConfig {
    /// One attempt, no retry.
    pub const NONE: Self = Self {
        max_retries: 0,
        initial_delay: Duration::from_secs(1),
        max_delay: Duration::from_secs(30),
        backoff_multiplier: 2.0,
    };

    pub fn new(max_retries: u32, initial_delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay,
            ..Self::NONE
        }
    }

    /// Delay for the given retry attempt (0-indexed), capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let multiplier = self.backoff_multiplier.powi(attempt as i32);
        let delay_secs = self.initial_delay.as_secs_f64() * multiplier;
        Duration::from_secs_f64(delay_secs.min(self.max_delay.as_secs_f64()))
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::NONE
    }
}

/// Run `operation` until it succeeds, fails permanently, or retries run out.
///
/// A `retry_after` hint on a rate-limit error overrides the computed delay
/// when it is longer, but never beyond `max_delay`.
pub(crate) async fn retry_with_backoff<T, F, Fut>(
    config: RetryConfig,
    mut operation: F,
) -> Result<T, LlmError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_transient() || attempt >= config.max_retries => return Err(e),
            Err(e) => {
                let mut delay = config.delay_for_attempt(attempt);
                if let LlmError::RateLimited {
                    retry_after: Some(hint),
                    ..
                } = &e
                {
                    delay = delay.max(*hint).min(config.max_delay);
                }
                attempt += 1;
                warn!(
                    attempt,
                    max_retries = config.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Transient LLM error, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
