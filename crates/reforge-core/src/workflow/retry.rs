//! Exponential backoff for collaborator calls within one node invocation.
//!
//! This is the inner retry loop: it re-sends a single API call after
//! transient failures (timeouts, rate limiting, outages). The outer
//! Generate -> Validate -> Reflect cycle is bounded separately by
//! `max_iterations` in the transition engine.

use std::future::Future;
use std::time::Duration;

use reforge_types::config::RetryConfig;
use reforge_types::error::CollaboratorError;

// ---------------------------------------------------------------------------
// RetryPolicy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            multiplier: config.multiplier.max(1.0),
        }
    }

    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1.0,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Whether another attempt should follow a failed one.
    ///
    /// `attempt` is 1-based (first execution is attempt 1).
    pub fn should_retry(&self, attempt: u32, error: &CollaboratorError) -> bool {
        error.is_retryable() && attempt < self.max_attempts
    }

    /// Delay before the attempt following `attempt`.
    ///
    /// Grows geometrically from `initial_delay`, honours a server-suggested
    /// delay when it is longer, and never exceeds `max_delay`.
    pub fn delay_for(&self, attempt: u32, error: &CollaboratorError) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let scaled = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let backoff = Duration::from_secs_f64(scaled.min(self.max_delay.as_secs_f64()));
        let hinted = error
            .retry_after_ms()
            .map(Duration::from_millis)
            .unwrap_or_default();
        backoff.max(hinted).min(self.max_delay)
    }

    /// Run `call` until it succeeds, fails permanently, or the attempt
    /// ceiling is reached. The last error is returned unchanged.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, CollaboratorError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CollaboratorError>>,
    {
        let mut attempt = 1;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(error) if self.should_retry(attempt, &error) => {
                    let delay = self.delay_for(attempt, &error);
                    tracing::warn!(
                        operation,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "collaborator call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => {
                    if error.is_retryable() {
                        tracing::warn!(
                            operation,
                            attempts = attempt,
                            error = %error,
                            "collaborator retry budget exhausted"
                        );
                    }
                    return Err(error);
                }
            }
        }
    }
}
