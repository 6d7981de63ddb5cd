//! Retry with exponential backoff for provider calls.
//!
//! Auth and other permanent failures short-circuit; rate limits and
//! provider outages back off and try again.

use crate::error::{LlmError, Result};
use std::future::Future;
use std::time::Duration;
use tracing::{error, info, warn};

/// Backoff configuration.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 1000,
            max_backoff_ms: 30_000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    pub fn with_initial_backoff(mut self, ms: u64) -> Self {
        self.initial_backoff_ms = ms;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Backoff delay for a 0-indexed attempt.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let delay_ms = (self.initial_backoff_ms as f64
            * self.backoff_multiplier.powi(attempt as i32)) as u64;
        let delay_ms = delay_ms.min(self.max_backoff_ms);
        let delay_ms = if self.jitter {
            delay_ms + (delay_ms as f64 * 0.25 * rand::random::<f64>()) as u64
        } else {
            delay_ms
        };
        Duration::from_millis(delay_ms)
    }
}

/// Run `f` until it succeeds, retries are exhausted, or a permanent error
/// appears.
pub async fn retry_with_backoff<F, Fut, T>(
    config: &RetryConfig,
    operation: &str,
    mut f: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_error = None;

    for attempt in 0..=config.max_retries {
        match f().await {
            Ok(value) => {
                if attempt > 0 {
                    info!(operation, attempt, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) => {
                if !e.is_retryable() {
                    error!(operation, error = %e, "Permanent error, aborting retries");
                    return Err(e);
                }
                if attempt < config.max_retries {
                    let delay = config.backoff_delay(attempt);
                    warn!(
                        operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient error, will retry after delay"
                    );
                    tokio::time::sleep(delay).await;
                }
                last_error = Some(e);
            }
        }
    }

    let final_error = last_error.unwrap_or_else(|| {
        LlmError::Provider(format!(
            "operation '{}' failed after {} retries",
            operation, config.max_retries
        ))
    });
    error!(operation, error = %final_error, "All retry attempts exhausted");
    Err(final_error)
}
