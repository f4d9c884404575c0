//! Retry with exponential backoff and jitter for transient API failures.
//!
//! Only errors for which [`TransportError::is_retryable`] holds are retried:
//! throttling (429), server errors (5xx) and connection failures.

use std::time::Duration;

use log::warn;
use rand::Rng;
use stratus_core::transport::{TransportError, TransportResult};

#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Retries after the first attempt (0 = no retry)
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }
}

/// Run `operation` until it succeeds, fails permanently, or retries run out.
///
/// The last error is returned unchanged.
pub async fn retry_with_backoff<F, Fut, T>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> TransportResult<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = TransportResult<T>>,
{
    let mut attempt = 0u32;
    let mut delay = config.initial_delay;

    loop {
        let err: TransportError = match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => e,
        };

        if !err.is_retryable() || attempt >= config.max_retries {
            return Err(err);
        }
        attempt += 1;

        // 0.5x to 1.5x of the nominal delay
        let jitter = rand::thread_rng().gen_range(0.5..1.5);
        let jittered = Duration::from_secs_f64(delay.as_secs_f64() * jitter);

        warn!(
            "{} failed ({}), retry {}/{} in {}ms",
            operation_name,
            err,
            attempt,
            config.max_retries,
            jittered.as_millis()
        );

        tokio::time::sleep(jittered).await;

        delay = Duration::from_secs_f64(
            (delay.as_secs_f64() * config.backoff_multiplier).min(config.max_delay.as_secs_f64()),
        );
    }
}
