//! Waiter - Poll an asynchronous cloud operation until it settles
//!
//! [`wait`] drives a refresh function on a timer. Each call of the refresh
//! function performs one probe and returns an [`Observation`]; the waiter
//! compares the observed label against the pending and target sets of a
//! [`WaitConfig`] and decides whether to stop, keep polling or fail.
//!
//! # Example
//!
//! ```ignore
//! let config = WaitConfig::new("DCS instance (abc)", &[PENDING], &[COMPLETED])
//!     .with_timeout(Duration::from_secs(600))
//!     .with_delay(Duration::from_secs(10))
//!     .with_poll_interval(Duration::from_secs(10));
//!
//! let instance = wait(&config, &cancel, || probe.probe()).await?;
//! ```

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::refresh::{Observation, StatusClassifier, StatusProbe};
use crate::transport::TransportError;

/// Consecutive empty observations tolerated before giving up
pub const DEFAULT_NOT_FOUND_CHECKS: u32 = 20;

/// Default pause between probes
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Default limit for a whole wait
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Parameters of a single wait
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitConfig {
    /// Human-readable description used in error messages (e.g. "IMS job (123)")
    pub operation: String,
    /// Labels that mean "keep waiting"
    pub pending: Vec<String>,
    /// Labels that mean "done"
    pub target: Vec<String>,
    /// Limit for the whole wait, initial delay included
    pub timeout: Duration,
    /// Sleep before the first probe
    pub delay: Duration,
    /// Sleep between probes
    pub poll_interval: Duration,
    /// Pending observations without an object tolerated in a row
    pub not_found_checks: u32,
    /// Target observations required in a row before succeeding
    pub continuous_target_occurrence: u32,
}

impl WaitConfig {
    pub fn new(operation: impl Into<String>, pending: &[&str], target: &[&str]) -> Self {
        Self {
            operation: operation.into(),
            pending: pending.iter().map(|s| s.to_string()).collect(),
            target: target.iter().map(|s| s.to_string()).collect(),
            timeout: DEFAULT_TIMEOUT,
            delay: Duration::ZERO,
            poll_interval: DEFAULT_POLL_INTERVAL,
            not_found_checks: DEFAULT_NOT_FOUND_CHECKS,
            continuous_target_occurrence: 1,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_not_found_checks(mut self, checks: u32) -> Self {
        self.not_found_checks = checks;
        self
    }

    pub fn with_continuous_target_occurrence(mut self, occurrences: u32) -> Self {
        self.continuous_target_occurrence = occurrences.max(1);
        self
    }

    fn is_pending(&self, state: &str) -> bool {
        self.pending.iter().any(|s| s == state)
    }

    fn is_target(&self, state: &str) -> bool {
        self.target.iter().any(|s| s == state)
    }
}

/// Why a wait ended without reaching a target state.
///
/// `E` is the refresh function's own error type, returned untouched.
#[derive(Debug, Error)]
pub enum WaitError<E> {
    /// The probe itself failed
    #[error("{0}")]
    Refresh(E),

    /// A state outside the pending and target sets was observed
    #[error(
        "{operation}: unexpected state '{state}'{}, wanted target '{}'",
        status_suffix(.status),
        .expected.join(", ")
    )]
    UnexpectedState {
        operation: String,
        state: String,
        status: Option<String>,
        expected: Vec<String>,
    },

    /// The operation was still pending when the timeout elapsed
    #[error("timeout while waiting for {operation} (last state: '{last_state}', timeout: {timeout:?})")]
    Timeout {
        operation: String,
        last_state: String,
        timeout: Duration,
    },

    /// The caller cancelled the wait
    #[error("wait for {operation} was cancelled")]
    Cancelled { operation: String },

    /// The resource kept disappearing from the probe results
    #[error("{operation}: couldn't find resource ({checks} retries)")]
    NotFound { operation: String, checks: u32 },
}

fn status_suffix(status: &Option<String>) -> String {
    match status {
        Some(s) => format!(" (status: {})", s),
        None => String::new(),
    }
}

impl<E> WaitError<E> {
    pub fn is_timeout(&self) -> bool {
        matches!(self, WaitError::Timeout { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, WaitError::Cancelled { .. })
    }

    /// The refresh function's error, if that is what ended the wait
    pub fn refresh_error(&self) -> Option<&E> {
        match self {
            WaitError::Refresh(e) => Some(e),
            _ => None,
        }
    }
}

/// Sleep for `duration` unless the token is cancelled first
async fn pause<E>(
    config: &WaitConfig,
    cancel: &CancellationToken,
    duration: Duration,
) -> Result<(), WaitError<E>> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(WaitError::Cancelled {
            operation: config.operation.clone(),
        }),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}

/// Resolves at `deadline`, or never when the wait is unbounded
async fn expiry(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Time left before `deadline`, `None` when unbounded
fn remaining(deadline: Option<Instant>) -> Option<Duration> {
    deadline.map(|d| d.saturating_duration_since(Instant::now()))
}

fn timeout_error<E>(config: &WaitConfig, last_state: Option<String>) -> WaitError<E> {
    WaitError::Timeout {
        operation: config.operation.clone(),
        last_state: last_state.unwrap_or_default(),
        timeout: config.timeout,
    }
}

/// Poll `refresh` until it reports a target state.
///
/// Returns the object of the last probe on success. A refresh error, a state
/// that is neither pending nor target, the timeout and cancellation all end
/// the wait immediately; nothing is retried here. A probe still running at
/// the deadline is dropped. A timeout too large to represent as an instant
/// means the wait is bounded only by cancellation.
pub async fn wait<T, E, F, Fut>(
    config: &WaitConfig,
    cancel: &CancellationToken,
    mut refresh: F,
) -> Result<Option<T>, WaitError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Observation<T>, E>>,
{
    let deadline = Instant::now().checked_add(config.timeout);
    let required = config.continuous_target_occurrence.max(1);
    let mut targets_seen = 0u32;
    let mut not_found = 0u32;
    let mut last_state: Option<String> = None;

    if !config.delay.is_zero() {
        let delay = match remaining(deadline) {
            Some(left) => config.delay.min(left),
            None => config.delay,
        };
        pause(config, cancel, delay).await?;
    }

    loop {
        if remaining(deadline).is_some_and(|left| left.is_zero()) {
            return Err(timeout_error(config, last_state));
        }

        let observation = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(WaitError::Cancelled {
                    operation: config.operation.clone(),
                });
            }
            _ = expiry(deadline) => return Err(timeout_error(config, last_state)),
            result = refresh() => result.map_err(WaitError::Refresh)?,
        };

        if config.is_target(&observation.state) {
            targets_seen += 1;
            not_found = 0;
            if targets_seen >= required {
                return Ok(observation.object);
            }
        } else if config.is_pending(&observation.state) {
            targets_seen = 0;
            if observation.object.is_none() {
                not_found += 1;
                if not_found > config.not_found_checks {
                    return Err(WaitError::NotFound {
                        operation: config.operation.clone(),
                        checks: not_found,
                    });
                }
            } else {
                not_found = 0;
            }
        } else {
            return Err(WaitError::UnexpectedState {
                operation: config.operation.clone(),
                state: observation.state,
                status: observation.status,
                expected: config.target.clone(),
            });
        }
        last_state = Some(observation.state);

        let interval = match remaining(deadline) {
            Some(left) => config.poll_interval.min(left),
            None => config.poll_interval,
        };
        pause(config, cancel, interval).await?;
    }
}

/// Wait on a [`StatusProbe`], the common case of polling one URL
pub async fn wait_for_status<C: StatusClassifier>(
    probe: &StatusProbe<C>,
    config: &WaitConfig,
    cancel: &CancellationToken,
) -> Result<Option<serde_json::Value>, WaitError<TransportError>> {
    wait(config, cancel, || probe.probe()).await
}
