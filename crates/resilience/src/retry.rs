//! Bounded retry with capped exponential backoff.

use std::error::Error;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::classifier::{http_status, is_transient};

/// Which failures a [`RetryPolicy`] retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOn {
    /// Only transient transport faults (see [`is_transient`]).
    TransientTransport,
    /// Any 5xx status, plus the listed 4xx statuses. Failures without a
    /// status fall back to transient transport classification.
    HttpStatus { statuses: Vec<u16> },
}

impl RetryOn {
    /// Decides whether `err` should be retried.
    pub fn matches(&self, err: &(dyn Error + 'static)) -> bool {
        match self {
            Self::TransientTransport => is_transient(err),
            Self::HttpStatus { statuses } => match http_status(err) {
                Some(status) => status >= 500 || statuses.contains(&status),
                None => is_transient(err),
            },
        }
    }
}

/// Retry configuration. Holds no mutable state.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Factor applied to the delay after each retry.
    pub backoff_multiplier: f64,
    pub retry_on: RetryOn,
}

impl RetryPolicy {
    /// Policy for ordinary gateway API calls: status-aware, 3 attempts.
    pub fn api() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            backoff_multiplier: 2.0,
            retry_on: RetryOn::HttpStatus {
                statuses: vec![408, 429],
            },
        }
    }

    /// Policy for object uploads: transient transport faults only,
    /// one try plus two retries.
    pub fn upload() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            retry_on: RetryOn::TransientTransport,
        }
    }

    /// Delays to sleep before each retry, in order.
    pub fn backoff(&self) -> Backoff {
        Backoff {
            current: self.initial_delay,
            max: self.max_delay,
            multiplier: self.backoff_multiplier,
        }
    }
}

/// Infinite sequence of retry delays: `min(current, max)`, then
/// `current *= multiplier`.
#[derive(Debug, Clone)]
pub struct Backoff {
    current: Duration,
    max: Duration,
    multiplier: f64,
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Self::Item> {
        let delay = self.current.min(self.max);
        // Growth stops at the cap, which also keeps the float math finite.
        self.current = Duration::try_from_secs_f64(self.current.as_secs_f64() * self.multiplier)
            .unwrap_or(self.max)
            .min(self.max);
        Some(delay)
    }
}

/// Runs async operations under a [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Runs `operation` until it succeeds, fails with a non-retryable error,
    /// or `max_attempts` is reached. Returns the last error seen.
    ///
    /// `label` only appears in log events.
    pub async fn execute<F, Fut, T, E>(&self, label: &str, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Error + 'static,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut backoff = self.policy.backoff();
        let mut attempt: u32 = 1;

        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(op = label, attempt, "succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) => {
                    let retryable = self.policy.retry_on.matches(&err);
                    if !retryable || attempt >= max_attempts {
                        warn!(
                            op = label,
                            attempt,
                            max_attempts,
                            retryable,
                            error = %err,
                            "giving up"
                        );
                        return Err(err);
                    }

                    let delay = backoff.next().unwrap_or(self.policy.max_delay);
                    warn!(
                        op = label,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
