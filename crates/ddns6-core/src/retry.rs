//! Retry scheduling
//!
//! [`RetryScheduler`] wraps one synchronization attempt with unbounded retry.
//! There is no attempt cap: a pipeline keeps trying until it succeeds, hits a
//! configuration-class error, runs into its optional deadline, or is cancelled.
//!
//! Delays grow exponentially from `initial_delay` and are capped at `max_delay`.

use crate::error::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Backoff settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound on any single delay
    pub max_delay: Duration,
    /// Growth factor between consecutive delays
    pub multiplier: u32,
    /// Bound on a single attempt; expiry counts as a transient failure
    pub attempt_timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(3),
            max_delay: Duration::from_secs(300),
            multiplier: 2,
            attempt_timeout: None,
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after the `failures`-th consecutive failure (1-based)
    pub fn delay_for(&self, failures: u32) -> Duration {
        let factor = self
            .multiplier
            .max(1)
            .checked_pow(failures.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Runs an attempt until it succeeds
///
/// # Termination
///
/// - `Ok` from an attempt ends the loop immediately; no further attempts run
/// - A non-retryable error (see [`Error::is_retryable`]) is returned as-is
/// - With a deadline: when the next delay would cross it, or an attempt is
///   still running when it passes, the most recent error is returned
///   (`DeadlineExceeded` if no attempt finished)
/// - Cancellation returns `Error::Cancelled` at the next await point
#[derive(Debug, Clone)]
pub struct RetryScheduler {
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl RetryScheduler {
    pub fn new(policy: RetryPolicy, cancel: CancellationToken) -> Self {
        Self { policy, cancel }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `attempt` until success, passing the 1-based attempt number
    pub async fn run<T, F, Fut>(&self, deadline: Option<Instant>, mut attempt: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut last_error: Option<Error> = None;
        let mut attempts: u32 = 0;

        loop {
            attempts = attempts.saturating_add(1);

            let outcome = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(Error::Cancelled),
                outcome = self.bounded(attempt(attempts), deadline) => outcome,
            };

            let error = match outcome {
                Some(Ok(value)) => {
                    if attempts > 1 {
                        debug!(attempts, "Attempt succeeded after retries");
                    }
                    return Ok(value);
                }
                Some(Err(e)) if !e.is_retryable() => return Err(e),
                Some(Err(e)) => e,
                None => {
                    debug!(attempts, "Deadline passed during attempt, abandoning cycle");
                    return Err(last_error.unwrap_or(Error::DeadlineExceeded));
                }
            };

            let delay = self.policy.delay_for(attempts);
            if let Some(deadline) = deadline
                && Instant::now() + delay >= deadline
            {
                debug!(attempts, "Next retry would pass the deadline, abandoning cycle");
                return Err(error);
            }

            warn!("retry {}: {}", attempts, error);
            last_error = Some(error);

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(Error::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Apply the per-attempt timeout and the cycle deadline.
    /// `None` means the deadline passed first.
    async fn bounded<T, Fut>(&self, fut: Fut, deadline: Option<Instant>) -> Option<Result<T>>
    where
        Fut: Future<Output = Result<T>>,
    {
        let timed = async {
            match self.policy.attempt_timeout {
                Some(limit) => tokio::time::timeout(limit, fut)
                    .await
                    .unwrap_or_else(|_| Err(Error::Timeout(limit))),
                None => fut.await,
            }
        };

        match deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, timed).await.ok(),
            None => Some(timed.await),
        }
    }
}
