// Fixed-interval retry for transient destination failures.
//
// Every bounded wait-and-retry loop in the bridge is described by a
// RetryPolicy value (how many attempts, how long between them). The generic
// executor below takes the policy plus a classifier that decides which
// errors deserve another attempt, so no caller keeps its own counter.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// How many times an operation may be attempted and how long to wait
/// between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before each retry.
    pub backoff: Duration,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    /// A policy that never gives up on its own. Only for loops whose input
    /// shrinks on every retry.
    pub const fn unbounded(backoff: Duration) -> Self {
        Self {
            max_attempts: u32::MAX,
            backoff,
        }
    }

    /// Whether another attempt is allowed after `attempts_made` attempts.
    pub fn allows_another(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }
}

/// Run `operation` until it succeeds, returns an error the classifier
/// rejects, or the policy's attempt budget is spent.
///
/// The last error is returned unchanged so callers can still inspect it.
pub async fn with_retry<F, Fut, T, E, C>(
    policy: &RetryPolicy,
    is_retryable: C,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> bool,
    E: Display,
{
    let mut attempts = 0u32;

    loop {
        attempts += 1;

        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !is_retryable(&err) || !policy.allows_another(attempts) {
                    return Err(err);
                }

                warn!(
                    attempt = attempts,
                    max_attempts = policy.max_attempts,
                    backoff_secs = policy.backoff.as_secs_f64(),
                    error = %err,
                    "Transient failure, retrying in {:.0}s (attempt {}/{})",
                    policy.backoff.as_secs_f64(),
                    attempts,
                    policy.max_attempts,
                );

                tokio::time::sleep(policy.backoff).await;
            }
        }
    }
}
