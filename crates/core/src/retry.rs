//! Bounded polling with optional backoff.
//!
//! The backend never pushes state changes, so the relay repeatedly asks
//! for them. [`poll`] drives one such loop: it calls the attempt function
//! up to [`RetryPolicy::max_attempts`] times, sleeping between attempts,
//! and reports an explicit [`Polled::Exhausted`] outcome instead of an
//! error when the budget runs out. A failed attempt is logged, remembered
//! as the last error, and still consumes one attempt.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Tunable parameters for a polling loop.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total number of attempts allotted, including the first.
    pub max_attempts: u32,
    /// Delay after the first unsuccessful attempt.
    pub interval: Duration,
    /// Factor by which the delay grows after each miss (1.0 = fixed).
    pub multiplier: f64,
    /// Upper bound on the delay between attempts.
    pub max_interval: Duration,
}

impl RetryPolicy {
    /// Fixed-interval policy.
    pub fn fixed(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
            multiplier: 1.0,
            max_interval: interval,
        }
    }

    /// Exponential policy clamped at `max_interval`.
    pub fn exponential(
        max_attempts: u32,
        interval: Duration,
        multiplier: f64,
        max_interval: Duration,
    ) -> Self {
        Self {
            max_attempts,
            interval,
            multiplier,
            max_interval,
        }
    }
}

/// Calculate the next delay from the current delay and policy.
///
/// The result is clamped to [`RetryPolicy::max_interval`].
pub fn next_delay(current: Duration, policy: &RetryPolicy) -> Duration {
    let next_ms = (current.as_millis() as f64 * policy.multiplier) as u64;
    Duration::from_millis(next_ms).min(policy.max_interval.max(policy.interval))
}

/// Outcome of a polling loop.
#[derive(Debug, Clone, PartialEq)]
pub enum Polled<T> {
    /// An attempt produced a value.
    Ready { value: T, attempts: u32 },
    /// Every attempt missed or failed.
    Exhausted {
        attempts: u32,
        last_error: Option<String>,
    },
}

/// Run `attempt` until it yields `Some`, or the policy is exhausted.
///
/// `attempt` receives the 1-based attempt number. `Ok(None)` means "not
/// yet"; `Err(e)` is treated as transient: logged under `label`, recorded,
/// and counted against the budget.
pub async fn poll<T, E, F, Fut>(policy: &RetryPolicy, label: &str, mut attempt: F) -> Polled<T>
where
    E: Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
{
    let mut delay = policy.interval;
    let mut last_error = None;

    for n in 1..=policy.max_attempts {
        match attempt(n).await {
            Ok(Some(value)) => {
                tracing::debug!(label, attempt = n, "Poll succeeded");
                return Polled::Ready { value, attempts: n };
            }
            Ok(None) => {
                tracing::trace!(label, attempt = n, "Poll not ready");
            }
            Err(e) => {
                tracing::warn!(label, attempt = n, error = %e, "Poll attempt failed");
                last_error = Some(e.to_string());
            }
        }

        if n < policy.max_attempts {
            tokio::time::sleep(delay).await;
            delay = next_delay(delay, policy);
        }
    }

    tracing::debug!(label, attempts = policy.max_attempts, "Poll budget exhausted");
    Polled::Exhausted {
        attempts: policy.max_attempts,
        last_error,
    }
}
