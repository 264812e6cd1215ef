//! Retry and backoff policies for remote API calls
//!
//! A [`BackoffPolicy`] is configuration; [`BackoffPolicy::schedule`] turns it
//! into an iterator of waits built on `tokio_retry` strategies. A
//! [`RetryState`] tracks one request's shared attempt budget.

use std::time::Duration;
use tokio_retry::strategy::{ExponentialBackoff, FixedInterval};

/// Waits between consecutive attempts, first retry first
pub type Schedule = Box<dyn Iterator<Item = Duration> + Send>;

/// Shape of the wait schedule between retries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffPolicy {
    /// The same wait before every retry
    Fixed(Duration),
    /// `n × unit` before the n-th retry
    Linear(Duration),
    /// `base`, then doubling, never longer than `max`
    Exponential { base: Duration, max: Duration },
}

impl BackoffPolicy {
    /// Unbounded iterator of waits for this policy
    pub fn schedule(&self) -> Schedule {
        match *self {
            BackoffPolicy::Fixed(wait) => Box::new(FixedInterval::new(wait)),
            BackoffPolicy::Linear(unit) => Box::new(LinearBackoff::new(unit)),
            BackoffPolicy::Exponential { base, max } => Box::new(doubling(base, max)),
        }
    }
}

/// Doubling backoff starting at `first`, capped at `max`
///
/// `ExponentialBackoff::from_millis(2)` yields `factor × 2^n` milliseconds,
/// so the factor is half the first wait.
fn doubling(first: Duration, max: Duration) -> ExponentialBackoff {
    let factor = u64::try_from(first.as_millis() / 2).unwrap_or(u64::MAX).max(1);
    ExponentialBackoff::from_millis(2)
        .factor(factor)
        .max_delay(max)
}

/// Waits growing by `unit` on every retry
#[derive(Debug, Clone)]
pub struct LinearBackoff {
    unit: Duration,
    retries: u32,
}

impl LinearBackoff {
    pub fn new(unit: Duration) -> Self {
        Self { unit, retries: 0 }
    }
}

impl Iterator for LinearBackoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        self.retries = self.retries.saturating_add(1);
        Some(self.unit.saturating_mul(self.retries))
    }
}

/// Why a request is being retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryReason {
    /// HTTP 429
    RateLimited,
    /// HTTP 5xx
    ServerError,
}

/// Bounded retry policy for the WiGLE search API
///
/// Rate-limit and server-error retries share one attempt budget per page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total requests allowed for one page, including the first
    pub max_attempts: u32,
    /// Wait schedule after an HTTP 429
    pub rate_limited: BackoffPolicy,
    /// Wait schedule after an HTTP 5xx
    pub server_error: BackoffPolicy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            rate_limited: BackoffPolicy::Exponential {
                base: Duration::from_secs(30),
                max: Duration::from_secs(300),
            },
            server_error: BackoffPolicy::Linear(Duration::from_secs(10)),
        }
    }
}

impl RetryPolicy {
    /// Fresh retry bookkeeping for one request
    pub fn start(&self) -> RetryState {
        let retries = self.max_attempts.saturating_sub(1);
        RetryState {
            failures: 0,
            retries_left: retries,
            rate_limited: Box::new(self.rate_limited.schedule().take(retries as usize)),
            server_error: Box::new(self.server_error.schedule().take(retries as usize)),
        }
    }
}

/// Attempt budget and per-reason wait schedules of one request
pub struct RetryState {
    failures: u32,
    retries_left: u32,
    rate_limited: Schedule,
    server_error: Schedule,
}

impl RetryState {
    /// Records a failed request and returns the wait before retrying,
    /// or `None` once the attempt budget is spent
    pub fn next_delay(&mut self, reason: RetryReason) -> Option<Duration> {
        self.failures += 1;
        if self.retries_left == 0 {
            return None;
        }
        self.retries_left -= 1;
        match reason {
            RetryReason::RateLimited => self.rate_limited.next(),
            RetryReason::ServerError => self.server_error.next(),
        }
    }

    /// Failed requests so far
    pub fn failures(&self) -> u32 {
        self.failures
    }
}
