//! Retry policy for fetch calls: which failures are retried and how long to
//! wait between attempts.

use std::time::Duration;

use crate::fetcher::{FetchError, FetchErrorKind};

/// Delay schedule between attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    Fixed { delay: Duration },
    /// `base * factor^attempt`, capped at `max`, with optional +/-50% jitter.
    Exponential {
        base: Duration,
        factor: f64,
        max: Duration,
        jitter: bool,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Exponential {
            base: Duration::from_millis(250),
            factor: 2.0,
            max: Duration::from_secs(4),
            jitter: true,
        }
    }
}

impl Backoff {
    /// Delay before retry number `attempt` (0-based).
    pub fn delay(self, attempt: u32) -> Duration {
        match self {
            Self::Fixed { delay } => delay,
            Self::Exponential {
                base,
                factor,
                max,
                jitter,
            } => {
                let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
                let seconds = (base.as_secs_f64() * factor.powi(exponent)).min(max.as_secs_f64());
                let delay = Duration::from_secs_f64(seconds.max(0.0));
                if !jitter {
                    return delay;
                }

                let half = u64::try_from(delay.as_millis() / 2).unwrap_or(u64::MAX / 4);
                let offset = fastrand::u64(0..=half.saturating_mul(2));
                Duration::from_millis(
                    u64::try_from(delay.as_millis())
                        .unwrap_or(u64::MAX / 2)
                        .saturating_sub(half)
                        .saturating_add(offset),
                )
            }
        }
    }
}

/// Which fetch failures are worth another attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Retries after the first attempt; total attempts = `max_retries + 1`.
    pub max_retries: u32,
    pub backoff: Backoff,
    pub retry_on_status: Vec<u16>,
    pub retry_on_transport: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff: Backoff::default(),
            retry_on_status: vec![408, 429, 500, 502, 503, 504],
            retry_on_transport: true,
        }
    }
}

impl RetryConfig {
    pub fn fixed(delay: Duration, max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff: Backoff::Fixed { delay },
            ..Self::default()
        }
    }

    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Returns the wait before the next attempt, or `None` when `error` after
    /// `attempt` (0-based) should be surfaced as-is.
    pub fn next_delay(&self, attempt: u32, error: &FetchError) -> Option<Duration> {
        if attempt >= self.max_retries {
            return None;
        }

        let retryable = match error.kind() {
            FetchErrorKind::Transport { retryable, .. } => self.retry_on_transport && *retryable,
            FetchErrorKind::Status { code } => self.retry_on_status.contains(code),
            _ => false,
        };

        retryable.then(|| self.backoff.delay(attempt))
    }
}
