use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::Quota;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::ValidationError;

type DirectRateLimiter = governor::RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Token-bucket shape: `burst` tokens of capacity, one token regained every
/// `refill_interval`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateQuota {
    pub refill_interval: Duration,
    pub burst: u32,
}

impl Default for RateQuota {
    fn default() -> Self {
        Self {
            refill_interval: Duration::from_millis(50),
            burst: 10,
        }
    }
}

impl RateQuota {
    fn to_governor(self) -> Result<Quota, ValidationError> {
        let burst = NonZeroU32::new(self.burst).ok_or(ValidationError::ZeroSetting {
            field: "rate_burst",
        })?;
        let quota = Quota::with_period(self.refill_interval).ok_or(
            ValidationError::ZeroSetting {
                field: "rate_refill_interval",
            },
        )?;
        Ok(quota.allow_burst(burst))
    }
}

/// Returned by [`RateLimiter::acquire`] when the caller's token was cancelled
/// before a permit became available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cancelled while waiting for rate limit permit")]
pub struct AcquireCancelled;

/// Process-wide token bucket shared by every fetch call site.
///
/// Clones share the same bucket.
#[derive(Clone)]
pub struct RateLimiter {
    limiter: Arc<DirectRateLimiter>,
    quota: RateQuota,
}

impl RateLimiter {
    pub fn new(quota: RateQuota) -> Result<Self, ValidationError> {
        Ok(Self {
            limiter: Arc::new(governor::RateLimiter::direct(quota.to_governor()?)),
            quota,
        })
    }

    pub const fn quota(&self) -> RateQuota {
        self.quota
    }

    /// Waits for a permit. Admission order between waiters is not guaranteed.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<(), AcquireCancelled> {
        if cancel.is_cancelled() {
            return Err(AcquireCancelled);
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AcquireCancelled),
            _ = self.limiter.until_ready() => Ok(()),
        }
    }

    /// Takes a permit only if one is immediately available.
    pub fn try_acquire(&self) -> bool {
        self.limiter.check().is_ok()
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("quota", &self.quota)
            .finish_non_exhaustive()
    }
}
