//! Global pacing for outbound forum API calls.

use std::fmt;
use std::num::NonZeroU32;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::Quota;

type DirectLimiter = governor::RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Shared pacing limiter.
///
/// Caps the aggregate rate of all callers at one call per `interval`,
/// regardless of how many workers run concurrently. Waiting callers hold no
/// lock, so only the pacing is serialized, never the request itself.
pub struct RateLimiter {
    interval: Duration,
    /// `None` when pacing is disabled.
    inner: Option<DirectLimiter>,
}

impl RateLimiter {
    /// Create a limiter allowing one call per `interval`, with no burst.
    ///
    /// A zero interval disables pacing.
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        let inner = Quota::with_period(interval)
            .map(|quota| DirectLimiter::direct(quota.allow_burst(NonZeroU32::MIN)));
        Self { interval, inner }
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait until the caller may issue its next call.
    ///
    /// The first call after creation (or after an idle period longer than the
    /// interval) proceeds immediately.
    pub async fn acquire(&self) {
        if let Some(limiter) = &self.inner {
            limiter.until_ready().await;
        }
    }
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("interval", &self.interval)
            .field("enabled", &self.inner.is_some())
            .finish()
    }
}
