// src/archive/rate_limit.rs
// =============================================================================
// Shared request throttle for every call made against the archive.
//
// The archive is a public service that answers with 429s (or silently drops
// connections) when hammered, so all workers share one limiter. The limiter
// is a token bucket from the `governor` crate with a burst of exactly one:
// a request is admitted only once a full period has elapsed since the last
// admission, so no rolling one-second window ever sees more than the
// configured rate, however many workers are waiting.
// =============================================================================

use governor::{Quota, RateLimiter as GovernorLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

type DirectLimiter = GovernorLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Cheap to clone; clones share the same bucket.
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<DirectLimiter>,
    period: Duration,
}

impl RateLimiter {
    /// Builds a limiter admitting `requests_per_second` requests per second.
    ///
    /// Fractional rates are allowed (0.2 = one request every five seconds).
    /// Returns None for any rate `period_for` refuses.
    pub fn per_second(requests_per_second: f64) -> Option<Self> {
        let period = period_for(requests_per_second)?;
        let quota = Quota::with_period(period)?.allow_burst(NonZeroU32::MIN);

        Some(Self {
            inner: Arc::new(GovernorLimiter::direct(quota)),
            period,
        })
    }

    /// Waits until one more request fits under the configured rate.
    ///
    /// Never fails; callers from any number of tasks may wait concurrently.
    pub async fn acquire(&self) {
        self.inner.until_ready().await;
    }

    /// Minimum spacing between two admitted requests
    pub fn period(&self) -> Duration {
        self.period
    }
}

/// Spacing between two requests at `requests_per_second`.
///
/// None when the rate is zero, negative or non-finite, or so extreme that the
/// spacing rounds to nothing or overflows the nanosecond clock the limiter
/// counts in (e.g. 1e12 or 1e-20 requests per second).
pub fn period_for(requests_per_second: f64) -> Option<Duration> {
    if !requests_per_second.is_finite() || requests_per_second <= 0.0 {
        return None;
    }
    // try_ variant: 1.0 / tiny rates exceed Duration::MAX instead of panicking
    let period = Duration::try_from_secs_f64(1.0 / requests_per_second).ok()?;
    if period.is_zero() || period.as_nanos() > u128::from(u64::MAX) {
        return None;
    }
    Some(period)
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("period", &self.period)
            .finish()
    }
}
