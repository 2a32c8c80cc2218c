// src/archive/retry.rs
// =============================================================================
// Exponential backoff schedule used by ArchiveClient.
//
// Attempt n (0-based) that fails transiently waits base * factor^n before the
// next attempt, never longer than `max_delay`. A Retry-After header sent with
// a 429 replaces the computed delay, still subject to the cap.
//
// Rust concepts:
// - Enums as decisions: RetryDecision says what to do, the caller does it
// - Duration: typed time spans instead of bare integers of unknown unit
// =============================================================================

use reqwest::header::{HeaderMap, RETRY_AFTER};
use std::time::Duration;

use crate::error::ErrorKind;

pub const DEFAULT_MAX_RETRIES: u32 = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; 3 means at most 4 requests
    pub max_retries: u32,
    pub base_delay: Duration,
    pub factor: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: Duration::from_secs(1),
            factor: 2.0,
            max_delay: Duration::from_secs(30),
        }
    }
}

/// What the request loop should do after a failed attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    RetryAfter(Duration),
    GiveUp,
}

impl RetryPolicy {
    /// Delay to wait after the failed attempt number `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let scale = self.factor.max(1.0).powi(attempt.min(i32::MAX as u32) as i32);
        let secs = self.base_delay.as_secs_f64() * scale;
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(secs)
        }
    }

    pub fn decide(&self, attempt: u32, error: &ErrorKind, retry_after: Option<Duration>) -> RetryDecision {
        if !error.is_transient() || attempt >= self.max_retries {
            return RetryDecision::GiveUp;
        }
        let delay = match (error, retry_after) {
            (ErrorKind::RateLimitExceeded, Some(hint)) => hint.min(self.max_delay),
            _ => self.delay_for(attempt),
        };
        RetryDecision::RetryAfter(delay)
    }
}

/// Reads a delay-seconds Retry-After header. HTTP-date values are ignored.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_default_schedule_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for(4), Duration::from_secs(16));
        assert_eq!(policy.delay_for(5), Duration::from_secs(30));
        assert_eq!(policy.delay_for(60), Duration::from_secs(30));
    }

    #[test]
    fn test_permanent_errors_are_not_retried() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.decide(0, &ErrorKind::ClientError(404), None),
            RetryDecision::GiveUp
        );
        assert_eq!(
            policy.decide(0, &ErrorKind::ParseError("x".into()), None),
            RetryDecision::GiveUp
        );
    }

    #[test]
    fn test_gives_up_when_budget_spent() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.decide(2, &ErrorKind::ServerError(503), None),
            RetryDecision::RetryAfter(Duration::from_secs(4))
        );
        assert_eq!(
            policy.decide(3, &ErrorKind::ServerError(503), None),
            RetryDecision::GiveUp
        );
    }

    #[test]
    fn test_retry_after_hint_is_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.decide(0, &ErrorKind::RateLimitExceeded, Some(Duration::from_secs(7))),
            RetryDecision::RetryAfter(Duration::from_secs(7))
        );
        assert_eq!(
            policy.decide(0, &ErrorKind::RateLimitExceeded, Some(Duration::from_secs(600))),
            RetryDecision::RetryAfter(Duration::from_secs(30))
        );
    }

    #[test]
    fn test_parse_retry_after() {
        let mut headers = HeaderMap::new();
        assert_eq!(parse_retry_after(&headers), None);

        headers.insert(RETRY_AFTER, HeaderValue::from_static("12"));
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(12)));

        headers.insert(RETRY_AFTER, HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"));
        assert_eq!(parse_retry_after(&headers), None);
    }
}
