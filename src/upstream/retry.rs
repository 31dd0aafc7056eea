//! Retry and backoff policy for upstream requests
//!
//! | Condition        | Delay before the next attempt                           |
//! |------------------|---------------------------------------------------------|
//! | HTTP 429         | `Retry-After` clamped to [1s, 120s], else 2s doubling, capped at 120s |
//! | HTTP 5xx         | 1s doubling, capped at 30s                              |
//! | Connect/timeout  | same as 5xx                                             |
//! | Other non-2xx    | no retry                                                |
//!
//! Every retryable condition gives up after `max_attempts` attempts in total.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Backoff constants for upstream requests
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts per request, the first one included
    pub max_attempts: u32,
    pub rate_limit_base: Duration,
    pub rate_limit_cap: Duration,
    pub retry_after_min: Duration,
    pub retry_after_max: Duration,
    pub server_error_base: Duration,
    pub server_error_cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            rate_limit_base: Duration::from_secs(2),
            rate_limit_cap: Duration::from_secs(120),
            retry_after_min: Duration::from_secs(1),
            retry_after_max: Duration::from_secs(120),
            server_error_base: Duration::from_secs(1),
            server_error_cap: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Default policy with a custom attempt ceiling
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Delay after the `attempt`-th (1-based) request was answered with 429
    pub fn rate_limit_delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        match retry_after {
            Some(hint) => hint.clamp(self.retry_after_min, self.retry_after_max),
            None => exponential(self.rate_limit_base, self.rate_limit_cap, attempt),
        }
    }

    /// Delay after the `attempt`-th (1-based) request failed with 5xx or a transport error
    pub fn server_error_delay(&self, attempt: u32) -> Duration {
        exponential(self.server_error_base, self.server_error_cap, attempt)
    }

    /// Returns true if another attempt is allowed after `attempt` attempts
    pub fn can_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

fn exponential(base: Duration, cap: Duration, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(31);
    base.checked_mul(1u32 << exponent)
        .map(|delay| delay.min(cap))
        .unwrap_or(cap)
}

/// Parses a `Retry-After` header: delta-seconds or an HTTP date
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    let date = DateTime::parse_from_rfc2822(value).ok()?;
    let wait = date.with_timezone(&Utc) - Utc::now();
    Some(wait.to_std().unwrap_or(Duration::ZERO))
}
