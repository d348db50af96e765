//! Retry with exponential backoff and bounded jitter.
//!
//! Delay for attempt `n` (0-based) is `min(base * 2^n, max)` plus a jitter of
//! at most `jitter_percent` of that step, capped at `max`. With
//! `jitter_percent <= 100` the worst case of step `n` never exceeds the best
//! case of step `n + 1`, so the schedule is non-decreasing.
//!
//! A rate-limited failure that carries a provider wait skips the schedule and
//! sleeps for exactly that wait plus `rate_limit_buffer`.

use super::RetryableError;
use chrono::{DateTime, Utc};
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use std::time::Duration;

/// Backoff configuration. Deserializes from the `[retry]` config section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first call.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Upper bound of jitter as a percentage of the current step (0-100).
    pub jitter_percent: u32,
    /// Added to every provider-dictated wait.
    pub rate_limit_buffer_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
            jitter_percent: 25,
            rate_limit_buffer_ms: 250,
        }
    }
}

impl RetryPolicy {
    /// Exponential step for `attempt`, before jitter.
    #[must_use]
    pub fn step_ms(&self, attempt: u32) -> u64 {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        self.base_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms)
    }

    /// Largest jitter allowed on top of `step_ms(attempt)`.
    #[must_use]
    pub fn max_jitter_ms(&self, attempt: u32) -> u64 {
        self.step_ms(attempt) * u64::from(self.jitter_percent.min(100)) / 100
    }
}

type Sleeper = Box<dyn Fn(Duration) + Send + Sync>;

/// Runs fallible operations under a [`RetryPolicy`].
pub struct Retrier {
    policy: RetryPolicy,
    sleeper: Sleeper,
}

impl std::fmt::Debug for Retrier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retrier")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl Retrier {
    /// A retrier that blocks the current thread between attempts.
    #[must_use]
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            sleeper: Box::new(std::thread::sleep),
        }
    }

    /// Replace the sleep function (tests record delays instead of waiting).
    #[must_use]
    pub fn with_sleeper(mut self, sleeper: impl Fn(Duration) + Send + Sync + 'static) -> Self {
        self.sleeper = Box::new(sleeper);
        self
    }

    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Backoff delay after failed attempt `attempt` (0-based), jitter included.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let step = self.policy.step_ms(attempt);
        let max_jitter = self.policy.max_jitter_ms(attempt);
        let jitter = if max_jitter > 0 {
            rand::rng().random_range(0..=max_jitter)
        } else {
            0
        };
        Duration::from_millis(step.saturating_add(jitter).min(self.policy.max_delay_ms))
    }

    /// Retry `op` while its error reports [`RetryableError::is_retryable`].
    ///
    /// `op` receives the 0-based attempt number.
    pub fn retry<T, E, F>(&self, op: F) -> Result<T, E>
    where
        E: RetryableError,
        F: FnMut(u32) -> Result<T, E>,
    {
        self.retry_if(op, E::is_retryable)
    }

    /// Retry `op` while `should_retry` accepts its error.
    pub fn retry_if<T, E, F, P>(&self, mut op: F, should_retry: P) -> Result<T, E>
    where
        E: RetryableError,
        F: FnMut(u32) -> Result<T, E>,
        P: Fn(&E) -> bool,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(e) => {
                    let last = attempt + 1 >= max_attempts;
                    if last || !should_retry(&e) {
                        if last {
                            tracing::warn!(attempts = attempt + 1, error = %e, "giving up after retries");
                        }
                        return Err(e);
                    }

                    let delay = match e.retry_after(Utc::now()) {
                        Some(wait) => {
                            wait + Duration::from_millis(self.policy.rate_limit_buffer_ms)
                        }
                        None => self.delay_for(attempt),
                    };
                    tracing::warn!(
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "call failed, retrying after backoff"
                    );
                    (self.sleeper)(delay);
                    attempt += 1;
                }
            }
        }
    }
}

// =============================================================================
// RETRY HINT PARSING
// =============================================================================

static RE_HTTP_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)retry-after:\s*([a-z]{3},\s*\d{1,2}\s+[a-z]{3}\s+\d{4}\s+\d{2}:\d{2}:\d{2}\s+GMT)")
        .expect("valid http-date regex")
});
static RE_SECONDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)retry[- _]after:?\s*(\d+)").expect("valid retry-after regex")
});
static RE_TRY_AGAIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)try again in\s*(\d+)(?:\.(\d+))?\s*(ms|milliseconds?|s|secs?|seconds?|m|mins?|minutes?)\b")
        .expect("valid try-again regex")
});
static RE_RETRY_AT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)retry at:?\s*(\d{4}-\d{2}-\d{2}T[0-9:.]+(?:Z|[+-]\d{2}:\d{2}))")
        .expect("valid retry-at regex")
});

/// Milliseconds in `whole.frac` of a unit worth `unit_ms`, without floats.
fn fractional_ms(whole: &str, frac: Option<&str>, unit_ms: u64) -> Option<u64> {
    let whole: u64 = whole.parse().ok()?;
    let mut total = whole.checked_mul(unit_ms)?;
    if let Some(frac) = frac {
        // Keep three decimal places; enough for millisecond precision.
        let digits: String = frac.chars().take(3).collect();
        let scale = 10u64.pow(digits.len() as u32);
        let value: u64 = digits.parse().ok()?;
        total = total.checked_add(value * unit_ms / scale)?;
    }
    Some(total)
}

fn until(at: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (at - now).to_std().unwrap_or(Duration::ZERO)
}

/// Extract a provider-dictated wait from an error message or header dump.
///
/// Understands `Retry-After: <secs>`, `Retry-After: <HTTP-date>`,
/// `retry after N seconds`, `try again in N(.N)s` / `ms` / `m` and
/// `retry at <RFC 3339>`. A time in the past yields a zero wait.
#[must_use]
pub fn parse_retry_after(text: &str, now: DateTime<Utc>) -> Option<Duration> {
    if let Some(caps) = RE_HTTP_DATE.captures(text) {
        let at = DateTime::parse_from_rfc2822(&caps[1]).ok()?;
        return Some(until(at.with_timezone(&Utc), now));
    }
    if let Some(caps) = RE_SECONDS.captures(text) {
        let secs: u64 = caps[1].parse().ok()?;
        return Some(Duration::from_secs(secs));
    }
    if let Some(caps) = RE_TRY_AGAIN.captures(text) {
        let unit = caps[3].to_ascii_lowercase();
        let unit_ms = if unit.starts_with("ms") || unit.starts_with("milli") {
            1
        } else if unit.starts_with('m') {
            60_000
        } else {
            1_000
        };
        let ms = fractional_ms(&caps[1], caps.get(2).map(|m| m.as_str()), unit_ms)?;
        return Some(Duration::from_millis(ms));
    }
    if let Some(caps) = RE_RETRY_AT.captures(text) {
        let at = DateTime::parse_from_rfc3339(&caps[1]).ok()?;
        return Some(until(at.with_timezone(&Utc), now));
    }
    None
}

// =============================================================================
// TESTS
// =============================================================================
