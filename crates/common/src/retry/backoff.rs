//! Backoff delay calculation and `Retry-After` parsing
//!
//! Everything here is pure apart from [`sleep`] and the random draw in
//! [`backoff_delay`]. Delays are exponential in the attempt index, capped at
//! the policy's `max_delay`, and spread by symmetric jitter:
//!
//! ```text
//! base  = min(base_delay * 2^attempt, max_delay)
//! delay = base * (1 + u),  u ~ U[-jitter_factor, +jitter_factor]
//! ```
//!
//! A server-supplied `Retry-After` header takes precedence when the policy
//! respects it.

use std::fmt;
use std::time::{Duration, Instant, SystemTime};

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::constants::MAX_BACKOFF_EXPONENT;
use super::policies::RetryPolicy;
#[cfg(feature = "runtime")]
use crate::testing::time::Clock;

/// RFC 850 date, e.g. `Sunday, 06-Nov-94 08:49:37 GMT`
const RFC850_FORMAT: &str = "%A, %d-%b-%y %H:%M:%S GMT";

/// ANSI C `asctime()` date, e.g. `Sun Nov  6 08:49:37 1994`
const ASCTIME_FORMAT: &str = "%a %b %e %H:%M:%S %Y";

/// Where a retry delay came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelaySource {
    /// `Retry-After: <seconds>`
    HeaderSeconds,
    /// `Retry-After: <http-date>`
    HeaderDate,
    /// Computed exponential backoff
    Exponential,
}

impl fmt::Display for DelaySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HeaderSeconds => write!(f, "header_seconds"),
            Self::HeaderDate => write!(f, "header_date"),
            Self::Exponential => write!(f, "exponential"),
        }
    }
}

/// A parsed `Retry-After` header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryAfter {
    pub delay: Duration,
    pub source: DelaySource,
    pub original_value: String,
}

/// The delay chosen before the next attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryDelay {
    pub delay: Duration,
    pub source: DelaySource,
}

/// Un-jittered delay for `attempt` (0-based), capped at `max_delay`
pub fn exponential_delay(attempt: u32, policy: &RetryPolicy) -> Duration {
    let exponent = attempt.min(MAX_BACKOFF_EXPONENT);
    let multiplier = 2_u32.saturating_pow(exponent);
    policy
        .base_delay
        .checked_mul(multiplier)
        .unwrap_or(policy.max_delay)
        .min(policy.max_delay)
}

/// Exponential backoff with symmetric jitter
///
/// With `jitter_factor == 0` the result is exactly
/// `min(base_delay * 2^attempt, max_delay)`. Otherwise it lies in
/// `[base * (1 - j), base * (1 + j)]` and is rounded to whole milliseconds
/// whenever the rounded value stays inside that band.
pub fn backoff_delay(attempt: u32, policy: &RetryPolicy) -> Duration {
    let base = exponential_delay(attempt, policy);
    apply_jitter(base, policy.jitter_factor)
}

fn apply_jitter(base: Duration, jitter_factor: f64) -> Duration {
    let jitter = if jitter_factor.is_nan() { 0.0 } else { jitter_factor.clamp(0.0, 1.0) };
    if jitter == 0.0 || base.is_zero() {
        return base;
    }

    let lower = scale(base, 1.0 - jitter);
    let upper = scale(base, 1.0 + jitter);
    let offset = rand::thread_rng().gen_range(-jitter..=jitter);
    let jittered = scale(base, 1.0 + offset).clamp(lower, upper);

    let rounded = Duration::from_millis((jittered.as_secs_f64() * 1000.0).round() as u64);
    if (lower..=upper).contains(&rounded) {
        rounded
    } else {
        jittered
    }
}

/// `base * factor` for a non-negative factor, saturating at `Duration::MAX`
fn scale(base: Duration, factor: f64) -> Duration {
    Duration::try_from_secs_f64(base.as_secs_f64() * factor).unwrap_or(Duration::MAX)
}

/// Parse a `Retry-After` header value against the current wall clock
///
/// Accepts integer seconds or an HTTP date (IMF-fixdate, RFC 850, asctime).
/// Dates in the past yield a zero delay. Empty, negative, fractional and
/// malformed values yield `None`.
///
/// ```
/// use std::time::Duration;
///
/// use deepsource_common::retry::{parse_retry_after, DelaySource};
///
/// let parsed = parse_retry_after(Some("120")).unwrap();
/// assert_eq!(parsed.delay, Duration::from_secs(120));
/// assert_eq!(parsed.source, DelaySource::HeaderSeconds);
/// assert!(parse_retry_after(Some("-5")).is_none());
/// ```
pub fn parse_retry_after(value: Option<&str>) -> Option<RetryAfter> {
    parse_retry_after_at(value, SystemTime::now())
}

/// [`parse_retry_after`] evaluated at `now`
pub fn parse_retry_after_at(value: Option<&str>, now: SystemTime) -> Option<RetryAfter> {
    let original = value?;
    let trimmed = original.trim();
    if trimmed.is_empty() {
        return None;
    }

    if trimmed.bytes().all(|b| b.is_ascii_digit()) {
        let seconds = trimmed.parse::<u64>().ok()?;
        return Some(RetryAfter {
            delay: Duration::from_secs(seconds),
            source: DelaySource::HeaderSeconds,
            original_value: original.to_string(),
        });
    }

    let target = parse_http_date(trimmed)?;
    Some(RetryAfter {
        delay: target.duration_since(now).unwrap_or(Duration::ZERO),
        source: DelaySource::HeaderDate,
        original_value: original.to_string(),
    })
}

fn parse_http_date(value: &str) -> Option<SystemTime> {
    if let Ok(date) = DateTime::parse_from_rfc2822(value) {
        return Some(SystemTime::from(date));
    }
    [RFC850_FORMAT, ASCTIME_FORMAT]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| SystemTime::from(Utc.from_utc_datetime(&naive)))
}

/// Delay before retrying after failed attempt `attempt`
///
/// A parsable `Retry-After` header wins when the policy respects it, capped
/// at `max_delay`; otherwise jittered exponential backoff is used.
pub fn retry_delay(attempt: u32, policy: &RetryPolicy, retry_after: Option<&str>) -> RetryDelay {
    retry_delay_at(attempt, policy, retry_after, SystemTime::now())
}

/// [`retry_delay`] with HTTP dates evaluated at `now`
pub fn retry_delay_at(
    attempt: u32,
    policy: &RetryPolicy,
    retry_after: Option<&str>,
    now: SystemTime,
) -> RetryDelay {
    if policy.respect_retry_after {
        if let Some(parsed) = parse_retry_after_at(retry_after, now) {
            return RetryDelay { delay: parsed.delay.min(policy.max_delay), source: parsed.source };
        }
    }
    RetryDelay { delay: backoff_delay(attempt, policy), source: DelaySource::Exponential }
}

/// Upper bound on the sleep time a policy can accumulate
///
/// Sum of the capped exponential delays plus the worst-case jitter
/// (`max_delay * jitter_factor` per retry).
pub fn max_total_delay(policy: &RetryPolicy) -> Duration {
    let exponential = (0..policy.max_attempts)
        .map(|attempt| exponential_delay(attempt, policy))
        .fold(Duration::ZERO, Duration::saturating_add);
    let jitter_ms = (policy.max_delay.as_millis() as f64 * policy.jitter_factor.max(0.0)).round();
    let jitter = Duration::from_millis(jitter_ms as u64).saturating_mul(policy.max_attempts);
    exponential.saturating_add(jitter)
}

/// Whether a call started at `start` is still inside `max_duration`
pub fn can_continue_retrying(start: Instant, max_duration: Duration) -> bool {
    start.elapsed() < max_duration
}

/// [`can_continue_retrying`] measured with `clock`
#[cfg(feature = "runtime")]
pub fn can_continue_retrying_with<C: Clock>(
    clock: &C,
    start: Instant,
    max_duration: Duration,
) -> bool {
    clock.now().saturating_duration_since(start) < max_duration
}

/// Suspend for `delay`; a zero delay returns without yielding
#[cfg(feature = "runtime")]
pub async fn sleep(delay: Duration) {
    if delay.is_zero() {
        return;
    }
    tokio::time::sleep(delay).await;
}
