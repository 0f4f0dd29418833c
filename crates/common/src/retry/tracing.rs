//! Structured log lines for retried calls
//!
//! The executor emits every per-call event through a [`RetrySpan`] so the
//! field names stay consistent: `endpoint`, `policy`, `attempt`,
//! `delay_ms` and `category`.

use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::backoff::DelaySource;
use super::category::ErrorCategory;

/// Entry point for per-call retry logging
#[derive(Debug, Default, Clone, Copy)]
pub struct RetryTracer;

impl RetryTracer {
    pub fn new() -> Self {
        Self
    }

    /// Start logging one executor call
    pub fn start_retry_span(&self, endpoint: &str, policy: &str, max_attempts: u32) -> RetrySpan {
        debug!(endpoint = endpoint, policy = policy, max_attempts, "Starting retryable operation");
        RetrySpan { endpoint: endpoint.to_string(), policy: policy.to_string(), max_attempts }
    }
}

/// Logging context for one executor call
#[derive(Debug, Clone)]
pub struct RetrySpan {
    endpoint: String,
    policy: String,
    max_attempts: u32,
}

impl RetrySpan {
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn policy(&self) -> &str {
        &self.policy
    }

    /// An invocation is about to start; `attempt` is 0-based
    pub fn record_attempt(&self, attempt: u32, delay: Option<Duration>) {
        match delay {
            Some(delay) => debug!(
                endpoint = %self.endpoint,
                policy = %self.policy,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Retry attempt after delay"
            ),
            None => debug!(
                endpoint = %self.endpoint,
                policy = %self.policy,
                attempt,
                "Attempt"
            ),
        }
    }

    /// An attempt failed and another one will follow
    pub fn record_failure(
        &self,
        attempt: u32,
        category: ErrorCategory,
        error: &str,
        next_delay: Duration,
        source: DelaySource,
    ) {
        warn!(
            endpoint = %self.endpoint,
            policy = %self.policy,
            attempt,
            category = %category,
            delay_ms = next_delay.as_millis() as u64,
            delay_source = %source,
            error = %error,
            "Attempt failed, retrying"
        );
    }

    pub fn record_success(&self, attempts: u32, total_delay: Duration) {
        if attempts > 1 {
            info!(
                endpoint = %self.endpoint,
                policy = %self.policy,
                attempts,
                total_delay_ms = total_delay.as_millis() as u64,
                "Operation succeeded after retries"
            );
        } else {
            debug!(endpoint = %self.endpoint, policy = %self.policy, "Operation succeeded");
        }
    }

    /// The error's category is not retried by the policy
    pub fn record_non_retriable(&self, attempt: u32, category: ErrorCategory, error: &str) {
        debug!(
            endpoint = %self.endpoint,
            policy = %self.policy,
            attempt,
            category = %category,
            error = %error,
            "Non-retriable error"
        );
    }

    /// Every allowed attempt failed
    pub fn record_exhausted(&self, attempts: u32, category: ErrorCategory, error: &str) {
        error!(
            endpoint = %self.endpoint,
            policy = %self.policy,
            attempts,
            max_attempts = self.max_attempts,
            category = %category,
            error = %error,
            "All retry attempts failed"
        );
    }

    pub fn record_deadline(&self, attempt: u32, elapsed: Duration, limit: Duration) {
        warn!(
            endpoint = %self.endpoint,
            policy = %self.policy,
            attempt,
            elapsed_ms = elapsed.as_millis() as u64,
            limit_ms = limit.as_millis() as u64,
            "Retry deadline reached"
        );
    }

    pub fn record_circuit_open(&self, attempt: u32) {
        warn!(
            endpoint = %self.endpoint,
            policy = %self.policy,
            attempt,
            "Circuit breaker is open, not attempting"
        );
    }

    pub fn record_budget_exhausted(&self, attempt: u32) {
        warn!(
            endpoint = %self.endpoint,
            policy = %self.policy,
            attempt,
            "Retry budget exhausted, giving up"
        );
    }
}
