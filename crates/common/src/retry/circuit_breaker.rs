//! Per-endpoint circuit breaker
//!
//! State machine:
//!
//! ```text
//!            failures in window >= threshold
//!   CLOSED ---------------------------------> OPEN
//!     ^                                        |  recovery_timeout elapsed
//!     |  success_threshold successes           v  (checked lazily)
//!     +------------------------------------ HALF_OPEN
//!                                              |
//!                  any failure ----------------+--> OPEN
//! ```
//!
//! Failures are counted in a sliding window of timestamps, so a burst of old
//! failures does not keep counting against the endpoint. While half-open
//! only `half_open_max_attempts` probe calls are admitted.
//!
//! Every breaker guards its state with one `parking_lot::Mutex`; all
//! transitions happen under that lock. [`CircuitBreakerManager`] hands out
//! one shared breaker per endpoint.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::constants::*;
use crate::error::{CommonError, CommonResult};
use crate::testing::time::{Clock, SystemClock};
use crate::utils::serde::duration_millis;

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Calls flow normally
    Closed,
    /// Calls are rejected until the recovery timeout elapses
    Open,
    /// A limited number of probe calls test recovery
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Failures inside `failure_window` that open the circuit
    pub failure_threshold: u32,
    /// Sliding window for counting failures
    #[serde(with = "duration_millis")]
    pub failure_window: Duration,
    /// Time spent open before probing
    #[serde(with = "duration_millis")]
    pub recovery_timeout: Duration,
    /// Consecutive half-open successes that close the circuit
    pub success_threshold: u32,
    /// Probe calls admitted while half-open
    pub half_open_max_attempts: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            failure_window: DEFAULT_FAILURE_WINDOW,
            recovery_timeout: DEFAULT_RECOVERY_TIMEOUT,
            success_threshold: DEFAULT_SUCCESS_THRESHOLD,
            half_open_max_attempts: DEFAULT_HALF_OPEN_MAX_ATTEMPTS,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder::new()
    }

    /// Validate the configuration
    ///
    /// The success threshold may not exceed the probe allowance, otherwise a
    /// half-open breaker could never close.
    pub fn validate(&self) -> CommonResult<()> {
        if self.failure_threshold == 0 {
            return Err(CommonError::config_field(
                "failure_threshold",
                "failure_threshold must be greater than 0",
            ));
        }
        if self.failure_window.is_zero() {
            return Err(CommonError::config_field(
                "failure_window",
                "failure_window must be greater than 0",
            ));
        }
        if self.success_threshold == 0 {
            return Err(CommonError::config_field(
                "success_threshold",
                "success_threshold must be greater than 0",
            ));
        }
        if self.half_open_max_attempts == 0 {
            return Err(CommonError::config_field(
                "half_open_max_attempts",
                "half_open_max_attempts must be greater than 0",
            ));
        }
        if self.success_threshold > self.half_open_max_attempts {
            return Err(CommonError::config_field(
                "success_threshold",
                format!(
                    "success_threshold ({}) must not exceed half_open_max_attempts ({})",
                    self.success_threshold, self.half_open_max_attempts
                ),
            ));
        }
        Ok(())
    }
}

/// Builder for CircuitBreakerConfig
#[derive(Debug, Default)]
pub struct CircuitBreakerConfigBuilder {
    config: CircuitBreakerConfig,
}

impl CircuitBreakerConfigBuilder {
    pub fn new() -> Self {
        Self { config: CircuitBreakerConfig::default() }
    }

    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.config.failure_threshold = threshold;
        self
    }

    pub fn failure_window(mut self, window: Duration) -> Self {
        self.config.failure_window = window;
        self
    }

    pub fn recovery_timeout(mut self, timeout: Duration) -> Self {
        self.config.recovery_timeout = timeout;
        self
    }

    pub fn success_threshold(mut self, threshold: u32) -> Self {
        self.config.success_threshold = threshold;
        self
    }

    pub fn half_open_max_attempts(mut self, attempts: u32) -> Self {
        self.config.half_open_max_attempts = attempts;
        self
    }

    pub fn build(self) -> CommonResult<CircuitBreakerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Point-in-time view of one breaker
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CircuitBreakerStats {
    pub endpoint: String,
    pub state: CircuitState,
    pub failures_in_window: u32,
    pub failure_threshold: u32,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub half_open_probes: u32,
    pub total_successes: u64,
    pub total_failures: u64,
    pub rejected_calls: u64,
    #[serde(with = "duration_millis")]
    pub time_in_state: Duration,
}

impl fmt::Display for CircuitBreakerStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} for {:?} (failures in window {}/{}, consecutive successes {}, probes {}, \
             rejected {})",
            self.endpoint,
            self.state,
            self.time_in_state,
            self.failures_in_window,
            self.failure_threshold,
            self.consecutive_successes,
            self.half_open_probes,
            self.rejected_calls
        )
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failure_timestamps: VecDeque<Instant>,
    consecutive_successes: u32,
    consecutive_failures: u32,
    last_state_change_at: Instant,
    half_open_probes_issued: u32,
    total_successes: u64,
    total_failures: u64,
    rejected_calls: u64,
}

impl BreakerInner {
    fn new(now: Instant) -> Self {
        Self {
            state: CircuitState::Closed,
            failure_timestamps: VecDeque::new(),
            consecutive_successes: 0,
            consecutive_failures: 0,
            last_state_change_at: now,
            half_open_probes_issued: 0,
            total_successes: 0,
            total_failures: 0,
            rejected_calls: 0,
        }
    }

    fn transition(&mut self, endpoint: &str, to: CircuitState, now: Instant) {
        let from = self.state;
        self.state = to;
        self.last_state_change_at = now;
        match to {
            CircuitState::Open => {
                self.half_open_probes_issued = 0;
                warn!(
                    endpoint = endpoint,
                    from = %from,
                    recent_failures = self.failure_timestamps.len(),
                    "Circuit breaker opened"
                );
            }
            CircuitState::HalfOpen => {
                self.half_open_probes_issued = 0;
                self.consecutive_successes = 0;
                debug!(endpoint = endpoint, "Circuit breaker half-open, admitting probes");
            }
            CircuitState::Closed => {
                self.failure_timestamps.clear();
                self.consecutive_failures = 0;
                self.half_open_probes_issued = 0;
                info!(endpoint = endpoint, from = %from, "Circuit breaker closed");
            }
        }
    }

    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(oldest) = self.failure_timestamps.front() {
            if now.saturating_duration_since(*oldest) > window {
                self.failure_timestamps.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Circuit breaker for one endpoint
pub struct CircuitBreaker<C: Clock = SystemClock> {
    endpoint: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
    clock: C,
}

impl<C: Clock> fmt::Debug for CircuitBreaker<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("endpoint", &self.endpoint)
            .field("config", &self.config)
            .field("state", &self.inner.lock().state)
            .finish()
    }
}

impl CircuitBreaker<SystemClock> {
    pub fn new(endpoint: impl Into<String>, config: CircuitBreakerConfig) -> CommonResult<Self> {
        Self::with_clock(endpoint, config, SystemClock)
    }
}

impl<C: Clock> CircuitBreaker<C> {
    /// Create a breaker reading time from `clock`
    pub fn with_clock(
        endpoint: impl Into<String>,
        config: CircuitBreakerConfig,
        clock: C,
    ) -> CommonResult<Self> {
        config.validate()?;
        Ok(Self::from_validated(endpoint.into(), config, clock))
    }

    fn from_validated(endpoint: String, config: CircuitBreakerConfig, clock: C) -> Self {
        let now = clock.now();
        Self { endpoint, config, inner: Mutex::new(BreakerInner::new(now)), clock }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Whether a call may proceed now
    ///
    /// Moves OPEN to HALF_OPEN once the recovery timeout has elapsed. In
    /// HALF_OPEN each `true` consumes one probe slot.
    pub fn can_attempt(&self) -> bool {
        let now = self.clock.now();
        let mut inner = self.inner.lock();

        if inner.state == CircuitState::Open
            && now.saturating_duration_since(inner.last_state_change_at)
                >= self.config.recovery_timeout
        {
            inner.transition(&self.endpoint, CircuitState::HalfOpen, now);
        }

        let allowed = match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => false,
            CircuitState::HalfOpen => {
                if inner.half_open_probes_issued < self.config.half_open_max_attempts {
                    inner.half_open_probes_issued += 1;
                    true
                } else {
                    false
                }
            }
        };
        if !allowed {
            inner.rejected_calls += 1;
        }
        allowed
    }

    pub fn record_success(&self) {
        let now = self.clock.now();
        let mut inner = self.inner.lock();

        inner.total_successes += 1;
        inner.consecutive_failures = 0;
        inner.consecutive_successes = inner.consecutive_successes.saturating_add(1);

        if inner.state == CircuitState::HalfOpen
            && inner.consecutive_successes >= self.config.success_threshold
        {
            inner.transition(&self.endpoint, CircuitState::Closed, now);
        }
    }

    pub fn record_failure(&self) {
        let now = self.clock.now();
        let mut inner = self.inner.lock();

        inner.total_failures += 1;
        inner.failure_timestamps.push_back(now);
        inner.consecutive_successes = 0;
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        inner.prune(now, self.config.failure_window);

        match inner.state {
            CircuitState::Closed => {
                if inner.failure_timestamps.len() >= self.config.failure_threshold as usize {
                    inner.transition(&self.endpoint, CircuitState::Open, now);
                }
            }
            CircuitState::HalfOpen => inner.transition(&self.endpoint, CircuitState::Open, now),
            CircuitState::Open => {}
        }
    }

    /// Current state, without applying the lazy OPEN to HALF_OPEN move
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    pub fn stats(&self) -> CircuitBreakerStats {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        inner.prune(now, self.config.failure_window);

        CircuitBreakerStats {
            endpoint: self.endpoint.clone(),
            state: inner.state,
            failures_in_window: inner.failure_timestamps.len() as u32,
            failure_threshold: self.config.failure_threshold,
            consecutive_failures: inner.consecutive_failures,
            consecutive_successes: inner.consecutive_successes,
            half_open_probes: inner.half_open_probes_issued,
            total_successes: inner.total_successes,
            total_failures: inner.total_failures,
            rejected_calls: inner.rejected_calls,
            time_in_state: now.saturating_duration_since(inner.last_state_change_at),
        }
    }

    /// Force the breaker back to CLOSED with an empty history
    pub fn reset(&self) {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        *inner = BreakerInner::new(now);
        info!(endpoint = %self.endpoint, "Circuit breaker manually reset");
    }
}

/// Registry of breakers, one per endpoint, created on first use
pub struct CircuitBreakerManager<C: Clock + Clone = SystemClock> {
    default_config: CircuitBreakerConfig,
    endpoint_configs: HashMap<String, CircuitBreakerConfig>,
    breakers: DashMap<String, Arc<CircuitBreaker<C>>>,
    clock: C,
}

impl<C: Clock + Clone> fmt::Debug for CircuitBreakerManager<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreakerManager")
            .field("default_config", &self.default_config)
            .field("endpoint_configs", &self.endpoint_configs)
            .field("breakers", &self.breakers.len())
            .finish()
    }
}

impl CircuitBreakerManager<SystemClock> {
    pub fn new(config: CircuitBreakerConfig) -> CommonResult<Self> {
        Self::with_clock(config, SystemClock)
    }
}

impl Default for CircuitBreakerManager<SystemClock> {
    fn default() -> Self {
        Self {
            default_config: CircuitBreakerConfig::default(),
            endpoint_configs: HashMap::new(),
            breakers: DashMap::new(),
            clock: SystemClock,
        }
    }
}

impl<C: Clock + Clone> CircuitBreakerManager<C> {
    pub fn with_clock(config: CircuitBreakerConfig, clock: C) -> CommonResult<Self> {
        config.validate()?;
        Ok(Self {
            default_config: config,
            endpoint_configs: HashMap::new(),
            breakers: DashMap::new(),
            clock,
        })
    }

    /// Use a dedicated configuration for one endpoint
    pub fn with_endpoint_config(
        mut self,
        endpoint: impl Into<String>,
        config: CircuitBreakerConfig,
    ) -> CommonResult<Self> {
        config.validate()?;
        self.endpoint_configs.insert(endpoint.into(), config);
        Ok(self)
    }

    /// Configuration that applies to `endpoint`
    pub fn config_for(&self, endpoint: &str) -> &CircuitBreakerConfig {
        self.endpoint_configs.get(endpoint).unwrap_or(&self.default_config)
    }

    /// Shared breaker for `endpoint`, created CLOSED on first use
    pub fn breaker(&self, endpoint: &str) -> Arc<CircuitBreaker<C>> {
        if let Some(existing) = self.breakers.get(endpoint) {
            return Arc::clone(existing.value());
        }
        let entry = self.breakers.entry(endpoint.to_string()).or_insert_with(|| {
            debug!(endpoint = endpoint, "Creating circuit breaker");
            Arc::new(CircuitBreaker::from_validated(
                endpoint.to_string(),
                self.config_for(endpoint).clone(),
                self.clock.clone(),
            ))
        });
        Arc::clone(entry.value())
    }

    pub fn can_attempt(&self, endpoint: &str) -> bool {
        self.breaker(endpoint).can_attempt()
    }

    pub fn record_success(&self, endpoint: &str) {
        self.breaker(endpoint).record_success();
    }

    pub fn record_failure(&self, endpoint: &str) {
        self.breaker(endpoint).record_failure();
    }

    /// State of `endpoint`; endpoints never seen are CLOSED
    pub fn state(&self, endpoint: &str) -> CircuitState {
        self.breakers.get(endpoint).map(|b| b.state()).unwrap_or(CircuitState::Closed)
    }

    pub fn stats(&self, endpoint: &str) -> Option<CircuitBreakerStats> {
        self.breakers.get(endpoint).map(|b| b.stats())
    }

    /// Stats of every known breaker, sorted by endpoint
    pub fn all_stats(&self) -> Vec<CircuitBreakerStats> {
        let mut stats: Vec<_> = self.breakers.iter().map(|entry| entry.value().stats()).collect();
        stats.sort_by(|a, b| a.endpoint.cmp(&b.endpoint));
        stats
    }

    /// Reset one breaker; returns `false` if the endpoint was never used
    pub fn reset(&self, endpoint: &str) -> bool {
        match self.breakers.get(endpoint) {
            Some(breaker) => {
                breaker.reset();
                true
            }
            None => false,
        }
    }

    pub fn reset_all(&self) {
        for entry in self.breakers.iter() {
            entry.value().reset();
        }
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for retry::circuit_breaker.
    use super::*;
    use crate::testing::MockClock;

    fn breaker(clock: &MockClock) -> CircuitBreaker<MockClock> {
        CircuitBreaker::with_clock("runs", CircuitBreakerConfig::default(), clock.clone()).unwrap()
    }

    fn open(breaker: &CircuitBreaker<MockClock>) {
        for _ in 0..DEFAULT_FAILURE_THRESHOLD {
            breaker.record_failure();
        }
    }

    /// Validates `CircuitBreakerConfig::validate` behavior for the invalid
    /// values scenario.
    ///
    /// Assertions:
    /// - Ensures zero thresholds and a zero window are rejected.
    /// - Ensures a success threshold above the probe allowance is rejected.
    #[test]
    fn test_config_validation() {
        assert!(CircuitBreakerConfig::default().validate().is_ok());
        assert!(CircuitBreakerConfig::builder().failure_threshold(0).build().is_err());
        assert!(CircuitBreakerConfig::builder().failure_window(Duration::ZERO).build().is_err());
        assert!(CircuitBreakerConfig::builder().success_threshold(0).build().is_err());
        assert!(CircuitBreakerConfig::builder().half_open_max_attempts(0).build().is_err());

        let err = CircuitBreakerConfig::builder()
            .success_threshold(4)
            .half_open_max_attempts(3)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("half_open_max_attempts"));
    }

    /// Validates `CircuitBreaker::record_failure` behavior for the
    /// threshold scenario.
    ///
    /// Assertions:
    /// - Confirms the breaker stays CLOSED below the threshold.
    /// - Confirms it opens at the threshold and rejects calls.
    #[test]
    fn test_opens_at_threshold() {
        let clock = MockClock::new();
        let breaker = breaker(&clock);

        for _ in 0..DEFAULT_FAILURE_THRESHOLD - 1 {
            breaker.record_failure();
        }
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.can_attempt());

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.can_attempt());
        assert_eq!(breaker.stats().rejected_calls, 1);
    }

    /// Validates the sliding failure window scenario.
    ///
    /// Assertions:
    /// - Ensures failures older than the window do not count toward the
    ///   threshold.
    #[test]
    fn test_failures_outside_window_are_pruned() {
        let clock = MockClock::new();
        let breaker = breaker(&clock);

        for _ in 0..4 {
            breaker.record_failure();
        }
        clock.advance(Duration::from_secs(61));
        breaker.record_failure();

        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.stats().failures_in_window, 1);
        assert_eq!(breaker.stats().consecutive_failures, 5);
    }

    /// Validates the recovery scenario.
    ///
    /// Assertions:
    /// - Ensures the breaker stays OPEN before the recovery timeout.
    /// - Confirms it becomes HALF_OPEN and admits a probe afterwards.
    /// - Confirms `success_threshold` successes close it.
    #[test]
    fn test_half_open_recovery() {
        let clock = MockClock::new();
        let breaker = breaker(&clock);
        open(&breaker);

        clock.advance(Duration::from_secs(29));
        assert!(!breaker.can_attempt());
        assert_eq!(breaker.state(), CircuitState::Open);

        clock.advance(Duration::from_secs(1));
        assert!(breaker.can_attempt());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.stats().failures_in_window, 0);
    }

    /// Validates the half-open failure scenario.
    ///
    /// Assertions:
    /// - Confirms any failure while HALF_OPEN reopens the breaker.
    /// - Confirms the recovery timer restarts from the reopening.
    #[test]
    fn test_half_open_failure_reopens() {
        let clock = MockClock::new();
        let breaker = breaker(&clock);
        open(&breaker);

        clock.advance(DEFAULT_RECOVERY_TIMEOUT);
        assert!(breaker.can_attempt());
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.can_attempt());

        clock.advance(DEFAULT_RECOVERY_TIMEOUT);
        assert!(breaker.can_attempt());
    }

    /// Validates the half-open probe limit scenario.
    ///
    /// Assertions:
    /// - Confirms only `half_open_max_attempts` probes are admitted.
    #[test]
    fn test_half_open_probe_limit() {
        let clock = MockClock::new();
        let breaker = breaker(&clock);
        open(&breaker);
        clock.advance(DEFAULT_RECOVERY_TIMEOUT);

        let admitted = (0..10).filter(|_| breaker.can_attempt()).count();
        assert_eq!(admitted, DEFAULT_HALF_OPEN_MAX_ATTEMPTS as usize);
        assert_eq!(breaker.stats().half_open_probes, DEFAULT_HALF_OPEN_MAX_ATTEMPTS);
    }

    /// Validates `CircuitBreaker::reset` behavior for the manual reset
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms an OPEN breaker is CLOSED with empty history after reset.
    #[test]
    fn test_reset() {
        let clock = MockClock::new();
        let breaker = breaker(&clock);
        open(&breaker);

        breaker.reset();
        let stats = breaker.stats();
        assert_eq!(stats.state, CircuitState::Closed);
        assert_eq!(stats.failures_in_window, 0);
        assert_eq!(stats.total_failures, 0);
        assert!(breaker.can_attempt());
    }

    /// Validates `CircuitBreakerStats` display formatting.
    ///
    /// Assertions:
    /// - Ensures the rendered line names the endpoint, state and counts.
    #[test]
    fn test_stats_display() {
        let clock = MockClock::new();
        let breaker = breaker(&clock);
        breaker.record_failure();

        let rendered = breaker.stats().to_string();
        assert!(rendered.starts_with("runs: CLOSED"));
        assert!(rendered.contains("failures in window 1/5"));
    }

    /// Validates `CircuitBreakerManager::breaker` behavior for the shared
    /// instance scenario.
    ///
    /// Assertions:
    /// - Confirms the same endpoint yields the same breaker.
    /// - Confirms endpoints are isolated from one another.
    /// - Confirms unknown endpoints report CLOSED and no stats.
    #[test]
    fn test_manager_isolation() {
        let clock = MockClock::new();
        let manager =
            CircuitBreakerManager::with_clock(CircuitBreakerConfig::default(), clock.clone())
                .unwrap();

        let first = manager.breaker("x");
        let second = manager.breaker("x");
        assert!(Arc::ptr_eq(&first, &second));

        for _ in 0..5 {
            manager.record_failure("x");
        }
        assert_eq!(manager.state("x"), CircuitState::Open);
        assert!(!manager.can_attempt("x"));
        assert!(manager.can_attempt("y"));
        assert_eq!(manager.state("never_seen"), CircuitState::Closed);
        assert!(manager.stats("never_seen").is_none());

        let all = manager.all_stats();
        assert_eq!(all.iter().map(|s| s.endpoint.as_str()).collect::<Vec<_>>(), vec!["x", "y"]);

        assert!(manager.reset("x"));
        assert!(!manager.reset("never_seen"));
        assert_eq!(manager.state("x"), CircuitState::Closed);
    }

    /// Validates `CircuitBreakerManager::with_endpoint_config` behavior for
    /// the per-endpoint override scenario.
    ///
    /// Assertions:
    /// - Confirms the overridden endpoint opens after one failure.
    /// - Confirms `reset_all` closes every breaker.
    #[test]
    fn test_manager_endpoint_config() {
        let clock = MockClock::new();
        let strict = CircuitBreakerConfig::builder()
            .failure_threshold(1)
            .success_threshold(1)
            .half_open_max_attempts(1)
            .build()
            .unwrap();
        let manager =
            CircuitBreakerManager::with_clock(CircuitBreakerConfig::default(), clock.clone())
                .unwrap()
                .with_endpoint_config("update_metric_setting", strict)
                .unwrap();

        manager.record_failure("update_metric_setting");
        manager.record_failure("runs");
        assert_eq!(manager.state("update_metric_setting"), CircuitState::Open);
        assert_eq!(manager.state("runs"), CircuitState::Closed);
        assert_eq!(manager.config_for("update_metric_setting").failure_threshold, 1);

        manager.reset_all();
        assert_eq!(manager.state("update_metric_setting"), CircuitState::Closed);
    }

    /// Validates concurrent failure recording.
    ///
    /// Assertions:
    /// - Confirms no failure is lost when many threads record at once.
    #[test]
    fn test_concurrent_failures_are_counted() {
        let clock = MockClock::new();
        let config = CircuitBreakerConfig::builder().failure_threshold(10_000).build().unwrap();
        let breaker = Arc::new(CircuitBreaker::with_clock("runs", config, clock).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let breaker = Arc::clone(&breaker);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        breaker.record_failure();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(breaker.stats().total_failures, 800);
        assert_eq!(breaker.stats().failures_in_window, 800);
    }
}
