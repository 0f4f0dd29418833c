// Retry budget to prevent retry storms against a struggling endpoint
//
// Each endpoint may spend `capacity` retries per fixed window. The window
// rolls lazily: whichever call first observes that it has elapsed starts a
// fresh one. First attempts never touch the budget, only retries do.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::constants::{DEFAULT_BUDGET_CAPACITY, DEFAULT_BUDGET_WINDOW};
use crate::error::{CommonError, CommonResult};
use crate::testing::time::{Clock, SystemClock};
use crate::utils::serde::duration_millis;

/// Retries allowed per window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryBudgetConfig {
    pub capacity: u32,
    #[serde(with = "duration_millis")]
    pub window: Duration,
}

impl Default for RetryBudgetConfig {
    fn default() -> Self {
        Self { capacity: DEFAULT_BUDGET_CAPACITY, window: DEFAULT_BUDGET_WINDOW }
    }
}

impl RetryBudgetConfig {
    pub fn new(capacity: u32, window: Duration) -> Self {
        Self { capacity, window }
    }

    /// A zero capacity is allowed and disables retries; a zero window is not
    pub fn validate(&self) -> CommonResult<()> {
        if self.window.is_zero() {
            return Err(CommonError::config_field("window", "retry budget window must be non-zero"));
        }
        Ok(())
    }
}

/// Point-in-time view of one budget
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetryBudgetStats {
    pub endpoint: String,
    pub consumed: u32,
    pub capacity: u32,
    pub remaining: u32,
    #[serde(with = "duration_millis")]
    pub window: Duration,
    /// Time until the current window rolls
    #[serde(with = "duration_millis")]
    pub resets_in: Duration,
    pub denied: u64,
}

impl fmt::Display for RetryBudgetStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}/{} retries used, resets in {:?}",
            self.endpoint, self.consumed, self.capacity, self.resets_in
        )
    }
}

#[derive(Debug)]
struct BudgetWindow {
    consumed: u32,
    started_at: Instant,
    denied: u64,
}

impl BudgetWindow {
    fn roll_if_elapsed(&mut self, now: Instant, window: Duration) {
        if now.saturating_duration_since(self.started_at) >= window {
            self.consumed = 0;
            self.started_at = now;
        }
    }
}

/// Windowed retry allowance for one endpoint
pub struct RetryBudget<C: Clock = SystemClock> {
    endpoint: String,
    config: RetryBudgetConfig,
    window: Mutex<BudgetWindow>,
    clock: C,
}

impl<C: Clock> fmt::Debug for RetryBudget<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryBudget")
            .field("endpoint", &self.endpoint)
            .field("config", &self.config)
            .field("consumed", &self.window.lock().consumed)
            .finish()
    }
}

impl RetryBudget<SystemClock> {
    pub fn new(endpoint: impl Into<String>, config: RetryBudgetConfig) -> CommonResult<Self> {
        Self::with_clock(endpoint, config, SystemClock)
    }
}

impl<C: Clock> RetryBudget<C> {
    /// Create a budget with a custom clock (for testing)
    pub fn with_clock(
        endpoint: impl Into<String>,
        config: RetryBudgetConfig,
        clock: C,
    ) -> CommonResult<Self> {
        config.validate()?;
        Ok(Self::from_validated(endpoint.into(), config, clock))
    }

    fn from_validated(endpoint: String, config: RetryBudgetConfig, clock: C) -> Self {
        let started_at = clock.now();
        Self {
            endpoint,
            config,
            window: Mutex::new(BudgetWindow { consumed: 0, started_at, denied: 0 }),
            clock,
        }
    }

    /// Whether a retry would currently be allowed, without spending it
    pub fn can_retry(&self) -> bool {
        let now = self.clock.now();
        let mut window = self.window.lock();
        window.roll_if_elapsed(now, self.config.window);
        window.consumed < self.config.capacity
    }

    /// Spend one retry; `false` when the window is exhausted
    pub fn consume_retry(&self) -> bool {
        let now = self.clock.now();
        let mut window = self.window.lock();
        window.roll_if_elapsed(now, self.config.window);

        if window.consumed < self.config.capacity {
            window.consumed += 1;
            debug!(
                endpoint = %self.endpoint,
                consumed = window.consumed,
                capacity = self.config.capacity,
                "Retry budget consumed"
            );
            true
        } else {
            window.denied += 1;
            warn!(
                endpoint = %self.endpoint,
                capacity = self.config.capacity,
                window_ms = self.config.window.as_millis() as u64,
                "Retry budget exhausted"
            );
            false
        }
    }

    pub fn stats(&self) -> RetryBudgetStats {
        let now = self.clock.now();
        let mut window = self.window.lock();
        window.roll_if_elapsed(now, self.config.window);

        let elapsed = now.saturating_duration_since(window.started_at);
        RetryBudgetStats {
            endpoint: self.endpoint.clone(),
            consumed: window.consumed,
            capacity: self.config.capacity,
            remaining: self.config.capacity.saturating_sub(window.consumed),
            window: self.config.window,
            resets_in: self.config.window.saturating_sub(elapsed),
            denied: window.denied,
        }
    }

    /// Start a fresh window immediately
    pub fn reset(&self) {
        let now = self.clock.now();
        let mut window = self.window.lock();
        *window = BudgetWindow { consumed: 0, started_at: now, denied: 0 };
        info!(endpoint = %self.endpoint, "Retry budget manually reset");
    }
}

/// Registry of budgets, one per endpoint, created on first use
pub struct RetryBudgetManager<C: Clock + Clone = SystemClock> {
    default_config: RetryBudgetConfig,
    endpoint_configs: HashMap<String, RetryBudgetConfig>,
    budgets: DashMap<String, Arc<RetryBudget<C>>>,
    clock: C,
}

impl<C: Clock + Clone> fmt::Debug for RetryBudgetManager<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryBudgetManager")
            .field("default_config", &self.default_config)
            .field("endpoint_configs", &self.endpoint_configs)
            .field("budgets", &self.budgets.len())
            .finish()
    }
}

impl RetryBudgetManager<SystemClock> {
    pub fn new(config: RetryBudgetConfig) -> CommonResult<Self> {
        Self::with_clock(config, SystemClock)
    }
}

impl Default for RetryBudgetManager<SystemClock> {
    fn default() -> Self {
        Self {
            default_config: RetryBudgetConfig::default(),
            endpoint_configs: HashMap::new(),
            budgets: DashMap::new(),
            clock: SystemClock,
        }
    }
}

impl<C: Clock + Clone> RetryBudgetManager<C> {
    pub fn with_clock(config: RetryBudgetConfig, clock: C) -> CommonResult<Self> {
        config.validate()?;
        Ok(Self {
            default_config: config,
            endpoint_configs: HashMap::new(),
            budgets: DashMap::new(),
            clock,
        })
    }

    /// Use a dedicated budget size for one endpoint
    pub fn with_endpoint_config(
        mut self,
        endpoint: impl Into<String>,
        config: RetryBudgetConfig,
    ) -> CommonResult<Self> {
        config.validate()?;
        self.endpoint_configs.insert(endpoint.into(), config);
        Ok(self)
    }

    pub fn config_for(&self, endpoint: &str) -> &RetryBudgetConfig {
        self.endpoint_configs.get(endpoint).unwrap_or(&self.default_config)
    }

    /// Shared budget for `endpoint`, created empty on first use
    pub fn budget(&self, endpoint: &str) -> Arc<RetryBudget<C>> {
        if let Some(existing) = self.budgets.get(endpoint) {
            return Arc::clone(existing.value());
        }
        let entry = self.budgets.entry(endpoint.to_string()).or_insert_with(|| {
            Arc::new(RetryBudget::from_validated(
                endpoint.to_string(),
                self.config_for(endpoint).clone(),
                self.clock.clone(),
            ))
        });
        Arc::clone(entry.value())
    }

    pub fn can_retry(&self, endpoint: &str) -> bool {
        self.budget(endpoint).can_retry()
    }

    pub fn consume_retry(&self, endpoint: &str) -> bool {
        self.budget(endpoint).consume_retry()
    }

    pub fn stats(&self, endpoint: &str) -> Option<RetryBudgetStats> {
        self.budgets.get(endpoint).map(|b| b.stats())
    }

    /// Stats of every known budget, sorted by endpoint
    pub fn all_stats(&self) -> Vec<RetryBudgetStats> {
        let mut stats: Vec<_> = self.budgets.iter().map(|entry| entry.value().stats()).collect();
        stats.sort_by(|a, b| a.endpoint.cmp(&b.endpoint));
        stats
    }

    /// Reset one budget; returns `false` if the endpoint was never used
    pub fn reset(&self, endpoint: &str) -> bool {
        match self.budgets.get(endpoint) {
            Some(budget) => {
                budget.reset();
                true
            }
            None => false,
        }
    }

    pub fn reset_all(&self) {
        for entry in self.budgets.iter() {
            entry.value().reset();
        }
    }
}
