//! Resilience configuration
//!
//! Bundles the circuit breaker, retry budget and deadline settings with the
//! `RETRY_*` environment overrides so a host can load everything once at
//! start-up and hand it to [`RetryExecutor::from_config`].
//!
//! ## Environment Variables
//! - `RETRY_MAX_ATTEMPTS`: retries for every retrying policy
//! - `RETRY_BASE_DELAY_MS`: base backoff delay in milliseconds
//! - `RETRY_MAX_DELAY_MS`: backoff cap in milliseconds
//!
//! Durations serialize as integer milliseconds:
//!
//! ```json
//! {
//!   "circuit_breaker": { "failure_threshold": 3, "recovery_timeout": 10000 },
//!   "retry_budget": { "capacity": 20 },
//!   "max_total_duration": 60000
//! }
//! ```
//!
//! [`RetryExecutor::from_config`]: super::executor::RetryExecutor::from_config

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::budget::RetryBudgetConfig;
use super::circuit_breaker::CircuitBreakerConfig;
use super::constants::DEFAULT_MAX_TOTAL_DURATION;
use super::policies::RetryEnvOverrides;
use crate::error::{CommonError, CommonResult};
use crate::utils::serde::duration_millis;

/// Everything the executor needs besides the policy table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    pub circuit_breaker: CircuitBreakerConfig,
    pub retry_budget: RetryBudgetConfig,
    /// Soft deadline for one executor call, sleeps included
    #[serde(with = "duration_millis")]
    pub max_total_duration: Duration,
    pub overrides: RetryEnvOverrides,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            circuit_breaker: CircuitBreakerConfig::default(),
            retry_budget: RetryBudgetConfig::default(),
            max_total_duration: DEFAULT_MAX_TOTAL_DURATION,
            overrides: RetryEnvOverrides::default(),
        }
    }
}

impl ResilienceConfig {
    /// Defaults plus whatever `RETRY_*` overrides are set
    ///
    /// # Errors
    /// Returns `CommonError::Config` naming the variable when a value does
    /// not parse.
    pub fn from_env() -> CommonResult<Self> {
        let overrides = RetryEnvOverrides::from_env()?;
        if !overrides.is_empty() {
            tracing::info!(?overrides, "Retry overrides loaded from environment");
        }
        let config = Self { overrides, ..Self::default() };
        config.validate()?;
        Ok(config)
    }

    /// Parse from JSON; missing fields take their defaults
    pub fn from_json(contents: &str) -> CommonResult<Self> {
        let config: Self = serde_json::from_str(contents)
            .map_err(|e| CommonError::config(format!("Invalid JSON format: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Replace the overrides with the ones found in the environment
    pub fn with_env_overrides(mut self) -> CommonResult<Self> {
        self.overrides = RetryEnvOverrides::from_env()?;
        Ok(self)
    }

    pub fn validate(&self) -> CommonResult<()> {
        self.circuit_breaker.validate()?;
        self.retry_budget.validate()?;
        if self.max_total_duration.is_zero() {
            return Err(CommonError::config_field(
                "max_total_duration",
                "max_total_duration must be non-zero",
            ));
        }
        Ok(())
    }
}
