//! Per-endpoint retry policies
//!
//! Three named policies cover the DeepSource API surface:
//!
//! | Policy | Retries | Base | Max | Used by |
//! |--------|---------|------|-----|---------|
//! | `standard` | 3 | 1 s | 30 s | read endpoints, unknown endpoints |
//! | `aggressive` | 5 | 500 ms | 60 s | `projects` |
//! | `none` | 0 | 0 | 0 | metric mutations |
//!
//! A [`RetryPolicyRegistry`] is built once at start-up and shared behind an
//! `Arc`. Environment overrides (`RETRY_MAX_ATTEMPTS`, `RETRY_BASE_DELAY_MS`,
//! `RETRY_MAX_DELAY_MS`) widen or narrow every policy that retries; the
//! `none` policy is never touched so mutations stay single-shot.

use std::collections::{BTreeSet, HashMap};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::category::ErrorCategory;
use super::constants::*;
use crate::error::{CommonError, CommonResult};
use crate::utils::serde::{duration_millis, option_duration_millis};

/// Endpoint categories known at start-up and the policy each one uses
pub const DEFAULT_ENDPOINT_POLICIES: &[(&str, &str)] = &[
    ("projects", AGGRESSIVE_POLICY),
    ("project_issues", STANDARD_POLICY),
    ("runs", STANDARD_POLICY),
    ("run", STANDARD_POLICY),
    ("recent_run_issues", STANDARD_POLICY),
    ("dependency_vulnerabilities", STANDARD_POLICY),
    ("quality_metrics", STANDARD_POLICY),
    ("compliance_report", STANDARD_POLICY),
    ("update_metric_threshold", NO_RETRY_POLICY),
    ("update_metric_setting", NO_RETRY_POLICY),
];

/// How often and how patiently an endpoint is retried
///
/// `max_attempts` counts retries after the first invocation, so an
/// operation runs at most `max_attempts + 1` times.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub name: String,
    pub max_attempts: u32,
    #[serde(with = "duration_millis")]
    pub base_delay: Duration,
    #[serde(with = "duration_millis")]
    pub max_delay: Duration,
    pub jitter_factor: f64,
    pub retriable_categories: BTreeSet<ErrorCategory>,
    pub respect_retry_after: bool,
}

pub(crate) fn transient_categories() -> BTreeSet<ErrorCategory> {
    BTreeSet::from([
        ErrorCategory::Network,
        ErrorCategory::Server,
        ErrorCategory::Timeout,
        ErrorCategory::RateLimit,
    ])
}

impl RetryPolicy {
    /// Default policy for read endpoints
    pub fn standard() -> Self {
        Self {
            name: STANDARD_POLICY.to_string(),
            max_attempts: STANDARD_MAX_ATTEMPTS,
            base_delay: STANDARD_BASE_DELAY,
            max_delay: STANDARD_MAX_DELAY,
            jitter_factor: DEFAULT_JITTER_FACTOR,
            retriable_categories: transient_categories(),
            respect_retry_after: true,
        }
    }

    /// Policy for cheap, high-traffic list endpoints
    pub fn aggressive() -> Self {
        Self {
            name: AGGRESSIVE_POLICY.to_string(),
            max_attempts: AGGRESSIVE_MAX_ATTEMPTS,
            base_delay: AGGRESSIVE_BASE_DELAY,
            max_delay: AGGRESSIVE_MAX_DELAY,
            jitter_factor: DEFAULT_JITTER_FACTOR,
            retriable_categories: transient_categories(),
            respect_retry_after: true,
        }
    }

    /// Single-shot policy for non-idempotent mutations
    pub fn none() -> Self {
        Self {
            name: NO_RETRY_POLICY.to_string(),
            max_attempts: 0,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter_factor: 0.0,
            retriable_categories: BTreeSet::new(),
            respect_retry_after: false,
        }
    }

    pub fn is_retriable(&self, category: ErrorCategory) -> bool {
        self.retriable_categories.contains(&category)
    }

    /// Whether this policy ever retries
    pub fn retries(&self) -> bool {
        self.max_attempts > 0
    }

    /// Check internal consistency
    pub fn validate(&self) -> CommonResult<()> {
        if self.base_delay > self.max_delay {
            return Err(CommonError::config_field(
                "base_delay",
                format!(
                    "base_delay ({:?}) must not exceed max_delay ({:?})",
                    self.base_delay, self.max_delay
                ),
            ));
        }
        if !self.jitter_factor.is_finite() || !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(CommonError::config_field(
                "jitter_factor",
                format!("jitter_factor must be within [0, 1], got {}", self.jitter_factor),
            ));
        }
        Ok(())
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::standard()
    }
}

/// Partial policy used by [`create_custom_policy`]; unset fields keep the
/// base policy's value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicyOverrides {
    pub name: Option<String>,
    pub max_attempts: Option<u32>,
    #[serde(with = "option_duration_millis")]
    pub base_delay: Option<Duration>,
    #[serde(with = "option_duration_millis")]
    pub max_delay: Option<Duration>,
    pub jitter_factor: Option<f64>,
    pub retriable_categories: Option<BTreeSet<ErrorCategory>>,
    pub respect_retry_after: Option<bool>,
}

impl RetryPolicyOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    #[must_use]
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = Some(delay);
        self
    }

    #[must_use]
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = Some(delay);
        self
    }

    #[must_use]
    pub fn jitter_factor(mut self, factor: f64) -> Self {
        self.jitter_factor = Some(factor);
        self
    }

    #[must_use]
    pub fn retriable_categories(
        mut self,
        categories: impl IntoIterator<Item = ErrorCategory>,
    ) -> Self {
        self.retriable_categories = Some(categories.into_iter().collect());
        self
    }

    #[must_use]
    pub fn respect_retry_after(mut self, respect: bool) -> Self {
        self.respect_retry_after = Some(respect);
        self
    }
}

/// Derive a policy from `base`, replacing only the supplied fields
///
/// The result is named `"custom"` unless a name is given. Jitter is clamped
/// into `[0, 1]`; a base delay above the max delay is rejected.
///
/// ```
/// use std::time::Duration;
///
/// use deepsource_common::retry::{create_custom_policy, RetryPolicy, RetryPolicyOverrides};
///
/// let policy = create_custom_policy(
///     &RetryPolicy::standard(),
///     RetryPolicyOverrides::new().max_attempts(1).jitter_factor(0.0),
/// )
/// .unwrap();
/// assert_eq!(policy.name, "custom");
/// assert_eq!(policy.max_attempts, 1);
/// assert_eq!(policy.base_delay, Duration::from_secs(1));
/// ```
pub fn create_custom_policy(
    base: &RetryPolicy,
    overrides: RetryPolicyOverrides,
) -> CommonResult<RetryPolicy> {
    let jitter_factor = overrides.jitter_factor.unwrap_or(base.jitter_factor);
    let jitter_factor = if jitter_factor.is_nan() { 0.0 } else { jitter_factor.clamp(0.0, 1.0) };

    let policy = RetryPolicy {
        name: overrides.name.unwrap_or_else(|| CUSTOM_POLICY.to_string()),
        max_attempts: overrides.max_attempts.unwrap_or(base.max_attempts),
        base_delay: overrides.base_delay.unwrap_or(base.base_delay),
        max_delay: overrides.max_delay.unwrap_or(base.max_delay),
        jitter_factor,
        retriable_categories: overrides
            .retriable_categories
            .unwrap_or_else(|| base.retriable_categories.clone()),
        respect_retry_after: overrides.respect_retry_after.unwrap_or(base.respect_retry_after),
    };
    policy.validate()?;
    Ok(policy)
}

/// Process-wide overrides read from `RETRY_*` environment variables
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryEnvOverrides {
    pub max_attempts: Option<u32>,
    #[serde(with = "option_duration_millis")]
    pub base_delay: Option<Duration>,
    #[serde(with = "option_duration_millis")]
    pub max_delay: Option<Duration>,
}

impl RetryEnvOverrides {
    /// Read overrides from the process environment
    ///
    /// Missing variables leave the field unset; an unparsable value is a
    /// `CommonError::Config` naming the variable.
    pub fn from_env() -> CommonResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read overrides through an arbitrary lookup function
    pub fn from_lookup<F>(lookup: F) -> CommonResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            max_attempts: parse_var(&lookup, ENV_MAX_ATTEMPTS)?,
            base_delay: parse_var::<u64, _>(&lookup, ENV_BASE_DELAY_MS)?.map(Duration::from_millis),
            max_delay: parse_var::<u64, _>(&lookup, ENV_MAX_DELAY_MS)?.map(Duration::from_millis),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.max_attempts.is_none() && self.base_delay.is_none() && self.max_delay.is_none()
    }

    /// Apply to `policy` if it retries; non-retrying policies come back as-is
    ///
    /// When the overrides would put `base_delay` above `max_delay`, the max
    /// is raised to the base.
    pub fn apply(&self, policy: &RetryPolicy) -> RetryPolicy {
        let mut policy = policy.clone();
        if !policy.retries() {
            return policy;
        }
        if let Some(max_attempts) = self.max_attempts {
            policy.max_attempts = max_attempts;
        }
        if let Some(base_delay) = self.base_delay {
            policy.base_delay = base_delay;
        }
        if let Some(max_delay) = self.max_delay {
            policy.max_delay = max_delay;
        }
        if policy.base_delay > policy.max_delay {
            policy.max_delay = policy.base_delay;
        }
        policy
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> CommonResult<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|e| {
            CommonError::config_field(key, format!("invalid value '{}': {}", raw, e))
        }),
    }
}

/// Immutable endpoint → policy table
///
/// Lookups never fail: unknown endpoints get the `standard` policy.
#[derive(Debug, Clone)]
pub struct RetryPolicyRegistry {
    named: HashMap<String, RetryPolicy>,
    endpoints: HashMap<String, RetryPolicy>,
    overrides: RetryEnvOverrides,
}

impl RetryPolicyRegistry {
    /// Registry with the built-in policies and endpoint table, no overrides
    pub fn new() -> Self {
        let named: HashMap<String, RetryPolicy> =
            [RetryPolicy::standard(), RetryPolicy::aggressive(), RetryPolicy::none()]
                .into_iter()
                .map(|p| (p.name.clone(), p))
                .collect();

        let endpoints = DEFAULT_ENDPOINT_POLICIES
            .iter()
            .filter_map(|(endpoint, policy)| {
                named.get(*policy).map(|p| ((*endpoint).to_string(), p.clone()))
            })
            .collect();

        Self { named, endpoints, overrides: RetryEnvOverrides::default() }
    }

    /// Built-in table with overrides read from the environment
    pub fn from_env() -> CommonResult<Self> {
        Ok(Self::new().with_overrides(RetryEnvOverrides::from_env()?))
    }

    /// Register (or replace) the policy for an endpoint
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>, policy: RetryPolicy) -> Self {
        self.endpoints.insert(endpoint.into(), policy);
        self
    }

    #[must_use]
    pub fn with_overrides(mut self, overrides: RetryEnvOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// Policy for an endpoint category, falling back to `standard`
    pub fn policy_for(&self, endpoint: &str) -> RetryPolicy {
        let policy = match self.endpoints.get(endpoint) {
            Some(policy) => policy.clone(),
            None => self.named.get(STANDARD_POLICY).cloned().unwrap_or_else(RetryPolicy::standard),
        };
        self.overrides.apply(&policy)
    }

    /// One of the named policies, with overrides applied
    pub fn policy_named(&self, name: &str) -> Option<RetryPolicy> {
        self.named.get(name).map(|p| self.overrides.apply(p))
    }

    pub fn overrides(&self) -> &RetryEnvOverrides {
        &self.overrides
    }

    /// Endpoints with an explicit entry, sorted
    pub fn endpoints(&self) -> Vec<&str> {
        let mut endpoints: Vec<&str> = self.endpoints.keys().map(String::as_str).collect();
        endpoints.sort_unstable();
        endpoints
    }
}

impl Default for RetryPolicyRegistry {
    fn default() -> Self {
        Self::new()
    }
}
