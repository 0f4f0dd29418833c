// Retry core: per-endpoint policies, exponential backoff with jitter,
// circuit breakers and retry budgets, orchestrated by the executor.
//
// The policy table and backoff math are pure and live in the foundation
// tier. Everything holding shared mutable state or sleeping needs the
// runtime tier.

pub mod backoff;
pub mod category;
pub mod constants;
pub mod error;
pub mod policies;

#[cfg(feature = "runtime")]
pub mod budget;
#[cfg(feature = "runtime")]
pub mod circuit_breaker;
#[cfg(feature = "runtime")]
pub mod config;
#[cfg(feature = "runtime")]
pub mod executor;
#[cfg(feature = "runtime")]
pub mod tracing;

pub use backoff::{
    backoff_delay, can_continue_retrying, exponential_delay, max_total_delay, parse_retry_after,
    parse_retry_after_at, retry_delay, retry_delay_at, DelaySource, RetryAfter, RetryDelay,
};
pub use category::{classify_message, CategorizedError, ClassifiedError, ErrorCategory};
pub use error::RetryError;
pub use policies::{
    create_custom_policy, RetryEnvOverrides, RetryPolicy, RetryPolicyOverrides,
    RetryPolicyRegistry, DEFAULT_ENDPOINT_POLICIES,
};

#[cfg(feature = "runtime")]
pub use self::tracing::{RetrySpan, RetryTracer};
#[cfg(feature = "runtime")]
pub use backoff::{can_continue_retrying_with, sleep};
#[cfg(feature = "runtime")]
pub use budget::{RetryBudget, RetryBudgetConfig, RetryBudgetManager, RetryBudgetStats};
#[cfg(feature = "runtime")]
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerConfigBuilder, CircuitBreakerManager,
    CircuitBreakerStats, CircuitState,
};
#[cfg(feature = "runtime")]
pub use config::ResilienceConfig;
#[cfg(feature = "runtime")]
pub use executor::{
    RetryAfterExtractor, RetryContext, RetryExecutor, RetryObserver, RetryOptions, RetryResult,
    RetryTermination,
};
