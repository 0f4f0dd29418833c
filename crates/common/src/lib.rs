//! Resilient retry core shared by DeepSource MCP crates.
//!
//! Wraps every outbound API call in per-endpoint retry policies,
//! exponential backoff with jitter, `Retry-After` handling, per-endpoint
//! circuit breakers and per-endpoint retry budgets.
//!
//! # Feature Tiers
//!
//! Enable cargo features to opt into the tiers you need:
//! - `foundation`: errors, serde helpers, error categories, retry policies,
//!   backoff math
//! - `observability`: tracing instrumentation
//! - `runtime` (default): circuit breakers, retry budgets, the executor and
//!   configuration loading
//! - `test-utils`: exposes [`testing`] (mock clock, test tracing) to other
//!   crates
//!
//! # Example
//!
//! ```
//! use deepsource_common::retry::{CategorizedError, RetryExecutor};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let executor = RetryExecutor::default();
//! let result = executor
//!     .execute("project_issues", || async {
//!         Ok::<_, CategorizedError>(vec!["PY-W0611"])
//!     })
//!     .await;
//!
//! assert!(result.success);
//! assert_eq!(result.attempts, 1);
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

// Foundation tier
// -----------------------------------------------------------------
#[cfg(feature = "foundation")]
pub mod error;
#[cfg(feature = "foundation")]
pub mod retry;
#[cfg(feature = "foundation")]
pub mod utils;

// Testing utilities
// ---------------------------------------------------------------
#[cfg(any(feature = "runtime", feature = "test-utils", test))]
pub mod testing;

// Re-export commonly used types and traits for convenience
// ------------------------
#[cfg(feature = "foundation")]
pub use error::{CommonError, CommonResult, ErrorClassification, ErrorSeverity};
#[cfg(feature = "foundation")]
pub use retry::{
    create_custom_policy, CategorizedError, ClassifiedError, ErrorCategory, RetryError,
    RetryPolicy, RetryPolicyRegistry,
};
#[cfg(feature = "runtime")]
pub use retry::{
    CircuitBreakerConfig, CircuitBreakerManager, CircuitState, ResilienceConfig,
    RetryBudgetConfig, RetryBudgetManager, RetryExecutor, RetryOptions, RetryResult,
};
#[cfg(any(feature = "runtime", feature = "test-utils", test))]
pub use testing::time::{Clock, MockClock, SystemClock};
#[cfg(feature = "foundation")]
pub use utils::serde::duration_millis;
