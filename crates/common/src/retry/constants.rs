// Constants for the retry core
use std::time::Duration;

/// Name of the default policy, also the fallback for unknown endpoints
pub const STANDARD_POLICY: &str = "standard";

/// Name of the policy used for high-volume list endpoints
pub const AGGRESSIVE_POLICY: &str = "aggressive";

/// Name of the policy that never retries (mutations)
pub const NO_RETRY_POLICY: &str = "none";

/// Name given to policies built by `create_custom_policy` without a name
pub const CUSTOM_POLICY: &str = "custom";

/// Standard policy: retries after the first attempt
pub const STANDARD_MAX_ATTEMPTS: u32 = 3;

/// Standard policy: base delay for exponential backoff
pub const STANDARD_BASE_DELAY: Duration = Duration::from_secs(1);

/// Standard policy: delay cap
pub const STANDARD_MAX_DELAY: Duration = Duration::from_secs(30);

/// Aggressive policy: retries after the first attempt
pub const AGGRESSIVE_MAX_ATTEMPTS: u32 = 5;

/// Aggressive policy: base delay for exponential backoff
pub const AGGRESSIVE_BASE_DELAY: Duration = Duration::from_millis(500);

/// Aggressive policy: delay cap
pub const AGGRESSIVE_MAX_DELAY: Duration = Duration::from_secs(60);

/// Default jitter factor (0.0 = no jitter, 1.0 = full jitter)
pub const DEFAULT_JITTER_FACTOR: f64 = 0.3;

/// Maximum exponent for exponential backoff calculation to prevent overflow
pub const MAX_BACKOFF_EXPONENT: u32 = 30;

/// Circuit breaker: failures inside the window that open the circuit
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

/// Circuit breaker: sliding window for counting failures
pub const DEFAULT_FAILURE_WINDOW: Duration = Duration::from_secs(60);

/// Circuit breaker: time spent open before probing
pub const DEFAULT_RECOVERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Circuit breaker: consecutive half-open successes needed to close
pub const DEFAULT_SUCCESS_THRESHOLD: u32 = 2;

/// Circuit breaker: probes admitted while half-open
pub const DEFAULT_HALF_OPEN_MAX_ATTEMPTS: u32 = 3;

/// Retry budget: retries allowed per window
pub const DEFAULT_BUDGET_CAPACITY: u32 = 10;

/// Retry budget: window length
pub const DEFAULT_BUDGET_WINDOW: Duration = Duration::from_secs(60);

/// Executor: soft deadline for a whole call including sleeps
pub const DEFAULT_MAX_TOTAL_DURATION: Duration = Duration::from_secs(120);

/// Environment variable overriding `max_attempts` of retrying policies
pub const ENV_MAX_ATTEMPTS: &str = "RETRY_MAX_ATTEMPTS";

/// Environment variable overriding `base_delay` (milliseconds)
pub const ENV_BASE_DELAY_MS: &str = "RETRY_BASE_DELAY_MS";

/// Environment variable overriding `max_delay` (milliseconds)
pub const ENV_MAX_DELAY_MS: &str = "RETRY_MAX_DELAY_MS";
