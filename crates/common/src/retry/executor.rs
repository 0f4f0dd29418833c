//! Retry executor
//!
//! [`RetryExecutor::execute_with_retry`] runs one fallible async operation
//! under the policy of its endpoint, consulting the shared circuit breaker
//! before every invocation and the retry budget before every retry. The
//! inter-attempt sleep is the only suspension point the executor adds.
//!
//! ```text
//! breaker? ──no──> blocked (attempts = 0)
//!    │
//!    ▼
//! attempt 0 ─ok─> success
//!    │err
//!    ▼
//! retriable? ──no──> non-retriable failure
//!    │
//!    ▼
//! last attempt? ──yes──> exhausted
//!    │
//!    ▼
//! consume budget? ──no──> budget exhausted
//!    │
//!    ▼
//! sleep(retry_delay) ─> breaker? budget? observer ─> attempt n ...
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use serde::Serialize;

use super::backoff::{can_continue_retrying_with, retry_delay_at, sleep};
use super::budget::RetryBudgetManager;
use super::category::ClassifiedError;
use super::circuit_breaker::CircuitBreakerManager;
use super::config::ResilienceConfig;
use super::constants::DEFAULT_MAX_TOTAL_DURATION;
use super::error::RetryError;
use super::policies::{RetryPolicy, RetryPolicyRegistry};
use super::tracing::{RetrySpan, RetryTracer};
use crate::error::CommonResult;
use crate::testing::time::{Clock, SystemClock};

/// Callback invoked before every retry (never before the first attempt)
pub type RetryObserver<E> = Arc<dyn Fn(&RetryContext<'_, E>) + Send + Sync>;

/// Pulls a raw `Retry-After` value out of an operation error
pub type RetryAfterExtractor<E> = Arc<dyn Fn(&E) -> Option<String> + Send + Sync>;

/// Snapshot handed to the retry observer
#[derive(Debug)]
pub struct RetryContext<'a, E> {
    pub endpoint: &'a str,
    /// Index of the attempt about to run (1 for the first retry)
    pub attempt_number: u32,
    pub elapsed: Duration,
    pub last_error: Option<&'a E>,
    pub is_last_attempt: bool,
    /// Delay slept before this attempt
    pub last_delay: Option<Duration>,
}

/// Why a call ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryTermination {
    Succeeded,
    NonRetriable,
    /// Includes calls cut short by `max_total_duration`
    AttemptsExhausted,
    CircuitOpen,
    BudgetExhausted,
}

impl fmt::Display for RetryTermination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Succeeded => "succeeded",
            Self::NonRetriable => "non_retriable",
            Self::AttemptsExhausted => "attempts_exhausted",
            Self::CircuitOpen => "circuit_open",
            Self::BudgetExhausted => "budget_exhausted",
        };
        f.write_str(label)
    }
}

/// Structured outcome of [`RetryExecutor::execute_with_retry`]
///
/// `data` is set exactly when `success` is true. `error` holds the last
/// operation error, if any attempt produced one.
#[derive(Debug)]
pub struct RetryResult<T, E> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<E>,
    /// Number of times the operation was invoked
    pub attempts: u32,
    pub total_duration: Duration,
    /// Sum of the delays slept between attempts
    pub total_delay: Duration,
    pub circuit_breaker_blocked: bool,
    pub budget_exhausted: bool,
    pub termination: RetryTermination,
    pub endpoint: String,
    pub policy_name: String,
}

impl<T, E> RetryResult<T, E> {
    pub fn is_success(&self) -> bool {
        self.success
    }

    /// Collapse into a `Result`
    ///
    /// Failures yield the last operation error when one was recorded, then
    /// `CircuitOpen` or `BudgetExhausted`, and otherwise `Exhausted`
    /// ("Operation failed after retries"). A refused call therefore names
    /// the refusal instead of the generic message.
    pub fn into_result(self) -> Result<T, RetryError<E>> {
        match (self.data, self.error) {
            (Some(data), _) if self.success => Ok(data),
            (_, Some(error)) => Err(RetryError::Operation(error)),
            _ if self.circuit_breaker_blocked => {
                Err(RetryError::CircuitOpen { endpoint: self.endpoint })
            }
            _ if self.budget_exhausted => {
                Err(RetryError::BudgetExhausted { endpoint: self.endpoint })
            }
            _ => Err(RetryError::Exhausted { attempts: self.attempts }),
        }
    }
}

/// Per-call options
pub struct RetryOptions<E> {
    pub endpoint: String,
    /// Replaces the registry's policy for this call
    pub policy: Option<RetryPolicy>,
    pub on_retry_attempt: Option<RetryObserver<E>>,
    /// Replaces the executor's deadline for this call
    pub max_total_duration: Option<Duration>,
    /// Takes precedence over `ClassifiedError::retry_after_header`
    pub extract_retry_after: Option<RetryAfterExtractor<E>>,
}

impl<E> RetryOptions<E> {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            policy: None,
            on_retry_attempt: None,
            max_total_duration: None,
            extract_retry_after: None,
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    #[must_use]
    pub fn on_retry_attempt<F>(mut self, observer: F) -> Self
    where
        F: Fn(&RetryContext<'_, E>) + Send + Sync + 'static,
    {
        self.on_retry_attempt = Some(Arc::new(observer));
        self
    }

    #[must_use]
    pub fn with_max_total_duration(mut self, limit: Duration) -> Self {
        self.max_total_duration = Some(limit);
        self
    }

    #[must_use]
    pub fn extract_retry_after<F>(mut self, extractor: F) -> Self
    where
        F: Fn(&E) -> Option<String> + Send + Sync + 'static,
    {
        self.extract_retry_after = Some(Arc::new(extractor));
        self
    }
}

impl<E> Clone for RetryOptions<E> {
    fn clone(&self) -> Self {
        Self {
            endpoint: self.endpoint.clone(),
            policy: self.policy.clone(),
            on_retry_attempt: self.on_retry_attempt.clone(),
            max_total_duration: self.max_total_duration,
            extract_retry_after: self.extract_retry_after.clone(),
        }
    }
}

impl<E> fmt::Debug for RetryOptions<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryOptions")
            .field("endpoint", &self.endpoint)
            .field("policy", &self.policy.as_ref().map(|p| p.name.as_str()))
            .field("on_retry_attempt", &self.on_retry_attempt.as_ref().map(|_| "<function>"))
            .field("max_total_duration", &self.max_total_duration)
            .field("extract_retry_after", &self.extract_retry_after.as_ref().map(|_| "<function>"))
            .finish()
    }
}

/// Orchestrates policies, breakers and budgets around an operation
///
/// Cloning is cheap; clones share the registry, breakers and budgets.
pub struct RetryExecutor<C: Clock + Clone = SystemClock> {
    registry: Arc<RetryPolicyRegistry>,
    breakers: Arc<CircuitBreakerManager<C>>,
    budgets: Arc<RetryBudgetManager<C>>,
    clock: C,
    max_total_duration: Duration,
    tracer: RetryTracer,
}

impl<C: Clock + Clone> Clone for RetryExecutor<C> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            breakers: Arc::clone(&self.breakers),
            budgets: Arc::clone(&self.budgets),
            clock: self.clock.clone(),
            max_total_duration: self.max_total_duration,
            tracer: self.tracer,
        }
    }
}

impl<C: Clock + Clone> fmt::Debug for RetryExecutor<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryExecutor")
            .field("registry", &self.registry)
            .field("breakers", &self.breakers)
            .field("budgets", &self.budgets)
            .field("max_total_duration", &self.max_total_duration)
            .finish()
    }
}

impl RetryExecutor<SystemClock> {
    pub fn new(
        registry: Arc<RetryPolicyRegistry>,
        breakers: Arc<CircuitBreakerManager>,
        budgets: Arc<RetryBudgetManager>,
    ) -> Self {
        Self::with_clock(registry, breakers, budgets, SystemClock)
    }

    /// Build the registry and managers from configuration
    pub fn from_config(config: &ResilienceConfig) -> CommonResult<Self> {
        let registry = RetryPolicyRegistry::new().with_overrides(config.overrides);
        let breakers = CircuitBreakerManager::new(config.circuit_breaker.clone())?;
        let budgets = RetryBudgetManager::new(config.retry_budget.clone())?;
        Ok(Self::new(Arc::new(registry), Arc::new(breakers), Arc::new(budgets))
            .with_max_total_duration(config.max_total_duration))
    }
}

impl Default for RetryExecutor<SystemClock> {
    fn default() -> Self {
        Self::new(
            Arc::new(RetryPolicyRegistry::default()),
            Arc::new(CircuitBreakerManager::default()),
            Arc::new(RetryBudgetManager::default()),
        )
    }
}

impl<C: Clock + Clone> RetryExecutor<C> {
    /// Create an executor with a custom clock (for testing)
    pub fn with_clock(
        registry: Arc<RetryPolicyRegistry>,
        breakers: Arc<CircuitBreakerManager<C>>,
        budgets: Arc<RetryBudgetManager<C>>,
        clock: C,
    ) -> Self {
        Self {
            registry,
            breakers,
            budgets,
            clock,
            max_total_duration: DEFAULT_MAX_TOTAL_DURATION,
            tracer: RetryTracer::new(),
        }
    }

    /// Default deadline for calls that do not set their own
    #[must_use]
    pub fn with_max_total_duration(mut self, limit: Duration) -> Self {
        self.max_total_duration = limit;
        self
    }

    pub fn registry(&self) -> &Arc<RetryPolicyRegistry> {
        &self.registry
    }

    pub fn breakers(&self) -> &Arc<CircuitBreakerManager<C>> {
        &self.breakers
    }

    pub fn budgets(&self) -> &Arc<RetryBudgetManager<C>> {
        &self.budgets
    }

    pub fn max_total_duration(&self) -> Duration {
        self.max_total_duration
    }

    /// [`execute_with_retry`](Self::execute_with_retry) with default options
    pub async fn execute<F, Fut, T, E>(&self, endpoint: &str, operation: F) -> RetryResult<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: ClassifiedError,
    {
        self.execute_with_retry(operation, &RetryOptions::new(endpoint)).await
    }

    /// Run `operation` until it succeeds or the policy, breaker, budget or
    /// deadline stops it
    pub async fn execute_with_retry<F, Fut, T, E>(
        &self,
        mut operation: F,
        options: &RetryOptions<E>,
    ) -> RetryResult<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: ClassifiedError,
    {
        let endpoint = options.endpoint.as_str();
        let policy = match &options.policy {
            Some(policy) => policy.clone(),
            None => self.registry.policy_for(endpoint),
        };
        let max_total_duration = options.max_total_duration.unwrap_or(self.max_total_duration);
        let breaker = self.breakers.breaker(endpoint);
        let span = self.tracer.start_retry_span(endpoint, &policy.name, policy.max_attempts);

        let mut call = CallState::new(self.clock.now(), span);

        if !breaker.can_attempt() {
            call.span.record_circuit_open(0);
            return call.finish(&self.clock, &policy, RetryTermination::CircuitOpen, None);
        }

        for attempt in 0..=policy.max_attempts {
            if !can_continue_retrying_with(&self.clock, call.start, max_total_duration) {
                let elapsed = self.clock.now().saturating_duration_since(call.start);
                call.span.record_deadline(attempt, elapsed, max_total_duration);
                break;
            }

            if attempt > 0 {
                if !breaker.can_attempt() {
                    call.span.record_circuit_open(attempt);
                    return call.finish(&self.clock, &policy, RetryTermination::CircuitOpen, None);
                }
                if !self.budgets.can_retry(endpoint) {
                    call.span.record_budget_exhausted(attempt);
                    let termination = RetryTermination::BudgetExhausted;
                    return call.finish(&self.clock, &policy, termination, None);
                }
                if let Some(observer) = &options.on_retry_attempt {
                    observer(&RetryContext {
                        endpoint,
                        attempt_number: attempt,
                        elapsed: self.clock.now().saturating_duration_since(call.start),
                        last_error: call.last_error.as_ref(),
                        is_last_attempt: attempt == policy.max_attempts,
                        last_delay: call.last_delay,
                    });
                }
            }

            call.span.record_attempt(attempt, call.last_delay);
            call.attempts = attempt + 1;

            let error = match operation().await {
                Ok(data) => {
                    breaker.record_success();
                    call.span.record_success(call.attempts, call.total_delay);
                    let termination = RetryTermination::Succeeded;
                    return call.finish(&self.clock, &policy, termination, Some(data));
                }
                Err(error) => error,
            };

            breaker.record_failure();
            let category = error.resolved_category();
            let message = error.to_string();

            if !policy.is_retriable(category) {
                call.span.record_non_retriable(attempt, category, &message);
                call.last_error = Some(error);
                return call.finish(&self.clock, &policy, RetryTermination::NonRetriable, None);
            }

            if attempt == policy.max_attempts {
                call.span.record_exhausted(call.attempts, category, &message);
                call.last_error = Some(error);
                return call.finish(&self.clock, &policy, RetryTermination::AttemptsExhausted, None);
            }

            if !self.budgets.consume_retry(endpoint) {
                call.span.record_budget_exhausted(attempt);
                call.last_error = Some(error);
                return call.finish(&self.clock, &policy, RetryTermination::BudgetExhausted, None);
            }

            let header = match &options.extract_retry_after {
                Some(extract) => extract(&error),
                None => error.retry_after_header(),
            };
            let now = self.clock.system_time();
            let next = retry_delay_at(attempt, &policy, header.as_deref(), now);
            call.span.record_failure(attempt, category, &message, next.delay, next.source);

            call.last_error = Some(error);
            call.last_delay = Some(next.delay);
            call.total_delay = call.total_delay.saturating_add(next.delay);
            sleep(next.delay).await;
        }

        call.finish(&self.clock, &policy, RetryTermination::AttemptsExhausted, None)
    }

    /// Wrap `operation` so every call runs through the executor
    ///
    /// The returned function has the operation's call shape and resolves to
    /// `Result<T, RetryError<E>>` (see [`RetryResult::into_result`]). When no
    /// operation error was recorded, a breaker or budget refusal comes back
    /// as `RetryError::CircuitOpen` or `RetryError::BudgetExhausted` rather
    /// than the generic "Operation failed after retries" error.
    pub fn with_retry<F, Fut, T, E>(
        &self,
        operation: F,
        options: RetryOptions<E>,
    ) -> impl Fn() -> BoxFuture<'static, Result<T, RetryError<E>>> + Send + Sync + 'static
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: ClassifiedError + Send + Sync + 'static,
    {
        let executor = self.clone();
        let operation = Arc::new(operation);
        let options = Arc::new(options);

        move || {
            let executor = executor.clone();
            let operation = Arc::clone(&operation);
            let options = Arc::clone(&options);
            Box::pin(async move {
                executor.execute_with_retry(|| operation(), &options).await.into_result()
            })
        }
    }
}

/// Mutable bookkeeping for one executor call
struct CallState<E> {
    start: Instant,
    span: RetrySpan,
    attempts: u32,
    total_delay: Duration,
    last_delay: Option<Duration>,
    last_error: Option<E>,
}

impl<E> CallState<E> {
    fn new(start: Instant, span: RetrySpan) -> Self {
        Self {
            start,
            span,
            attempts: 0,
            total_delay: Duration::ZERO,
            last_delay: None,
            last_error: None,
        }
    }

    fn finish<T, C: Clock>(
        self,
        clock: &C,
        policy: &RetryPolicy,
        termination: RetryTermination,
        data: Option<T>,
    ) -> RetryResult<T, E> {
        RetryResult {
            success: termination == RetryTermination::Succeeded,
            data,
            error: self.last_error,
            attempts: self.attempts,
            total_duration: clock.now().saturating_duration_since(self.start),
            total_delay: self.total_delay,
            circuit_breaker_blocked: termination == RetryTermination::CircuitOpen,
            budget_exhausted: termination == RetryTermination::BudgetExhausted,
            termination,
            endpoint: self.span.endpoint().to_string(),
            policy_name: policy.name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for retry::executor.
    use std::sync::atomic::{AtomicU32, Ordering};

    use parking_lot::Mutex;

    use super::*;
    use crate::error::CommonError;
    use crate::retry::budget::RetryBudgetConfig;
    use crate::retry::category::{CategorizedError, ErrorCategory};
    use crate::retry::circuit_breaker::{CircuitBreakerConfig, CircuitState};
    use crate::retry::policies::{create_custom_policy, RetryPolicyOverrides};
    use crate::testing::MockClock;

    fn executor() -> RetryExecutor {
        RetryExecutor::default()
    }

    fn exact_policy(max_attempts: u32) -> RetryPolicy {
        create_custom_policy(
            &RetryPolicy::standard(),
            RetryPolicyOverrides::new().max_attempts(max_attempts).jitter_factor(0.0),
        )
        .unwrap()
    }

    fn network_error() -> CategorizedError {
        CategorizedError::new(ErrorCategory::Network, "connection reset by peer")
    }

    /// Validates the first-attempt success scenario.
    ///
    /// Assertions:
    /// - Confirms one invocation, no delay and the `Succeeded` termination.
    #[tokio::test(start_paused = true)]
    async fn test_success_first_attempt() {
        let result: RetryResult<u32, CategorizedError> =
            executor().execute("runs", || async { Ok(42) }).await;

        assert!(result.is_success());
        assert_eq!(result.data, Some(42));
        assert!(result.error.is_none());
        assert_eq!(result.attempts, 1);
        assert_eq!(result.total_delay, Duration::ZERO);
        assert_eq!(result.termination, RetryTermination::Succeeded);
        assert_eq!(result.policy_name, "standard");
        assert_eq!(result.endpoint, "runs");
    }

    /// Validates the transient failures then success scenario.
    ///
    /// Assertions:
    /// - Confirms three invocations and two doubling delays.
    /// - Confirms the observer sees attempts 1 and 2 with the previous
    ///   error and delay.
    #[tokio::test(start_paused = true)]
    async fn test_retries_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let observed = Arc::clone(&seen);
        let options = RetryOptions::new("runs").with_policy(exact_policy(3)).on_retry_attempt(
            move |ctx: &RetryContext<'_, CategorizedError>| {
                observed.lock().push((
                    ctx.attempt_number,
                    ctx.last_delay,
                    ctx.last_error.map(|e| e.to_string()),
                    ctx.is_last_attempt,
                ));
            },
        );

        let counter = Arc::clone(&calls);
        let result = executor()
            .execute_with_retry(
                move || {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if n < 2 {
                            Err(network_error())
                        } else {
                            Ok("done")
                        }
                    }
                },
                &options,
            )
            .await;

        assert!(result.success);
        assert_eq!(result.attempts, 3);
        assert_eq!(result.total_delay, Duration::from_secs(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].0, 1);
        assert_eq!(seen[0].1, Some(Duration::from_secs(1)));
        assert_eq!(seen[0].2.as_deref(), Some("NETWORK: connection reset by peer"));
        assert_eq!(seen[1].0, 2);
        assert_eq!(seen[1].1, Some(Duration::from_secs(2)));
        assert!(!seen[1].3);
    }

    /// Validates the non-retriable failure scenario.
    ///
    /// Assertions:
    /// - Confirms a NOT_FOUND error stops after one invocation.
    #[tokio::test(start_paused = true)]
    async fn test_non_retriable_stops_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result: RetryResult<(), CommonError> = executor()
            .execute("project_issues", move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err(CommonError::not_found_with_id("project", "demo")) }
            })
            .await;

        assert!(!result.success);
        assert_eq!(result.attempts, 1);
        assert_eq!(result.termination, RetryTermination::NonRetriable);
        assert!(matches!(result.error, Some(CommonError::NotFound { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    /// Validates the attempts exhausted scenario.
    ///
    /// Assertions:
    /// - Confirms `max_attempts + 1` invocations and the last error.
    /// - Confirms `into_result` yields the operation error.
    #[tokio::test(start_paused = true)]
    async fn test_attempts_exhausted() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let options = RetryOptions::new("runs").with_policy(exact_policy(2));

        let result: RetryResult<(), CategorizedError> = executor()
            .execute_with_retry(
                move || {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    async move { Err(CategorizedError::from_status(503, format!("try {n}"))) }
                },
                &options,
            )
            .await;

        assert_eq!(result.attempts, 3);
        assert_eq!(result.termination, RetryTermination::AttemptsExhausted);
        assert_eq!(result.total_delay, Duration::from_secs(3));
        assert!(!result.circuit_breaker_blocked);
        assert!(!result.budget_exhausted);

        match result.into_result() {
            Err(RetryError::Operation(e)) => assert_eq!(e.message(), "try 2"),
            other => panic!("unexpected {other:?}"),
        }
    }

    /// Validates the no-retry policy scenario.
    ///
    /// Assertions:
    /// - Confirms mutations run once even on a retriable error.
    #[tokio::test(start_paused = true)]
    async fn test_mutation_endpoint_never_retries() {
        let result: RetryResult<(), CategorizedError> = executor()
            .execute("update_metric_threshold", || async { Err(network_error()) })
            .await;

        assert_eq!(result.attempts, 1);
        assert_eq!(result.policy_name, "none");
        assert_eq!(result.termination, RetryTermination::NonRetriable);
    }

    /// Validates the open circuit scenario.
    ///
    /// Assertions:
    /// - Confirms the operation is never invoked and `attempts` is 0.
    /// - Confirms `into_result` yields `CircuitOpen`.
    #[tokio::test(start_paused = true)]
    async fn test_open_circuit_blocks_first_attempt() {
        let executor = executor();
        for _ in 0..5 {
            executor.breakers().record_failure("x");
        }
        assert_eq!(executor.breakers().state("x"), CircuitState::Open);

        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let result: RetryResult<(), CategorizedError> = executor
            .execute("x", move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            })
            .await;

        assert!(result.circuit_breaker_blocked);
        assert_eq!(result.attempts, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(matches!(
            result.into_result(),
            Err(RetryError::CircuitOpen { endpoint }) if endpoint == "x"
        ));
    }

    /// Validates the circuit opening mid-call scenario.
    ///
    /// Assertions:
    /// - Confirms the call stops once its own failures open the breaker.
    /// - Confirms the last operation error is still reported.
    #[tokio::test(start_paused = true)]
    async fn test_circuit_opens_between_attempts() {
        let breakers = CircuitBreakerManager::new(
            CircuitBreakerConfig::builder()
                .failure_threshold(2)
                .success_threshold(1)
                .half_open_max_attempts(1)
                .build()
                .unwrap(),
        )
        .unwrap();
        let executor = RetryExecutor::new(
            Arc::new(RetryPolicyRegistry::new()),
            Arc::new(breakers),
            Arc::new(RetryBudgetManager::default()),
        );

        let options = RetryOptions::new("runs").with_policy(exact_policy(5));
        let result: RetryResult<(), CategorizedError> =
            executor.execute_with_retry(|| async { Err(network_error()) }, &options).await;

        assert!(result.circuit_breaker_blocked);
        assert_eq!(result.attempts, 2);
        assert_eq!(result.termination, RetryTermination::CircuitOpen);
        assert!(result.error.is_some());
    }

    /// Validates the exhausted budget scenario.
    ///
    /// Assertions:
    /// - Confirms a pre-exhausted budget stops after the first attempt.
    #[tokio::test(start_paused = true)]
    async fn test_budget_exhausted_after_first_attempt() {
        let budgets = RetryBudgetManager::new(RetryBudgetConfig::new(1, Duration::from_secs(60)))
            .unwrap();
        assert!(budgets.consume_retry("y"));
        let executor = RetryExecutor::new(
            Arc::new(RetryPolicyRegistry::new()),
            Arc::new(CircuitBreakerManager::default()),
            Arc::new(budgets),
        );

        let result: RetryResult<(), CategorizedError> =
            executor.execute("y", || async { Err(network_error()) }).await;

        assert!(result.budget_exhausted);
        assert_eq!(result.attempts, 1);
        assert_eq!(result.termination, RetryTermination::BudgetExhausted);
        assert!(matches!(result.into_result(), Err(RetryError::Operation(_))));
    }

    /// Validates the `Retry-After` precedence scenario.
    ///
    /// Assertions:
    /// - Confirms the extractor's header value replaces the backoff delay.
    #[tokio::test(start_paused = true)]
    async fn test_retry_after_from_extractor() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let options = RetryOptions::new("runs")
            .with_policy(exact_policy(1))
            .extract_retry_after(|_e: &CategorizedError| Some("7".to_string()));

        let result = executor()
            .execute_with_retry(
                move || {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if n == 0 {
                            Err(CategorizedError::from_status(429, "slow down"))
                        } else {
                            Ok(n)
                        }
                    }
                },
                &options,
            )
            .await;

        assert_eq!(result.data, Some(1));
        assert_eq!(result.total_delay, Duration::from_secs(7));
    }

    /// Validates the header carried by the error scenario.
    ///
    /// Assertions:
    /// - Confirms `ClassifiedError::retry_after_header` is used when no
    ///   extractor is set, capped at the policy's max delay.
    #[tokio::test(start_paused = true)]
    async fn test_retry_after_from_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let options = RetryOptions::new("runs").with_policy(exact_policy(1));

        let result = executor()
            .execute_with_retry(
                move || {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if n == 0 {
                            Err(CategorizedError::from_status(429, "slow").with_retry_after("600"))
                        } else {
                            Ok(())
                        }
                    }
                },
                &options,
            )
            .await;

        assert!(result.success);
        assert_eq!(result.total_delay, Duration::from_secs(30));
    }

    /// Validates the total deadline scenario.
    ///
    /// Assertions:
    /// - Confirms the loop stops once the mock clock passes the deadline.
    /// - Confirms the deadline surfaces as exhausted attempts with the last
    ///   error.
    #[tokio::test(start_paused = true)]
    async fn test_deadline_stops_loop() {
        let clock = MockClock::new();
        let executor = RetryExecutor::with_clock(
            Arc::new(RetryPolicyRegistry::new()),
            Arc::new(
                CircuitBreakerManager::with_clock(CircuitBreakerConfig::default(), clock.clone())
                    .unwrap(),
            ),
            Arc::new(
                RetryBudgetManager::with_clock(RetryBudgetConfig::default(), clock.clone())
                    .unwrap(),
            ),
            clock.clone(),
        );

        let ticking = clock.clone();
        let options = RetryOptions::new("runs")
            .with_policy(exact_policy(5))
            .with_max_total_duration(Duration::from_secs(10));
        let result: RetryResult<(), CategorizedError> = executor
            .execute_with_retry(
                move || {
                    ticking.advance(Duration::from_secs(6));
                    async { Err(network_error()) }
                },
                &options,
            )
            .await;

        assert_eq!(result.attempts, 2);
        assert_eq!(result.termination, RetryTermination::AttemptsExhausted);
        assert!(result.error.is_some());
        assert_eq!(result.total_duration, Duration::from_secs(12));
    }

    /// Validates the deadline boundary scenario.
    ///
    /// Assertions:
    /// - Confirms a call whose elapsed time equals the limit makes no
    ///   further attempt.
    /// - Confirms the executor agrees with `can_continue_retrying_with`.
    #[tokio::test(start_paused = true)]
    async fn test_deadline_boundary_matches_helper() {
        let clock = MockClock::new();
        let executor = RetryExecutor::with_clock(
            Arc::new(RetryPolicyRegistry::new()),
            Arc::new(
                CircuitBreakerManager::with_clock(CircuitBreakerConfig::default(), clock.clone())
                    .unwrap(),
            ),
            Arc::new(
                RetryBudgetManager::with_clock(RetryBudgetConfig::default(), clock.clone())
                    .unwrap(),
            ),
            clock.clone(),
        );

        let start = clock.now();
        let limit = Duration::from_secs(10);
        let ticking = clock.clone();
        let options =
            RetryOptions::new("runs").with_policy(exact_policy(5)).with_max_total_duration(limit);
        let result: RetryResult<(), CategorizedError> = executor
            .execute_with_retry(
                move || {
                    ticking.advance(Duration::from_secs(5));
                    async { Err(network_error()) }
                },
                &options,
            )
            .await;

        assert_eq!(result.attempts, 2);
        assert_eq!(result.total_duration, limit);
        assert!(!can_continue_retrying_with(&clock, start, limit));
    }

    /// Validates the message heuristic fallback scenario.
    ///
    /// Assertions:
    /// - Confirms an `io::Error` without a mapped kind is classified from
    ///   its message and retried.
    #[tokio::test(start_paused = true)]
    async fn test_heuristic_classification_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let options = RetryOptions::new("runs").with_policy(exact_policy(1));

        let result: RetryResult<(), std::io::Error> = executor()
            .execute_with_retry(
                move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async { Err(std::io::Error::other("upstream returned 502 Bad Gateway")) }
                },
                &options,
            )
            .await;

        assert_eq!(result.attempts, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    /// Validates `RetryExecutor::with_retry` behavior.
    ///
    /// Assertions:
    /// - Confirms the wrapper can be called repeatedly and maps outcomes to
    ///   `Result`.
    #[tokio::test(start_paused = true)]
    async fn test_with_retry_wrapper() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let fetch = executor().with_retry(
            move || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n % 2 == 0 {
                        Err(network_error())
                    } else {
                        Ok(n)
                    }
                }
            },
            RetryOptions::new("runs").with_policy(exact_policy(3)),
        );

        assert_eq!(fetch().await.unwrap(), 1);
        assert_eq!(fetch().await.unwrap(), 3);

        let failing = executor().with_retry(
            || async { Err::<(), _>(CategorizedError::new(ErrorCategory::Auth, "bad token")) },
            RetryOptions::new("runs"),
        );
        let err = failing().await.unwrap_err();
        assert_eq!(err.to_string(), "AUTH: bad token");
    }

    /// Validates `RetryExecutor::with_retry` behavior for a call refused by
    /// an open breaker.
    ///
    /// Assertions:
    /// - Confirms the wrapper yields `CircuitOpen` instead of the generic
    ///   exhausted error.
    /// - Confirms the operation is never invoked.
    #[tokio::test(start_paused = true)]
    async fn test_with_retry_reports_open_circuit() {
        let executor = executor();
        for _ in 0..CircuitBreakerConfig::default().failure_threshold {
            executor.breakers().record_failure("runs");
        }

        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let fetch = executor.with_retry(
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok::<(), CategorizedError>(()) }
            },
            RetryOptions::new("runs"),
        );

        match fetch().await {
            Err(RetryError::CircuitOpen { endpoint }) => assert_eq!(endpoint, "runs"),
            other => panic!("expected CircuitOpen, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    /// Validates `RetryResult::into_result` for a result without any
    /// recorded error.
    ///
    /// Assertions:
    /// - Confirms the fixed "Operation failed after retries" error.
    #[test]
    fn test_into_result_without_error() {
        let result: RetryResult<(), CategorizedError> = RetryResult {
            success: false,
            data: None,
            error: None,
            attempts: 0,
            total_duration: Duration::ZERO,
            total_delay: Duration::ZERO,
            circuit_breaker_blocked: false,
            budget_exhausted: false,
            termination: RetryTermination::AttemptsExhausted,
            endpoint: "runs".into(),
            policy_name: "standard".into(),
        };
        let err = result.into_result().unwrap_err();
        assert_eq!(err.to_string(), "Operation failed after retries");
    }
}
