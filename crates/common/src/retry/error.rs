// Error type returned by `with_retry` and `RetryResult::into_result`
use std::time::Duration;

use thiserror::Error;

use super::backoff::parse_retry_after;
use super::category::{ClassifiedError, ErrorCategory};
use super::policies::transient_categories;
use crate::error::{CommonError, ErrorClassification, ErrorSeverity};

/// Terminal outcome of a retried call that did not succeed
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// The last error the operation returned
    #[error("{0}")]
    Operation(E),

    /// The circuit for the endpoint was open and nothing was recorded
    #[error("Circuit breaker is open for endpoint '{endpoint}'")]
    CircuitOpen { endpoint: String },

    /// The retry budget for the endpoint ran out and nothing was recorded
    #[error("Retry budget exhausted for endpoint '{endpoint}'")]
    BudgetExhausted { endpoint: String },

    /// No attempt produced an error to report
    #[error("Operation failed after retries")]
    Exhausted { attempts: u32 },
}

impl<E> RetryError<E> {
    /// The wrapped operation error, if that is what ended the call
    pub fn operation_error(&self) -> Option<&E> {
        match self {
            Self::Operation(e) => Some(e),
            _ => None,
        }
    }

    pub fn into_operation_error(self) -> Option<E> {
        match self {
            Self::Operation(e) => Some(e),
            _ => None,
        }
    }
}

impl<E: ClassifiedError> ErrorClassification for RetryError<E> {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Operation(e) => transient_categories().contains(&e.resolved_category()),
            // Both may clear on their own once the window or recovery passes
            Self::CircuitOpen { .. } | Self::BudgetExhausted { .. } => true,
            Self::Exhausted { .. } => false,
        }
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Operation(e) => match e.resolved_category() {
                ErrorCategory::NotFound => ErrorSeverity::Info,
                ErrorCategory::RateLimit | ErrorCategory::Auth => ErrorSeverity::Warning,
                _ => ErrorSeverity::Error,
            },
            Self::CircuitOpen { .. } | Self::BudgetExhausted { .. } => ErrorSeverity::Warning,
            Self::Exhausted { .. } => ErrorSeverity::Error,
        }
    }

    fn is_critical(&self) -> bool {
        false
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Operation(e) => {
                parse_retry_after(e.retry_after_header().as_deref()).map(|parsed| parsed.delay)
            }
            _ => None,
        }
    }
}

impl<E> From<RetryError<E>> for CommonError
where
    E: Into<CommonError>,
{
    fn from(err: RetryError<E>) -> Self {
        match err {
            RetryError::Operation(e) => e.into(),
            RetryError::CircuitOpen { endpoint } => CommonError::circuit_open(endpoint),
            RetryError::BudgetExhausted { endpoint } => CommonError::budget_exhausted(endpoint),
            RetryError::Exhausted { attempts } => CommonError::RetriesExhausted { attempts },
        }
    }
}
