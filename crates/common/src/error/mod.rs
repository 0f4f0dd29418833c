//! Shared error vocabulary for DeepSource MCP crates
//!
//! [`CommonError`] covers the failures every layer of the server can hit
//! when talking to the DeepSource GraphQL API: bad configuration, transport
//! failures, API responses with an error status, rate limiting, and the
//! retry core's own refusals (open circuit, spent budget).
//!
//! Tool-specific errors wrap it rather than duplicating its variants:
//!
//! ```rust,ignore
//! #[derive(Debug, Error)]
//! pub enum ToolError {
//!     #[error("unknown analyzer shortcode '{0}'")]
//!     UnknownAnalyzer(String),
//!
//!     #[error(transparent)]
//!     Common(#[from] CommonError),
//! }
//! ```
//!
//! | Variant | Retry category | Retryable |
//! |---------|----------------|-----------|
//! | `Config` | `OTHER` | no |
//! | `Network` | `NETWORK` | yes |
//! | `Api` | from status (`SERVER` without one) | 408, 429, 5xx |
//! | `RateLimited` | `RATE_LIMIT` | yes |
//! | `Timeout` | `TIMEOUT` | yes |
//! | `CircuitOpen` | `OTHER` | later |
//! | `BudgetExhausted` | `OTHER` | later |
//! | `RetriesExhausted` | `OTHER` | no |
//! | `Unauthorized` | `AUTH` | no |
//! | `NotFound` | `NOT_FOUND` | no |
//! | `Validation` | `CLIENT` | no |
//! | `Serialization` | `FORMAT` | no |
//! | `Internal` | `OTHER` | no |

use std::fmt;
use std::time::Duration;

/// Result alias used across the crate
pub type CommonResult<T> = Result<T, CommonError>;

#[derive(Debug, Clone, PartialEq)]
pub enum CommonError {
    /// Invalid configuration value; `field` names the setting or variable
    Config { message: String, field: Option<String> },

    /// The request never produced an HTTP response
    Network { endpoint: String, message: String },

    /// The API answered with an error
    Api { endpoint: String, status: Option<u16>, message: String },

    /// The API asked us to slow down
    RateLimited { endpoint: Option<String>, retry_after: Option<Duration> },

    Timeout { operation: String, duration: Duration },

    /// The endpoint's circuit breaker refused the call
    CircuitOpen { endpoint: String, retry_after: Option<Duration> },

    /// The endpoint's retry budget for the current window is spent
    BudgetExhausted { endpoint: String },

    /// Every allowed attempt failed without a reportable error
    RetriesExhausted { attempts: u32 },

    /// Missing or rejected API token
    Unauthorized { message: String },

    NotFound { resource_type: String, identifier: Option<String> },

    Validation { field: String, message: String },

    Serialization { message: String, format: Option<String> },

    Internal { message: String },
}

impl fmt::Display for CommonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config { message, field: Some(field) } => {
                write!(f, "Configuration error in '{}': {}", field, message)
            }
            Self::Config { message, field: None } => write!(f, "Configuration error: {}", message),
            Self::Network { endpoint, message } => {
                write!(f, "Network error calling '{}': {}", endpoint, message)
            }
            Self::Api { endpoint, status: Some(status), message } => {
                write!(f, "API error from '{}' (HTTP {}): {}", endpoint, status, message)
            }
            Self::Api { endpoint, status: None, message } => {
                write!(f, "API error from '{}': {}", endpoint, message)
            }
            Self::RateLimited { endpoint, retry_after } => {
                f.write_str("Rate limited")?;
                if let Some(endpoint) = endpoint {
                    write!(f, " on '{}'", endpoint)?;
                }
                if let Some(retry) = retry_after {
                    write!(f, " (retry in {:?})", retry)?;
                }
                Ok(())
            }
            Self::Timeout { operation, duration } => {
                write!(f, "Operation '{}' timed out after {:?}", operation, duration)
            }
            Self::CircuitOpen { endpoint, retry_after: Some(retry) } => {
                write!(f, "Circuit breaker open for '{}' (retry in {:?})", endpoint, retry)
            }
            Self::CircuitOpen { endpoint, retry_after: None } => {
                write!(f, "Circuit breaker open for '{}'", endpoint)
            }
            Self::BudgetExhausted { endpoint } => {
                write!(f, "Retry budget exhausted for '{}'", endpoint)
            }
            Self::RetriesExhausted { attempts } => {
                write!(f, "Operation failed after {} attempts", attempts)
            }
            Self::Unauthorized { message } => write!(f, "Unauthorized: {}", message),
            Self::NotFound { resource_type, identifier: Some(id) } => {
                write!(f, "{} not found: '{}'", resource_type, id)
            }
            Self::NotFound { resource_type, identifier: None } => {
                write!(f, "{} not found", resource_type)
            }
            Self::Validation { field, message } => {
                write!(f, "Invalid value for '{}': {}", field, message)
            }
            Self::Serialization { message, format: Some(format) } => {
                write!(f, "{} serialization error: {}", format, message)
            }
            Self::Serialization { message, format: None } => {
                write!(f, "Serialization error: {}", message)
            }
            Self::Internal { message } => write!(f, "Internal error: {}", message),
        }
    }
}

impl std::error::Error for CommonError {}

impl ErrorClassification for CommonError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Network { .. }
            | Self::RateLimited { .. }
            | Self::Timeout { .. }
            | Self::CircuitOpen { .. }
            | Self::BudgetExhausted { .. } => true,
            Self::Api { status, .. } => match status {
                Some(status) => matches!(*status, 408 | 429 | 500..=599),
                None => true,
            },
            _ => false,
        }
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::NotFound { .. } => ErrorSeverity::Info,
            Self::RateLimited { .. }
            | Self::Timeout { .. }
            | Self::Network { .. }
            | Self::CircuitOpen { .. }
            | Self::BudgetExhausted { .. }
            | Self::Unauthorized { .. } => ErrorSeverity::Warning,
            Self::Internal { .. } => ErrorSeverity::Critical,
            _ => ErrorSeverity::Error,
        }
    }

    fn is_critical(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::CircuitOpen { retry_after, .. } | Self::RateLimited { retry_after, .. } => {
                *retry_after
            }
            _ => None,
        }
    }
}

impl CommonError {
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into(), field: None }
    }

    /// Configuration error tied to a setting or environment variable
    pub fn config_field<F: Into<String>, S: Into<String>>(field: F, message: S) -> Self {
        Self::Config { message: message.into(), field: Some(field.into()) }
    }

    pub fn network<E: Into<String>, S: Into<String>>(endpoint: E, message: S) -> Self {
        Self::Network { endpoint: endpoint.into(), message: message.into() }
    }

    /// API error response with its HTTP status
    pub fn api<E: Into<String>, S: Into<String>>(endpoint: E, status: u16, message: S) -> Self {
        Self::Api { endpoint: endpoint.into(), status: Some(status), message: message.into() }
    }

    /// API error reported in the response body without a failing status
    pub fn api_message<E: Into<String>, S: Into<String>>(endpoint: E, message: S) -> Self {
        Self::Api { endpoint: endpoint.into(), status: None, message: message.into() }
    }

    pub fn rate_limited() -> Self {
        Self::RateLimited { endpoint: None, retry_after: None }
    }

    /// Rate limit carrying the server's `Retry-After` delay
    pub fn rate_limited_with_retry(retry_after: Duration) -> Self {
        Self::RateLimited { endpoint: None, retry_after: Some(retry_after) }
    }

    pub fn timeout<S: Into<String>>(operation: S, duration: Duration) -> Self {
        Self::Timeout { operation: operation.into(), duration }
    }

    pub fn circuit_open<E: Into<String>>(endpoint: E) -> Self {
        Self::CircuitOpen { endpoint: endpoint.into(), retry_after: None }
    }

    pub fn budget_exhausted<E: Into<String>>(endpoint: E) -> Self {
        Self::BudgetExhausted { endpoint: endpoint.into() }
    }

    pub fn unauthorized<S: Into<String>>(message: S) -> Self {
        Self::Unauthorized { message: message.into() }
    }

    pub fn not_found<T: Into<String>>(resource_type: T) -> Self {
        Self::NotFound { resource_type: resource_type.into(), identifier: None }
    }

    pub fn not_found_with_id<T: Into<String>, I: Into<String>>(
        resource_type: T,
        identifier: I,
    ) -> Self {
        Self::NotFound { resource_type: resource_type.into(), identifier: Some(identifier.into()) }
    }

    pub fn validation<F: Into<String>, S: Into<String>>(field: F, message: S) -> Self {
        Self::Validation { field: field.into(), message: message.into() }
    }

    pub fn serialization_format<F: Into<String>, S: Into<String>>(format: F, message: S) -> Self {
        Self::Serialization { message: message.into(), format: Some(format.into()) }
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Endpoint the failure is attributed to, when known
    pub fn endpoint(&self) -> Option<&str> {
        match self {
            Self::Network { endpoint, .. }
            | Self::Api { endpoint, .. }
            | Self::CircuitOpen { endpoint, .. }
            | Self::BudgetExhausted { endpoint } => Some(endpoint.as_str()),
            Self::RateLimited { endpoint, .. } => endpoint.as_deref(),
            _ => None,
        }
    }
}

/// Uniform retryability and severity queries over error types
///
/// ```rust
/// use deepsource_common::error::{CommonError, ErrorClassification, ErrorSeverity};
///
/// let err = CommonError::api("runs", 503, "upstream unavailable");
/// assert!(err.is_retryable());
/// assert_eq!(err.severity(), ErrorSeverity::Error);
/// ```
pub trait ErrorClassification {
    /// Whether the same call may succeed if made again later
    fn is_retryable(&self) -> bool;

    fn severity(&self) -> ErrorSeverity;

    fn is_critical(&self) -> bool;

    /// Delay the server or breaker asked for, if any
    fn retry_after(&self) -> Option<Duration>;
}

/// Log level an error should be reported at
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Info => "INFO",
            Self::Warning => "WARN",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
        };
        f.write_str(label)
    }
}

impl From<serde_json::Error> for CommonError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization_format("JSON", err.to_string())
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for error handling functionality
    //!
    //! Tests cover constructors, display formatting, severity levels,
    //! retryability, and conversions.

    use super::*;

    /// Validates `CommonError::config_field` behavior for the environment
    /// variable scenario.
    ///
    /// Assertions:
    /// - Ensures the rendered message names the variable.
    /// - Ensures configuration errors are not retryable.
    #[test]
    fn test_config_errors() {
        let err = CommonError::config_field("RETRY_MAX_ATTEMPTS", "not a number");
        assert_eq!(err.to_string(), "Configuration error in 'RETRY_MAX_ATTEMPTS': not a number");
        assert!(!err.is_retryable());
        assert_eq!(err.severity(), ErrorSeverity::Error);
        assert_eq!(CommonError::config("bad").to_string(), "Configuration error: bad");
    }

    /// Validates `CommonError::api` retryability by HTTP status.
    ///
    /// Assertions:
    /// - Ensures 408, 429 and 5xx are retryable and other 4xx are not.
    /// - Ensures an API error without a status is treated as retryable.
    #[test]
    fn test_api_status_retryability() {
        for status in [408, 429, 500, 502, 503, 599] {
            assert!(CommonError::api("runs", status, "x").is_retryable(), "{status}");
        }
        for status in [400, 401, 403, 404, 422] {
            assert!(!CommonError::api("runs", status, "x").is_retryable(), "{status}");
        }
        assert!(CommonError::api_message("runs", "upstream hiccup").is_retryable());
    }

    /// Validates the display strings scenario.
    ///
    /// Assertions:
    /// - Confirms the endpoint and status appear in API and network errors.
    /// - Confirms not-found errors render the identifier when present.
    #[test]
    fn test_display() {
        assert_eq!(
            CommonError::api("project_issues", 502, "bad gateway").to_string(),
            "API error from 'project_issues' (HTTP 502): bad gateway"
        );
        assert_eq!(
            CommonError::network("runs", "connection refused").to_string(),
            "Network error calling 'runs': connection refused"
        );
        assert_eq!(
            CommonError::not_found_with_id("Repository", "acme/widgets").to_string(),
            "Repository not found: 'acme/widgets'"
        );
        assert_eq!(CommonError::not_found("Run").to_string(), "Run not found");
        assert_eq!(
            CommonError::RetriesExhausted { attempts: 4 }.to_string(),
            "Operation failed after 4 attempts"
        );
    }

    /// Validates `CommonError::rate_limited_with_retry` behavior for the
    /// retry-after hint scenario.
    ///
    /// Assertions:
    /// - Ensures `err.is_retryable()` evaluates to true.
    /// - Confirms `err.retry_after()` equals `Some(30s)`.
    #[test]
    fn test_rate_limit_retry_after() {
        let err = CommonError::rate_limited_with_retry(Duration::from_secs(30));
        assert!(err.is_retryable());
        assert_eq!(err.retry_after(), Some(Duration::from_secs(30)));
        assert_eq!(err.to_string(), "Rate limited (retry in 30s)");
        assert_eq!(CommonError::rate_limited().retry_after(), None);
    }

    #[test]
    fn test_endpoint_attribution() {
        assert_eq!(CommonError::circuit_open("runs").endpoint(), Some("runs"));
        assert_eq!(CommonError::budget_exhausted("projects").endpoint(), Some("projects"));
        assert_eq!(CommonError::rate_limited().endpoint(), None);
        assert_eq!(CommonError::internal("boom").endpoint(), None);
    }

    #[test]
    fn test_severity() {
        assert!(CommonError::internal("invariant violated").is_critical());
        assert_eq!(CommonError::internal("x").severity(), ErrorSeverity::Critical);
        assert_eq!(CommonError::not_found("Run").severity(), ErrorSeverity::Info);
        assert_eq!(CommonError::unauthorized("bad token").severity(), ErrorSeverity::Warning);
        assert!(ErrorSeverity::Info < ErrorSeverity::Warning);
        assert_eq!(ErrorSeverity::Warning.to_string(), "WARN");
    }

    /// Validates `From<serde_json::Error>` behavior for the JSON conversion
    /// scenario.
    ///
    /// Assertions:
    /// - Ensures the converted error is a `Serialization` variant tagged
    ///   `JSON`.
    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{oops").unwrap_err();
        let err: CommonError = json_err.into();
        match err {
            CommonError::Serialization { format, .. } => {
                assert_eq!(format.as_deref(), Some("JSON"));
            }
            other => panic!("expected Serialization, got {other:?}"),
        }
    }
}
