//! Error categories and the classification contract
//!
//! Every failure the executor sees is mapped to one [`ErrorCategory`]. The
//! primary path is the [`ClassifiedError`] trait, implemented by the error
//! types of the transport layer. When an error does not know its own
//! category the executor falls back to [`classify_message`], a keyword
//! heuristic over the rendered message.

use std::fmt;
use std::io;

use serde::{Deserialize, Serialize};

use crate::error::{CommonError, ErrorClassification};

/// Failure taxonomy shared by policies and classifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    Auth,
    Network,
    Server,
    Client,
    Timeout,
    RateLimit,
    Schema,
    NotFound,
    Format,
    Other,
}

impl ErrorCategory {
    /// All categories, in declaration order
    pub const ALL: [ErrorCategory; 10] = [
        Self::Auth,
        Self::Network,
        Self::Server,
        Self::Client,
        Self::Timeout,
        Self::RateLimit,
        Self::Schema,
        Self::NotFound,
        Self::Format,
        Self::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auth => "AUTH",
            Self::Network => "NETWORK",
            Self::Server => "SERVER",
            Self::Client => "CLIENT",
            Self::Timeout => "TIMEOUT",
            Self::RateLimit => "RATE_LIMIT",
            Self::Schema => "SCHEMA",
            Self::NotFound => "NOT_FOUND",
            Self::Format => "FORMAT",
            Self::Other => "OTHER",
        }
    }

    /// Map an HTTP status code to a category
    ///
    /// Returns `None` for statuses below 400, which are not failures.
    pub fn from_status(status: u16) -> Option<Self> {
        match status {
            429 => Some(Self::RateLimit),
            408 => Some(Self::Timeout),
            400..=499 => Some(Self::Client),
            500..=599 => Some(Self::Server),
            s if s >= 600 => Some(Self::Other),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const RATE_LIMIT_KEYWORDS: &[&str] =
    &["rate limit", "ratelimit", "too many requests", "429", "throttl", "quota exceeded"];

const TIMEOUT_KEYWORDS: &[&str] = &["timeout", "timed out", "408", "deadline exceeded"];

const NETWORK_KEYWORDS: &[&str] = &[
    "network",
    "connection",
    "econnrefused",
    "econnreset",
    "enotfound",
    "dns",
    "socket hang up",
    "refused",
    "unreachable",
    "broken pipe",
];

const SERVER_KEYWORDS: &[&str] = &[
    "500",
    "502",
    "503",
    "504",
    "internal server error",
    "bad gateway",
    "service unavailable",
    "server error",
];

/// Heuristic category for an error that carries no structured category
///
/// Checked in order: rate limiting, timeouts, network, server. Anything
/// else is `OTHER`. Lossy; prefer [`ClassifiedError::category`].
pub fn classify_message(message: &str) -> ErrorCategory {
    let message = message.to_lowercase();
    let matches_any = |keywords: &[&str]| keywords.iter().any(|k| message.contains(k));

    if matches_any(RATE_LIMIT_KEYWORDS) {
        ErrorCategory::RateLimit
    } else if matches_any(TIMEOUT_KEYWORDS) {
        ErrorCategory::Timeout
    } else if matches_any(NETWORK_KEYWORDS) {
        ErrorCategory::Network
    } else if matches_any(SERVER_KEYWORDS) {
        ErrorCategory::Server
    } else {
        ErrorCategory::Other
    }
}

/// Errors that can tell the retry core what kind of failure they are
pub trait ClassifiedError: fmt::Display {
    /// Structured category, or `None` to fall back to the message heuristic
    fn category(&self) -> Option<ErrorCategory> {
        None
    }

    /// Raw `Retry-After` header value attached to the failure, if any
    fn retry_after_header(&self) -> Option<String> {
        None
    }

    /// Category used by the executor
    fn resolved_category(&self) -> ErrorCategory {
        self.category().unwrap_or_else(|| classify_message(&self.to_string()))
    }
}

impl ClassifiedError for CommonError {
    fn category(&self) -> Option<ErrorCategory> {
        let category = match self {
            Self::Network { .. } => ErrorCategory::Network,
            Self::Api { status: Some(status), .. } => {
                ErrorCategory::from_status(*status).unwrap_or(ErrorCategory::Other)
            }
            Self::Api { status: None, .. } => ErrorCategory::Server,
            Self::RateLimited { .. } => ErrorCategory::RateLimit,
            Self::Timeout { .. } => ErrorCategory::Timeout,
            Self::Unauthorized { .. } => ErrorCategory::Auth,
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::Validation { .. } => ErrorCategory::Client,
            Self::Serialization { .. } => ErrorCategory::Format,
            // The retry core's own refusals are never retried in place
            Self::CircuitOpen { .. }
            | Self::BudgetExhausted { .. }
            | Self::RetriesExhausted { .. }
            | Self::Config { .. }
            | Self::Internal { .. } => ErrorCategory::Other,
        };
        Some(category)
    }

    fn retry_after_header(&self) -> Option<String> {
        self.retry_after().map(|d| {
            let secs = d.as_secs() + u64::from(d.subsec_nanos() > 0);
            secs.to_string()
        })
    }
}

impl ClassifiedError for io::Error {
    fn category(&self) -> Option<ErrorCategory> {
        use io::ErrorKind;

        match self.kind() {
            ErrorKind::TimedOut => Some(ErrorCategory::Timeout),
            ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::NotConnected
            | ErrorKind::AddrNotAvailable
            | ErrorKind::BrokenPipe
            | ErrorKind::UnexpectedEof => Some(ErrorCategory::Network),
            ErrorKind::NotFound => Some(ErrorCategory::NotFound),
            ErrorKind::PermissionDenied => Some(ErrorCategory::Auth),
            ErrorKind::InvalidData => Some(ErrorCategory::Format),
            ErrorKind::InvalidInput => Some(ErrorCategory::Client),
            _ => None,
        }
    }
}

/// Concrete classified error for transports that already know the category
///
/// ```
/// use deepsource_common::retry::{CategorizedError, ClassifiedError, ErrorCategory};
///
/// let err = CategorizedError::from_status(503, "upstream unavailable").with_retry_after("5");
/// assert_eq!(err.category(), Some(ErrorCategory::Server));
/// assert_eq!(err.retry_after_header().as_deref(), Some("5"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategorizedError {
    category: ErrorCategory,
    message: String,
    status: Option<u16>,
    retry_after: Option<String>,
}

impl CategorizedError {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self { category, message: message.into(), status: None, retry_after: None }
    }

    /// Build from an HTTP status; statuses below 400 are classified `OTHER`
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let category = ErrorCategory::from_status(status).unwrap_or(ErrorCategory::Other);
        Self { category, message: message.into(), status: Some(status), retry_after: None }
    }

    #[must_use]
    pub fn with_retry_after(mut self, value: impl Into<String>) -> Self {
        self.retry_after = Some(value.into());
        self
    }

    pub fn error_category(&self) -> ErrorCategory {
        self.category
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }
}

impl fmt::Display for CategorizedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} ({}): {}", self.category, status, self.message),
            None => write!(f, "{}: {}", self.category, self.message),
        }
    }
}

impl std::error::Error for CategorizedError {}

impl ClassifiedError for CategorizedError {
    fn category(&self) -> Option<ErrorCategory> {
        Some(self.category)
    }

    fn retry_after_header(&self) -> Option<String> {
        self.retry_after.clone()
    }
}
