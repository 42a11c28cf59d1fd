//! Error types for delivery operations.
//!
//! Every failure scoped to one delivery task is a `DeliveryError`. The
//! retryable variants are transport faults (network, timeout, any non-2xx
//! response). The rest are target or configuration faults that retrying
//! cannot fix.

use std::{fmt, time::Duration};

use herald_core::ValidationError;
use thiserror::Error;

/// Result type alias for delivery operations.
pub type Result<T> = std::result::Result<T, DeliveryError>;

/// Failure of a single delivery task or of the delivery machinery.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// Network-level connectivity failure.
    #[error("network connection failed: {message}")]
    NetworkError {
        /// Error message describing the network failure
        message: String,
    },

    /// Connect or read timeout exceeded.
    #[error("request timeout after {timeout_ms}ms")]
    Timeout {
        /// Timeout that was exceeded, in milliseconds
        timeout_ms: u64,
    },

    /// Target answered with a 4xx status.
    #[error("client error: HTTP {status_code}")]
    ClientError {
        /// HTTP status code (4xx)
        status_code: u16,
        /// Response body content
        body: String,
    },

    /// Target answered with a 5xx or other non-2xx status.
    #[error("server error: HTTP {status_code}")]
    ServerError {
        /// HTTP status code
        status_code: u16,
        /// Response body content
        body: String,
    },

    /// Target asked us to back off.
    #[error(
        "rate limited{}",
        .retry_after_seconds.map(|s| format!(": retry after {s}s")).unwrap_or_default()
    )]
    RateLimited {
        /// Seconds the target asked us to wait, when it said
        retry_after_seconds: Option<u64>,
    },

    /// Integration API accepted the request but refused the message.
    #[error("{integration} rejected the message: {reason}")]
    Rejected {
        /// Integration that refused
        integration: String,
        /// Reason reported by the integration API
        reason: String,
    },

    /// Target is unusable as configured (malformed URL, disabled
    /// integration, missing credentials).
    #[error("invalid target configuration: {message}")]
    ConfigurationError {
        /// Configuration error message
        message: String,
    },

    /// Event lacks data the target needs to build its message.
    #[error("invalid payload for target: {message}")]
    InvalidPayload {
        /// What is missing or malformed
        message: String,
    },

    /// Worker shutdown interrupted the task.
    #[error("worker shutdown requested")]
    ShutdownRequested,

    /// Workers did not finish within the shutdown timeout.
    #[error("worker shutdown timed out after {timeout:?}")]
    ShutdownTimeout {
        /// Timeout that was exceeded
        timeout: Duration,
    },

    /// A worker task panicked.
    #[error("worker {worker_id} panicked: {error}")]
    WorkerPanic {
        /// Index of the worker
        worker_id: usize,
        /// Join error description
        error: String,
    },

    /// Unexpected internal error.
    #[error("internal delivery error: {message}")]
    InternalError {
        /// Internal error message
        message: String,
    },
}

impl DeliveryError {
    /// Creates a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkError { message: message.into() }
    }

    /// Creates a timeout error.
    pub fn timeout(timeout: Duration) -> Self {
        Self::Timeout { timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX) }
    }

    /// Creates a client error from an HTTP response.
    pub fn client_error(status_code: u16, body: impl Into<String>) -> Self {
        Self::ClientError { status_code, body: body.into() }
    }

    /// Creates a server error from an HTTP response.
    pub fn server_error(status_code: u16, body: impl Into<String>) -> Self {
        Self::ServerError { status_code, body: body.into() }
    }

    /// Creates a rate limit error, with the target's `Retry-After` hint if
    /// it sent one.
    pub fn rate_limited(retry_after_seconds: Option<u64>) -> Self {
        Self::RateLimited { retry_after_seconds }
    }

    /// Creates an integration rejection.
    pub fn rejected(integration: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Rejected { integration: integration.into(), reason: reason.into() }
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::ConfigurationError { message: message.into() }
    }

    /// Creates an invalid payload error.
    pub fn invalid_payload(message: impl Into<String>) -> Self {
        Self::InvalidPayload { message: message.into() }
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::InternalError { message: message.into() }
    }

    /// Whether another attempt could succeed.
    ///
    /// Transport failures and every non-2xx response are retryable. Target
    /// and configuration faults and shutdown are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::NetworkError { .. }
            | Self::Timeout { .. }
            | Self::ClientError { .. }
            | Self::ServerError { .. }
            | Self::RateLimited { .. } => true,

            Self::Rejected { .. }
            | Self::ConfigurationError { .. }
            | Self::InvalidPayload { .. }
            | Self::ShutdownRequested
            | Self::ShutdownTimeout { .. }
            | Self::WorkerPanic { .. }
            | Self::InternalError { .. } => false,
        }
    }

    /// Server-requested retry delay, if any.
    pub fn retry_after_seconds(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after_seconds } => *retry_after_seconds,
            _ => None,
        }
    }

    /// HTTP status carried by the error, if the target responded.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::ClientError { status_code, .. } | Self::ServerError { status_code, .. } => {
                Some(*status_code)
            },
            Self::RateLimited { .. } => Some(429),
            _ => None,
        }
    }
}

impl From<ValidationError> for DeliveryError {
    fn from(error: ValidationError) -> Self {
        Self::configuration(error.to_string())
    }
}

/// Category of delivery error for logs and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Connectivity or timeout.
    Network,
    /// Non-2xx HTTP response.
    Http,
    /// Rate limiting.
    RateLimit,
    /// Integration refused the message.
    Rejected,
    /// Target or payload unusable.
    Configuration,
    /// Shutdown, worker and internal faults.
    Internal,
}

impl From<&DeliveryError> for ErrorCategory {
    fn from(error: &DeliveryError) -> Self {
        match error {
            DeliveryError::NetworkError { .. } | DeliveryError::Timeout { .. } => Self::Network,
            DeliveryError::ClientError { .. } | DeliveryError::ServerError { .. } => Self::Http,
            DeliveryError::RateLimited { .. } => Self::RateLimit,
            DeliveryError::Rejected { .. } => Self::Rejected,
            DeliveryError::ConfigurationError { .. } | DeliveryError::InvalidPayload { .. } => {
                Self::Configuration
            },
            DeliveryError::ShutdownRequested
            | DeliveryError::ShutdownTimeout { .. }
            | DeliveryError::WorkerPanic { .. }
            | DeliveryError::InternalError { .. } => Self::Internal,
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network => write!(f, "network"),
            Self::Http => write!(f, "http"),
            Self::RateLimit => write!(f, "rate_limit"),
            Self::Rejected => write!(f, "rejected"),
            Self::Configuration => write!(f, "configuration"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors_identified_correctly() {
        assert!(DeliveryError::network("connection refused").is_retryable());
        assert!(DeliveryError::timeout(Duration::from_secs(30)).is_retryable());
        assert!(DeliveryError::server_error(503, "unavailable").is_retryable());
        assert!(DeliveryError::client_error(404, "not found").is_retryable());
        assert!(DeliveryError::rate_limited(Some(60)).is_retryable());
        assert!(DeliveryError::rate_limited(None).is_retryable());

        assert!(!DeliveryError::configuration("invalid URL").is_retryable());
        assert!(!DeliveryError::invalid_payload("missing log").is_retryable());
        assert!(!DeliveryError::rejected("slack", "invalid_auth").is_retryable());
        assert!(!DeliveryError::ShutdownRequested.is_retryable());
    }

    #[test]
    fn validation_errors_become_configuration_errors() {
        let err: DeliveryError = ValidationError::invalid_post_url("nope", "relative URL").into();
        assert!(matches!(err, DeliveryError::ConfigurationError { .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn status_codes_extracted() {
        assert_eq!(DeliveryError::client_error(410, "").status_code(), Some(410));
        assert_eq!(DeliveryError::rate_limited(Some(5)).status_code(), Some(429));
        assert_eq!(DeliveryError::network("reset").status_code(), None);
    }

    #[test]
    fn error_categories_mapped_correctly() {
        assert_eq!(ErrorCategory::from(&DeliveryError::network("x")), ErrorCategory::Network);
        assert_eq!(ErrorCategory::from(&DeliveryError::server_error(500, "")), ErrorCategory::Http);
        assert_eq!(
            ErrorCategory::from(&DeliveryError::configuration("x")),
            ErrorCategory::Configuration
        );
        assert_eq!(ErrorCategory::Configuration.to_string(), "configuration");
    }

    #[test]
    fn error_display_format() {
        assert_eq!(
            DeliveryError::timeout(Duration::from_millis(1500)).to_string(),
            "request timeout after 1500ms"
        );
        assert_eq!(
            DeliveryError::rejected("slack", "channel_not_found").to_string(),
            "slack rejected the message: channel_not_found"
        );
        assert_eq!(DeliveryError::rate_limited(None).to_string(), "rate limited");
        assert_eq!(
            DeliveryError::rate_limited(Some(12)).to_string(),
            "rate limited: retry after 12s"
        );
    }
}
