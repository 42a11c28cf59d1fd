//! Caller-facing error types.
//!
//! `ValidationError` covers bad input rejected before anything is enqueued.
//! `LookupError` covers an unreachable subscriber registry. Neither is ever
//! retried by the core.

use thiserror::Error;

/// Input rejected synchronously at the trigger boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The event name was empty or whitespace.
    #[error("event name must not be empty")]
    EmptyEventName,

    /// A subscriber URL is not a well-formed absolute http(s) URL.
    #[error("invalid post url {url:?}: {reason}")]
    InvalidPostUrl {
        /// The rejected URL as supplied
        url: String,
        /// Why the URL was rejected
        reason: String,
    },
}

impl ValidationError {
    /// Creates an invalid post URL error.
    pub fn invalid_post_url(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPostUrl { url: url.into(), reason: reason.into() }
    }
}

/// The subscriber registry could not answer a lookup.
///
/// Distinct from an empty result: an empty subscriber list is a valid answer
/// and triggers the integration fallback, an unavailable registry drops the
/// event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    /// Registry backend unreachable or in an unusable state.
    #[error("subscriber registry unavailable: {message}")]
    Unavailable {
        /// Description of the registry failure
        message: String,
    },
}

impl LookupError {
    /// Creates an unavailable registry error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable { message: message.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_format() {
        assert_eq!(ValidationError::EmptyEventName.to_string(), "event name must not be empty");

        let err = ValidationError::invalid_post_url("ftp://x", "unsupported scheme");
        assert_eq!(err.to_string(), r#"invalid post url "ftp://x": unsupported scheme"#);

        let err = LookupError::unavailable("connection reset");
        assert_eq!(err.to_string(), "subscriber registry unavailable: connection reset");
    }
}
