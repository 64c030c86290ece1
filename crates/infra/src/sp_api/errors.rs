//! SP-API error types
//!
//! Provides error classification for SP-API calls and credential exchanges
//! with retry metadata.

use std::time::Duration;

use sellerscan_domain::{FailureKind, SellerScanError};
use thiserror::Error;

use super::signer::SigningError;
use crate::http::TransportError;

/// Categories of SP-API errors for retry logic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpApiErrorCategory {
    /// Authentication errors (401, 403, failed credential exchange) - non-retryable
    Authentication,
    /// Rate limiting errors (429) - retry with backoff
    RateLimit,
    /// Server errors (5xx) - retryable when transient
    Server,
    /// Client errors (4xx except auth and throttling) - non-retryable
    Client,
    /// Network/connection errors and timeouts - retryable
    Network,
    /// Configuration or decoding problems - non-retryable
    Config,
}

/// SP-API operation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpApiError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    #[error("Upstream returned HTTP {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to decode response: {0}")]
    Decode(String),
}

impl SpApiError {
    /// Classify a non-success HTTP status.
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = summarize_body(body);
        match status {
            401 | 403 => Self::Auth(format!("HTTP {status}: {message}")),
            429 => Self::RateLimitExceeded(message),
            _ => Self::Upstream { status, message },
        }
    }

    /// Get the error category for this error
    pub fn category(&self) -> SpApiErrorCategory {
        match self {
            Self::Auth(_) => SpApiErrorCategory::Authentication,
            Self::RateLimitExceeded(_) => SpApiErrorCategory::RateLimit,
            Self::Upstream { status, .. } if *status >= 500 => SpApiErrorCategory::Server,
            Self::Upstream { .. } => SpApiErrorCategory::Client,
            Self::Network(_) | Self::Timeout(_) => SpApiErrorCategory::Network,
            Self::Config(_) | Self::Decode(_) => SpApiErrorCategory::Config,
        }
    }

    /// Check if this error should be retried
    pub fn should_retry(&self) -> bool {
        match self {
            Self::RateLimitExceeded(_) | Self::Network(_) | Self::Timeout(_) => true,
            Self::Upstream { status, .. } => matches!(status, 500 | 502 | 503 | 504),
            Self::Auth(_) | Self::Config(_) | Self::Decode(_) => false,
        }
    }

    /// Per-item failure kind, or `None` when the error is systemic and should
    /// abort the scan instead.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Auth(_) => Some(FailureKind::Auth),
            Self::RateLimitExceeded(_) => Some(FailureKind::RateLimited),
            Self::Upstream { .. } | Self::Decode(_) => Some(FailureKind::Upstream),
            Self::Network(_) | Self::Timeout(_) => Some(FailureKind::Network),
            Self::Config(_) => None,
        }
    }
}

impl From<TransportError> for SpApiError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Timeout(after) => Self::Timeout(after),
            TransportError::Network(msg) => Self::Network(msg),
            TransportError::Build(msg) => Self::Config(msg),
        }
    }
}

impl From<SigningError> for SpApiError {
    fn from(err: SigningError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<CredentialError> for SpApiError {
    fn from(err: CredentialError) -> Self {
        match err {
            CredentialError::Config(msg) => Self::Config(msg),
            other => Self::Auth(other.to_string()),
        }
    }
}

impl From<SpApiError> for SellerScanError {
    fn from(err: SpApiError) -> Self {
        match err {
            SpApiError::Auth(msg) => SellerScanError::Auth(msg),
            SpApiError::Config(msg) => SellerScanError::Config(msg),
            SpApiError::Upstream { status: 404, message } => SellerScanError::NotFound(message),
            other => SellerScanError::Network(other.to_string()),
        }
    }
}

/// Client failure together with the number of attempts that were made.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{error} (after {attempts} attempt(s))")]
pub struct RequestFailure {
    #[source]
    pub error: SpApiError,
    pub attempts: u32,
}

impl RequestFailure {
    pub fn new(error: SpApiError, attempts: u32) -> Self {
        Self { error, attempts }
    }
}

/// Errors from the LWA and STS credential exchanges
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CredentialError {
    /// The identity service refused the request (4xx).
    #[error("credential exchange rejected: {0}")]
    Rejected(String),

    /// Transport failure, timeout or 5xx.
    #[error("credential exchange network error: {0}")]
    Network(String),

    #[error("credential response could not be decoded: {0}")]
    Decode(String),

    #[error("credential configuration error: {0}")]
    Config(String),
}

impl CredentialError {
    /// Only transient failures are worth another exchange.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_))
    }

    pub(crate) fn from_status(service: &str, status: u16, body: &str) -> Self {
        let message = format!("{service} returned HTTP {status}: {}", summarize_body(body));
        if (400..500).contains(&status) {
            Self::Rejected(message)
        } else {
            Self::Network(message)
        }
    }
}

impl From<SigningError> for CredentialError {
    fn from(err: SigningError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<TransportError> for CredentialError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Build(msg) => Self::Config(msg),
            other => Self::Network(other.to_string()),
        }
    }
}

const MAX_BODY_SNIPPET: usize = 200;

fn summarize_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "empty response body".to_string();
    }
    match trimmed.char_indices().nth(MAX_BODY_SNIPPET) {
        Some((cut, _)) => format!("{}…", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert_eq!(SpApiError::from_status(401, "").category(), SpApiErrorCategory::Authentication);
        assert_eq!(SpApiError::from_status(403, "").category(), SpApiErrorCategory::Authentication);
        assert_eq!(SpApiError::from_status(429, "").category(), SpApiErrorCategory::RateLimit);
        assert_eq!(SpApiError::from_status(503, "").category(), SpApiErrorCategory::Server);
        assert_eq!(SpApiError::from_status(404, "").category(), SpApiErrorCategory::Client);
    }

    #[test]
    fn test_should_retry() {
        for status in [429, 500, 502, 503, 504] {
            assert!(SpApiError::from_status(status, "").should_retry(), "{status}");
        }
        for status in [400, 401, 403, 404, 501] {
            assert!(!SpApiError::from_status(status, "").should_retry(), "{status}");
        }
        assert!(SpApiError::Network("reset".into()).should_retry());
        assert!(SpApiError::Timeout(Duration::from_secs(30)).should_retry());
        assert!(!SpApiError::Decode("bad json".into()).should_retry());
    }

    #[test]
    fn test_failure_kinds() {
        assert_eq!(SpApiError::from_status(403, "").failure_kind(), Some(FailureKind::Auth));
        assert_eq!(
            SpApiError::from_status(429, "").failure_kind(),
            Some(FailureKind::RateLimited)
        );
        assert_eq!(SpApiError::from_status(500, "").failure_kind(), Some(FailureKind::Upstream));
        assert_eq!(
            SpApiError::Timeout(Duration::from_secs(1)).failure_kind(),
            Some(FailureKind::Network)
        );
        assert_eq!(SpApiError::Config("no endpoint".into()).failure_kind(), None);
    }

    #[test]
    fn test_credential_errors_become_auth() {
        let err: SpApiError = CredentialError::Rejected("invalid_grant".into()).into();
        assert!(matches!(err, SpApiError::Auth(_)));

        let err: SpApiError = CredentialError::Network("reset".into()).into();
        assert!(matches!(err, SpApiError::Auth(_)));
        assert!(!err.should_retry());
    }

    #[test]
    fn test_credential_status_split() {
        assert!(matches!(
            CredentialError::from_status("LWA", 400, "{\"error\":\"invalid_grant\"}"),
            CredentialError::Rejected(_)
        ));
        assert!(CredentialError::from_status("STS", 503, "").is_transient());
    }

    #[test]
    fn test_long_bodies_are_truncated() {
        let body = "x".repeat(1_000);
        match SpApiError::from_status(400, &body) {
            SpApiError::Upstream { message, .. } => assert!(message.chars().count() <= 201),
            other => panic!("unexpected {other:?}"),
        }
    }
}
