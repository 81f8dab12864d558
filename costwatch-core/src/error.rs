//! Core error types for `costwatch`.
//!
//! Two families live here:
//! - [`CoreError`] for invalid model construction and serialization.
//! - [`CollectionError`] for provider failures, each mapping onto exactly one
//!   [`ErrorKind`] of the closed recovery taxonomy.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// ============================================================================
// Core Error
// ============================================================================

/// Core error type for `costwatch` model operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Date range whose start lies after its end.
    #[error("Invalid date range: start {start} is after end {end}")]
    InvalidDateRange {
        /// Requested start date.
        start: chrono::NaiveDate,
        /// Requested end date.
        end: chrono::NaiveDate,
    },

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Invalid data from a provider response.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// ============================================================================
// Error Kind
// ============================================================================

/// Closed taxonomy of provider failure kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Credentials rejected or expired.
    AuthenticationError,
    /// Credentials valid but lacking permission.
    AuthorizationError,
    /// Provider throttled the caller.
    RateLimitError,
    /// Provider unreachable, timing out, or returning 5xx.
    ServiceUnavailable,
    /// Provider returned data that could not be decoded.
    DataFormatError,
    /// Account-level quota exhausted.
    QuotaExceeded,
    /// Anything that matched none of the above.
    UnknownError,
}

impl ErrorKind {
    /// Stable string code used for history keys and statistics.
    pub fn code(&self) -> &'static str {
        match self {
            Self::AuthenticationError => "AUTHENTICATION_ERROR",
            Self::AuthorizationError => "AUTHORIZATION_ERROR",
            Self::RateLimitError => "RATE_LIMIT_ERROR",
            Self::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            Self::DataFormatError => "DATA_FORMAT_ERROR",
            Self::QuotaExceeded => "QUOTA_EXCEEDED",
            Self::UnknownError => "UNKNOWN_ERROR",
        }
    }

    /// Returns all error kinds.
    pub fn all() -> &'static [ErrorKind] {
        &[
            Self::AuthenticationError,
            Self::AuthorizationError,
            Self::RateLimitError,
            Self::ServiceUnavailable,
            Self::DataFormatError,
            Self::QuotaExceeded,
            Self::UnknownError,
        ]
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

// ============================================================================
// Collection Error
// ============================================================================

/// Typed provider failure raised at the adapter boundary.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CollectionError {
    /// Authentication failed.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Caller lacks permission.
    #[error("Permission denied: {0}")]
    Authorization(String),

    /// Rate limited by the provider.
    #[error("Rate limited: {message}")]
    RateLimited {
        /// Provider message.
        message: String,
        /// Seconds the provider asked us to wait, if any.
        retry_after: Option<u64>,
    },

    /// Provider service unavailable.
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Malformed provider response.
    #[error("Data format error: {0}")]
    DataFormat(String),

    /// Account quota exhausted.
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Unclassified failure.
    #[error("{0}")]
    Unknown(String),
}

impl CollectionError {
    /// Returns the taxonomy kind for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Authentication(_) => ErrorKind::AuthenticationError,
            Self::Authorization(_) => ErrorKind::AuthorizationError,
            Self::RateLimited { .. } => ErrorKind::RateLimitError,
            Self::ServiceUnavailable(_) => ErrorKind::ServiceUnavailable,
            Self::DataFormat(_) => ErrorKind::DataFormatError,
            Self::QuotaExceeded(_) => ErrorKind::QuotaExceeded,
            Self::Unknown(_) => ErrorKind::UnknownError,
        }
    }

    /// Builds an error of the given kind carrying `message`.
    pub fn from_kind(kind: ErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        match kind {
            ErrorKind::AuthenticationError => Self::Authentication(message),
            ErrorKind::AuthorizationError => Self::Authorization(message),
            ErrorKind::RateLimitError => Self::RateLimited {
                message,
                retry_after: None,
            },
            ErrorKind::ServiceUnavailable => Self::ServiceUnavailable(message),
            ErrorKind::DataFormatError => Self::DataFormat(message),
            ErrorKind::QuotaExceeded => Self::QuotaExceeded(message),
            ErrorKind::UnknownError => Self::Unknown(message),
        }
    }

    /// Provider-supplied retry hint, if any.
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

impl From<serde_json::Error> for CollectionError {
    fn from(err: serde_json::Error) -> Self {
        CollectionError::DataFormat(err.to_string())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_codes() {
        assert_eq!(ErrorKind::RateLimitError.code(), "RATE_LIMIT_ERROR");
        assert_eq!(ErrorKind::QuotaExceeded.to_string(), "QUOTA_EXCEEDED");
        assert_eq!(ErrorKind::all().len(), 7);
    }

    #[test]
    fn test_kind_serializes_as_code() {
        for kind in ErrorKind::all() {
            let json = serde_json::to_string(kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.code()));
        }
    }

    #[test]
    fn test_from_kind_preserves_kind() {
        for kind in ErrorKind::all() {
            let err = CollectionError::from_kind(*kind, "boom");
            assert_eq!(err.kind(), *kind);
        }
    }

    #[test]
    fn test_retry_after_only_on_rate_limit() {
        let err = CollectionError::RateLimited {
            message: "slow down".to_string(),
            retry_after: Some(12),
        };
        assert_eq!(err.retry_after(), Some(12));
        assert_eq!(CollectionError::Unknown("x".into()).retry_after(), None);
    }
}
