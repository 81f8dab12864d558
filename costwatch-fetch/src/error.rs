//! Fetch error types.
//!
//! [`HttpError`] is raised by [`crate::http::HttpClient`]; adapters turn it into
//! a typed [`CollectionError`] at their boundary through the `From` impl below.

use costwatch_core::CollectionError;
use thiserror::Error;

// ============================================================================
// Main Fetch Error
// ============================================================================

/// Error type for manager and wrapper operations outside a single collection.
#[derive(Debug, Error)]
pub enum FetchError {
    /// No adapter registered for the tenant/provider pair.
    #[error("No adapter registered for tenant '{tenant}' and provider '{provider}'")]
    AdapterNotFound {
        /// Tenant id.
        tenant: String,
        /// Provider cli name.
        provider: String,
    },

    /// Tenant has no adapters at all.
    #[error("Tenant '{0}' has no registered adapters")]
    UnknownTenant(String),

    /// HTTP error.
    #[error("HTTP error: {0}")]
    Http(#[from] HttpError),

    /// Typed collection failure.
    #[error("Collection failed: {0}")]
    Collection(#[from] CollectionError),

    /// Core error.
    #[error("Core error: {0}")]
    Core(#[from] costwatch_core::CoreError),
}

// ============================================================================
// HTTP Error
// ============================================================================

/// HTTP-specific error type.
#[derive(Debug, Error)]
pub enum HttpError {
    /// Request error.
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    /// Domain not allowed.
    #[error("Domain not allowed: {0}")]
    DomainNotAllowed(String),

    /// Invalid URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Timeout.
    #[error("Request timed out")]
    Timeout,

    /// Non-success status code.
    #[error("HTTP {status}: {body}")]
    Status {
        /// Status code.
        status: u16,
        /// `Retry-After` header in seconds, if present.
        retry_after: Option<u64>,
        /// Response body, truncated.
        body: String,
    },

    /// Response body could not be decoded.
    #[error("Failed to decode response: {0}")]
    Decode(String),
}

impl HttpError {
    /// Returns the status code for `Status` errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Request(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

impl From<HttpError> for CollectionError {
    fn from(err: HttpError) -> Self {
        match err {
            HttpError::Status {
                status,
                retry_after,
                body,
            } => match status {
                401 => CollectionError::Authentication(body),
                402 => CollectionError::QuotaExceeded(body),
                403 => CollectionError::Authorization(body),
                429 => CollectionError::RateLimited {
                    message: body,
                    retry_after,
                },
                500..=599 => CollectionError::ServiceUnavailable(format!("HTTP {status}: {body}")),
                _ => CollectionError::Unknown(format!("HTTP {status}: {body}")),
            },
            HttpError::Timeout => CollectionError::ServiceUnavailable("request timed out".into()),
            HttpError::Request(e) if e.is_timeout() || e.is_connect() => {
                CollectionError::ServiceUnavailable(e.to_string())
            }
            HttpError::Request(e) if e.is_decode() => CollectionError::DataFormat(e.to_string()),
            HttpError::Decode(msg) => CollectionError::DataFormat(msg),
            other => CollectionError::Unknown(other.to_string()),
        }
    }
}
