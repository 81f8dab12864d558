//! Provider error types.

use costwatch_core::{CollectionError, ProviderKind};
use costwatch_fetch::HttpError;
use thiserror::Error;

/// Errors raised while talking to a billing-export gateway.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Gateway URL could not be parsed.
    #[error("Invalid gateway URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Gateway URL uses a scheme other than http(s).
    #[error("Unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    /// No descriptor for the provider.
    #[error("Unsupported provider: {0}")]
    UnsupportedProvider(ProviderKind),

    /// HTTP failure.
    #[error("HTTP error: {0}")]
    Http(#[from] HttpError),

    /// Export body was well-formed JSON with unusable content.
    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<ProviderError> for CollectionError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Http(e) => e.into(),
            ProviderError::Parse(msg) => CollectionError::DataFormat(msg),
            other => CollectionError::Unknown(other.to_string()),
        }
    }
}
