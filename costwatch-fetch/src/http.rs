//! HTTP client with tracing, basic auth, and domain allowlist.
//!
//! This module provides a wrapped HTTP client that adds:
//! - Request/response tracing
//! - Domain allowlist for security
//! - Status code and `Retry-After` extraction into [`HttpError`]
//! - Typed JSON decoding

use reqwest::{Client, Response, header};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::error::HttpError;

/// Default request timeout.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// User agent string for costwatch.
const USER_AGENT: &str = concat!("costwatch/", env!("CARGO_PKG_VERSION"));

/// Maximum number of body bytes kept in error messages.
const MAX_ERROR_BODY: usize = 512;

// ============================================================================
// Basic Auth
// ============================================================================

/// Username/password pair sent as HTTP basic auth.
#[derive(Clone)]
pub struct BasicAuth {
    /// Username (credential principal).
    pub username: String,
    /// Password (credential secret).
    pub password: String,
}

impl BasicAuth {
    /// Creates a new basic auth pair.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicAuth")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

// ============================================================================
// HTTP Client
// ============================================================================

/// HTTP client wrapper with tracing and domain allowlist.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: Client,
    allowed_domains: Option<Vec<String>>,
}

impl HttpClient {
    /// Creates a new HTTP client with default settings.
    pub fn new() -> Result<Self, HttpError> {
        Self::with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Creates a new HTTP client with a custom timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialised.
    pub fn with_timeout(timeout: Duration) -> Result<Self, HttpError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            inner: client,
            allowed_domains: None,
        })
    }

    /// Restricts requests to the given domains (and their subdomains).
    pub fn allow_domains(mut self, domains: Vec<String>) -> Self {
        self.allowed_domains = Some(domains);
        self
    }

    /// Checks if a URL's domain is allowed.
    fn is_domain_allowed(&self, url: &str) -> Result<(), HttpError> {
        let parsed = Url::parse(url).map_err(|e| HttpError::InvalidUrl(e.to_string()))?;

        let Some(ref allowed) = self.allowed_domains else {
            return Ok(());
        };

        let host = parsed
            .host_str()
            .ok_or_else(|| HttpError::InvalidUrl("No host in URL".to_string()))?;

        let allowed = allowed
            .iter()
            .any(|domain| host == domain || host.ends_with(&format!(".{domain}")));

        if allowed {
            Ok(())
        } else {
            Err(HttpError::DomainNotAllowed(host.to_string()))
        }
    }

    /// Performs a GET request, optionally with basic auth.
    ///
    /// Non-success statuses are returned as [`HttpError::Status`].
    #[instrument(skip(self, auth), fields(url = %url))]
    pub async fn get(&self, url: &str, auth: Option<&BasicAuth>) -> Result<Response, HttpError> {
        self.is_domain_allowed(url)?;
        debug!("GET request");

        let mut request = self.inner.get(url);
        if let Some(auth) = auth {
            request = request.basic_auth(&auth.username, Some(&auth.password));
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                HttpError::Timeout
            } else {
                HttpError::Request(e)
            }
        })?;
        debug!(status = %response.status(), "Response received");

        check_status(response).await
    }

    /// Performs a GET request and decodes the JSON body.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        auth: Option<&BasicAuth>,
    ) -> Result<T, HttpError> {
        let response = self.get(url, auth).await?;
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| HttpError::Decode(e.to_string()))
    }
}

async fn check_status(response: Response) -> Result<Response, HttpError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response.retry_after_secs();
    let mut body = response.text().await.unwrap_or_default();
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    if body.is_empty() {
        body = status
            .canonical_reason()
            .unwrap_or("unknown status")
            .to_string();
    }

    warn!(status = status.as_u16(), ?retry_after, "Request failed");
    Err(HttpError::Status {
        status: status.as_u16(),
        retry_after,
        body,
    })
}

// ============================================================================
// Response Extensions
// ============================================================================

/// Extension trait for Response handling.
pub trait ResponseExt {
    /// Get the Retry-After header value in seconds.
    fn retry_after_secs(&self) -> Option<u64>;
}

impl ResponseExt for Response {
    fn retry_after_secs(&self) -> Option<u64> {
        self.headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_allowlist() {
        let client = HttpClient::new()
            .unwrap()
            .allow_domains(vec!["billing.example.com".to_string(), "example.net".to_string()]);

        assert!(client
            .is_domain_allowed("https://billing.example.com/v1/aws/costs")
            .is_ok());
        assert!(client.is_domain_allowed("https://eu.example.net/v1").is_ok());
        assert!(client.is_domain_allowed("https://evil.com/steal").is_err());
    }

    #[test]
    fn test_no_domain_restrictions() {
        let client = HttpClient::new().unwrap();
        assert!(client.is_domain_allowed("https://any.domain.com").is_ok());
    }

    #[test]
    fn test_invalid_url() {
        let client = HttpClient::new().unwrap();
        assert!(matches!(
            client.is_domain_allowed("not-a-valid-url"),
            Err(HttpError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_basic_auth_debug_redacts_password() {
        let auth = BasicAuth::new("AKIAEXAMPLE", "hunter2");
        let debug = format!("{auth:?}");
        assert!(debug.contains("AKIAEXAMPLE"));
        assert!(!debug.contains("hunter2"));
    }
}
