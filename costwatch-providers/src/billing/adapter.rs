//! Adapter over a billing-export gateway.
//!
//! The gateway exposes one read-only JSON API per provider under
//! `{base}/v1/{provider}/` and authenticates with HTTP basic auth taken from
//! the credential principal and secret.

use async_trait::async_trait;
use costwatch_core::{
    BudgetInformation, CollectionError, CollectionResult, CostAnomaly, CostForecast,
    CredentialValidation, DateRange, ProviderAccount, ProviderCredentials, ProviderKind,
    ProviderService, ServiceCategory,
};
use costwatch_fetch::{BasicAuth, HttpClient, HttpError, ProviderAdapter};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

use super::wire::{AccountList, CostExport, CredentialCheck, ServiceList, parse_cost_export};
use crate::descriptor::ProviderDescriptor;
use crate::error::ProviderError;
use crate::registry::ProviderRegistry;

/// Date format used in query strings.
const DATE_FORMAT: &str = "%Y-%m-%d";

// ============================================================================
// Construction
// ============================================================================

/// [`ProviderAdapter`] backed by a billing-export gateway.
#[derive(Debug, Clone)]
pub struct BillingExportAdapter {
    descriptor: &'static ProviderDescriptor,
    client: HttpClient,
    base_url: Url,
    auth: BasicAuth,
}

impl BillingExportAdapter {
    /// Creates an adapter for `credentials`' provider using `client`.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or not http(s).
    pub fn new(
        gateway_url: &str,
        credentials: &ProviderCredentials,
        client: HttpClient,
    ) -> Result<Self, ProviderError> {
        let provider = credentials.provider();
        let descriptor =
            ProviderRegistry::get(provider).ok_or(ProviderError::UnsupportedProvider(provider))?;

        let mut base_url = Url::parse(gateway_url)?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(ProviderError::UnsupportedScheme(base_url.scheme().to_string()));
        }
        // Url::join drops the last segment unless the path ends in '/'.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            descriptor,
            client,
            base_url,
            auth: BasicAuth::new(credentials.principal(), credentials.secret()),
        })
    }

    /// Creates an adapter with its own client restricted to the gateway host.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the client cannot be built.
    pub fn connect(
        gateway_url: &str,
        credentials: &ProviderCredentials,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let host = Url::parse(gateway_url)?
            .host_str()
            .map(str::to_string)
            .ok_or(ProviderError::InvalidUrl(url::ParseError::EmptyHost))?;
        let client = HttpClient::with_timeout(timeout)?.allow_domains(vec![host]);
        Self::new(gateway_url, credentials, client)
    }

    /// Descriptor of the adapter's provider.
    pub fn descriptor(&self) -> &'static ProviderDescriptor {
        self.descriptor
    }

    /// URL of a gateway endpoint for this provider.
    ///
    /// # Errors
    ///
    /// Returns an error if the joined URL is invalid.
    pub fn endpoint(&self, path: &str) -> Result<Url, ProviderError> {
        Ok(self
            .base_url
            .join(&format!("v1/{}/{path}", self.descriptor.cli_name()))?)
    }

    fn ranged_endpoint(&self, path: &str, range: &DateRange) -> Result<Url, ProviderError> {
        let mut url = self.endpoint(path)?;
        url.query_pairs_mut()
            .append_pair("start", &range.start().format(DATE_FORMAT).to_string())
            .append_pair("end", &range.end().format(DATE_FORMAT).to_string());
        Ok(url)
    }

    async fn fetch<T: DeserializeOwned>(&self, url: &Url) -> Result<T, ProviderError> {
        Ok(self.client.get_json(url.as_str(), Some(&self.auth)).await?)
    }

    /// Fetches an optional capability; 404 means the gateway lacks it.
    async fn fetch_optional<T: DeserializeOwned>(&self, url: &Url) -> Result<Option<T>, ProviderError> {
        match self.fetch(url).await {
            Ok(value) => Ok(Some(value)),
            Err(ProviderError::Http(e)) if e.status() == Some(404) => {
                debug!(url = %url, "Capability not offered by gateway");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

/// Builds a boxed adapter, the shape tenant factories return.
///
/// # Errors
///
/// Returns an error if the adapter cannot be constructed.
pub fn build_adapter(
    gateway_url: &str,
    credentials: &ProviderCredentials,
    timeout: Duration,
) -> Result<Arc<dyn ProviderAdapter>, ProviderError> {
    Ok(Arc::new(BillingExportAdapter::connect(
        gateway_url,
        credentials,
        timeout,
    )?))
}

// ============================================================================
// Adapter Contract
// ============================================================================

#[derive(Debug, Deserialize)]
struct AnomalyList {
    #[serde(default)]
    anomalies: Vec<CostAnomaly>,
}

#[async_trait]
impl ProviderAdapter for BillingExportAdapter {
    fn provider(&self) -> ProviderKind {
        self.descriptor.id
    }

    fn provider_name(&self) -> &str {
        self.descriptor.display_name()
    }

    fn supported_regions(&self) -> Vec<String> {
        self.descriptor.supported_regions()
    }

    fn default_currency(&self) -> &str {
        self.descriptor.billing.default_currency
    }

    /// Rejected credentials come back as an invalid validation, not an error.
    #[instrument(skip(self), fields(provider = %self.provider()))]
    async fn validate_credentials(&self) -> Result<CredentialValidation, CollectionError> {
        let url = self.endpoint("credentials")?;
        match self.fetch::<CredentialCheck>(&url).await {
            Ok(check) => Ok(check.into_validation(self.provider())),
            Err(ProviderError::Http(HttpError::Status {
                status: status @ (401 | 403),
                body,
                ..
            })) => Ok(CredentialValidation::invalid(
                self.provider(),
                format!("HTTP {status}: {body}"),
            )),
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self, range), fields(provider = %self.provider(), range = %range))]
    async fn collect_cost_data(&self, range: &DateRange) -> Result<CollectionResult, CollectionError> {
        let url = self.ranged_endpoint("costs", range)?;
        let export: CostExport = self.fetch(&url).await?;
        let parsed = parse_cost_export(self.provider(), range, export, self.default_currency())?;

        let mut result = CollectionResult::success(self.provider(), parsed.data);
        for warning in parsed.warnings {
            result = result.with_warning(warning);
        }
        Ok(result)
    }

    async fn get_accounts(&self) -> Result<Vec<ProviderAccount>, CollectionError> {
        let list: AccountList = self.fetch(&self.endpoint("accounts")?).await?;
        Ok(list.into_accounts(self.provider()))
    }

    async fn get_services(&self) -> Result<Vec<ProviderService>, CollectionError> {
        let list: ServiceList = self.fetch(&self.endpoint("services")?).await?;
        Ok(list.into_services(self.descriptor))
    }

    fn get_service_mapping(&self) -> HashMap<String, ServiceCategory> {
        self.descriptor.service_mapping()
    }

    async fn test_connection(&self) -> Result<bool, CollectionError> {
        let url = self.endpoint("ping")?;
        self.client.get(url.as_str(), Some(&self.auth)).await?;
        Ok(true)
    }

    async fn get_cost_forecast(&self, range: &DateRange) -> Result<Option<CostForecast>, CollectionError> {
        let url = self.ranged_endpoint("forecast", range)?;
        Ok(self.fetch_optional(&url).await?)
    }

    async fn get_cost_anomalies(&self, range: &DateRange) -> Result<Vec<CostAnomaly>, CollectionError> {
        let url = self.ranged_endpoint("anomalies", range)?;
        let list: Option<AnomalyList> = self.fetch_optional(&url).await?;
        Ok(list.map(|l| l.anomalies).unwrap_or_default())
    }

    async fn get_budget_information(&self) -> Result<Option<BudgetInformation>, CollectionError> {
        let url = self.endpoint("budget")?;
        Ok(self.fetch_optional(&url).await?)
    }
}
