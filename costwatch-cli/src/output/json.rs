//! JSON output formatting.

use anyhow::Result;
use chrono::{DateTime, Utc};
use costwatch_core::{CollectionResult, DateRange, ProviderKind, UnifiedCostRecord};
use costwatch_fetch::ErrorHandlerConfig;
use costwatch_providers::ProviderDescriptor;
use costwatch_store::{
    CollectionSettings, EndpointClass, LogLevel, RateLimitRule, RateLimitStatus, RateLimitStorage,
    RetrySettings, Settings, TenantConfig,
};
use serde::Serialize;

// ============================================================================
// Output Types
// ============================================================================

/// Output of one collect run.
#[derive(Debug, Serialize)]
pub struct CollectOutput {
    pub tenant: String,
    pub range: DateRange,
    pub results: Vec<CollectionResult>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unified: Vec<UnifiedCostRecord>,
}

/// One endpoint class with its rule and, for a key, the current quota.
#[derive(Debug, Serialize)]
pub struct LimitEntry {
    pub class: EndpointClass,
    pub rule: RateLimitRule,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<RateLimitStatus>,
}

/// Provider info output.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderInfoOutput {
    pub id: ProviderKind,
    pub display_name: String,
    pub cli_name: String,
    pub aliases: Vec<String>,
    pub default_currency: String,
    pub regions: usize,
    pub mapped_services: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub console_url: Option<String>,
}

impl From<&ProviderDescriptor> for ProviderInfoOutput {
    fn from(desc: &ProviderDescriptor) -> Self {
        Self {
            id: desc.id,
            display_name: desc.display_name().to_string(),
            cli_name: desc.cli_name().to_string(),
            aliases: desc.cli.aliases.iter().map(|a| (*a).to_string()).collect(),
            default_currency: desc.billing.default_currency.to_string(),
            regions: desc.billing.regions.len(),
            mapped_services: desc.services.len(),
            console_url: desc.metadata.console_url.map(str::to_string),
        }
    }
}

/// Settings with credential secrets left out.
#[derive(Debug, Serialize)]
pub struct ConfigView {
    pub log_level: LogLevel,
    pub error_handling: ErrorHandlerConfig,
    pub retry: RetrySettings,
    pub collection: CollectionSettings,
    pub rate_limits: Vec<(EndpointClass, RateLimitRule)>,
    pub rate_limit_storage: RateLimitStorage,
    pub tenants: Vec<TenantView>,
}

/// A tenant without secrets.
#[derive(Debug, Serialize)]
pub struct TenantView {
    pub id: String,
    pub gateway_url: String,
    pub enabled: bool,
    pub credentials: Vec<CredentialView>,
}

/// Public half of a credential set.
#[derive(Debug, Serialize)]
pub struct CredentialView {
    pub provider: ProviderKind,
    pub principal: String,
    pub is_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<&Settings> for ConfigView {
    fn from(settings: &Settings) -> Self {
        Self {
            log_level: settings.log_level,
            error_handling: settings.error_handling.clone(),
            retry: settings.retry,
            collection: settings.collection,
            rate_limits: settings.rate_limits.iter().collect(),
            rate_limit_storage: settings.rate_limit_storage.clone(),
            tenants: settings.tenants.iter().map(TenantView::from).collect(),
        }
    }
}

impl From<&TenantConfig> for TenantView {
    fn from(tenant: &TenantConfig) -> Self {
        Self {
            id: tenant.id.clone(),
            gateway_url: tenant.gateway_url.clone(),
            enabled: tenant.enabled,
            credentials: tenant
                .credentials
                .iter()
                .map(|c| CredentialView {
                    provider: c.provider(),
                    principal: c.principal().to_string(),
                    is_active: c.is_active,
                    expires_at: c.expires_at,
                })
                .collect(),
        }
    }
}

// ============================================================================
// JSON Formatter
// ============================================================================

/// JSON formatter.
pub struct JsonFormatter {
    pretty: bool,
}

impl JsonFormatter {
    /// Creates a new JSON formatter.
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    /// Formats any serializable value.
    pub fn format<T: Serialize>(&self, data: &T) -> Result<String> {
        let json = if self.pretty {
            serde_json::to_string_pretty(data)?
        } else {
            serde_json::to_string(data)?
        };
        Ok(json)
    }
}
