//! Provider adapter contract.
//!
//! Every cloud integration implements [`ProviderAdapter`]. The required
//! methods talk to the provider; the provided methods build on them
//! (normalization, health rollup, incremental collection) and can be
//! overridden when a provider has a better way.

use async_trait::async_trait;
use chrono::Utc;
use costwatch_core::{
    BudgetInformation, CollectionError, CollectionResult, CostAnomaly, CostForecast,
    CredentialValidation, DEFAULT_CURRENCY, DateRange, HealthReport, HealthStatus,
    ProviderAccount, ProviderCostData, ProviderKind, ProviderService, ServiceCategory,
    ServiceCost, UnifiedCostRecord,
};
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use std::collections::HashMap;
use std::error::Error as StdError;
use tracing::{debug, warn};

use crate::error_handler::{classify_message, find_collection_error};

// ============================================================================
// Provider Adapter Trait
// ============================================================================

/// Contract implemented by every provider integration.
///
/// Fallible methods return a typed [`CollectionError`] so the error handler
/// never has to guess from message text.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    // ------------------------------------------------------------------------
    // Static metadata
    // ------------------------------------------------------------------------

    /// Which provider this adapter talks to.
    fn provider(&self) -> ProviderKind;

    /// Human-readable provider name.
    fn provider_name(&self) -> &str {
        self.provider().display_name()
    }

    /// Regions the adapter can collect for.
    fn supported_regions(&self) -> Vec<String>;

    /// Currency costs are reported in when the provider does not say.
    fn default_currency(&self) -> &str {
        DEFAULT_CURRENCY
    }

    // ------------------------------------------------------------------------
    // Required operations
    // ------------------------------------------------------------------------

    /// Checks that the configured credentials are accepted.
    async fn validate_credentials(&self) -> Result<CredentialValidation, CollectionError>;

    /// Collects cost data for `range`.
    async fn collect_cost_data(&self, range: &DateRange) -> Result<CollectionResult, CollectionError>;

    /// Lists billing accounts visible to the credentials.
    async fn get_accounts(&self) -> Result<Vec<ProviderAccount>, CollectionError>;

    /// Lists billable services.
    async fn get_services(&self) -> Result<Vec<ProviderService>, CollectionError>;

    /// Provider service name to category mapping.
    fn get_service_mapping(&self) -> HashMap<String, ServiceCategory>;

    /// Cheap reachability check.
    async fn test_connection(&self) -> Result<bool, CollectionError>;

    // ------------------------------------------------------------------------
    // Optional capabilities
    // ------------------------------------------------------------------------

    /// Provider-side forecast, when supported.
    async fn get_cost_forecast(
        &self,
        _range: &DateRange,
    ) -> Result<Option<CostForecast>, CollectionError> {
        Ok(None)
    }

    /// Provider-detected anomalies, when supported.
    async fn get_cost_anomalies(
        &self,
        _range: &DateRange,
    ) -> Result<Vec<CostAnomaly>, CollectionError> {
        Ok(Vec::new())
    }

    /// Provider-side budget, when supported.
    async fn get_budget_information(&self) -> Result<Option<BudgetInformation>, CollectionError> {
        Ok(None)
    }

    /// Re-acquires short-lived credentials. No-op by default.
    async fn refresh_credentials(&self) -> Result<(), CollectionError> {
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Derived behaviour
    // ------------------------------------------------------------------------

    /// Turns a provider-specific error into the taxonomy.
    fn translate_error(&self, error: &(dyn StdError + 'static)) -> CollectionError {
        translate_error(error)
    }

    /// Normalizes raw cost data into a cross-provider record.
    fn normalize_cost_data(&self, raw: &ProviderCostData, client_id: &str) -> UnifiedCostRecord {
        normalize_cost_data(raw, client_id, &self.get_service_mapping(), self.default_currency())
    }

    /// Runs `test_connection` then `validate_credentials` and rolls them up.
    async fn health_check(&self) -> HealthReport {
        let provider = self.provider();

        let connection_ok = match self.test_connection().await {
            Ok(ok) => ok,
            Err(e) => return HealthReport::error(provider, format!("connection check failed: {e}")),
        };
        let validation = match self.validate_credentials().await {
            Ok(v) => v,
            Err(e) => {
                return HealthReport::error(provider, format!("credential check failed: {e}"));
            }
        };

        let credentials_valid = validation.is_valid;
        let (status, message) = match (connection_ok, credentials_valid) {
            (true, true) => (HealthStatus::Healthy, None),
            (false, _) => (HealthStatus::Unhealthy, Some("connection test failed".to_string())),
            (true, false) => (
                HealthStatus::Unhealthy,
                Some(
                    validation
                        .error_message
                        .unwrap_or_else(|| "credentials rejected".to_string()),
                ),
            ),
        };

        HealthReport {
            provider,
            status,
            connection_ok,
            credentials_valid,
            message,
            checked_at: Utc::now(),
        }
    }

    /// Collects `range` lazily, one result per sub-range of `batch_days`.
    ///
    /// A failed sub-range yields a `Failed` result and the stream continues.
    fn get_cost_data_incremental(
        &self,
        range: DateRange,
        batch_days: u32,
    ) -> BoxStream<'_, CollectionResult> {
        let provider = self.provider();
        stream::iter(range.split(batch_days))
            .then(move |batch| async move {
                debug!(provider = %provider, batch = %batch, "Collecting batch");
                match self.collect_cost_data(&batch).await {
                    Ok(result) => result,
                    Err(e) => {
                        warn!(provider = %provider, batch = %batch, error = %e, "Batch failed");
                        CollectionResult::failed(provider, format!("{batch}: {e}"))
                    }
                }
            })
            .boxed()
    }
}

// ============================================================================
// Default Implementations
// ============================================================================

/// Default error translation: typed values pass through, the rest by keyword.
pub fn translate_error(error: &(dyn StdError + 'static)) -> CollectionError {
    if let Some(typed) = find_collection_error(error) {
        return typed.clone();
    }
    let message = error.to_string();
    CollectionError::from_kind(classify_message(&message), message)
}

/// Normalizes raw cost data using `mapping`.
///
/// Services missing from the mapping are filed under [`ServiceCategory::Other`]
/// with one warning each.
pub fn normalize_cost_data(
    raw: &ProviderCostData,
    client_id: &str,
    mapping: &HashMap<String, ServiceCategory>,
    default_currency: &str,
) -> UnifiedCostRecord {
    let mut names: Vec<&String> = raw.service_costs.keys().collect();
    names.sort();

    let mut services = HashMap::with_capacity(names.len());
    let mut warnings = Vec::new();
    for name in names {
        let cost = raw.service_costs[name];
        let category = if let Some(category) = mapping.get(name) {
            *category
        } else {
            warn!(provider = %raw.provider, service = %name, "Unmapped service");
            warnings.push(format!("Unmapped service '{name}' categorized as other"));
            ServiceCategory::Other
        };
        services.insert(name.clone(), ServiceCost { category, cost });
    }

    let currency = if raw.currency.is_empty() {
        default_currency.to_string()
    } else {
        raw.currency.clone()
    };

    UnifiedCostRecord {
        client_id: client_id.to_string(),
        provider: raw.provider,
        date: raw.date,
        total_cost: raw.total_cost,
        currency,
        services,
        accounts: raw.account_costs.clone(),
        regions: raw.region_costs.clone(),
        warnings,
        normalized_at: Utc::now(),
    }
}

// ============================================================================
// Tests
// ============================================================================
