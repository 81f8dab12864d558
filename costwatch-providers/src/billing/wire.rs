//! Billing-export gateway payloads and their conversion to core types.

use chrono::NaiveDate;
use costwatch_core::{
    CredentialValidation, DateRange, ProviderAccount, ProviderCostData, ProviderKind,
    ProviderService,
};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;

use crate::descriptor::ProviderDescriptor;
use crate::error::ProviderError;

// ============================================================================
// Costs
// ============================================================================

/// Body of `GET /v1/{provider}/costs`.
#[derive(Debug, Deserialize)]
pub struct CostExport {
    /// ISO currency code for every line item.
    #[serde(default)]
    pub currency: Option<String>,
    /// One row per day, service, account and region.
    #[serde(default)]
    pub line_items: Vec<LineItem>,
    /// Free-form export metadata.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// One billed row.
#[derive(Debug, Deserialize)]
pub struct LineItem {
    /// Usage day.
    pub date: NaiveDate,
    /// Provider service name.
    pub service: String,
    /// Account, subscription or project id.
    #[serde(default)]
    pub account: Option<String>,
    /// Region, if the row is regional.
    #[serde(default)]
    pub region: Option<String>,
    /// Cost; negative for credits.
    pub cost: f64,
}

/// Aggregated cost data plus one warning per skipped row.
#[derive(Debug)]
pub struct ParsedCosts {
    /// Aggregated data.
    pub data: ProviderCostData,
    /// Rows that were skipped, described.
    pub warnings: Vec<String>,
}

/// Folds an export into cost data for `range`.
///
/// Rows dated outside `range` or with a blank service are skipped with a
/// warning. A non-finite cost poisons the whole export.
///
/// # Errors
///
/// Returns [`ProviderError::Parse`] for non-finite costs.
pub fn parse_cost_export(
    provider: ProviderKind,
    range: &DateRange,
    export: CostExport,
    default_currency: &str,
) -> Result<ParsedCosts, ProviderError> {
    let mut data = ProviderCostData::new(provider, range.start());
    data.currency = export
        .currency
        .filter(|c| !c.trim().is_empty())
        .unwrap_or_else(|| default_currency.to_string());
    data.metadata = export.metadata;

    let mut warnings = Vec::new();
    for item in export.line_items {
        if !item.cost.is_finite() {
            return Err(ProviderError::Parse(format!(
                "non-finite cost for '{}' on {}",
                item.service, item.date
            )));
        }
        if !range.contains(item.date) {
            warnings.push(format!(
                "Skipped line item for '{}' dated {} outside {}",
                item.service, item.date, range
            ));
            continue;
        }
        let service = item.service.trim();
        if service.is_empty() {
            warnings.push(format!("Skipped line item without service on {}", item.date));
            continue;
        }

        data = data.with_service(service, item.cost);
        if let Some(account) = item.account.filter(|a| !a.is_empty()) {
            *data.account_costs.entry(account).or_insert(0.0) += item.cost;
        }
        if let Some(region) = item.region.filter(|r| !r.is_empty()) {
            *data.region_costs.entry(region).or_insert(0.0) += item.cost;
        }
    }

    debug!(
        provider = %provider,
        total = data.total_cost,
        services = data.service_costs.len(),
        skipped = warnings.len(),
        "Parsed cost export"
    );
    Ok(ParsedCosts { data, warnings })
}

// ============================================================================
// Inventory
// ============================================================================

/// Body of `GET /v1/{provider}/accounts`.
#[derive(Debug, Deserialize)]
pub struct AccountList {
    /// Accounts.
    #[serde(default)]
    pub accounts: Vec<AccountEntry>,
}

/// One account.
#[derive(Debug, Deserialize)]
pub struct AccountEntry {
    /// Account id.
    pub id: String,
    /// Display name; the id when absent.
    #[serde(default)]
    pub name: Option<String>,
    /// Active regions.
    #[serde(default)]
    pub regions: Vec<String>,
    /// Tags.
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

impl AccountList {
    /// Converts to core accounts.
    pub fn into_accounts(self, provider: ProviderKind) -> Vec<ProviderAccount> {
        self.accounts
            .into_iter()
            .map(|a| ProviderAccount {
                name: a.name.unwrap_or_else(|| a.id.clone()),
                id: a.id,
                provider,
                regions: a.regions,
                tags: a.tags,
            })
            .collect()
    }
}

/// Body of `GET /v1/{provider}/services`.
#[derive(Debug, Deserialize)]
pub struct ServiceList {
    /// Services.
    #[serde(default)]
    pub services: Vec<ServiceEntry>,
}

/// One service.
#[derive(Debug, Deserialize)]
pub struct ServiceEntry {
    /// Service id.
    pub id: String,
    /// Service name as used in cost rows.
    pub name: String,
    /// Regions offered.
    #[serde(default)]
    pub regions: Vec<String>,
    /// Tags.
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

impl ServiceList {
    /// Converts to core services, categorized by the descriptor.
    pub fn into_services(self, descriptor: &ProviderDescriptor) -> Vec<ProviderService> {
        self.services
            .into_iter()
            .map(|s| ProviderService {
                category: descriptor.category_for(&s.name),
                id: s.id,
                name: s.name,
                provider: descriptor.id,
                regions: s.regions,
                tags: s.tags,
            })
            .collect()
    }
}

// ============================================================================
// Credentials
// ============================================================================

/// Body of `GET /v1/{provider}/credentials`.
#[derive(Debug, Deserialize)]
pub struct CredentialCheck {
    /// Whether the gateway accepted the credentials.
    pub valid: bool,
    /// Account the credentials resolve to.
    #[serde(default)]
    pub account_id: Option<String>,
    /// Granted permissions.
    #[serde(default)]
    pub permissions: Vec<String>,
    /// Reason for rejection.
    #[serde(default)]
    pub message: Option<String>,
}

impl CredentialCheck {
    /// Converts to a core validation.
    pub fn into_validation(self, provider: ProviderKind) -> CredentialValidation {
        if self.valid {
            CredentialValidation::valid(provider, self.account_id).with_permissions(self.permissions)
        } else {
            CredentialValidation::invalid(
                provider,
                self.message
                    .unwrap_or_else(|| "credentials rejected".to_string()),
            )
        }
    }
}
