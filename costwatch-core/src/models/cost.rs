//! Cost data types.
//!
//! This module contains the raw and normalized cost representations:
//! - [`ProviderCostData`] - Raw per-call result from an adapter
//! - [`UnifiedCostRecord`] - Cross-provider normalized record
//! - [`ServiceCost`] - Per-service entry in a unified record
//! - [`CostForecast`], [`CostAnomaly`], [`BudgetInformation`] - Optional extras

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::provider::{ProviderKind, ServiceCategory};

/// Default billing currency.
pub const DEFAULT_CURRENCY: &str = "USD";

// ============================================================================
// Provider Cost Data
// ============================================================================

/// Raw cost data as returned by one adapter call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderCostData {
    /// Provider the data came from.
    pub provider: ProviderKind,
    /// Billing date (start of the collected range).
    pub date: NaiveDate,
    /// Total cost across all services.
    pub total_cost: f64,
    /// ISO currency code.
    #[serde(default = "default_currency")]
    pub currency: String,
    /// Cost per service name.
    #[serde(default)]
    pub service_costs: HashMap<String, f64>,
    /// Cost per account id.
    #[serde(default)]
    pub account_costs: HashMap<String, f64>,
    /// Cost per region.
    #[serde(default)]
    pub region_costs: HashMap<String, f64>,
    /// Free-form provider metadata.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

impl ProviderCostData {
    /// Creates empty cost data for a provider and date.
    pub fn new(provider: ProviderKind, date: NaiveDate) -> Self {
        Self {
            provider,
            date,
            total_cost: 0.0,
            currency: default_currency(),
            service_costs: HashMap::new(),
            account_costs: HashMap::new(),
            region_costs: HashMap::new(),
            metadata: HashMap::new(),
        }
    }

    /// Adds a service cost and bumps the total.
    pub fn with_service(mut self, service: impl Into<String>, cost: f64) -> Self {
        *self.service_costs.entry(service.into()).or_insert(0.0) += cost;
        self.total_cost += cost;
        self
    }

    /// Sum of service costs.
    pub fn services_total(&self) -> f64 {
        self.service_costs.values().sum()
    }

    /// Number of line items carried (services + accounts + regions).
    pub fn record_count(&self) -> usize {
        self.service_costs.len() + self.account_costs.len() + self.region_costs.len()
    }

    /// Merges another batch of the same provider into this one.
    pub fn merge(&mut self, other: &ProviderCostData) {
        self.total_cost += other.total_cost;
        merge_into(&mut self.service_costs, &other.service_costs);
        merge_into(&mut self.account_costs, &other.account_costs);
        merge_into(&mut self.region_costs, &other.region_costs);
        for (key, value) in &other.metadata {
            self.metadata
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
        self.date = self.date.min(other.date);
    }
}

fn merge_into(target: &mut HashMap<String, f64>, source: &HashMap<String, f64>) {
    for (key, cost) in source {
        *target.entry(key.clone()).or_insert(0.0) += cost;
    }
}

// ============================================================================
// Unified Cost Record
// ============================================================================

/// Cost of one service inside a unified record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ServiceCost {
    /// Cross-provider category.
    pub category: ServiceCategory,
    /// Cost in record currency.
    pub cost: f64,
}

/// Cross-provider normalized representation of one tenant's spend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UnifiedCostRecord {
    /// Tenant the spend belongs to.
    pub client_id: String,
    /// Provider the spend was billed by.
    pub provider: ProviderKind,
    /// Billing date.
    pub date: NaiveDate,
    /// Total cost.
    pub total_cost: f64,
    /// ISO currency code.
    pub currency: String,
    /// Cost per service, with category.
    pub services: HashMap<String, ServiceCost>,
    /// Cost per account id.
    pub accounts: HashMap<String, f64>,
    /// Cost per region.
    pub regions: HashMap<String, f64>,
    /// Warnings produced during normalization.
    #[serde(default)]
    pub warnings: Vec<String>,
    /// When the record was produced.
    pub normalized_at: DateTime<Utc>,
}

impl UnifiedCostRecord {
    /// Total cost per category.
    pub fn cost_by_category(&self) -> HashMap<ServiceCategory, f64> {
        let mut totals = HashMap::new();
        for service in self.services.values() {
            *totals.entry(service.category).or_insert(0.0) += service.cost;
        }
        totals
    }

    /// Service names sorted by cost, highest first.
    pub fn top_services(&self, limit: usize) -> Vec<(&str, f64)> {
        let mut services: Vec<_> = self
            .services
            .iter()
            .map(|(name, s)| (name.as_str(), s.cost))
            .collect();
        services.sort_by(|a, b| b.1.total_cmp(&a.1));
        services.truncate(limit);
        services
    }
}

// ============================================================================
// Optional Capabilities
// ============================================================================

/// Provider-side cost forecast.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CostForecast {
    /// Forecast period start.
    pub start: NaiveDate,
    /// Forecast period end.
    pub end: NaiveDate,
    /// Predicted spend.
    pub predicted_cost: f64,
    /// Lower confidence bound.
    pub lower_bound: Option<f64>,
    /// Upper confidence bound.
    pub upper_bound: Option<f64>,
    /// ISO currency code.
    pub currency: String,
}

/// Provider-detected spend anomaly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CostAnomaly {
    /// Day the anomaly was observed.
    pub date: NaiveDate,
    /// Service responsible, if known.
    pub service: Option<String>,
    /// Expected spend.
    pub expected_cost: f64,
    /// Observed spend.
    pub actual_cost: f64,
    /// Provider-specific description.
    pub description: String,
}

impl CostAnomaly {
    /// Observed minus expected spend.
    pub fn impact(&self) -> f64 {
        self.actual_cost - self.expected_cost
    }
}

/// Budget configured at the provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BudgetInformation {
    /// Budget name.
    pub name: String,
    /// Budget amount.
    pub limit: f64,
    /// Spend so far in the budget period.
    pub spent: f64,
    /// ISO currency code.
    pub currency: String,
}

impl BudgetInformation {
    /// Percent of the budget consumed (0-100+).
    pub fn used_percent(&self) -> f64 {
        if self.limit <= 0.0 {
            return 0.0;
        }
        self.spent / self.limit * 100.0
    }
}

// ============================================================================
// Tests
// ============================================================================
