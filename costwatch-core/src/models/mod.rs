//! Domain models for costwatch.
//!
//! This module contains the data contracts exchanged between adapters, the
//! collection manager, and callers.
//!
//! ## Submodules
//!
//! - [`provider`] - Provider types (ProviderKind, credentials, inventory)
//! - [`date_range`] - Inclusive date ranges
//! - [`cost`] - Raw and normalized cost data
//! - [`collection`] - Collection results, credential validation, health

mod collection;
mod cost;
mod date_range;
mod provider;

// Re-export everything at the models level
pub use collection::{
    CollectionResult, CollectionStatus, CredentialValidation, HealthReport, HealthStatus,
};
pub use cost::{
    BudgetInformation, CostAnomaly, CostForecast, DEFAULT_CURRENCY, ProviderCostData,
    ServiceCost, UnifiedCostRecord,
};
pub use date_range::DateRange;
pub use provider::{
    CredentialSecret, ProviderAccount, ProviderCredentials, ProviderKind, ProviderService,
    ServiceCategory,
};
