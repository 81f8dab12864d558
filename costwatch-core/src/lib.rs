// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # `costwatch` Core
//!
//! Core types, models, and the error taxonomy for `costwatch`.
//!
//! This crate provides the foundational data contracts shared by every other
//! `costwatch` crate:
//!
//! - Domain models (providers, credentials, date ranges, cost data)
//! - Collection results handed back to callers
//! - The closed error taxonomy used for recovery decisions
//!
//! ## Key Types
//!
//! ### Provider Types
//! - [`ProviderKind`] - Enum of supported cloud providers
//! - [`ProviderCredentials`] - Per-provider credentials with expiry
//! - [`ProviderAccount`] / [`ProviderService`] - Inventory descriptors
//! - [`ServiceCategory`] - Cross-provider service classification
//!
//! ### Cost Types
//! - [`DateRange`] - Inclusive calendar date range
//! - [`ProviderCostData`] - Raw per-call cost data
//! - [`UnifiedCostRecord`] - Normalized cross-provider record
//!
//! ### Collection Types
//! - [`CollectionResult`] - Terminal outcome of one collection attempt
//! - [`CredentialValidation`] - Outcome of a credential check
//! - [`HealthReport`] - Rolled-up adapter health
//!
//! ### Errors
//! - [`CoreError`] - Model construction errors
//! - [`CollectionError`] / [`ErrorKind`] - The provider error taxonomy

pub mod error;
pub mod models;

// Re-export error types
pub use error::{CollectionError, CoreError, ErrorKind};

// Re-export all model types
pub use models::{
    // Provider types
    CredentialSecret,
    ProviderAccount,
    ProviderCredentials,
    ProviderKind,
    ProviderService,
    ServiceCategory,
    // Date ranges
    DateRange,
    // Cost types
    BudgetInformation,
    CostAnomaly,
    CostForecast,
    DEFAULT_CURRENCY,
    ProviderCostData,
    ServiceCost,
    UnifiedCostRecord,
    // Collection types
    CollectionResult,
    CollectionStatus,
    CredentialValidation,
    HealthReport,
    HealthStatus,
};
