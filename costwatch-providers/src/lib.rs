// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # `costwatch` Providers
//!
//! Provider descriptors and the adapter that talks to them.
//!
//! Each provider module contributes a static descriptor:
//!
//! - **Metadata**: display name, console and status page
//! - **Billing**: default currency and supported regions
//! - **Services**: service name to [`ServiceCategory`] mapping
//! - **CLI**: command-line name and aliases
//!
//! Cost data is read from a billing-export gateway through
//! [`BillingExportAdapter`], one adapter per tenant and provider.
//!
//! ## Usage
//!
//! ```ignore
//! use costwatch_providers::{ProviderRegistry, build_adapter};
//! use std::time::Duration;
//!
//! let desc = ProviderRegistry::get_by_cli_name("gcloud").unwrap();
//! let adapter = build_adapter("https://billing.example.com", &creds, Duration::from_secs(30))?;
//! let result = adapter.collect_cost_data(&range).await?;
//! ```
//!
//! [`ServiceCategory`]: costwatch_core::ServiceCategory

pub mod billing;
pub mod descriptor;
pub mod error;
pub mod registry;

// Provider modules (alphabetical)
pub mod aws;
pub mod azure;
pub mod gcp;

#[cfg(test)]
mod parser_edge_tests;

// Re-export key types
pub use billing::{BillingExportAdapter, build_adapter};
pub use descriptor::{BillingConfig, CliConfig, ProviderDescriptor, ProviderMetadata};
pub use error::ProviderError;
pub use registry::ProviderRegistry;

// Re-export provider descriptors
pub use aws::aws_descriptor;
pub use azure::azure_descriptor;
pub use gcp::gcp_descriptor;
