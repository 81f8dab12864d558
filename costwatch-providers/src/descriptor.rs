//! Provider descriptor system.
//!
//! A descriptor contains all the static configuration for a provider:
//! - Metadata (display name, console and status URLs)
//! - Billing defaults (currency, regions)
//! - Service name to category mapping
//! - CLI names and aliases

use costwatch_core::{DEFAULT_CURRENCY, ProviderKind, ServiceCategory};
use std::collections::HashMap;

// ============================================================================
// Provider Descriptor
// ============================================================================

/// Complete descriptor for a provider.
#[derive(Debug, Clone)]
pub struct ProviderDescriptor {
    /// Provider identifier.
    pub id: ProviderKind,
    /// Display metadata.
    pub metadata: ProviderMetadata,
    /// Billing defaults.
    pub billing: BillingConfig,
    /// Provider service name to category, as reported by the billing export.
    pub services: &'static [(&'static str, ServiceCategory)],
    /// CLI configuration.
    pub cli: CliConfig,
}

impl ProviderDescriptor {
    /// Returns the display name.
    pub fn display_name(&self) -> &str {
        self.metadata.display_name
    }

    /// Returns the CLI name.
    pub fn cli_name(&self) -> &str {
        self.cli.name
    }

    /// Owned service mapping, the shape adapters hand to normalization.
    pub fn service_mapping(&self) -> HashMap<String, ServiceCategory> {
        self.services
            .iter()
            .map(|(name, category)| ((*name).to_string(), *category))
            .collect()
    }

    /// Category of a service, [`ServiceCategory::Other`] if unmapped.
    pub fn category_for(&self, service: &str) -> ServiceCategory {
        self.services
            .iter()
            .find(|(name, _)| *name == service)
            .map_or(ServiceCategory::Other, |(_, category)| *category)
    }

    /// Regions billing data is collected for.
    pub fn supported_regions(&self) -> Vec<String> {
        self.billing.regions.iter().map(|r| (*r).to_string()).collect()
    }
}

// ============================================================================
// Metadata
// ============================================================================

/// Display metadata for a provider.
#[derive(Debug, Clone)]
pub struct ProviderMetadata {
    /// Human-readable name.
    pub display_name: &'static str,
    /// Billing console URL.
    pub console_url: Option<&'static str>,
    /// Public status page.
    pub status_page_url: Option<&'static str>,
}

// ============================================================================
// Billing Config
// ============================================================================

/// Billing defaults for a provider.
#[derive(Debug, Clone)]
pub struct BillingConfig {
    /// Currency used when the export does not name one.
    pub default_currency: &'static str,
    /// Regions collected by default.
    pub regions: &'static [&'static str],
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            default_currency: DEFAULT_CURRENCY,
            regions: &[],
        }
    }
}

// ============================================================================
// CLI Config
// ============================================================================

/// Names a provider is addressed by on the command line.
#[derive(Debug, Clone)]
pub struct CliConfig {
    /// Primary CLI name.
    pub name: &'static str,
    /// Alternative names.
    pub aliases: &'static [&'static str],
}
