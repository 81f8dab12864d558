//! Per-endpoint-class rate limit configuration.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

// ============================================================================
// Algorithm
// ============================================================================

/// Admission algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    /// Counts admissions in a trailing window.
    SlidingWindow,
    /// Spends tokens refilled at `limit / window` per second.
    TokenBucket,
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SlidingWindow => write!(f, "sliding_window"),
            Self::TokenBucket => write!(f, "token_bucket"),
        }
    }
}

// ============================================================================
// Endpoint Class
// ============================================================================

/// Class of call that a rate limit applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointClass {
    /// Outbound provider billing API calls.
    ProviderApi,
    /// Full collection runs per tenant.
    Collection,
    /// Credential validation calls.
    CredentialValidation,
    /// Provider health checks.
    HealthCheck,
    /// Tenant-facing API requests.
    Api,
}

impl EndpointClass {
    /// Stable identifier used in record keys.
    pub const fn code(self) -> &'static str {
        match self {
            Self::ProviderApi => "provider_api",
            Self::Collection => "collection",
            Self::CredentialValidation => "credential_validation",
            Self::HealthCheck => "health_check",
            Self::Api => "api",
        }
    }

    /// Every endpoint class.
    pub const fn all() -> &'static [Self] {
        &[
            Self::ProviderApi,
            Self::Collection,
            Self::CredentialValidation,
            Self::HealthCheck,
            Self::Api,
        ]
    }

    /// Built-in rule for this class.
    pub const fn default_rule(self) -> RateLimitRule {
        match self {
            Self::ProviderApi => RateLimitRule::new(100, 60, Algorithm::TokenBucket),
            Self::Collection => RateLimitRule::new(10, 3600, Algorithm::SlidingWindow),
            Self::CredentialValidation => RateLimitRule::new(5, 300, Algorithm::SlidingWindow),
            Self::HealthCheck => RateLimitRule::new(30, 60, Algorithm::TokenBucket),
            Self::Api => RateLimitRule::new(1000, 3600, Algorithm::SlidingWindow),
        }
    }
}

impl fmt::Display for EndpointClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

// ============================================================================
// Rule and Table
// ============================================================================

/// Limit, window and algorithm for one endpoint class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitRule {
    /// Admissions allowed per window.
    pub limit: u32,
    /// Window length in seconds.
    pub window_secs: u64,
    /// Admission algorithm.
    pub algorithm: Algorithm,
}

impl RateLimitRule {
    /// Creates a rule.
    pub const fn new(limit: u32, window_secs: u64, algorithm: Algorithm) -> Self {
        Self {
            limit,
            window_secs,
            algorithm,
        }
    }

    /// Window as a duration.
    pub const fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// Static table mapping endpoint classes to rules.
///
/// Classes missing from a loaded table fall back to their built-in rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitTable {
    rules: HashMap<EndpointClass, RateLimitRule>,
}

impl Default for RateLimitTable {
    fn default() -> Self {
        Self {
            rules: EndpointClass::all()
                .iter()
                .map(|class| (*class, class.default_rule()))
                .collect(),
        }
    }
}

impl RateLimitTable {
    /// Rule for a class.
    pub fn rule(&self, class: EndpointClass) -> RateLimitRule {
        self.rules
            .get(&class)
            .copied()
            .unwrap_or_else(|| class.default_rule())
    }

    /// Replaces the rule for a class.
    #[must_use]
    pub fn with_rule(mut self, class: EndpointClass, rule: RateLimitRule) -> Self {
        self.rules.insert(class, rule);
        self
    }

    /// Rules in declaration order of [`EndpointClass::all`].
    pub fn iter(&self) -> impl Iterator<Item = (EndpointClass, RateLimitRule)> + '_ {
        EndpointClass::all()
            .iter()
            .map(|class| (*class, self.rule(*class)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table_covers_every_class() {
        let table = RateLimitTable::default();
        assert_eq!(table.iter().count(), EndpointClass::all().len());
        assert_eq!(
            table.rule(EndpointClass::ProviderApi),
            RateLimitRule::new(100, 60, Algorithm::TokenBucket)
        );
    }

    #[test]
    fn test_partial_table_falls_back_to_defaults() {
        let json = r#"{"rules": {"health_check": {"limit": 2, "window_secs": 10, "algorithm": "sliding_window"}}}"#;
        let table: RateLimitTable = serde_json::from_str(json).unwrap();

        assert_eq!(table.rule(EndpointClass::HealthCheck).limit, 2);
        assert_eq!(
            table.rule(EndpointClass::Collection),
            EndpointClass::Collection.default_rule()
        );
    }

    #[test]
    fn test_with_rule_overrides() {
        let table = RateLimitTable::default().with_rule(
            EndpointClass::Api,
            RateLimitRule::new(1, 1, Algorithm::TokenBucket),
        );
        assert_eq!(table.rule(EndpointClass::Api).window(), Duration::from_secs(1));
    }
}
