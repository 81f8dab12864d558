//! Collection outcome types.
//!
//! - [`CollectionStatus`] / [`CollectionResult`] - Outcome of one collection attempt
//! - [`CredentialValidation`] - Outcome of a credential check
//! - [`HealthStatus`] / [`HealthReport`] - Rolled-up adapter health

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::cost::ProviderCostData;
use super::provider::ProviderKind;
use crate::error::ErrorKind;

// ============================================================================
// Collection Status
// ============================================================================

/// Terminal outcome of one collection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CollectionStatus {
    /// All requested data was collected.
    Success,
    /// Some data was collected, with warnings.
    PartialSuccess,
    /// Nothing usable was collected.
    Failed,
    /// Collection has started but not finished.
    InProgress,
    /// Provider or local limiter refused the call.
    RateLimited,
    /// Credentials were rejected.
    AuthenticationError,
    /// Credentials lacked permission.
    PermissionError,
}

impl CollectionStatus {
    /// Returns true for statuses that carry usable data.
    pub fn has_data(&self) -> bool {
        matches!(self, Self::Success | Self::PartialSuccess)
    }

    /// Returns the display name for this status.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::PartialSuccess => "partial success",
            Self::Failed => "failed",
            Self::InProgress => "in progress",
            Self::RateLimited => "rate limited",
            Self::AuthenticationError => "authentication error",
            Self::PermissionError => "permission error",
        }
    }
}

impl fmt::Display for CollectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

// ============================================================================
// Collection Result
// ============================================================================

/// Result of one collection attempt for one provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CollectionResult {
    /// Provider the result belongs to.
    pub provider: ProviderKind,
    /// Terminal status.
    pub status: CollectionStatus,
    /// Collected data, when any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_data: Option<ProviderCostData>,
    /// Error message on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Taxonomy kind of the error that ended a failed collection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    /// Non-fatal warnings.
    #[serde(default)]
    pub warnings: Vec<String>,
    /// When collection started.
    pub started_at: DateTime<Utc>,
    /// When collection finished.
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    /// Wall-clock duration in milliseconds.
    #[serde(default)]
    pub duration_ms: u64,
    /// Number of line items collected.
    #[serde(default)]
    pub records_collected: usize,
    /// Number of provider API calls made.
    #[serde(default)]
    pub api_calls_made: u32,
}

impl CollectionResult {
    /// A result that has started but not finished.
    pub fn in_progress(provider: ProviderKind) -> Self {
        Self {
            provider,
            status: CollectionStatus::InProgress,
            cost_data: None,
            error_message: None,
            error_kind: None,
            warnings: Vec::new(),
            started_at: Utc::now(),
            completed_at: None,
            duration_ms: 0,
            records_collected: 0,
            api_calls_made: 0,
        }
    }

    /// A successful result carrying `data`.
    pub fn success(provider: ProviderKind, data: ProviderCostData) -> Self {
        let mut result = Self::in_progress(provider);
        result.records_collected = data.record_count();
        result.cost_data = Some(data);
        result.status = CollectionStatus::Success;
        result.api_calls_made = 1;
        let started_at = result.started_at;
        result.finish_at(started_at)
    }

    /// A failed result carrying `message`.
    pub fn failed(provider: ProviderKind, message: impl Into<String>) -> Self {
        let mut result = Self::in_progress(provider);
        result.status = CollectionStatus::Failed;
        result.error_message = Some(message.into());
        let started_at = result.started_at;
        result.finish_at(started_at)
    }

    /// Records the error kind that ended the collection.
    pub fn with_error_kind(mut self, kind: ErrorKind) -> Self {
        self.error_kind = Some(kind);
        self
    }

    /// Overrides the status.
    pub fn with_status(mut self, status: CollectionStatus) -> Self {
        self.status = status;
        self
    }

    /// Adds a warning; a `Success` result becomes `PartialSuccess`.
    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        if self.status == CollectionStatus::Success {
            self.status = CollectionStatus::PartialSuccess;
        }
        self
    }

    /// Stamps completion time and duration relative to `started_at`.
    pub fn finish_at(mut self, started_at: DateTime<Utc>) -> Self {
        let now = Utc::now();
        self.started_at = started_at;
        self.completed_at = Some(now);
        self.duration_ms = u64::try_from((now - started_at).num_milliseconds()).unwrap_or(0);
        self
    }

    /// Returns true if the status carries usable data.
    pub fn is_success(&self) -> bool {
        self.status.has_data()
    }

    /// Total cost collected, if any.
    pub fn total_cost(&self) -> Option<f64> {
        self.cost_data.as_ref().map(|d| d.total_cost)
    }
}

// ============================================================================
// Credential Validation
// ============================================================================

/// Outcome of validating a provider's credentials.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CredentialValidation {
    /// Whether the credentials were accepted.
    pub is_valid: bool,
    /// Provider checked.
    pub provider: ProviderKind,
    /// Account the credentials resolved to.
    #[serde(default)]
    pub account_id: Option<String>,
    /// Permissions granted, when reported.
    #[serde(default)]
    pub permissions: Vec<String>,
    /// Error message when invalid.
    #[serde(default)]
    pub error_message: Option<String>,
    /// When the check ran.
    pub validated_at: DateTime<Utc>,
}

impl CredentialValidation {
    /// Valid credentials for `account_id`.
    pub fn valid(provider: ProviderKind, account_id: Option<String>) -> Self {
        Self {
            is_valid: true,
            provider,
            account_id,
            permissions: Vec::new(),
            error_message: None,
            validated_at: Utc::now(),
        }
    }

    /// Invalid credentials with a reason.
    pub fn invalid(provider: ProviderKind, message: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            provider,
            account_id: None,
            permissions: Vec::new(),
            error_message: Some(message.into()),
            validated_at: Utc::now(),
        }
    }

    /// Sets the granted permissions.
    pub fn with_permissions(mut self, permissions: Vec<String>) -> Self {
        self.permissions = permissions;
        self
    }
}

// ============================================================================
// Health
// ============================================================================

/// Rolled-up health of an adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Connection and credentials both OK.
    Healthy,
    /// Connection or credentials reported a failure.
    Unhealthy,
    /// The check itself errored.
    Error,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => f.write_str("healthy"),
            Self::Unhealthy => f.write_str("unhealthy"),
            Self::Error => f.write_str("error"),
        }
    }
}

/// Health check report for one adapter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthReport {
    /// Provider checked.
    pub provider: ProviderKind,
    /// Rolled-up status.
    pub status: HealthStatus,
    /// Whether `test_connection` passed.
    pub connection_ok: bool,
    /// Whether credentials validated.
    pub credentials_valid: bool,
    /// Detail when not healthy.
    #[serde(default)]
    pub message: Option<String>,
    /// When the check ran.
    pub checked_at: DateTime<Utc>,
}

impl HealthReport {
    /// A report for a check that errored before completing.
    pub fn error(provider: ProviderKind, message: impl Into<String>) -> Self {
        Self {
            provider,
            status: HealthStatus::Error,
            connection_ok: false,
            credentials_valid: false,
            message: Some(message.into()),
            checked_at: Utc::now(),
        }
    }

    /// Returns true if the adapter is healthy.
    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_success_counts_records() {
        let mut data = ProviderCostData::new(
            ProviderKind::Aws,
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        )
        .with_service("Amazon EC2", 5.0);
        data.region_costs.insert("us-east-1".into(), 5.0);

        let result = CollectionResult::success(ProviderKind::Aws, data);
        assert_eq!(result.status, CollectionStatus::Success);
        assert_eq!(result.records_collected, 2);
        assert!(result.completed_at.is_some());
        assert_eq!(result.total_cost(), Some(5.0));
    }

    #[test]
    fn test_warning_downgrades_success() {
        let data = ProviderCostData::new(
            ProviderKind::Gcp,
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        );
        let result = CollectionResult::success(ProviderKind::Gcp, data).with_warning("partial");
        assert_eq!(result.status, CollectionStatus::PartialSuccess);
        assert!(result.is_success());
    }

    #[test]
    fn test_failed_has_message() {
        let result = CollectionResult::failed(ProviderKind::Azure, "boom");
        assert_eq!(result.status, CollectionStatus::Failed);
        assert_eq!(result.error_message.as_deref(), Some("boom"));
        assert!(!result.is_success());
        assert!(result.cost_data.is_none());
    }

    #[test]
    fn test_status_serializes_screaming_case() {
        let json = serde_json::to_string(&CollectionStatus::PartialSuccess).unwrap();
        assert_eq!(json, r#""PARTIAL_SUCCESS""#);
    }
}
