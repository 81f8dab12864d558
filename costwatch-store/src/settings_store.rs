//! Service configuration store.
//!
//! Manages settings with persistence and change notification.

use chrono::{DateTime, Utc};
use costwatch_core::{ProviderCredentials, ProviderKind};
use costwatch_fetch::{DEFAULT_MAX_ATTEMPTS, ErrorHandlerConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, watch};
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::persistence::{default_rate_limit_path, default_settings_path, load_json, save_json};
use crate::rate_limit_table::RateLimitTable;

// ============================================================================
// Settings Types
// ============================================================================

/// Service configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Log level.
    pub log_level: LogLevel,

    /// Error classification and escalation tunables.
    pub error_handling: ErrorHandlerConfig,

    /// Retry ceiling for collection.
    pub retry: RetrySettings,

    /// Collection defaults.
    pub collection: CollectionSettings,

    /// Per-endpoint-class rate limits.
    pub rate_limits: RateLimitTable,

    /// Where rate-limit records live.
    pub rate_limit_storage: RateLimitStorage,

    /// Configured tenants.
    pub tenants: Vec<TenantConfig>,
}

impl Settings {
    /// Looks up a tenant by id.
    pub fn tenant(&self, id: &str) -> Option<&TenantConfig> {
        self.tenants.iter().find(|t| t.id == id)
    }

    /// Enabled tenants, in file order.
    pub fn enabled_tenants(&self) -> impl Iterator<Item = &TenantConfig> {
        self.tenants.iter().filter(|t| t.enabled)
    }

    /// Checks the settings for values that cannot work.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Config`] describing the first problem found.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.retry.max_attempts == 0 {
            return Err(StoreError::Config("retry.max_attempts must be at least 1".into()));
        }
        if self.collection.batch_days == 0 {
            return Err(StoreError::Config("collection.batch_days must be at least 1".into()));
        }
        self.error_handling
            .validate()
            .map_err(|e| StoreError::Config(format!("error_handling: {e}")))?;

        let mut seen = HashSet::new();
        for tenant in &self.tenants {
            if tenant.id.trim().is_empty() {
                return Err(StoreError::Config("tenant id must not be empty".into()));
            }
            if !seen.insert(tenant.id.as_str()) {
                return Err(StoreError::Config(format!("duplicate tenant '{}'", tenant.id)));
            }
            if tenant.gateway_url.trim().is_empty() {
                return Err(StoreError::Config(format!(
                    "tenant '{}' has no gateway_url",
                    tenant.id
                )));
            }
        }
        Ok(())
    }
}

/// Log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// Error level logging.
    Error,
    /// Warning level logging.
    #[default]
    Warn,
    /// Info level logging.
    Info,
    /// Debug level logging.
    Debug,
    /// Trace level logging.
    Trace,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Error => write!(f, "error"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Trace => write!(f, "trace"),
        }
    }
}

/// Retry settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Attempts per collection, including the first.
    pub max_attempts: u32,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// Collection defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionSettings {
    /// Days per batch for incremental collection.
    pub batch_days: u32,
    /// HTTP timeout for provider calls.
    pub http_timeout_secs: u64,
    /// Days collected when no range is given.
    pub default_days: u32,
}

impl Default for CollectionSettings {
    fn default() -> Self {
        Self {
            batch_days: 7,
            http_timeout_secs: 30,
            default_days: 7,
        }
    }
}

impl CollectionSettings {
    /// HTTP timeout as a duration.
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

/// Backing store for rate-limit records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RateLimitStorage {
    /// Process-local; limits reset on restart.
    Memory,
    /// JSON file shared by successive runs.
    File {
        /// File path; the data directory when unset.
        #[serde(default)]
        path: Option<PathBuf>,
    },
}

impl Default for RateLimitStorage {
    fn default() -> Self {
        Self::File { path: None }
    }
}

impl RateLimitStorage {
    /// Resolved file path, if file-backed.
    pub fn file_path(&self) -> Option<PathBuf> {
        match self {
            Self::Memory => None,
            Self::File { path } => Some(path.clone().unwrap_or_else(default_rate_limit_path)),
        }
    }
}

/// One tenant and its provider credentials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantConfig {
    /// Tenant identifier.
    pub id: String,
    /// Base URL of the billing-export gateway.
    pub gateway_url: String,
    /// Whether the tenant is collected.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Credentials, at most one set per provider in use.
    #[serde(default)]
    pub credentials: Vec<ProviderCredentials>,
}

fn default_true() -> bool {
    true
}

impl TenantConfig {
    /// Creates an enabled tenant without credentials.
    pub fn new(id: impl Into<String>, gateway_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            gateway_url: gateway_url.into(),
            enabled: true,
            credentials: Vec::new(),
        }
    }

    /// Adds credentials.
    #[must_use]
    pub fn with_credentials(mut self, credentials: ProviderCredentials) -> Self {
        self.credentials.push(credentials);
        self
    }

    /// Credentials for a provider.
    pub fn credentials_for(&self, provider: ProviderKind) -> Option<&ProviderCredentials> {
        self.credentials.iter().find(|c| c.provider() == provider)
    }

    /// Active, unexpired credentials at `now`.
    pub fn usable_credentials_at(&self, now: DateTime<Utc>) -> impl Iterator<Item = &ProviderCredentials> {
        self.credentials
            .iter()
            .filter(move |c| c.is_active && !c.is_expired_at(now))
    }
}

// ============================================================================
// Settings Store
// ============================================================================

/// Persistent settings store with change notifications.
pub struct SettingsStore {
    settings: Arc<RwLock<Settings>>,
    path: PathBuf,
    notify: watch::Sender<u64>,
    version: Arc<RwLock<u64>>,
}

impl SettingsStore {
    /// Creates a store holding default settings.
    pub fn new(path: PathBuf) -> Self {
        Self::with_settings(path, Settings::default())
    }

    /// Creates a store holding `settings`.
    pub fn with_settings(path: PathBuf, settings: Settings) -> Self {
        let (notify, _) = watch::channel(0);
        Self {
            settings: Arc::new(RwLock::new(settings)),
            path,
            notify,
            version: Arc::new(RwLock::new(0)),
        }
    }

    /// Loads settings from the default path.
    ///
    /// # Errors
    ///
    /// Returns an error if the loaded settings are invalid.
    pub async fn load_default() -> Result<Self, StoreError> {
        Self::load(default_settings_path()).await
    }

    /// Loads settings from a path.
    ///
    /// A missing or unreadable file yields defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the loaded settings are invalid.
    pub async fn load(path: PathBuf) -> Result<Self, StoreError> {
        let settings: Settings = if path.exists() {
            info!(path = %path.display(), "Loading settings");
            load_json(&path).await.unwrap_or_else(|e| {
                warn!(error = %e, "Failed to load settings, using defaults");
                Settings::default()
            })
        } else {
            debug!(path = %path.display(), "Settings file not found, using defaults");
            Settings::default()
        };

        settings.validate()?;
        Ok(Self::with_settings(path, settings))
    }

    /// Gets a copy of the current settings.
    pub async fn get(&self) -> Settings {
        self.settings.read().await.clone()
    }

    /// Updates settings and notifies subscribers.
    pub async fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut Settings),
    {
        {
            let mut settings = self.settings.write().await;
            f(&mut settings);
        }
        self.notify_change().await;
    }

    /// Saves settings to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings are invalid or cannot be written.
    pub async fn save(&self) -> Result<(), StoreError> {
        let settings = self.settings.read().await;
        settings.validate()?;
        save_json(&self.path, &*settings).await?;
        info!(path = %self.path.display(), "Settings saved");
        Ok(())
    }

    /// Subscribes to settings changes.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.notify.subscribe()
    }

    /// Path settings are saved to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Notifies subscribers of a change.
    async fn notify_change(&self) {
        let mut version = self.version.write().await;
        *version += 1;
        let _ = self.notify.send(*version);
    }

    // ========================================================================
    // Tenants
    // ========================================================================

    /// Gets a tenant's configuration.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::TenantNotFound`] for unknown tenants.
    pub async fn tenant(&self, id: &str) -> Result<TenantConfig, StoreError> {
        self.settings
            .read()
            .await
            .tenant(id)
            .cloned()
            .ok_or_else(|| StoreError::TenantNotFound(id.to_string()))
    }

    /// Inserts or replaces a tenant.
    pub async fn upsert_tenant(&self, tenant: TenantConfig) {
        self.update(|s| {
            if let Some(existing) = s.tenants.iter_mut().find(|t| t.id == tenant.id) {
                *existing = tenant;
            } else {
                s.tenants.push(tenant);
            }
        })
        .await;
    }

    /// Removes a tenant, returning whether it existed.
    pub async fn remove_tenant(&self, id: &str) -> bool {
        let removed = {
            let mut settings = self.settings.write().await;
            let before = settings.tenants.len();
            settings.tenants.retain(|t| t.id != id);
            settings.tenants.len() != before
        };
        if removed {
            self.notify_change().await;
        }
        removed
    }

    /// Enables or disables a tenant.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::TenantNotFound`] for unknown tenants.
    pub async fn set_tenant_enabled(&self, id: &str, enabled: bool) -> Result<(), StoreError> {
        {
            let mut settings = self.settings.write().await;
            let tenant = settings
                .tenants
                .iter_mut()
                .find(|t| t.id == id)
                .ok_or_else(|| StoreError::TenantNotFound(id.to_string()))?;
            tenant.enabled = enabled;
        }
        self.notify_change().await;
        Ok(())
    }

    /// Ids of enabled tenants.
    pub async fn enabled_tenant_ids(&self) -> Vec<String> {
        self.settings
            .read()
            .await
            .enabled_tenants()
            .map(|t| t.id.clone())
            .collect()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use costwatch_core::CredentialSecret;

    fn aws() -> ProviderCredentials {
        ProviderCredentials::new(CredentialSecret::Aws {
            access_key_id: "AKIA".into(),
            secret_access_key: "s3cr3t".into(),
            region: "eu-west-1".into(),
            role_arn: None,
        })
    }

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.retry.max_attempts, 3);
        assert_eq!(settings.collection.batch_days, 7);
        assert_eq!(settings.error_handling.escalation_threshold, 5);
        assert!(settings.tenants.is_empty());
        assert!(settings.rate_limit_storage.file_path().is_some());
        settings.validate().unwrap();
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let json = r#"{
            "log_level": "debug",
            "collection": {"batch_days": 3},
            "rate_limit_storage": {"kind": "memory"},
            "tenants": [{"id": "acme", "gateway_url": "https://billing.acme.test"}]
        }"#;
        let settings: Settings = serde_json::from_str(json).unwrap();

        assert_eq!(settings.log_level, LogLevel::Debug);
        assert_eq!(settings.collection.batch_days, 3);
        assert_eq!(settings.collection.http_timeout_secs, 30);
        assert_eq!(settings.rate_limit_storage, RateLimitStorage::Memory);
        assert!(settings.tenant("acme").unwrap().enabled);
    }

    #[test]
    fn test_validate_rejects_duplicates_and_zeroes() {
        let mut settings = Settings::default();
        settings.tenants.push(TenantConfig::new("a", "https://x.test"));
        settings.tenants.push(TenantConfig::new("a", "https://y.test"));
        assert!(matches!(settings.validate(), Err(StoreError::Config(_))));

        let mut settings = Settings::default();
        settings.collection.batch_days = 0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.tenants.push(TenantConfig::new("b", " "));
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_negative_delay_cap() {
        let settings: Settings =
            serde_json::from_str(r#"{"error_handling": {"max_delay_secs": -1}}"#).unwrap();

        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("max_delay_secs"));

        let mut settings = Settings::default();
        settings.error_handling.escalation_window_secs = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_usable_credentials_skip_inactive_and_expired() {
        let now = Utc::now();
        let mut inactive = aws();
        inactive.is_active = false;
        let expired = aws().with_expiry(now - TimeDelta::minutes(1));
        let tenant = TenantConfig::new("acme", "https://x.test")
            .with_credentials(inactive)
            .with_credentials(expired)
            .with_credentials(aws());

        assert_eq!(tenant.usable_credentials_at(now).count(), 1);
        assert!(tenant.credentials_for(ProviderKind::Aws).is_some());
        assert!(tenant.credentials_for(ProviderKind::Gcp).is_none());
    }

    #[tokio::test]
    async fn test_update_notifies_subscribers() {
        let store = SettingsStore::new(PathBuf::from("/tmp/costwatch_test_settings.json"));
        let mut rx = store.subscribe();

        store.update(|s| s.log_level = LogLevel::Trace).await;

        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), 1);
        assert_eq!(store.get().await.log_level, LogLevel::Trace);
    }

    #[tokio::test]
    async fn test_tenant_helpers() {
        let store = SettingsStore::new(PathBuf::from("/tmp/costwatch_test_settings.json"));
        store.upsert_tenant(TenantConfig::new("acme", "https://a.test")).await;
        store.upsert_tenant(TenantConfig::new("beta", "https://b.test")).await;
        store.upsert_tenant(TenantConfig::new("acme", "https://a2.test")).await;

        assert_eq!(store.tenant("acme").await.unwrap().gateway_url, "https://a2.test");
        assert_eq!(store.enabled_tenant_ids().await, vec!["acme", "beta"]);

        store.set_tenant_enabled("beta", false).await.unwrap();
        assert_eq!(store.enabled_tenant_ids().await, vec!["acme"]);

        assert!(store.remove_tenant("acme").await);
        assert!(!store.remove_tenant("acme").await);
        assert!(matches!(
            store.tenant("acme").await,
            Err(StoreError::TenantNotFound(_))
        ));
        assert!(store.set_tenant_enabled("ghost", true).await.is_err());
    }
}
