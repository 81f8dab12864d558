//! Shared service context.
//!
//! Built once at startup from [`Settings`] and handed to every caller. Owns
//! the error handler, the adapter manager and the rate limiter so they share
//! one error history and one record store.

use chrono::{DateTime, Utc};
use costwatch_core::{
    CollectionResult, CollectionStatus, DateRange, ErrorKind, ProviderCredentials,
};
use costwatch_fetch::{AdapterManager, ErrorHandler, ProviderAdapter};
use std::fmt::Display;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::error::StoreError;
use crate::rate_limit_table::EndpointClass;
use crate::rate_limiter::RateLimiter;
use crate::record_store::{InMemoryRecordStore, JsonFileRecordStore, RecordStore};
use crate::settings_store::{Settings, TenantConfig};

/// Error handler, adapter registry and rate limiter built from settings.
pub struct ServiceContext {
    settings: Settings,
    error_handler: Arc<ErrorHandler>,
    manager: Arc<AdapterManager>,
    rate_limiter: RateLimiter,
}

impl std::fmt::Debug for ServiceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceContext")
            .field("tenants", &self.settings.tenants.len())
            .field("adapters", &self.manager.len())
            .field("rate_limiter", &self.rate_limiter)
            .finish_non_exhaustive()
    }
}

impl ServiceContext {
    /// Builds the context and registers adapters for every enabled tenant.
    ///
    /// `factory` is called once per usable credential set. Inactive or
    /// expired credentials and factory failures are logged and skipped.
    pub fn from_settings<F, E>(settings: Settings, store: Arc<dyn RecordStore>, factory: F) -> Self
    where
        F: FnMut(&TenantConfig, &ProviderCredentials) -> Result<Arc<dyn ProviderAdapter>, E>,
        E: Display,
    {
        Self::from_settings_at(settings, store, factory, Utc::now())
    }

    /// [`Self::from_settings`] judging credential expiry at `now`.
    pub fn from_settings_at<F, E>(
        settings: Settings,
        store: Arc<dyn RecordStore>,
        mut factory: F,
        now: DateTime<Utc>,
    ) -> Self
    where
        F: FnMut(&TenantConfig, &ProviderCredentials) -> Result<Arc<dyn ProviderAdapter>, E>,
        E: Display,
    {
        let error_handler = Arc::new(ErrorHandler::with_config(settings.error_handling.clone()));
        let manager = AdapterManager::new(Arc::clone(&error_handler))
            .with_max_attempts(settings.retry.max_attempts);
        let rate_limiter = RateLimiter::with_table(store, settings.rate_limits.clone());

        for tenant in &settings.tenants {
            if !tenant.enabled {
                debug!(tenant = %tenant.id, "Tenant disabled, skipping");
                continue;
            }
            for credentials in &tenant.credentials {
                let provider = credentials.provider();
                if !credentials.is_active {
                    info!(tenant = %tenant.id, provider = %provider, "Credentials inactive, skipping");
                    continue;
                }
                if credentials.is_expired_at(now) {
                    warn!(tenant = %tenant.id, provider = %provider, "Credentials expired, skipping");
                    continue;
                }
                match factory(tenant, credentials) {
                    Ok(adapter) => {
                        manager.add_adapter(tenant.id.clone(), adapter);
                    }
                    Err(e) => {
                        warn!(tenant = %tenant.id, provider = %provider, error = %e, "Failed to build adapter");
                    }
                }
            }
        }

        info!(
            tenants = settings.tenants.len(),
            adapters = manager.len(),
            "Service context ready"
        );

        Self {
            settings,
            error_handler,
            manager: Arc::new(manager),
            rate_limiter,
        }
    }

    /// Opens the record store selected in `settings`.
    ///
    /// # Errors
    ///
    /// Returns an error if a file-backed store cannot be loaded.
    pub async fn open_record_store(settings: &Settings) -> Result<Arc<dyn RecordStore>, StoreError> {
        match settings.rate_limit_storage.file_path() {
            Some(path) => Ok(Arc::new(JsonFileRecordStore::open(path).await?)),
            None => Ok(Arc::new(InMemoryRecordStore::new())),
        }
    }

    /// Settings the context was built from.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Shared error handler.
    pub fn error_handler(&self) -> &Arc<ErrorHandler> {
        &self.error_handler
    }

    /// Adapter registry.
    pub fn manager(&self) -> &Arc<AdapterManager> {
        &self.manager
    }

    /// Rate limiter.
    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    // ========================================================================
    // Admission-controlled collection
    // ========================================================================

    /// Collects for a tenant after admitting it against the provider API limit.
    ///
    /// A denied tenant gets one `RateLimited` result per registered adapter.
    /// `batch_days` of `None` collects each adapter in a single call.
    #[instrument(skip(self, range), fields(range = %range))]
    pub async fn collect(
        &self,
        tenant_id: &str,
        range: &DateRange,
        batch_days: Option<u32>,
    ) -> Vec<CollectionResult> {
        if !self
            .rate_limiter
            .check_endpoint(EndpointClass::ProviderApi, tenant_id)
            .await
        {
            warn!("Provider API rate limit exceeded for tenant");
            return self.rate_limited(tenant_id);
        }

        match batch_days {
            Some(days) => self.manager.collect_incremental(tenant_id, range, days).await,
            None => self.manager.collect_all_cost_data(tenant_id, range).await,
        }
    }

    fn rate_limited(&self, tenant_id: &str) -> Vec<CollectionResult> {
        self.manager
            .adapters_for_tenant(tenant_id)
            .iter()
            .map(|adapter| {
                CollectionResult::failed(adapter.provider(), "Rate limit exceeded for tenant")
                    .with_status(CollectionStatus::RateLimited)
                    .with_error_kind(ErrorKind::RateLimitError)
            })
            .collect()
    }

    /// Sweeps expired rate-limit records and logs error statistics.
    ///
    /// Returns how many records were removed.
    pub async fn shutdown(&self) -> usize {
        let removed = match self.rate_limiter.cleanup_expired_entries().await {
            Ok(removed) => removed,
            Err(e) => {
                warn!(error = %e, "Failed to sweep rate limit records");
                0
            }
        };

        let stats = self.error_handler.statistics();
        info!(
            total_errors = stats.total_errors,
            errors_last_hour = stats.errors_last_hour,
            error_rate_per_hour = stats.error_rate_per_hour,
            removed,
            "Service context shut down"
        );
        removed
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeDelta;
    use costwatch_core::{
        CollectionError, CredentialSecret, CredentialValidation, ProviderAccount, ProviderCostData,
        ProviderKind, ProviderService, ServiceCategory,
    };
    use std::collections::HashMap;

    struct FixedAdapter(ProviderKind);

    #[async_trait]
    impl ProviderAdapter for FixedAdapter {
        fn provider(&self) -> ProviderKind {
            self.0
        }

        fn supported_regions(&self) -> Vec<String> {
            Vec::new()
        }

        async fn validate_credentials(&self) -> Result<CredentialValidation, CollectionError> {
            Ok(CredentialValidation::valid(self.0, None))
        }

        async fn collect_cost_data(&self, range: &DateRange) -> Result<CollectionResult, CollectionError> {
            let data = ProviderCostData::new(self.0, range.start()).with_service("compute", 1.0);
            Ok(CollectionResult::success(self.0, data))
        }

        async fn get_accounts(&self) -> Result<Vec<ProviderAccount>, CollectionError> {
            Ok(Vec::new())
        }

        async fn get_services(&self) -> Result<Vec<ProviderService>, CollectionError> {
            Ok(Vec::new())
        }

        fn get_service_mapping(&self) -> HashMap<String, ServiceCategory> {
            HashMap::new()
        }

        async fn test_connection(&self) -> Result<bool, CollectionError> {
            Ok(true)
        }
    }

    fn aws() -> ProviderCredentials {
        ProviderCredentials::new(CredentialSecret::Aws {
            access_key_id: "AKIA".into(),
            secret_access_key: "s".into(),
            region: "us-east-1".into(),
            role_arn: None,
        })
    }

    fn gcp() -> ProviderCredentials {
        ProviderCredentials::new(CredentialSecret::Gcp {
            project_id: "p".into(),
            client_email: "svc@p.iam".into(),
            private_key: "k".into(),
            billing_account_id: None,
        })
    }

    fn factory(
        _tenant: &TenantConfig,
        credentials: &ProviderCredentials,
    ) -> Result<Arc<dyn ProviderAdapter>, String> {
        match credentials.provider() {
            ProviderKind::Azure => Err("azure unsupported".into()),
            provider => Ok(Arc::new(FixedAdapter(provider))),
        }
    }

    fn azure() -> ProviderCredentials {
        ProviderCredentials::new(CredentialSecret::Azure {
            tenant_id: "t".into(),
            client_id: "c".into(),
            client_secret: "s".into(),
            subscription_id: "sub".into(),
        })
    }

    #[test]
    fn test_from_settings_registers_usable_credentials_only() {
        let now = Utc::now();
        let mut settings = Settings::default();
        settings.tenants.push(
            TenantConfig::new("acme", "https://a.test")
                .with_credentials(aws())
                .with_credentials(gcp().with_expiry(now - TimeDelta::hours(1)))
                .with_credentials(azure()),
        );
        let mut disabled = TenantConfig::new("off", "https://b.test").with_credentials(aws());
        disabled.enabled = false;
        settings.tenants.push(disabled);

        let ctx = ServiceContext::from_settings_at(
            settings,
            Arc::new(InMemoryRecordStore::new()),
            factory,
            now,
        );

        assert_eq!(ctx.manager().len(), 1);
        assert!(ctx.manager().get_adapter("acme", ProviderKind::Aws).is_some());
        assert!(ctx.manager().adapters_for_tenant("off").is_empty());
    }

    #[tokio::test]
    async fn test_collect_denied_tenant_gets_rate_limited_results() {
        let mut settings = Settings::default();
        settings.rate_limits = settings.rate_limits.with_rule(
            EndpointClass::ProviderApi,
            crate::rate_limit_table::RateLimitRule::new(
                1,
                3600,
                crate::rate_limit_table::Algorithm::SlidingWindow,
            ),
        );
        settings.tenants.push(
            TenantConfig::new("acme", "https://a.test")
                .with_credentials(aws())
                .with_credentials(gcp()),
        );
        let ctx = ServiceContext::from_settings(settings, Arc::new(InMemoryRecordStore::new()), factory);
        let range = DateRange::last_n_days(2);

        let first = ctx.collect("acme", &range, None).await;
        assert_eq!(first.len(), 2);
        assert!(first.iter().all(CollectionResult::is_success));

        let second = ctx.collect("acme", &range, Some(1)).await;
        assert_eq!(second.len(), 2);
        assert!(second.iter().all(|r| r.status == CollectionStatus::RateLimited));
        assert_eq!(second[0].provider, ProviderKind::Aws);
        assert_eq!(second[1].provider, ProviderKind::Gcp);
    }

    #[tokio::test]
    async fn test_shutdown_sweeps_expired_records() {
        let store = Arc::new(InMemoryRecordStore::new());
        let ctx = ServiceContext::from_settings(Settings::default(), store.clone(), factory);

        let long_ago = Utc::now() - TimeDelta::days(2);
        ctx.rate_limiter()
            .check_endpoint_at(EndpointClass::Collection, "acme", long_ago)
            .await;
        ctx.rate_limiter()
            .check_endpoint(EndpointClass::Collection, "beta")
            .await;

        assert_eq!(ctx.shutdown().await, 1);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_open_record_store_follows_settings() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = Settings::default();
        settings.rate_limit_storage = crate::settings_store::RateLimitStorage::File {
            path: Some(dir.path().join("limits.json")),
        };

        let store = ServiceContext::open_record_store(&settings).await.unwrap();
        store
            .put(
                "k",
                crate::record_store::RateLimitRecord::SlidingWindow {
                    timestamps: Vec::new(),
                    expiry: Utc::now(),
                },
            )
            .await
            .unwrap();
        assert!(dir.path().join("limits.json").exists());
    }
}
