//! Adapter registry and concurrent fan-out.
//!
//! The [`AdapterManager`] keeps adapters keyed by `(tenant, provider)` in
//! registration order and runs a tenant's adapters concurrently. One
//! adapter failing, or panicking, never affects the others: every failure
//! is turned into a `Failed` result in that adapter's slot, carrying the
//! terminal error kind in `error_kind`.

use chrono::{DateTime, Utc};
use costwatch_core::{
    CollectionError, CollectionResult, CredentialValidation, DateRange, HealthReport,
    ProviderCostData, ProviderKind,
};
use futures::FutureExt;
use futures::future::join_all;
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, error, info, instrument, warn};

use crate::adapter::ProviderAdapter;
use crate::error::FetchError;
use crate::error_handler::{ErrorHandler, RecoveryAction};
use crate::retry::{DEFAULT_MAX_ATTEMPTS, RetryTarget, run_with_retry};

// ============================================================================
// Registration
// ============================================================================

struct Registration {
    tenant_id: String,
    provider: ProviderKind,
    adapter: Arc<dyn ProviderAdapter>,
}

// ============================================================================
// Adapter Manager
// ============================================================================

/// Registry of adapters per tenant, with isolated concurrent fan-out.
pub struct AdapterManager {
    registrations: RwLock<Vec<Registration>>,
    error_handler: Arc<ErrorHandler>,
    max_attempts: u32,
}

impl AdapterManager {
    /// Creates an empty manager sharing `error_handler`.
    pub fn new(error_handler: Arc<ErrorHandler>) -> Self {
        Self {
            registrations: RwLock::new(Vec::new()),
            error_handler,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Sets the retry ceiling used for collection.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Returns the shared error handler.
    pub fn error_handler(&self) -> &Arc<ErrorHandler> {
        &self.error_handler
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Registration>> {
        self.registrations.read().unwrap_or_else(|poisoned| {
            warn!("Adapter registry lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Registration>> {
        self.registrations.write().unwrap_or_else(|poisoned| {
            warn!("Adapter registry lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    // ========================================================================
    // Registry
    // ========================================================================

    /// Registers an adapter for a tenant.
    ///
    /// Replacing an existing `(tenant, provider)` entry keeps its position
    /// and returns the previous adapter.
    pub fn add_adapter(
        &self,
        tenant_id: impl Into<String>,
        adapter: Arc<dyn ProviderAdapter>,
    ) -> Option<Arc<dyn ProviderAdapter>> {
        let tenant_id = tenant_id.into();
        let provider = adapter.provider();
        let mut registrations = self.write();

        if let Some(existing) = registrations
            .iter_mut()
            .find(|r| r.tenant_id == tenant_id && r.provider == provider)
        {
            debug!(tenant = %tenant_id, provider = %provider, "Replacing adapter");
            return Some(std::mem::replace(&mut existing.adapter, adapter));
        }

        info!(tenant = %tenant_id, provider = %provider, "Registered adapter");
        registrations.push(Registration {
            tenant_id,
            provider,
            adapter,
        });
        None
    }

    /// Looks up the adapter for a tenant and provider.
    pub fn get_adapter(
        &self,
        tenant_id: &str,
        provider: ProviderKind,
    ) -> Option<Arc<dyn ProviderAdapter>> {
        self.read()
            .iter()
            .find(|r| r.tenant_id == tenant_id && r.provider == provider)
            .map(|r| Arc::clone(&r.adapter))
    }

    /// Like [`get_adapter`](Self::get_adapter), but an error when missing.
    pub fn require_adapter(
        &self,
        tenant_id: &str,
        provider: ProviderKind,
    ) -> Result<Arc<dyn ProviderAdapter>, FetchError> {
        self.get_adapter(tenant_id, provider)
            .ok_or_else(|| FetchError::AdapterNotFound {
                tenant: tenant_id.to_string(),
                provider: provider.cli_name().to_string(),
            })
    }

    /// Removes and returns the adapter for a tenant and provider.
    pub fn remove_adapter(
        &self,
        tenant_id: &str,
        provider: ProviderKind,
    ) -> Option<Arc<dyn ProviderAdapter>> {
        let mut registrations = self.write();
        let index = registrations
            .iter()
            .position(|r| r.tenant_id == tenant_id && r.provider == provider)?;
        info!(tenant = %tenant_id, provider = %provider, "Removed adapter");
        Some(registrations.remove(index).adapter)
    }

    /// Snapshot of a tenant's adapters in registration order.
    pub fn adapters_for_tenant(&self, tenant_id: &str) -> Vec<Arc<dyn ProviderAdapter>> {
        self.read()
            .iter()
            .filter(|r| r.tenant_id == tenant_id)
            .map(|r| Arc::clone(&r.adapter))
            .collect()
    }

    /// Registered tenant ids in first-registration order.
    pub fn tenants(&self) -> Vec<String> {
        let mut tenants: Vec<String> = Vec::new();
        for registration in self.read().iter() {
            if !tenants.contains(&registration.tenant_id) {
                tenants.push(registration.tenant_id.clone());
            }
        }
        tenants
    }

    /// Total number of registered adapters.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    // ========================================================================
    // Fan-out
    // ========================================================================

    /// Collects cost data from every adapter of `tenant_id` concurrently.
    ///
    /// Results come back in registration order, one per adapter.
    #[instrument(skip(self, range), fields(range = %range))]
    pub async fn collect_all_cost_data(
        &self,
        tenant_id: &str,
        range: &DateRange,
    ) -> Vec<CollectionResult> {
        let adapters = self.adapters_for_tenant(tenant_id);
        if adapters.is_empty() {
            warn!("No adapters registered for tenant");
            return Vec::new();
        }
        info!(count = adapters.len(), "Collecting cost data");

        let range = *range;
        let tasks = adapters
            .into_iter()
            .map(|adapter| self.collect_isolated(tenant_id, adapter, range));
        let results = join_all(tasks).await;

        let succeeded = results.iter().filter(|r| r.is_success()).count();
        info!(succeeded, failed = results.len() - succeeded, "Collection finished");
        results
    }

    /// Collects `range` in `batch_days` pieces per adapter and merges them.
    ///
    /// Adapters run concurrently; an adapter's batches run in order, each
    /// with the same recovery as [`collect_all_cost_data`](Self::collect_all_cost_data).
    /// A failed batch becomes a warning on the merged result.
    #[instrument(skip(self, range), fields(range = %range))]
    pub async fn collect_incremental(
        &self,
        tenant_id: &str,
        range: &DateRange,
        batch_days: u32,
    ) -> Vec<CollectionResult> {
        let batches = range.split(batch_days);
        let tasks = self.adapters_for_tenant(tenant_id).into_iter().map(|adapter| {
            let batches = &batches;
            async move {
                let provider = adapter.provider();
                let started = Utc::now();
                let mut results = Vec::with_capacity(batches.len());
                for batch in batches {
                    results.push(self.collect_isolated(tenant_id, Arc::clone(&adapter), *batch).await);
                }
                merge_results(provider, range, results).finish_at(started)
            }
        });
        join_all(tasks).await
    }

    /// Validates credentials of every adapter of `tenant_id` concurrently.
    #[instrument(skip(self))]
    pub async fn validate_all_credentials(
        &self,
        tenant_id: &str,
    ) -> HashMap<ProviderKind, CredentialValidation> {
        let tasks = self.adapters_for_tenant(tenant_id).into_iter().map(|adapter| async move {
            let provider = adapter.provider();
            let validation = match AssertUnwindSafe(adapter.validate_credentials())
                .catch_unwind()
                .await
            {
                Ok(Ok(validation)) => validation,
                Ok(Err(e)) => {
                    warn!(provider = %provider, error = %e, "Credential validation failed");
                    CredentialValidation::invalid(provider, e.to_string())
                }
                Err(panic) => {
                    let message = panic_message(&*panic);
                    error!(provider = %provider, panic = %message, "Credential validation panicked");
                    CredentialValidation::invalid(provider, format!("validation panicked: {message}"))
                }
            };
            (provider, validation)
        });
        join_all(tasks).await.into_iter().collect()
    }

    /// Health-checks every adapter of `tenant_id` concurrently.
    #[instrument(skip(self))]
    pub async fn health_check_all(&self, tenant_id: &str) -> HashMap<ProviderKind, HealthReport> {
        let tasks = self.adapters_for_tenant(tenant_id).into_iter().map(|adapter| async move {
            let provider = adapter.provider();
            let report = match AssertUnwindSafe(adapter.health_check()).catch_unwind().await {
                Ok(report) => report,
                Err(panic) => {
                    let message = panic_message(&*panic);
                    error!(provider = %provider, panic = %message, "Health check panicked");
                    HealthReport::error(provider, format!("health check panicked: {message}"))
                }
            };
            (provider, report)
        });
        join_all(tasks).await.into_iter().collect()
    }

    // ========================================================================
    // Per-adapter collection
    // ========================================================================

    async fn collect_isolated(
        &self,
        tenant_id: &str,
        adapter: Arc<dyn ProviderAdapter>,
        range: DateRange,
    ) -> CollectionResult {
        let provider = adapter.provider();
        let started = Utc::now();

        match AssertUnwindSafe(self.collect_with_recovery(tenant_id, adapter, range, started))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(panic) => panicked(provider, "collect_cost_data", &*panic, started),
        }
    }

    async fn collect_with_recovery(
        &self,
        tenant_id: &str,
        adapter: Arc<dyn ProviderAdapter>,
        range: DateRange,
        started: DateTime<Utc>,
    ) -> CollectionResult {
        let provider = adapter.provider();
        let target = RetryTarget::new("collect_cost_data", provider.cli_name(), tenant_id);
        let mut batch_days = range.days();

        let outcome = run_with_retry(&self.error_handler, &target, self.max_attempts, |attempt| {
            let action = attempt.previous_action();
            if action == Some(RecoveryAction::ReduceRequestSize) {
                batch_days = (batch_days / 2).max(1);
            }
            let batch = batch_days;
            let adapter = Arc::clone(&adapter);
            async move {
                if action == Some(RecoveryAction::RefreshCredentials) {
                    debug!(provider = %provider, "Refreshing credentials");
                    adapter.refresh_credentials().await?;
                }
                if batch < range.days() {
                    debug!(provider = %provider, batch_days = batch, "Collecting in smaller batches");
                    collect_in_batches(adapter.as_ref(), &range, batch).await
                } else {
                    adapter.collect_cost_data(&range).await
                }
            }
        })
        .await;

        match outcome.result {
            Ok(mut result) => {
                result.api_calls_made = result.api_calls_made.max(outcome.attempts);
                if outcome.attempts > 1 {
                    result
                        .warnings
                        .push(format!("succeeded after {} attempts", outcome.attempts));
                }
                result.finish_at(started)
            }
            Err(e) => {
                let mut result =
                    CollectionResult::failed(provider, e.to_string()).with_error_kind(e.kind());
                result.api_calls_made = outcome.attempts;
                if let Some(decision) = outcome.last_decision {
                    result.warnings.push(decision.message);
                }
                result.finish_at(started)
            }
        }
    }
}

impl std::fmt::Debug for AdapterManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterManager")
            .field("adapters", &self.len())
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Collects `range` sequentially in `batch_days` pieces, stopping at the first error.
async fn collect_in_batches(
    adapter: &dyn ProviderAdapter,
    range: &DateRange,
    batch_days: u32,
) -> Result<CollectionResult, CollectionError> {
    let mut results = Vec::new();
    for batch in range.split(batch_days) {
        results.push(adapter.collect_cost_data(&batch).await?);
    }
    Ok(merge_results(adapter.provider(), range, results))
}

/// Merges per-batch results of one provider into a single result.
fn merge_results(
    provider: ProviderKind,
    range: &DateRange,
    results: Vec<CollectionResult>,
) -> CollectionResult {
    let mut data: Option<ProviderCostData> = None;
    let mut warnings = Vec::new();
    let mut failures = Vec::new();
    let mut kind = None;
    let mut api_calls = 0;
    let mut succeeded = 0;

    for result in results {
        api_calls += result.api_calls_made;
        warnings.extend(result.warnings);
        if result.status.has_data() {
            succeeded += 1;
            if let Some(batch) = result.cost_data {
                match data.as_mut() {
                    Some(merged) => merged.merge(&batch),
                    None => data = Some(batch),
                }
            }
        } else {
            kind = kind.or(result.error_kind);
            failures.push(
                result
                    .error_message
                    .unwrap_or_else(|| result.status.to_string()),
            );
        }
    }

    let mut merged = if succeeded == 0 {
        let message = if failures.is_empty() {
            "no batches collected".to_string()
        } else {
            failures.join("; ")
        };
        let failed = CollectionResult::failed(provider, message);
        match kind {
            Some(kind) => failed.with_error_kind(kind),
            None => failed,
        }
    } else {
        let data = data.unwrap_or_else(|| ProviderCostData::new(provider, range.start()));
        let mut merged = CollectionResult::success(provider, data);
        for failure in &failures {
            merged = merged.with_warning(format!("batch failed: {failure}"));
        }
        merged
    };
    warnings.append(&mut merged.warnings);
    merged.warnings = warnings;
    merged.api_calls_made = api_calls;
    merged
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn panicked(
    provider: ProviderKind,
    operation: &str,
    panic: &(dyn Any + Send),
    started: DateTime<Utc>,
) -> CollectionResult {
    let message = panic_message(panic);
    error!(provider = %provider, operation, panic = %message, "Adapter panicked");
    CollectionResult::failed(provider, format!("adapter panicked: {message}")).finish_at(started)
}
