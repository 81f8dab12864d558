//! CLI command implementations.

pub mod check;
pub mod collect;
pub mod config;
pub mod limits;
pub mod providers;

use anyhow::{Context, Result};
use costwatch_providers::build_adapter;
use costwatch_store::{ServiceContext, Settings, SettingsStore, TenantConfig, default_settings_path};
use std::path::PathBuf;
use tracing::debug;

use crate::Cli;

/// Settings file selected on the command line, or the default.
pub fn settings_path(cli: &Cli) -> PathBuf {
    cli.config.clone().unwrap_or_else(default_settings_path)
}

/// Loads and validates the settings file.
pub async fn load_settings(cli: &Cli) -> Result<SettingsStore> {
    let path = settings_path(cli);
    SettingsStore::load(path.clone())
        .await
        .with_context(|| format!("invalid settings in {}", path.display()))
}

/// Default settings bound to the selected path.
pub fn default_settings(cli: &Cli) -> SettingsStore {
    SettingsStore::new(settings_path(cli))
}

/// Builds the service context, one gateway adapter per usable credential.
pub async fn open_context(settings: Settings) -> Result<ServiceContext> {
    let store = ServiceContext::open_record_store(&settings)
        .await
        .context("failed to open rate-limit store")?;
    let timeout = settings.collection.http_timeout();

    Ok(ServiceContext::from_settings(settings, store, |tenant, credentials| {
        debug!(tenant = %tenant.id, provider = %credentials.provider(), "Building adapter");
        build_adapter(&tenant.gateway_url, credentials, timeout)
    }))
}

/// Looks up an enabled tenant.
pub fn require_tenant<'a>(settings: &'a Settings, id: &str) -> Result<&'a TenantConfig> {
    let tenant = settings
        .tenant(id)
        .with_context(|| format!("Unknown tenant: {id}"))?;
    if !tenant.enabled {
        anyhow::bail!("Tenant is disabled: {id}");
    }
    Ok(tenant)
}
