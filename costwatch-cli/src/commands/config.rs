//! Config command - manage configuration.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use costwatch_store::{SettingsStore, default_config_dir, default_data_dir};
use std::path::Path;
use tracing::info;

use crate::output::{ConfigView, JsonFormatter, TextFormatter};
use crate::{Cli, ExitCode, OutputFormat};

/// Arguments for the config command.
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Config subcommands.
#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show current configuration (secrets omitted).
    Show,

    /// Show configuration paths.
    Path,

    /// Write a default settings file.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },

    /// Enable collection for a tenant.
    Enable {
        /// Tenant id.
        tenant: String,
    },

    /// Disable collection for a tenant.
    Disable {
        /// Tenant id.
        tenant: String,
    },
}

/// Runs the config command.
pub async fn run(args: &ConfigArgs, store: &SettingsStore, cli: &Cli) -> Result<ExitCode> {
    match &args.action {
        ConfigAction::Show => show_config(store, cli).await?,
        ConfigAction::Path => show_paths(store, cli)?,
        ConfigAction::Init { force } => {
            init_config(store.path(), *force).await?;
            println!("Wrote default settings to {}", store.path().display());
        }
        ConfigAction::Enable { tenant } => set_enabled(store, tenant, true).await?,
        ConfigAction::Disable { tenant } => set_enabled(store, tenant, false).await?,
    }
    Ok(ExitCode::Success)
}

async fn show_config(store: &SettingsStore, cli: &Cli) -> Result<()> {
    let settings = store.get().await;
    let view = ConfigView::from(&settings);

    match cli.format {
        OutputFormat::Text => {
            let formatter = TextFormatter::new(!cli.no_color);
            println!("{}", formatter.format_config(&view));
        }
        OutputFormat::Json => {
            let formatter = JsonFormatter::new(cli.pretty);
            println!("{}", formatter.format(&view)?);
        }
    }

    Ok(())
}

fn show_paths(store: &SettingsStore, cli: &Cli) -> Result<()> {
    let config_dir = default_config_dir();
    let data_dir = default_data_dir();

    match cli.format {
        OutputFormat::Text => {
            println!("Configuration Paths");
            println!("{}", "─".repeat(40));
            println!();
            println!("Config dir:    {}", config_dir.display());
            println!("Data dir:      {}", data_dir.display());
            println!("Settings file: {}", store.path().display());
        }
        OutputFormat::Json => {
            let paths = serde_json::json!({
                "config_dir": config_dir.display().to_string(),
                "data_dir": data_dir.display().to_string(),
                "settings_file": store.path().display().to_string(),
            });
            let formatter = JsonFormatter::new(cli.pretty);
            println!("{}", formatter.format(&paths)?);
        }
    }

    Ok(())
}

/// Writes default settings to `path`, refusing to clobber unless `force`.
pub async fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists; pass --force to overwrite",
            path.display()
        );
    }

    SettingsStore::new(path.to_path_buf())
        .save()
        .await
        .with_context(|| format!("failed to write {}", path.display()))?;
    info!(path = %path.display(), "Settings initialised");
    Ok(())
}

async fn set_enabled(store: &SettingsStore, tenant: &str, enabled: bool) -> Result<()> {
    store.set_tenant_enabled(tenant, enabled).await?;
    store.save().await?;

    info!(tenant = %tenant, enabled, "Tenant updated");
    println!(
        "{}: {tenant}",
        if enabled { "Enabled" } else { "Disabled" }
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use costwatch_store::Settings;

    #[tokio::test]
    async fn test_init_writes_loadable_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        init_config(&path, false).await.unwrap();

        let store = SettingsStore::load(path).await.unwrap();
        assert_eq!(store.get().await, Settings::default());
    }

    #[tokio::test]
    async fn test_init_refuses_to_overwrite_without_force() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"log_level": "debug"}"#).unwrap();

        let err = init_config(&path, false).await.unwrap_err();
        assert!(err.to_string().contains("--force"));
        assert!(std::fs::read_to_string(&path).unwrap().contains("debug"));

        init_config(&path, true).await.unwrap();
        let store = SettingsStore::load(path).await.unwrap();
        assert_eq!(store.get().await, Settings::default());
    }
}
