//! Health and validate commands.

use anyhow::Result;
use clap::Args;
use costwatch_core::{CredentialValidation, HealthReport, ProviderKind};
use costwatch_store::{EndpointClass, ServiceContext, SettingsStore};
use std::collections::HashMap;
use tracing::{info, warn};

use super::{open_context, require_tenant};
use crate::output::{JsonFormatter, TextFormatter};
use crate::{Cli, ExitCode, OutputFormat};

/// Arguments naming one tenant.
#[derive(Args, Debug)]
pub struct TenantArgs {
    /// Tenant to check.
    #[arg(long, short)]
    pub tenant: String,
}

/// Runs the health command.
pub async fn run_health(args: &TenantArgs, store: &SettingsStore, cli: &Cli) -> Result<ExitCode> {
    let Some(ctx) = admitted(args, store, EndpointClass::HealthCheck).await? else {
        return Ok(ExitCode::RateLimited);
    };
    info!(tenant = %args.tenant, "Running health checks");

    let reports = in_provider_order(ctx.manager().health_check_all(&args.tenant).await);
    match cli.format {
        OutputFormat::Text => {
            let formatter = TextFormatter::new(!cli.no_color);
            println!("{}", formatter.format_health(&reports));
        }
        OutputFormat::Json => {
            let formatter = JsonFormatter::new(cli.pretty);
            println!("{}", formatter.format(&reports)?);
        }
    }

    ctx.shutdown().await;
    Ok(if reports.iter().all(HealthReport::is_healthy) {
        ExitCode::Success
    } else {
        ExitCode::ProviderFailed
    })
}

/// Runs the validate command.
pub async fn run_validate(args: &TenantArgs, store: &SettingsStore, cli: &Cli) -> Result<ExitCode> {
    let Some(ctx) = admitted(args, store, EndpointClass::CredentialValidation).await? else {
        return Ok(ExitCode::RateLimited);
    };
    info!(tenant = %args.tenant, "Validating credentials");

    let validations = in_provider_order(ctx.manager().validate_all_credentials(&args.tenant).await);
    match cli.format {
        OutputFormat::Text => {
            let formatter = TextFormatter::new(!cli.no_color);
            println!("{}", formatter.format_validations(&validations));
        }
        OutputFormat::Json => {
            let formatter = JsonFormatter::new(cli.pretty);
            println!("{}", formatter.format(&validations)?);
        }
    }

    ctx.shutdown().await;
    Ok(if validations.iter().all(|v| v.is_valid) {
        ExitCode::Success
    } else {
        ExitCode::ProviderFailed
    })
}

/// Builds the context and admits the tenant against `class`.
///
/// Returns `None` when the rate limiter denies the tenant.
async fn admitted(
    args: &TenantArgs,
    store: &SettingsStore,
    class: EndpointClass,
) -> Result<Option<ServiceContext>> {
    let settings = store.get().await;
    require_tenant(&settings, &args.tenant)?;

    let ctx = open_context(settings).await?;
    if ctx.rate_limiter().check_endpoint(class, &args.tenant).await {
        Ok(Some(ctx))
    } else {
        warn!(tenant = %args.tenant, class = %class, "Rate limit exceeded");
        eprintln!("Rate limit exceeded for {class}; try again later");
        Ok(None)
    }
}

/// Orders per-provider results the way providers are declared.
pub fn in_provider_order<T>(mut by_provider: HashMap<ProviderKind, T>) -> Vec<T> {
    ProviderKind::all()
        .iter()
        .filter_map(|kind| by_provider.remove(kind))
        .collect()
}
