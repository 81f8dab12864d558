//! Limits command - rate-limit rules and per-key quotas.

use anyhow::Result;
use clap::Args;
use costwatch_store::{RateLimiter, SettingsStore};
use tracing::info;

use super::open_context;
use crate::output::{JsonFormatter, LimitEntry, TextFormatter};
use crate::{Cli, ExitCode, OutputFormat};

/// Arguments for the limits command.
#[derive(Args, Debug)]
pub struct LimitsArgs {
    /// Key (usually a tenant id) to report quotas for.
    #[arg(long, short)]
    pub key: Option<String>,

    /// Clear the key's records in every class.
    #[arg(long, requires = "key")]
    pub reset: bool,
}

/// Runs the limits command.
pub async fn run(args: &LimitsArgs, store: &SettingsStore, cli: &Cli) -> Result<ExitCode> {
    let ctx = open_context(store.get().await).await?;
    let limiter = ctx.rate_limiter();

    if args.reset {
        if let Some(key) = &args.key {
            let cleared = reset_key(limiter, key).await?;
            info!(key = %key, cleared, "Rate limit records cleared");
            println!("Cleared {cleared} rate-limit record(s) for {key}");
        }
    }

    let mut entries = Vec::new();
    for (class, rule) in limiter.table().iter() {
        let status = match &args.key {
            Some(key) => Some(limiter.endpoint_status(class, key).await),
            None => None,
        };
        entries.push(LimitEntry { class, rule, status });
    }

    match cli.format {
        OutputFormat::Text => {
            let formatter = TextFormatter::new(!cli.no_color);
            println!("{}", formatter.format_limits(args.key.as_deref(), &entries));
        }
        OutputFormat::Json => {
            let formatter = JsonFormatter::new(cli.pretty);
            println!("{}", formatter.format(&entries)?);
        }
    }

    ctx.shutdown().await;
    Ok(ExitCode::Success)
}

/// Deletes `key`'s record in every endpoint class; returns how many existed.
pub async fn reset_key(limiter: &RateLimiter, key: &str) -> Result<usize> {
    let mut cleared = 0;
    for (class, _) in limiter.table().iter() {
        if limiter
            .reset_rate_limit(&RateLimiter::endpoint_key(class, key))
            .await?
        {
            cleared += 1;
        }
    }
    Ok(cleared)
}
