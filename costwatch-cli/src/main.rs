// Lint configuration for this crate
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! costwatch CLI - multi-tenant cloud cost collection from the command line.
//!
//! # Examples
//!
//! ```bash
//! # Collect the last 7 days for a tenant
//! costwatch collect --tenant acme
//!
//! # Collect an explicit range in 3-day batches
//! costwatch collect --tenant acme --start 2024-03-01 --end 2024-03-31 --batch-days 3
//!
//! # JSON output
//! costwatch --format json --pretty collect --tenant acme
//!
//! # Health and credential checks
//! costwatch health --tenant acme
//! costwatch validate --tenant acme
//!
//! # Rate-limit rules and a tenant's quota
//! costwatch limits --key acme
//! ```

mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use costwatch_store::LogLevel;
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use commands::{check, collect, config, limits, providers};

// ============================================================================
// CLI Definition
// ============================================================================

/// costwatch CLI - cloud cost collection.
#[derive(Parser)]
#[command(name = "costwatch")]
#[command(about = "Resilient multi-tenant cloud cost collection")]
#[command(long_about = r"
costwatch collects cloud spend for configured tenants through a billing-export
gateway, retrying and isolating provider failures.

Supported providers:
  • AWS (aws)
  • Azure (azure)
  • Google Cloud (gcp)

Examples:
  costwatch collect --tenant acme            # Last 7 days
  costwatch collect --tenant acme --days 30  # Last 30 days
  costwatch health --tenant acme             # Connection + credential check
  costwatch limits --key acme                # Rate-limit quota
  costwatch config init                      # Write default settings
")]
#[command(version)]
pub struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Commands,

    /// Output format (text or json).
    #[arg(long, short = 'f', default_value = "text", global = true)]
    pub format: OutputFormat,

    /// Pretty-print JSON output.
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Settings file (defaults to the user config directory).
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output (show debug info).
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Disable colored output.
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Quiet mode (no logging).
    #[arg(long, short, global = true)]
    pub quiet: bool,
}

/// CLI commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Collect cost data for a tenant.
    Collect(collect::CollectArgs),

    /// Check connectivity and credentials of a tenant's providers.
    Health(check::TenantArgs),

    /// Validate a tenant's credentials.
    Validate(check::TenantArgs),

    /// Show rate-limit rules and quotas.
    Limits(limits::LimitsArgs),

    /// List supported providers.
    #[command(visible_alias = "p")]
    Providers,

    /// Manage configuration.
    Config(config::ConfigArgs),
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable text with colors.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

/// CLI exit codes.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    /// Success.
    Success = 0,
    /// General error.
    Error = 1,
    /// At least one provider failed.
    ProviderFailed = 2,
    /// Admission denied by the rate limiter.
    RateLimited = 3,
}

// ============================================================================
// Logging Setup
// ============================================================================

fn setup_logging(verbose: bool, quiet: bool, level: LogLevel) {
    if quiet {
        return;
    }

    let filter = if verbose {
        EnvFilter::new("costwatch=debug,info")
    } else {
        EnvFilter::new(format!("costwatch={level}"))
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .without_time()
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Settings pick the default log level, so they load before logging starts.
    let store = match commands::load_settings(&cli).await {
        Ok(store) => store,
        // Config commands still run so a broken file can be inspected or replaced.
        Err(e) if matches!(cli.command, Commands::Config(_)) => {
            if !cli.quiet {
                eprintln!("Warning: {e:#}");
            }
            commands::default_settings(&cli)
        }
        Err(e) => {
            if !cli.quiet {
                eprintln!("Error: {e:#}");
            }
            std::process::exit(ExitCode::Error as i32);
        }
    };
    setup_logging(cli.verbose, cli.quiet, store.get().await.log_level);

    let result = match &cli.command {
        Commands::Collect(args) => collect::run(args, &store, &cli).await,
        Commands::Health(args) => check::run_health(args, &store, &cli).await,
        Commands::Validate(args) => check::run_validate(args, &store, &cli).await,
        Commands::Limits(args) => limits::run(args, &store, &cli).await,
        Commands::Providers => providers::run(&cli),
        Commands::Config(args) => config::run(args, &store, &cli).await,
    };

    match result {
        Ok(ExitCode::Success) => Ok(()),
        Ok(code) => std::process::exit(code as i32),
        Err(e) => {
            if !cli.quiet {
                eprintln!("Error: {e:#}");
            }
            std::process::exit(ExitCode::Error as i32);
        }
    }
}
