//! Providers command - list supported providers.

use anyhow::Result;
use costwatch_providers::ProviderRegistry;
use tracing::info;

use crate::output::{JsonFormatter, ProviderInfoOutput, TextFormatter};
use crate::{Cli, ExitCode, OutputFormat};

/// Runs the providers command.
pub fn run(cli: &Cli) -> Result<ExitCode> {
    info!("Listing providers");

    let providers = ProviderRegistry::all();

    match cli.format {
        OutputFormat::Text => {
            let formatter = TextFormatter::new(!cli.no_color);

            println!("{}", formatter.format_providers_header());
            println!("{}", "─".repeat(70));
            for desc in providers {
                println!("{}", formatter.format_provider_line(desc));
            }
            println!();
            println!("Total: {} providers", providers.len());
        }
        OutputFormat::Json => {
            let formatter = JsonFormatter::new(cli.pretty);
            let output: Vec<ProviderInfoOutput> =
                providers.iter().map(ProviderInfoOutput::from).collect();
            println!("{}", formatter.format(&output)?);
        }
    }

    Ok(ExitCode::Success)
}
