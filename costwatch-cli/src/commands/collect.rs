//! Collect command - fetch cost data for one tenant.

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::Args;
use costwatch_core::{
    CollectionResult, CollectionStatus, DateRange, ErrorKind, UnifiedCostRecord,
};
use costwatch_store::{CollectionSettings, SettingsStore};
use tracing::{info, warn};

use super::{open_context, require_tenant};
use crate::output::{CollectOutput, JsonFormatter, TextFormatter};
use crate::{Cli, ExitCode, OutputFormat};

/// Arguments for the collect command.
#[derive(Args, Debug, Default)]
pub struct CollectArgs {
    /// Tenant to collect for.
    #[arg(long, short)]
    pub tenant: String,

    /// First day to collect (YYYY-MM-DD).
    #[arg(long, conflicts_with = "days")]
    pub start: Option<NaiveDate>,

    /// Last day to collect (YYYY-MM-DD); today when omitted.
    #[arg(long, requires = "start", conflicts_with = "days")]
    pub end: Option<NaiveDate>,

    /// Collect the last N days, ending today.
    #[arg(long, short)]
    pub days: Option<u32>,

    /// Days per batch; ranges longer than this are collected incrementally.
    #[arg(long)]
    pub batch_days: Option<u32>,

    /// Also print normalized cross-provider records.
    #[arg(long)]
    pub unified: bool,
}

/// Runs the collect command.
pub async fn run(args: &CollectArgs, store: &SettingsStore, cli: &Cli) -> Result<ExitCode> {
    let settings = store.get().await;
    require_tenant(&settings, &args.tenant)?;

    let range = resolve_range(args, &settings.collection, Local::now().date_naive())?;
    let batch_days = resolve_batch(args, &settings.collection, &range);
    info!(tenant = %args.tenant, range = %range, ?batch_days, "Running collect");

    let ctx = open_context(settings).await?;
    if ctx.manager().adapters_for_tenant(&args.tenant).is_empty() {
        warn!(tenant = %args.tenant, "Tenant has no usable credentials");
    }

    let results = ctx.collect(&args.tenant, &range, batch_days).await;

    let unified = if args.unified {
        normalize(&ctx, &args.tenant, &results)
    } else {
        Vec::new()
    };

    let output = CollectOutput {
        tenant: args.tenant.clone(),
        range,
        results,
        unified,
    };

    match cli.format {
        OutputFormat::Text => {
            let formatter = TextFormatter::new(!cli.no_color);
            println!("{}", formatter.format_collection(&output));
        }
        OutputFormat::Json => {
            let formatter = JsonFormatter::new(cli.pretty);
            println!("{}", formatter.format(&output)?);
        }
    }

    ctx.shutdown().await;
    Ok(exit_code(&output.results))
}

/// Resolves the collection range from flags and settings.
///
/// `--start` without `--end` runs through `today`. Without `--start` the last
/// `--days` (or the configured default) days ending `today` are used.
pub fn resolve_range(
    args: &CollectArgs,
    collection: &CollectionSettings,
    today: NaiveDate,
) -> Result<DateRange> {
    if let Some(start) = args.start {
        let end = args.end.unwrap_or(today);
        return DateRange::new(start, end).context("invalid --start/--end");
    }

    let days = args.days.unwrap_or(collection.default_days);
    if days == 0 {
        anyhow::bail!("--days must be at least 1");
    }
    let start = today
        .checked_sub_days(chrono::Days::new(u64::from(days - 1)))
        .context("--days reaches before the calendar start")?;
    Ok(DateRange::new(start, today)?)
}

/// Batch size to use, or `None` when the range fits in one call.
pub fn resolve_batch(
    args: &CollectArgs,
    collection: &CollectionSettings,
    range: &DateRange,
) -> Option<u32> {
    let batch = args.batch_days.unwrap_or(collection.batch_days).max(1);
    (range.days() > batch).then_some(batch)
}

fn normalize(
    ctx: &costwatch_store::ServiceContext,
    tenant: &str,
    results: &[CollectionResult],
) -> Vec<UnifiedCostRecord> {
    results
        .iter()
        .filter_map(|result| {
            let data = result.cost_data.as_ref()?;
            let adapter = ctx.manager().get_adapter(tenant, result.provider)?;
            Some(adapter.normalize_cost_data(data, tenant))
        })
        .collect()
}

/// Exit code summarizing a collection run.
///
/// A result counts as rate limited when the local limiter denied it or the
/// provider's own limit ended it.
pub fn exit_code(results: &[CollectionResult]) -> ExitCode {
    let rate_limited = |r: &CollectionResult| {
        r.status == CollectionStatus::RateLimited
            || r.error_kind == Some(ErrorKind::RateLimitError)
    };
    if results.iter().any(rate_limited) {
        ExitCode::RateLimited
    } else if results.iter().all(CollectionResult::is_success) {
        ExitCode::Success
    } else {
        ExitCode::ProviderFailed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use costwatch_core::{ProviderCostData, ProviderKind};

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn args() -> CollectArgs {
        CollectArgs {
            tenant: "acme".into(),
            ..CollectArgs::default()
        }
    }

    #[test]
    fn test_default_range_uses_configured_days() {
        let range = resolve_range(&args(), &CollectionSettings::default(), day(2024, 3, 10)).unwrap();
        assert_eq!(range.start(), day(2024, 3, 4));
        assert_eq!(range.end(), day(2024, 3, 10));
        assert_eq!(range.days(), 7);
    }

    #[test]
    fn test_days_flag() {
        let args = CollectArgs {
            days: Some(1),
            ..args()
        };
        let range = resolve_range(&args, &CollectionSettings::default(), day(2024, 3, 10)).unwrap();
        assert_eq!(range, DateRange::single_day(day(2024, 3, 10)));

        let args = CollectArgs {
            days: Some(0),
            ..args
        };
        assert!(resolve_range(&args, &CollectionSettings::default(), day(2024, 3, 10)).is_err());
    }

    #[test]
    fn test_start_without_end_runs_to_today() {
        let args = CollectArgs {
            start: Some(day(2024, 2, 28)),
            ..args()
        };
        let range = resolve_range(&args, &CollectionSettings::default(), day(2024, 3, 1)).unwrap();
        assert_eq!(range.days(), 3);
    }

    #[test]
    fn test_reversed_range_is_rejected() {
        let args = CollectArgs {
            start: Some(day(2024, 3, 5)),
            end: Some(day(2024, 3, 1)),
            ..args()
        };
        assert!(resolve_range(&args, &CollectionSettings::default(), day(2024, 3, 10)).is_err());
    }

    #[test]
    fn test_batch_only_when_range_exceeds_it() {
        let settings = CollectionSettings::default();
        let week = DateRange::new(day(2024, 3, 1), day(2024, 3, 7)).unwrap();
        let month = DateRange::new(day(2024, 3, 1), day(2024, 3, 31)).unwrap();

        assert_eq!(resolve_batch(&args(), &settings, &week), None);
        assert_eq!(resolve_batch(&args(), &settings, &month), Some(7));

        let args = CollectArgs {
            batch_days: Some(0),
            ..args()
        };
        assert_eq!(resolve_batch(&args, &settings, &week), Some(1));
    }

    #[test]
    fn test_exit_codes() {
        let data = ProviderCostData::new(ProviderKind::Aws, day(2024, 3, 1));
        let ok = CollectionResult::success(ProviderKind::Aws, data);
        let failed = CollectionResult::failed(ProviderKind::Gcp, "boom");
        let limited = CollectionResult::failed(ProviderKind::Gcp, "slow")
            .with_status(CollectionStatus::RateLimited);

        assert_eq!(exit_code(&[ok.clone()]), ExitCode::Success);
        assert_eq!(exit_code(&[]), ExitCode::Success);
        assert_eq!(exit_code(&[ok.clone(), failed]), ExitCode::ProviderFailed);
        assert_eq!(exit_code(&[ok.clone(), limited]), ExitCode::RateLimited);

        let throttled = CollectionResult::failed(ProviderKind::Azure, "429")
            .with_error_kind(ErrorKind::RateLimitError);
        assert_eq!(exit_code(&[ok, throttled]), ExitCode::RateLimited);
    }
}
