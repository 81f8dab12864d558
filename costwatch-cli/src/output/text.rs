//! Text output formatting with quota bars and colors.

use chrono::{DateTime, Duration, Utc};
use costwatch_core::{
    CollectionResult, CollectionStatus, CredentialValidation, HealthReport, HealthStatus,
    UnifiedCostRecord,
};
use costwatch_providers::{ProviderDescriptor, ProviderRegistry};
use std::collections::BTreeMap;

use super::json::{CollectOutput, ConfigView, LimitEntry};

// ============================================================================
// ANSI Colors
// ============================================================================

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const RED: &str = "\x1b[31m";
const CYAN: &str = "\x1b[36m";

// Progress bar characters
const BAR_FULL: char = '█';
const BAR_EMPTY: char = '░';

/// Services listed per unified record.
const TOP_SERVICES: usize = 3;

/// Text formatter with optional colors.
pub struct TextFormatter {
    use_colors: bool,
    bar_width: usize,
}

impl TextFormatter {
    /// Creates a new text formatter.
    pub fn new(use_colors: bool) -> Self {
        Self {
            use_colors,
            bar_width: 10,
        }
    }

    /// Set the progress bar width.
    #[allow(dead_code)]
    pub fn with_bar_width(mut self, width: usize) -> Self {
        self.bar_width = width;
        self
    }

    // ========================================================================
    // Collection
    // ========================================================================

    /// Formats a collect run: one block per provider, then totals.
    pub fn format_collection(&self, output: &CollectOutput) -> String {
        let mut lines = Vec::new();

        lines.push(format!(
            "{} {}",
            self.bold(&output.tenant),
            self.dim(&output.range.to_string())
        ));
        lines.push("─".repeat(50));

        if output.results.is_empty() {
            lines.push(self.dim("No providers configured for this tenant"));
            return lines.join("\n");
        }

        for result in &output.results {
            lines.push(self.format_result(result));
        }

        let totals = totals_by_currency(&output.results);
        if !totals.is_empty() {
            lines.push(String::new());
            let totals: Vec<String> = totals
                .iter()
                .map(|(currency, amount)| self.format_cost(*amount, currency))
                .collect();
            lines.push(format!("Total: {}", self.bold(&totals.join(" + "))));
        }

        for record in &output.unified {
            lines.push(String::new());
            lines.push(self.format_unified(record));
        }

        lines.join("\n")
    }

    /// Formats one provider's result.
    pub fn format_result(&self, result: &CollectionResult) -> String {
        let name = provider_name(result);
        let status = self.format_status(result.status);

        let mut line = match &result.cost_data {
            Some(data) => format!(
                "{:<14} {} {} {}",
                name,
                status,
                self.format_cost(data.total_cost, &data.currency),
                self.dim(&format!(
                    "({} records, {} calls, {} ms)",
                    result.records_collected, result.api_calls_made, result.duration_ms
                )),
            ),
            None => format!("{name:<14} {status}"),
        };

        if let Some(error) = &result.error_message {
            let error = match result.error_kind {
                Some(kind) => format!("{}: {error}", kind.code()),
                None => error.clone(),
            };
            line.push_str(&format!("\n  {}", self.red(&error)));
        }
        for warning in &result.warnings {
            line.push_str(&format!("\n  {}", self.dim(&format!("! {warning}"))));
        }
        line
    }

    fn format_unified(&self, record: &UnifiedCostRecord) -> String {
        let mut lines = vec![format!(
            "{} {} {}",
            self.bold(record.provider.display_name()),
            self.dim(&record.date.to_string()),
            self.format_cost(record.total_cost, &record.currency)
        )];

        for (service, cost) in record.top_services(TOP_SERVICES) {
            let category = record
                .services
                .get(service)
                .map_or("Other", |s| s.category.display_name());
            lines.push(format!(
                "  {:<40} {:<18} {}",
                service,
                self.dim(category),
                self.format_cost(cost, &record.currency)
            ));
        }
        for warning in &record.warnings {
            lines.push(format!("  {}", self.dim(&format!("! {warning}"))));
        }
        lines.join("\n")
    }

    /// Formats a collection status with a color for its severity.
    pub fn format_status(&self, status: CollectionStatus) -> String {
        let text = format!("{:<16}", status.display_name());
        match status {
            CollectionStatus::Success => self.green(&text),
            CollectionStatus::PartialSuccess
            | CollectionStatus::InProgress
            | CollectionStatus::RateLimited => self.yellow(&text),
            CollectionStatus::Failed
            | CollectionStatus::AuthenticationError
            | CollectionStatus::PermissionError => self.red(&text),
        }
    }

    /// Formats an amount, with a `$` prefix for USD.
    pub fn format_cost(&self, amount: f64, currency: &str) -> String {
        if currency.eq_ignore_ascii_case("USD") {
            format!("${amount:.2}")
        } else {
            format!("{amount:.2} {currency}")
        }
    }

    // ========================================================================
    // Health and credentials
    // ========================================================================

    /// Formats health reports, one line per provider.
    pub fn format_health(&self, reports: &[HealthReport]) -> String {
        if reports.is_empty() {
            return self.dim("No providers configured for this tenant");
        }

        reports
            .iter()
            .map(|report| {
                let status = match report.status {
                    HealthStatus::Healthy => self.green("✓ healthy"),
                    HealthStatus::Unhealthy => self.yellow("✗ unhealthy"),
                    HealthStatus::Error => self.red("✗ error"),
                };
                let mut line = format!("{:<14} {}", report.provider.display_name(), status);
                if let Some(message) = &report.message {
                    line.push_str(&format!(" {}", self.dim(message)));
                }
                line
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Formats credential validations, one line per provider.
    pub fn format_validations(&self, validations: &[CredentialValidation]) -> String {
        if validations.is_empty() {
            return self.dim("No providers configured for this tenant");
        }

        validations
            .iter()
            .map(|v| {
                let name = v.provider.display_name();
                if v.is_valid {
                    let account = v.account_id.as_deref().unwrap_or("unknown account");
                    format!("{:<14} {} {}", name, self.green("✓ valid"), self.cyan(account))
                } else {
                    let reason = v.error_message.as_deref().unwrap_or("rejected");
                    format!("{:<14} {} {}", name, self.red("✗ invalid"), reason)
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    // ========================================================================
    // Rate limits
    // ========================================================================

    /// Formats the rate-limit table, with quota bars when a key is given.
    pub fn format_limits(&self, key: Option<&str>, entries: &[LimitEntry]) -> String {
        let mut lines = Vec::new();

        match key {
            Some(key) => lines.push(format!("Rate limits for {}", self.bold(key))),
            None => lines.push(self.bold("Rate limits")),
        }
        lines.push("─".repeat(60));

        for entry in entries {
            let rule = format!(
                "{:<22} {:>5} / {:<6} {}",
                entry.class.code(),
                entry.rule.limit,
                format_window(entry.rule.window_secs),
                self.dim(&entry.rule.algorithm.to_string())
            );
            lines.push(rule);

            if let Some(status) = &entry.status {
                let percent = if status.limit == 0 {
                    0.0
                } else {
                    f64::from(status.remaining) / f64::from(status.limit) * 100.0
                };
                let mut line = format!(
                    "  {} {} left",
                    self.progress_bar(percent),
                    self.color_for_percent(percent, &status.remaining.to_string())
                );
                if status.remaining < status.limit {
                    line.push_str(&format!(
                        ", full {}",
                        self.dim(&self.format_reset_time(status.reset_time, Utc::now()))
                    ));
                }
                lines.push(line);
            }
        }

        lines.join("\n")
    }

    /// Formats a progress bar.
    pub fn progress_bar(&self, percent_remaining: f64) -> String {
        let fraction = (percent_remaining / 100.0).clamp(0.0, 1.0);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
        let filled = (fraction * self.bar_width as f64).round() as usize;
        let empty = self.bar_width.saturating_sub(filled);

        let bar = format!(
            "{}{}",
            BAR_FULL.to_string().repeat(filled),
            BAR_EMPTY.to_string().repeat(empty)
        );

        self.color_for_percent(percent_remaining, &bar)
    }

    /// Formats a reset instant relative to `now`.
    pub fn format_reset_time(&self, resets_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
        if resets_at <= now {
            return "now".to_string();
        }

        let diff = resets_at - now;
        if diff < Duration::minutes(1) {
            let secs = diff.num_seconds().max(1);
            format!("in {secs}s")
        } else if diff < Duration::hours(1) {
            let mins = diff.num_minutes();
            format!("in {} minute{}", mins, if mins == 1 { "" } else { "s" })
        } else {
            let hours = diff.num_hours();
            let mins = diff.num_minutes() % 60;
            if mins > 0 {
                format!("in {hours}h {mins}m")
            } else {
                format!("in {} hour{}", hours, if hours == 1 { "" } else { "s" })
            }
        }
    }

    // ========================================================================
    // Providers and configuration
    // ========================================================================

    /// Formats provider list header.
    pub fn format_providers_header(&self) -> String {
        format!(
            "{:<15} {:<8} {:<18} {:<9} {}",
            self.bold("Provider"),
            self.bold("CLI"),
            self.bold("Aliases"),
            self.bold("Services"),
            self.bold("Console")
        )
    }

    /// Formats a single provider line.
    pub fn format_provider_line(&self, desc: &ProviderDescriptor) -> String {
        let aliases = if desc.cli.aliases.is_empty() {
            "−".to_string()
        } else {
            desc.cli.aliases.join(", ")
        };

        format!(
            "{:<15} {:<8} {:<18} {:<9} {}",
            desc.display_name(),
            desc.cli_name(),
            aliases,
            desc.services.len(),
            desc.metadata.console_url.unwrap_or("−")
        )
    }

    /// Formats the configuration summary.
    pub fn format_config(&self, view: &ConfigView) -> String {
        let mut lines = vec![self.bold("costwatch Configuration"), "─".repeat(40), String::new()];

        lines.push(format!("Log level:        {}", view.log_level));
        lines.push(format!("Max attempts:     {}", view.retry.max_attempts));
        lines.push(format!("Batch days:       {}", view.collection.batch_days));
        lines.push(format!("Default days:     {}", view.collection.default_days));
        lines.push(format!("HTTP timeout:     {}s", view.collection.http_timeout_secs));
        lines.push(format!(
            "Escalation:       >{} errors in {}",
            view.error_handling.escalation_threshold,
            format_window(view.error_handling.escalation_window_secs)
        ));

        lines.push(String::new());
        lines.push("Tenants:".to_string());
        if view.tenants.is_empty() {
            lines.push(format!("  {}", self.dim("none")));
        }
        for tenant in &view.tenants {
            let state = if tenant.enabled {
                self.green("enabled")
            } else {
                self.dim("disabled")
            };
            lines.push(format!("  • {} ({}) {}", self.bold(&tenant.id), state, tenant.gateway_url));
            for cred in &tenant.credentials {
                let mut line = format!("      {:<14} {}", cred.provider.display_name(), cred.principal);
                if !cred.is_active {
                    line.push_str(&format!(" {}", self.dim("(inactive)")));
                }
                if let Some(expires_at) = cred.expires_at {
                    line.push_str(&format!(" {}", self.dim(&format!("expires {}", expires_at.format("%Y-%m-%d")))));
                }
                lines.push(line);
            }
        }

        lines.join("\n")
    }

    // ========================================================================
    // Color/style helpers
    // ========================================================================

    fn color_for_percent(&self, percent: f64, text: &str) -> String {
        if !self.use_colors {
            return text.to_string();
        }

        if percent < 20.0 {
            self.red(text)
        } else if percent < 50.0 {
            self.yellow(text)
        } else {
            self.green(text)
        }
    }

    fn paint(&self, color: &str, text: &str) -> String {
        if self.use_colors {
            format!("{color}{text}{RESET}")
        } else {
            text.to_string()
        }
    }

    fn bold(&self, text: &str) -> String {
        self.paint(BOLD, text)
    }

    fn dim(&self, text: &str) -> String {
        self.paint(DIM, text)
    }

    fn green(&self, text: &str) -> String {
        self.paint(GREEN, text)
    }

    fn yellow(&self, text: &str) -> String {
        self.paint(YELLOW, text)
    }

    fn red(&self, text: &str) -> String {
        self.paint(RED, text)
    }

    fn cyan(&self, text: &str) -> String {
        self.paint(CYAN, text)
    }
}

fn provider_name(result: &CollectionResult) -> &'static str {
    ProviderRegistry::get(result.provider)
        .map_or_else(|| result.provider.display_name(), |d| d.metadata.display_name)
}

/// Sums collected costs per currency, in currency order.
pub fn totals_by_currency(results: &[CollectionResult]) -> BTreeMap<String, f64> {
    let mut totals = BTreeMap::new();
    for data in results.iter().filter_map(|r| r.cost_data.as_ref()) {
        *totals.entry(data.currency.clone()).or_insert(0.0) += data.total_cost;
    }
    totals
}

/// Formats a window length compactly (`90s`, `5m`, `1h`, `1d`).
pub fn format_window(secs: u64) -> String {
    match secs {
        s if s >= 86_400 && s % 86_400 == 0 => format!("{}d", s / 86_400),
        s if s >= 3600 && s % 3600 == 0 => format!("{}h", s / 3600),
        s if s >= 60 && s % 60 == 0 => format!("{}m", s / 60),
        s => format!("{s}s"),
    }
}

// ============================================================================
// Tests
// ============================================================================
