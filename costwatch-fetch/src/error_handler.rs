//! Error classification and recovery decisions.
//!
//! The [`ErrorHandler`] maps a provider failure onto the closed [`ErrorKind`]
//! taxonomy, looks up the [`RecoveryStrategy`] for that kind, and returns an
//! [`ErrorHandlingResult`] telling the caller whether to retry and after how
//! long. It keeps a rolling per-`(provider, tenant, code)` history so that a
//! key failing too often inside the escalation window is skipped instead of
//! retried.
//!
//! Classification prefers typed [`CollectionError`] values anywhere in the
//! error's source chain and falls back to keyword matching on the message.

use chrono::{DateTime, TimeDelta, Utc};
use costwatch_core::{CollectionError, ErrorKind};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt;
use std::sync::{Mutex, MutexGuard};
use tracing::{error, info, warn};

/// Span of `ErrorStatistics::errors_last_hour`, independent of the escalation window.
const SECS_PER_HOUR: u64 = 3600;

// ============================================================================
// Recovery Action
// ============================================================================

/// What to do about a classified failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecoveryAction {
    /// Retry after an exponentially growing delay.
    RetryWithBackoff,
    /// Retry after a fixed (or provider-hinted) delay.
    RetryAfterDelay,
    /// Refresh credentials, then retry immediately.
    RefreshCredentials,
    /// Retry immediately with a smaller request.
    ReduceRequestSize,
    /// Give up on this provider for now.
    SkipProvider,
    /// Give up on this operation.
    FailOperation,
}

impl RecoveryAction {
    /// Stable string code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::RetryWithBackoff => "RETRY_WITH_BACKOFF",
            Self::RetryAfterDelay => "RETRY_AFTER_DELAY",
            Self::RefreshCredentials => "REFRESH_CREDENTIALS",
            Self::ReduceRequestSize => "REDUCE_REQUEST_SIZE",
            Self::SkipProvider => "SKIP_PROVIDER",
            Self::FailOperation => "FAIL_OPERATION",
        }
    }

    /// Returns true for actions that never retry.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::SkipProvider | Self::FailOperation)
    }
}

impl fmt::Display for RecoveryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

// ============================================================================
// Recovery Strategy
// ============================================================================

/// Policy attached to one error kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryStrategy {
    /// Action to take.
    pub action: RecoveryAction,
    /// Base delay in seconds, for delayed actions.
    #[serde(default)]
    pub delay_seconds: Option<f64>,
    /// Attempt ceiling for this kind.
    pub max_attempts: u32,
    /// Backoff multiplier for `RetryWithBackoff`.
    #[serde(default = "default_multiplier")]
    pub backoff_multiplier: f64,
    /// Whether backoff delays are jittered.
    #[serde(default)]
    pub jitter: bool,
    /// Free-form notes on when the strategy applies.
    #[serde(default)]
    pub conditions: Vec<String>,
}

fn default_multiplier() -> f64 {
    1.0
}

impl RecoveryStrategy {
    fn new(action: RecoveryAction, delay_seconds: Option<f64>, max_attempts: u32) -> Self {
        Self {
            action,
            delay_seconds,
            max_attempts,
            backoff_multiplier: 1.0,
            jitter: false,
            conditions: Vec::new(),
        }
    }

    fn backoff(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self.jitter = true;
        self
    }

    fn when(mut self, condition: &str) -> Self {
        self.conditions.push(condition.to_string());
        self
    }

    /// Default strategy for an error kind.
    pub fn default_for(kind: ErrorKind) -> Self {
        use RecoveryAction as A;
        match kind {
            ErrorKind::AuthenticationError => {
                Self::new(A::RefreshCredentials, None, 2).when("credentials rejected or expired")
            }
            ErrorKind::AuthorizationError => {
                Self::new(A::FailOperation, None, 1).when("caller lacks permission")
            }
            ErrorKind::RateLimitError => Self {
                backoff_multiplier: 1.5,
                ..Self::new(A::RetryAfterDelay, Some(60.0), 5).when("provider throttling")
            },
            ErrorKind::ServiceUnavailable => Self::new(A::RetryWithBackoff, Some(30.0), 3)
                .backoff(2.0)
                .when("5xx, timeout, or connection failure"),
            ErrorKind::DataFormatError => {
                Self::new(A::FailOperation, None, 1).when("response could not be decoded")
            }
            ErrorKind::QuotaExceeded => {
                Self::new(A::ReduceRequestSize, None, 2).when("account quota exhausted")
            }
            ErrorKind::UnknownError => Self::new(A::RetryWithBackoff, Some(30.0), 2).backoff(2.0),
        }
    }

    /// Strategy used once a key has escalated.
    pub fn skip_provider() -> Self {
        Self::new(RecoveryAction::SkipProvider, None, 1).when("error rate above threshold")
    }
}

// ============================================================================
// Severity
// ============================================================================

/// How bad a failure is, for logging and alerting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Expected noise.
    Low,
    /// Transient provider trouble.
    Medium,
    /// Needs attention.
    High,
    /// Needs immediate attention.
    Critical,
}

impl Severity {
    /// Severity for a kind at a given attempt number.
    pub fn for_kind(kind: ErrorKind, attempt: u32) -> Self {
        match kind {
            ErrorKind::AuthenticationError | ErrorKind::AuthorizationError => Self::Critical,
            ErrorKind::QuotaExceeded => Self::High,
            ErrorKind::RateLimitError | ErrorKind::ServiceUnavailable => Self::Medium,
            ErrorKind::DataFormatError | ErrorKind::UnknownError => {
                if attempt > 3 {
                    Self::High
                } else {
                    Self::Low
                }
            }
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => f.write_str("low"),
            Self::Medium => f.write_str("medium"),
            Self::High => f.write_str("high"),
            Self::Critical => f.write_str("critical"),
        }
    }
}

// ============================================================================
// Context & Result
// ============================================================================

/// Where a failure happened.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorContext {
    /// Operation name (e.g. `collect_cost_data`).
    pub operation: String,
    /// Provider name.
    pub provider: String,
    /// Tenant id.
    pub client_id: String,
    /// 1-based attempt number.
    pub attempt_number: u32,
    /// Attempt ceiling of the caller.
    pub max_attempts: u32,
    /// When the first attempt started.
    pub start_time: DateTime<Utc>,
}

impl ErrorContext {
    /// Creates a context for the first attempt, starting now.
    pub fn new(
        operation: impl Into<String>,
        provider: impl Into<String>,
        client_id: impl Into<String>,
    ) -> Self {
        Self {
            operation: operation.into(),
            provider: provider.into(),
            client_id: client_id.into(),
            attempt_number: 1,
            max_attempts: 1,
            start_time: Utc::now(),
        }
    }

    /// Sets the attempt number and ceiling.
    pub fn with_attempt(mut self, attempt_number: u32, max_attempts: u32) -> Self {
        self.attempt_number = attempt_number;
        self.max_attempts = max_attempts;
        self
    }

    /// Sets the start time.
    pub fn with_start_time(mut self, start_time: DateTime<Utc>) -> Self {
        self.start_time = start_time;
        self
    }
}

/// Decision returned by [`ErrorHandler::handle_error`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorHandlingResult {
    /// Classified kind.
    pub error_kind: ErrorKind,
    /// Action chosen.
    pub action_taken: RecoveryAction,
    /// Whether the caller should try again.
    pub should_retry: bool,
    /// Seconds to wait before retrying (0 when not retrying).
    pub delay_seconds: f64,
    /// Severity.
    pub severity: Severity,
    /// Whether adaptive escalation overrode the default action.
    pub escalated: bool,
    /// Human-readable summary.
    pub message: String,
}

// ============================================================================
// Configuration
// ============================================================================

/// Tunables for the error handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorHandlerConfig {
    /// Stop retrying once this many seconds have passed since the first attempt.
    pub max_retry_duration_secs: u64,
    /// How long failures are kept in history.
    pub history_window_secs: u64,
    /// Window in which failures count towards escalation.
    pub escalation_window_secs: u64,
    /// Escalate once more than this many failures fall in the window.
    pub escalation_threshold: usize,
    /// Upper bound on any computed delay.
    pub max_delay_secs: f64,
    /// Global jitter switch.
    pub jitter: bool,
}

impl Default for ErrorHandlerConfig {
    fn default() -> Self {
        Self {
            max_retry_duration_secs: 3600,
            history_window_secs: 24 * 3600,
            escalation_window_secs: 3600,
            escalation_threshold: 5,
            max_delay_secs: 300.0,
            jitter: true,
        }
    }
}

impl ErrorHandlerConfig {
    /// Checks for values the handler cannot work with.
    ///
    /// # Errors
    ///
    /// Returns a message naming the first offending field.
    pub fn validate(&self) -> Result<(), String> {
        if !self.max_delay_secs.is_finite() || self.max_delay_secs < 0.0 {
            return Err(format!(
                "max_delay_secs must be a non-negative number, got {}",
                self.max_delay_secs
            ));
        }
        if self.history_window_secs == 0 {
            return Err("history_window_secs must be at least 1".to_string());
        }
        if self.escalation_window_secs == 0 {
            return Err("escalation_window_secs must be at least 1".to_string());
        }
        if self.escalation_window_secs > self.history_window_secs {
            return Err("escalation_window_secs must not exceed history_window_secs".to_string());
        }
        Ok(())
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// Snapshot of the error history.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ErrorStatistics {
    /// Errors inside the history window.
    pub total_errors: usize,
    /// Errors per provider.
    pub errors_by_provider: HashMap<String, usize>,
    /// Errors per kind code.
    pub errors_by_code: HashMap<String, usize>,
    /// Errors in the trailing hour.
    pub errors_last_hour: usize,
    /// Average errors per hour over the history window.
    pub error_rate_per_hour: f64,
    /// Most frequent codes, at most five.
    pub top_error_codes: Vec<(String, usize)>,
}

// ============================================================================
// Classification
// ============================================================================

const KEYWORDS: &[(&[&str], ErrorKind)] = &[
    (&["auth", "credential", "token"], ErrorKind::AuthenticationError),
    (&["permission", "forbidden"], ErrorKind::AuthorizationError),
    (&["rate", "throttle", "limit"], ErrorKind::RateLimitError),
    (
        &["unavailable", "timeout", "connection"],
        ErrorKind::ServiceUnavailable,
    ),
    (&["format", "parse", "json", "xml"], ErrorKind::DataFormatError),
    (&["quota", "exceeded"], ErrorKind::QuotaExceeded),
];

/// Classifies a message by keyword, first match wins.
pub fn classify_message(message: &str) -> ErrorKind {
    let lower = message.to_lowercase();
    KEYWORDS
        .iter()
        .find(|(words, _)| words.iter().any(|w| lower.contains(w)))
        .map_or(ErrorKind::UnknownError, |(_, kind)| *kind)
}

/// Finds a typed [`CollectionError`] in the source chain.
pub fn find_collection_error<'a>(
    error: &'a (dyn StdError + 'static),
) -> Option<&'a CollectionError> {
    let mut current = Some(error);
    while let Some(err) = current {
        if let Some(typed) = err.downcast_ref::<CollectionError>() {
            return Some(typed);
        }
        current = err.source();
    }
    None
}

/// Classifies an error, preferring typed values over keywords.
pub fn classify_error(error: &(dyn StdError + 'static)) -> ErrorKind {
    find_collection_error(error)
        .map_or_else(|| classify_message(&error.to_string()), CollectionError::kind)
}

// ============================================================================
// Error Handler
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct HistoryKey {
    provider: String,
    client_id: String,
    kind: ErrorKind,
}

type History = HashMap<HistoryKey, Vec<DateTime<Utc>>>;

/// Classifies failures and decides how to recover.
#[derive(Debug)]
pub struct ErrorHandler {
    config: ErrorHandlerConfig,
    strategies: HashMap<ErrorKind, RecoveryStrategy>,
    history: Mutex<History>,
}

impl ErrorHandler {
    /// Creates a handler with default configuration.
    pub fn new() -> Self {
        Self::with_config(ErrorHandlerConfig::default())
    }

    /// Creates a handler with the given configuration.
    pub fn with_config(config: ErrorHandlerConfig) -> Self {
        let strategies = ErrorKind::all()
            .iter()
            .map(|kind| (*kind, RecoveryStrategy::default_for(*kind)))
            .collect();
        Self {
            config,
            strategies,
            history: Mutex::new(HashMap::new()),
        }
    }

    /// Overrides the strategy for one kind.
    pub fn with_strategy(mut self, kind: ErrorKind, strategy: RecoveryStrategy) -> Self {
        self.strategies.insert(kind, strategy);
        self
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ErrorHandlerConfig {
        &self.config
    }

    /// Returns the strategy configured for `kind`.
    pub fn strategy_for(&self, kind: ErrorKind) -> RecoveryStrategy {
        self.strategies
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| RecoveryStrategy::default_for(kind))
    }

    /// Classifies an error, preferring typed values over keywords.
    pub fn classify(&self, error: &(dyn StdError + 'static)) -> ErrorKind {
        classify_error(error)
    }

    /// Decides how to recover from `error`.
    pub fn handle_error(
        &self,
        error: &(dyn StdError + 'static),
        context: &ErrorContext,
    ) -> ErrorHandlingResult {
        self.handle_error_at(error, context, Utc::now())
    }

    /// Decides how to recover from `error` as of `now`.
    pub fn handle_error_at(
        &self,
        error: &(dyn StdError + 'static),
        context: &ErrorContext,
        now: DateTime<Utc>,
    ) -> ErrorHandlingResult {
        let typed = find_collection_error(error);
        let kind = typed.map_or_else(|| classify_message(&error.to_string()), CollectionError::kind);
        let retry_after = typed.and_then(CollectionError::retry_after);

        let recent = self.record(context, kind, now);
        let escalated = recent > self.config.escalation_threshold;
        let strategy = if escalated {
            RecoveryStrategy::skip_provider()
        } else {
            self.strategy_for(kind)
        };

        let elapsed = now.signed_duration_since(context.start_time);
        let out_of_time = elapsed > seconds(self.config.max_retry_duration_secs);
        let should_retry = context.attempt_number < strategy.max_attempts
            && !strategy.action.is_terminal()
            && !out_of_time;

        let delay_seconds = if should_retry {
            self.calculate_delay(&strategy, context.attempt_number, retry_after)
        } else {
            0.0
        };
        let severity = Severity::for_kind(kind, context.attempt_number);

        let mut message = format!(
            "{kind} in {} for {}/{} (attempt {}/{}): {error}; action {}",
            context.operation,
            context.provider,
            context.client_id,
            context.attempt_number,
            context.max_attempts,
            strategy.action,
        );
        if escalated {
            message.push_str(&format!(
                "; {recent} failures within {}s",
                self.config.escalation_window_secs
            ));
        }
        if should_retry {
            message.push_str(&format!("; retrying in {delay_seconds:.1}s"));
        }

        match severity {
            Severity::Critical => error!(
                provider = %context.provider,
                client_id = %context.client_id,
                code = kind.code(),
                action = strategy.action.code(),
                "{message}"
            ),
            Severity::High | Severity::Medium => warn!(
                provider = %context.provider,
                client_id = %context.client_id,
                code = kind.code(),
                action = strategy.action.code(),
                "{message}"
            ),
            Severity::Low => info!(
                provider = %context.provider,
                client_id = %context.client_id,
                code = kind.code(),
                action = strategy.action.code(),
                "{message}"
            ),
        }

        ErrorHandlingResult {
            error_kind: kind,
            action_taken: strategy.action,
            should_retry,
            delay_seconds,
            severity,
            escalated,
            message,
        }
    }

    /// Delay before the next attempt, capped at `max_delay_secs`.
    #[allow(clippy::cast_precision_loss)]
    pub fn calculate_delay(
        &self,
        strategy: &RecoveryStrategy,
        attempt: u32,
        retry_after: Option<u64>,
    ) -> f64 {
        let base = strategy.delay_seconds.unwrap_or(0.0);
        let delay = match strategy.action {
            RecoveryAction::RetryWithBackoff => {
                let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
                let mut delay = base * strategy.backoff_multiplier.powi(exponent);
                if strategy.jitter && self.config.jitter {
                    delay *= rand::thread_rng().gen_range(0.5..=1.0);
                }
                delay
            }
            RecoveryAction::RetryAfterDelay => retry_after.map_or(base, |secs| secs as f64),
            _ => base,
        };
        if delay.is_nan() {
            return 0.0;
        }
        // f64::max drops a NaN operand, so the cap is never negative or NaN.
        let cap = self.config.max_delay_secs.max(0.0);
        delay.max(0.0).min(cap)
    }

    // ========================================================================
    // History
    // ========================================================================

    fn lock_history(&self) -> MutexGuard<'_, History> {
        self.history.lock().unwrap_or_else(|poisoned| {
            warn!("Error history lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn prune(&self, history: &mut History, now: DateTime<Utc>) {
        let cutoff = cutoff(now, self.config.history_window_secs);
        history.retain(|_, stamps| {
            stamps.retain(|t| *t > cutoff);
            !stamps.is_empty()
        });
    }

    /// Records one failure and returns how many fall inside the escalation window.
    fn record(&self, context: &ErrorContext, kind: ErrorKind, now: DateTime<Utc>) -> usize {
        let mut history = self.lock_history();
        self.prune(&mut history, now);

        let stamps = history
            .entry(HistoryKey {
                provider: context.provider.clone(),
                client_id: context.client_id.clone(),
                kind,
            })
            .or_default();
        stamps.push(now);

        let since = cutoff(now, self.config.escalation_window_secs);
        stamps.iter().filter(|t| **t > since).count()
    }

    /// Number of recorded failures for a key inside the history window.
    pub fn history_count(&self, provider: &str, client_id: &str, kind: ErrorKind) -> usize {
        let mut history = self.lock_history();
        self.prune(&mut history, Utc::now());
        history
            .get(&HistoryKey {
                provider: provider.to_string(),
                client_id: client_id.to_string(),
                kind,
            })
            .map_or(0, Vec::len)
    }

    /// Statistics over the current history.
    pub fn statistics(&self) -> ErrorStatistics {
        self.statistics_at(Utc::now())
    }

    /// Statistics over the history as of `now`.
    #[allow(clippy::cast_precision_loss)]
    pub fn statistics_at(&self, now: DateTime<Utc>) -> ErrorStatistics {
        let mut history = self.lock_history();
        self.prune(&mut history, now);

        let last_hour = cutoff(now, SECS_PER_HOUR);
        let mut stats = ErrorStatistics::default();
        for (key, stamps) in history.iter() {
            stats.total_errors += stamps.len();
            *stats
                .errors_by_provider
                .entry(key.provider.clone())
                .or_insert(0) += stamps.len();
            *stats
                .errors_by_code
                .entry(key.kind.code().to_string())
                .or_insert(0) += stamps.len();
            stats.errors_last_hour += stamps.iter().filter(|t| **t > last_hour).count();
        }
        drop(history);

        let window_hours =
            (self.config.history_window_secs as f64 / SECS_PER_HOUR as f64).max(1.0);
        stats.error_rate_per_hour = stats.total_errors as f64 / window_hours;

        let mut codes: Vec<(String, usize)> = stats
            .errors_by_code
            .iter()
            .map(|(code, count)| (code.clone(), *count))
            .collect();
        codes.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        codes.truncate(5);
        stats.top_error_codes = codes;

        stats
    }

    /// Clears history for one provider, or all of it.
    pub fn clear_history(&self, provider: Option<&str>) {
        let mut history = self.lock_history();
        match provider {
            Some(provider) => history.retain(|key, _| key.provider != provider),
            None => history.clear(),
        }
        info!(provider = ?provider, "Error history cleared");
    }
}

impl Default for ErrorHandler {
    fn default() -> Self {
        Self::new()
    }
}

fn seconds(secs: u64) -> TimeDelta {
    i64::try_from(secs)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .unwrap_or(TimeDelta::MAX)
}

fn cutoff(now: DateTime<Utc>, window_secs: u64) -> DateTime<Utc> {
    now.checked_sub_signed(seconds(window_secs))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn ctx(attempt: u32) -> ErrorContext {
        ErrorContext::new("collect_cost_data", "aws", "tenant-1")
            .with_attempt(attempt, 5)
            .with_start_time(now())
    }

    fn rate_limited() -> CollectionError {
        CollectionError::RateLimited {
            message: "slow down".into(),
            retry_after: None,
        }
    }

    #[test]
    fn test_keyword_classification_order() {
        let cases = [
            ("Invalid auth token", ErrorKind::AuthenticationError),
            ("Permission denied for bucket", ErrorKind::AuthorizationError),
            ("403 Forbidden", ErrorKind::AuthorizationError),
            ("Request was throttled", ErrorKind::RateLimitError),
            ("Service Unavailable", ErrorKind::ServiceUnavailable),
            ("connection reset by peer", ErrorKind::ServiceUnavailable),
            ("Could not parse JSON body", ErrorKind::DataFormatError),
            ("Monthly quota reached", ErrorKind::QuotaExceeded),
            ("something odd", ErrorKind::UnknownError),
        ];
        for (msg, kind) in cases {
            assert_eq!(classify_message(msg), kind, "message {msg:?}");
        }
    }

    #[test]
    fn test_typed_error_bypasses_keywords() {
        // Message mentions "token" but the typed kind wins.
        let err = CollectionError::ServiceUnavailable("token endpoint down".into());
        assert_eq!(classify_error(&err), ErrorKind::ServiceUnavailable);
    }

    #[test]
    fn test_typed_error_found_in_source_chain() {
        let err = crate::error::FetchError::Collection(CollectionError::QuotaExceeded("x".into()));
        assert_eq!(classify_error(&err), ErrorKind::QuotaExceeded);
    }

    #[test]
    fn test_untyped_error_uses_keywords() {
        let err = std::io::Error::new(std::io::ErrorKind::Other, "operation timeout");
        assert_eq!(classify_error(&err), ErrorKind::ServiceUnavailable);
    }

    #[test]
    fn test_default_strategy_table() {
        let expect = [
            (ErrorKind::AuthenticationError, RecoveryAction::RefreshCredentials, 2),
            (ErrorKind::AuthorizationError, RecoveryAction::FailOperation, 1),
            (ErrorKind::RateLimitError, RecoveryAction::RetryAfterDelay, 5),
            (ErrorKind::ServiceUnavailable, RecoveryAction::RetryWithBackoff, 3),
            (ErrorKind::DataFormatError, RecoveryAction::FailOperation, 1),
            (ErrorKind::QuotaExceeded, RecoveryAction::ReduceRequestSize, 2),
            (ErrorKind::UnknownError, RecoveryAction::RetryWithBackoff, 2),
        ];
        for (kind, action, max) in expect {
            let strategy = RecoveryStrategy::default_for(kind);
            assert_eq!(strategy.action, action, "{kind}");
            assert_eq!(strategy.max_attempts, max, "{kind}");
        }
        assert_eq!(
            RecoveryStrategy::default_for(ErrorKind::RateLimitError).delay_seconds,
            Some(60.0)
        );
    }

    #[test]
    fn test_backoff_delay_within_jitter_bounds() {
        let handler = ErrorHandler::new();
        let strategy = RecoveryStrategy::default_for(ErrorKind::ServiceUnavailable);

        for _ in 0..200 {
            let delay = handler.calculate_delay(&strategy, 3, None);
            assert!((60.0..=120.0).contains(&delay), "delay {delay}");
        }
    }

    #[test]
    fn test_backoff_delay_never_exceeds_cap() {
        let handler = ErrorHandler::new();
        let strategy = RecoveryStrategy::default_for(ErrorKind::ServiceUnavailable);

        for attempt in [1, 2, 5, 10, 50, 1000, u32::MAX] {
            let delay = handler.calculate_delay(&strategy, attempt, None);
            assert!(delay <= 300.0, "attempt {attempt} delay {delay}");
        }
    }

    #[test]
    fn test_negative_delay_cap_does_not_panic() {
        let handler = ErrorHandler::with_config(ErrorHandlerConfig {
            max_delay_secs: -1.0,
            ..ErrorHandlerConfig::default()
        });
        let strategy = RecoveryStrategy::default_for(ErrorKind::ServiceUnavailable);

        assert_eq!(handler.calculate_delay(&strategy, 1, None), 0.0);

        let handler = ErrorHandler::with_config(ErrorHandlerConfig {
            max_delay_secs: f64::NAN,
            ..ErrorHandlerConfig::default()
        });
        assert_eq!(handler.calculate_delay(&strategy, 1, None), 0.0);
    }

    #[test]
    fn test_config_validation() {
        assert!(ErrorHandlerConfig::default().validate().is_ok());

        for broken in [
            ErrorHandlerConfig { max_delay_secs: -1.0, ..ErrorHandlerConfig::default() },
            ErrorHandlerConfig { max_delay_secs: f64::INFINITY, ..ErrorHandlerConfig::default() },
            ErrorHandlerConfig { history_window_secs: 0, ..ErrorHandlerConfig::default() },
            ErrorHandlerConfig { escalation_window_secs: 0, ..ErrorHandlerConfig::default() },
            ErrorHandlerConfig {
                escalation_window_secs: 7200,
                history_window_secs: 3600,
                ..ErrorHandlerConfig::default()
            },
        ] {
            assert!(broken.validate().is_err(), "{broken:?}");
        }
    }

    #[test]
    fn test_backoff_without_jitter_is_exact() {
        let handler = ErrorHandler::with_config(ErrorHandlerConfig {
            jitter: false,
            ..ErrorHandlerConfig::default()
        });
        let strategy = RecoveryStrategy::default_for(ErrorKind::ServiceUnavailable);

        assert_eq!(handler.calculate_delay(&strategy, 1, None), 30.0);
        assert_eq!(handler.calculate_delay(&strategy, 2, None), 60.0);
        assert_eq!(handler.calculate_delay(&strategy, 3, None), 120.0);
        assert_eq!(handler.calculate_delay(&strategy, 4, None), 240.0);
        assert_eq!(handler.calculate_delay(&strategy, 5, None), 300.0);
    }

    #[test]
    fn test_retry_after_hint_overrides_base() {
        let handler = ErrorHandler::new();
        let strategy = RecoveryStrategy::default_for(ErrorKind::RateLimitError);

        assert_eq!(handler.calculate_delay(&strategy, 1, None), 60.0);
        assert_eq!(handler.calculate_delay(&strategy, 1, Some(12)), 12.0);
        assert_eq!(handler.calculate_delay(&strategy, 1, Some(9_000)), 300.0);

        let err = CollectionError::RateLimited {
            message: "slow down".into(),
            retry_after: Some(7),
        };
        let result = handler.handle_error_at(&err, &ctx(1), now());
        assert_eq!(result.delay_seconds, 7.0);
    }

    #[test]
    fn test_immediate_actions_have_zero_delay() {
        let handler = ErrorHandler::new();
        let err = CollectionError::Authentication("expired".into());
        let result = handler.handle_error_at(&err, &ctx(1), now());

        assert_eq!(result.action_taken, RecoveryAction::RefreshCredentials);
        assert!(result.should_retry);
        assert_eq!(result.delay_seconds, 0.0);
        assert_eq!(result.severity, Severity::Critical);
    }

    #[test]
    fn test_terminal_actions_do_not_retry() {
        let handler = ErrorHandler::new();
        let err = CollectionError::Authorization("nope".into());
        let result = handler.handle_error_at(&err, &ctx(1), now());

        assert_eq!(result.action_taken, RecoveryAction::FailOperation);
        assert!(!result.should_retry);
        assert_eq!(result.delay_seconds, 0.0);
    }

    #[test]
    fn test_attempt_ceiling_stops_retry() {
        let handler = ErrorHandler::new();
        let err = CollectionError::ServiceUnavailable("503".into());

        assert!(handler.handle_error_at(&err, &ctx(2), now()).should_retry);
        assert!(!handler.handle_error_at(&err, &ctx(3), now()).should_retry);
    }

    #[test]
    fn test_max_retry_duration_stops_retry() {
        let handler = ErrorHandler::new();
        let err = CollectionError::ServiceUnavailable("503".into());
        let context = ctx(1).with_start_time(now() - TimeDelta::hours(2));

        let result = handler.handle_error_at(&err, &context, now());
        assert!(!result.should_retry);
    }

    #[test]
    fn test_sixth_error_in_hour_escalates_to_skip() {
        let handler = ErrorHandler::new();
        let err = rate_limited();

        for i in 0..5 {
            let at = now() + TimeDelta::minutes(i);
            let result = handler.handle_error_at(&err, &ctx(1), at);
            assert_eq!(result.action_taken, RecoveryAction::RetryAfterDelay, "call {i}");
            assert!(!result.escalated);
        }

        let result = handler.handle_error_at(&err, &ctx(1), now() + TimeDelta::minutes(5));
        assert_eq!(result.action_taken, RecoveryAction::SkipProvider);
        assert!(result.escalated);
        assert!(!result.should_retry);
    }

    #[test]
    fn test_escalation_is_per_key() {
        let handler = ErrorHandler::new();
        let err = rate_limited();
        for _ in 0..6 {
            handler.handle_error_at(&err, &ctx(1), now());
        }

        let other_tenant = ErrorContext::new("collect_cost_data", "aws", "tenant-2")
            .with_attempt(1, 5)
            .with_start_time(now());
        let result = handler.handle_error_at(&err, &other_tenant, now());
        assert_eq!(result.action_taken, RecoveryAction::RetryAfterDelay);
    }

    #[test]
    fn test_old_errors_do_not_escalate() {
        let handler = ErrorHandler::new();
        let err = rate_limited();
        for i in 0..5 {
            handler.handle_error_at(&err, &ctx(1), now() - TimeDelta::hours(2) + TimeDelta::minutes(i));
        }

        let result = handler.handle_error_at(&err, &ctx(1), now());
        assert_eq!(result.action_taken, RecoveryAction::RetryAfterDelay);
    }

    #[test]
    fn test_severity_escalates_after_three_attempts() {
        assert_eq!(Severity::for_kind(ErrorKind::UnknownError, 3), Severity::Low);
        assert_eq!(Severity::for_kind(ErrorKind::UnknownError, 4), Severity::High);
        assert_eq!(Severity::for_kind(ErrorKind::QuotaExceeded, 1), Severity::High);
        assert_eq!(Severity::for_kind(ErrorKind::RateLimitError, 9), Severity::Medium);
    }

    #[test]
    fn test_statistics_and_pruning() {
        let handler = ErrorHandler::new();
        let rate = rate_limited();
        let unavailable = CollectionError::ServiceUnavailable("503".into());

        // Outside the 24h history window.
        handler.handle_error_at(&rate, &ctx(1), now() - TimeDelta::hours(30));
        // Inside the window but not the last hour.
        handler.handle_error_at(&rate, &ctx(1), now() - TimeDelta::hours(3));
        handler.handle_error_at(&unavailable, &ctx(1), now() - TimeDelta::minutes(10));
        handler.handle_error_at(&unavailable, &ctx(1), now() - TimeDelta::minutes(5));

        let stats = handler.statistics_at(now());
        assert_eq!(stats.total_errors, 3);
        assert_eq!(stats.errors_last_hour, 2);
        assert_eq!(stats.errors_by_provider.get("aws"), Some(&3));
        assert_eq!(stats.errors_by_code.get("SERVICE_UNAVAILABLE"), Some(&2));
        assert_eq!(stats.top_error_codes[0], ("SERVICE_UNAVAILABLE".to_string(), 2));
        assert!((stats.error_rate_per_hour - 3.0 / 24.0).abs() < 1e-9);
    }

    #[test]
    fn test_last_hour_count_ignores_escalation_window() {
        let handler = ErrorHandler::with_config(ErrorHandlerConfig {
            escalation_window_secs: 60,
            ..ErrorHandlerConfig::default()
        });
        let unavailable = CollectionError::ServiceUnavailable("503".into());

        handler.handle_error_at(&unavailable, &ctx(1), now() - TimeDelta::minutes(30));
        handler.handle_error_at(&unavailable, &ctx(1), now() - TimeDelta::minutes(90));

        let stats = handler.statistics_at(now());
        assert_eq!(stats.total_errors, 2);
        assert_eq!(stats.errors_last_hour, 1);
    }

    #[test]
    fn test_clear_history_by_provider() {
        let handler = ErrorHandler::new();
        let err = rate_limited();
        let gcp = ErrorContext::new("collect_cost_data", "gcp", "tenant-1").with_start_time(now());

        handler.handle_error(&err, &ctx(1).with_start_time(Utc::now()));
        handler.handle_error(&err, &gcp.with_start_time(Utc::now()));

        handler.clear_history(Some("aws"));
        assert_eq!(handler.history_count("aws", "tenant-1", ErrorKind::RateLimitError), 0);
        assert_eq!(handler.history_count("gcp", "tenant-1", ErrorKind::RateLimitError), 1);

        handler.clear_history(None);
        assert_eq!(handler.statistics().total_errors, 0);
    }

    #[test]
    fn test_strategy_override() {
        let handler = ErrorHandler::new().with_strategy(
            ErrorKind::DataFormatError,
            RecoveryStrategy::default_for(ErrorKind::UnknownError),
        );
        let err = CollectionError::DataFormat("bad".into());
        let result = handler.handle_error_at(&err, &ctx(1), now());
        assert_eq!(result.action_taken, RecoveryAction::RetryWithBackoff);
        assert!(result.should_retry);
    }
}
