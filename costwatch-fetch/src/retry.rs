//! Retry wrapper driven by the [`ErrorHandler`].
//!
//! [`run_with_retry`] calls an async operation until it succeeds, the handler
//! says to stop, or the caller's attempt ceiling is hit. Each attempt receives
//! an [`Attempt`] carrying the previous decision, so callers can refresh
//! credentials or shrink the request before trying again.

use chrono::Utc;
use std::error::Error as StdError;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error_handler::{ErrorContext, ErrorHandler, ErrorHandlingResult, RecoveryAction};

/// Default attempt ceiling for callers that do not configure one.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

// ============================================================================
// Retry Target
// ============================================================================

/// Identifies the operation being retried, for history keys and logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryTarget {
    /// Operation name.
    pub operation: String,
    /// Provider name.
    pub provider: String,
    /// Tenant id.
    pub client_id: String,
}

impl RetryTarget {
    /// Creates a new target.
    pub fn new(
        operation: impl Into<String>,
        provider: impl Into<String>,
        client_id: impl Into<String>,
    ) -> Self {
        Self {
            operation: operation.into(),
            provider: provider.into(),
            client_id: client_id.into(),
        }
    }
}

// ============================================================================
// Attempt & Outcome
// ============================================================================

/// Passed to the operation on every attempt.
#[derive(Debug, Clone)]
pub struct Attempt {
    /// 1-based attempt number.
    pub number: u32,
    /// Decision made after the previous failed attempt.
    pub previous: Option<ErrorHandlingResult>,
}

impl Attempt {
    /// Action chosen after the previous attempt, if any.
    pub fn previous_action(&self) -> Option<RecoveryAction> {
        self.previous.as_ref().map(|d| d.action_taken)
    }

    /// Returns true on the first attempt.
    pub fn is_first(&self) -> bool {
        self.number == 1
    }
}

/// Everything the wrapper knows once it stops.
#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    /// Final result.
    pub result: Result<T, E>,
    /// Attempts made.
    pub attempts: u32,
    /// Last handler decision, if any attempt failed.
    pub last_decision: Option<ErrorHandlingResult>,
    /// Total time spent, including sleeps.
    pub elapsed: Duration,
}

impl<T, E> RetryOutcome<T, E> {
    /// Returns true if the operation eventually succeeded.
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

// ============================================================================
// Wrapper
// ============================================================================

/// Runs `operation` with retries and reports how it went.
pub async fn run_with_retry<T, E, F, Fut>(
    handler: &ErrorHandler,
    target: &RetryTarget,
    max_attempts: u32,
    mut operation: F,
) -> RetryOutcome<T, E>
where
    F: FnMut(Attempt) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: StdError + 'static,
{
    let max_attempts = max_attempts.max(1);
    let start_time = Utc::now();
    let started = Instant::now();
    let mut previous: Option<ErrorHandlingResult> = None;
    let mut number = 1;

    loop {
        debug!(
            operation = %target.operation,
            provider = %target.provider,
            attempt = number,
            "Running attempt"
        );
        let attempt = Attempt {
            number,
            previous: previous.clone(),
        };

        match operation(attempt).await {
            Ok(value) => {
                if number > 1 {
                    info!(
                        operation = %target.operation,
                        provider = %target.provider,
                        attempts = number,
                        "Succeeded after retry"
                    );
                }
                return RetryOutcome {
                    result: Ok(value),
                    attempts: number,
                    last_decision: previous,
                    elapsed: started.elapsed(),
                };
            }
            Err(err) => {
                let context = ErrorContext::new(
                    target.operation.clone(),
                    target.provider.clone(),
                    target.client_id.clone(),
                )
                .with_attempt(number, max_attempts)
                .with_start_time(start_time);
                let decision = handler.handle_error(&err, &context);

                if !decision.should_retry || number >= max_attempts {
                    warn!(
                        operation = %target.operation,
                        provider = %target.provider,
                        attempts = number,
                        action = %decision.action_taken,
                        "Giving up"
                    );
                    return RetryOutcome {
                        result: Err(err),
                        attempts: number,
                        last_decision: Some(decision),
                        elapsed: started.elapsed(),
                    };
                }

                if decision.delay_seconds > 0.0 {
                    let delay =
                        Duration::try_from_secs_f64(decision.delay_seconds).unwrap_or_default();
                    debug!(delay = ?delay, "Sleeping before retry");
                    tokio::time::sleep(delay).await;
                }
                previous = Some(decision);
                number += 1;
            }
        }
    }
}

/// Runs `operation` with retries, returning the last error on give-up.
pub async fn retry_with_handler<T, E, F, Fut>(
    handler: &ErrorHandler,
    target: &RetryTarget,
    max_attempts: u32,
    operation: F,
) -> Result<T, E>
where
    F: FnMut(Attempt) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: StdError + 'static,
{
    run_with_retry(handler, target, max_attempts, operation)
        .await
        .result
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error_handler::ErrorHandlerConfig;
    use costwatch_core::CollectionError;

    fn target() -> RetryTarget {
        RetryTarget::new("collect_cost_data", "aws", "tenant-1")
    }

    fn no_jitter() -> ErrorHandler {
        ErrorHandler::with_config(ErrorHandlerConfig {
            jitter: false,
            ..ErrorHandlerConfig::default()
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_authorization_error_fails_once_without_sleep() {
        let handler = ErrorHandler::new();
        let started = Instant::now();

        let outcome: RetryOutcome<(), _> = run_with_retry(&handler, &target(), 5, |_| async {
            Err(CollectionError::Authorization("no access".into()))
        })
        .await;

        assert_eq!(outcome.attempts, 1);
        assert_eq!(
            outcome.result,
            Err(CollectionError::Authorization("no access".into()))
        );
        assert_eq!(started.elapsed(), Duration::ZERO);
        assert_eq!(
            outcome.last_decision.map(|d| d.action_taken),
            Some(RecoveryAction::FailOperation)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_then_success() {
        let handler = no_jitter();
        let started = Instant::now();

        let outcome = run_with_retry(&handler, &target(), 5, |attempt| async move {
            if attempt.number < 3 {
                Err(CollectionError::ServiceUnavailable("503".into()))
            } else {
                Ok(attempt.number)
            }
        })
        .await;

        assert_eq!(outcome.result, Ok(3));
        assert_eq!(outcome.attempts, 3);
        // 30s then 60s of backoff.
        assert!(started.elapsed() >= Duration::from_secs(90));
        assert!(started.elapsed() < Duration::from_secs(91));
    }

    #[tokio::test(start_paused = true)]
    async fn test_strategy_ceiling_below_wrapper_ceiling() {
        let handler = no_jitter();

        let result: Result<(), _> = retry_with_handler(&handler, &target(), 10, |_| async {
            Err(CollectionError::ServiceUnavailable("503".into()))
        })
        .await;

        assert!(matches!(result, Err(CollectionError::ServiceUnavailable(_))));
        assert_eq!(
            handler.history_count("aws", "tenant-1", costwatch_core::ErrorKind::ServiceUnavailable),
            3
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_wrapper_ceiling_below_strategy_ceiling() {
        let handler = ErrorHandler::new();

        let outcome: RetryOutcome<(), _> = run_with_retry(&handler, &target(), 2, |_| async {
            Err(CollectionError::RateLimited {
                message: "slow".into(),
                retry_after: Some(1),
            })
        })
        .await;

        assert_eq!(outcome.attempts, 2);
        assert!(outcome.result.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_hint_controls_sleep() {
        let handler = ErrorHandler::new();
        let started = Instant::now();

        let outcome = run_with_retry(&handler, &target(), 3, |attempt| async move {
            if attempt.is_first() {
                Err(CollectionError::RateLimited {
                    message: "slow".into(),
                    retry_after: Some(5),
                })
            } else {
                Ok(())
            }
        })
        .await;

        assert!(outcome.is_success());
        assert!(started.elapsed() >= Duration::from_secs(5));
        assert!(started.elapsed() < Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_previous_decision_is_passed_to_next_attempt() {
        let handler = ErrorHandler::new();

        let outcome = run_with_retry(&handler, &target(), 3, |attempt| async move {
            match attempt.previous_action() {
                None => Err(CollectionError::Authentication("expired".into())),
                Some(action) => Ok(action),
            }
        })
        .await;

        assert_eq!(outcome.result, Ok(RecoveryAction::RefreshCredentials));
        assert_eq!(outcome.attempts, 2);
    }

    #[tokio::test]
    async fn test_untyped_errors_are_classified_by_message() {
        let handler = ErrorHandler::new();

        let result: Result<(), std::io::Error> =
            retry_with_handler(&handler, &target(), 3, |_| async {
                Err(std::io::Error::other("could not parse response"))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(
            handler.history_count("aws", "tenant-1", costwatch_core::ErrorKind::DataFormatError),
            1
        );
    }
}
