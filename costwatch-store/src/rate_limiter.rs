//! Store-backed rate limiter.
//!
//! Every check is a read-modify-write of one [`RateLimitRecord`] in a shared
//! [`RecordStore`]. Storage failures fail open: the request is admitted and
//! the failure logged.
//!
//! There is no compare-and-set between the read and the write, so
//! concurrent checks on the same key may both be admitted. The limits are a
//! soft ceiling under contention.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::error::StoreError;
use crate::rate_limit_table::{Algorithm, EndpointClass, RateLimitTable};
use crate::record_store::{RateLimitRecord, RecordStore};

/// Extra lifetime given to records past their window.
const EXPIRY_GRACE_SECS: i64 = 3600;

// ============================================================================
// Status
// ============================================================================

/// Snapshot of a key's quota.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitStatus {
    /// Admissions allowed per window.
    pub limit: u32,
    /// Admissions still available now.
    pub remaining: u32,
    /// Admissions counted against the current window.
    pub requests_made: u32,
    /// When the quota is fully restored.
    pub reset_time: DateTime<Utc>,
    /// Algorithm the status was computed with.
    pub algorithm: Algorithm,
}

impl RateLimitStatus {
    fn fresh(limit: u32, algorithm: Algorithm, now: DateTime<Utc>) -> Self {
        Self {
            limit,
            remaining: limit,
            requests_made: 0,
            reset_time: now,
            algorithm,
        }
    }

    /// Returns true if no admissions are left.
    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }
}

// ============================================================================
// Time Helpers
// ============================================================================

fn delta(duration: Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX)
}

fn plus(now: DateTime<Utc>, d: TimeDelta) -> DateTime<Utc> {
    now.checked_add_signed(d).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn minus(now: DateTime<Utc>, d: TimeDelta) -> DateTime<Utc> {
    now.checked_sub_signed(d).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn record_expiry(now: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    plus(plus(now, delta(window)), TimeDelta::seconds(EXPIRY_GRACE_SECS))
}

fn elapsed_secs(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).to_std().map_or(0.0, |d| d.as_secs_f64())
}

/// Tokens after topping up for the time since `last_refill`.
fn refilled(tokens: f64, last_refill: DateTime<Utc>, now: DateTime<Utc>, limit: u32, window: Duration) -> f64 {
    let capacity = f64::from(limit);
    let window_secs = window.as_secs_f64();
    if window_secs <= 0.0 {
        return capacity;
    }
    let rate = capacity / window_secs;
    (tokens + elapsed_secs(last_refill, now) * rate).min(capacity)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn whole_tokens(tokens: f64) -> u32 {
    tokens.max(0.0).floor() as u32
}

// ============================================================================
// Rate Limiter
// ============================================================================

/// Rate limiter over a shared record store.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn RecordStore>,
    table: RateLimitTable,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}

impl RateLimiter {
    /// Creates a limiter with the default endpoint table.
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self::with_table(store, RateLimitTable::default())
    }

    /// Creates a limiter with a custom endpoint table.
    pub fn with_table(store: Arc<dyn RecordStore>, table: RateLimitTable) -> Self {
        Self { store, table }
    }

    /// The endpoint table.
    pub fn table(&self) -> &RateLimitTable {
        &self.table
    }

    /// The backing store.
    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Record key for `key` under an endpoint class.
    pub fn endpoint_key(class: EndpointClass, key: &str) -> String {
        format!("{}:{key}", class.code())
    }

    // ========================================================================
    // Admission
    // ========================================================================

    /// Checks and records one request against `key`.
    pub async fn check_rate_limit(&self, key: &str, limit: u32, window: Duration, algorithm: Algorithm) -> bool {
        self.check_rate_limit_at(key, limit, window, algorithm, Utc::now())
            .await
    }

    /// [`Self::check_rate_limit`] at a fixed instant.
    #[instrument(skip(self, window, now), fields(window_secs = window.as_secs()))]
    pub async fn check_rate_limit_at(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
        algorithm: Algorithm,
        now: DateTime<Utc>,
    ) -> bool {
        let checked = match algorithm {
            Algorithm::SlidingWindow => self.check_sliding_window(key, limit, window, now).await,
            Algorithm::TokenBucket => self.check_token_bucket(key, limit, window, now).await,
        };

        match checked {
            Ok(true) => true,
            Ok(false) => {
                debug!("Rate limit exceeded");
                false
            }
            Err(e) => {
                warn!(error = %e, "Rate limit store failed, allowing request");
                true
            }
        }
    }

    /// Checks `key` against the rule for `class`.
    pub async fn check_endpoint(&self, class: EndpointClass, key: &str) -> bool {
        self.check_endpoint_at(class, key, Utc::now()).await
    }

    /// [`Self::check_endpoint`] at a fixed instant.
    pub async fn check_endpoint_at(&self, class: EndpointClass, key: &str, now: DateTime<Utc>) -> bool {
        let rule = self.table.rule(class);
        self.check_rate_limit_at(
            &Self::endpoint_key(class, key),
            rule.limit,
            rule.window(),
            rule.algorithm,
            now,
        )
        .await
    }

    async fn check_sliding_window(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut timestamps = self.live_timestamps(key, window, now).await?;
        if timestamps.len() >= limit as usize {
            return Ok(false);
        }

        timestamps.push(now);
        self.store
            .put(
                key,
                RateLimitRecord::SlidingWindow {
                    timestamps,
                    expiry: record_expiry(now, window),
                },
            )
            .await?;
        Ok(true)
    }

    async fn check_token_bucket(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut tokens = self.current_tokens(key, limit, window, now).await?;
        let admitted = tokens >= 1.0;
        if admitted {
            tokens -= 1.0;
        }

        self.store
            .put(
                key,
                RateLimitRecord::TokenBucket {
                    tokens,
                    last_refill: now,
                    expiry: record_expiry(now, window),
                },
            )
            .await?;
        Ok(admitted)
    }

    /// Stored timestamps still inside the window ending at `now`.
    async fn live_timestamps(
        &self,
        key: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>, StoreError> {
        let cutoff = minus(now, delta(window));
        let mut timestamps = match self.store.get(key).await? {
            Some(RateLimitRecord::SlidingWindow { timestamps, .. }) => timestamps,
            Some(RateLimitRecord::TokenBucket { .. }) => {
                debug!(key, "Algorithm changed for key, starting a new window");
                Vec::new()
            }
            None => Vec::new(),
        };
        timestamps.retain(|t| *t >= cutoff);
        timestamps.sort();
        Ok(timestamps)
    }

    /// Refilled token balance; unknown keys start full.
    async fn current_tokens(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<f64, StoreError> {
        Ok(match self.store.get(key).await? {
            Some(RateLimitRecord::TokenBucket {
                tokens,
                last_refill,
                ..
            }) => refilled(tokens, last_refill, now, limit, window),
            Some(RateLimitRecord::SlidingWindow { .. }) => {
                debug!(key, "Algorithm changed for key, starting a full bucket");
                f64::from(limit)
            }
            None => f64::from(limit),
        })
    }

    // ========================================================================
    // Status
    // ========================================================================

    /// Reports the quota for `key` without recording a request.
    pub async fn get_rate_limit_status(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
        algorithm: Algorithm,
    ) -> RateLimitStatus {
        self.get_rate_limit_status_at(key, limit, window, algorithm, Utc::now())
            .await
    }

    /// [`Self::get_rate_limit_status`] at a fixed instant.
    pub async fn get_rate_limit_status_at(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
        algorithm: Algorithm,
        now: DateTime<Utc>,
    ) -> RateLimitStatus {
        let status = match algorithm {
            Algorithm::SlidingWindow => self.sliding_window_status(key, limit, window, now).await,
            Algorithm::TokenBucket => self.token_bucket_status(key, limit, window, now).await,
        };

        status.unwrap_or_else(|e| {
            warn!(key, error = %e, "Rate limit store failed, reporting full quota");
            RateLimitStatus::fresh(limit, algorithm, now)
        })
    }

    /// Status of `key` under the rule for `class`.
    pub async fn endpoint_status(&self, class: EndpointClass, key: &str) -> RateLimitStatus {
        self.endpoint_status_at(class, key, Utc::now()).await
    }

    /// [`Self::endpoint_status`] at a fixed instant.
    pub async fn endpoint_status_at(&self, class: EndpointClass, key: &str, now: DateTime<Utc>) -> RateLimitStatus {
        let rule = self.table.rule(class);
        self.get_rate_limit_status_at(
            &Self::endpoint_key(class, key),
            rule.limit,
            rule.window(),
            rule.algorithm,
            now,
        )
        .await
    }

    async fn sliding_window_status(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<RateLimitStatus, StoreError> {
        let timestamps = self.live_timestamps(key, window, now).await?;
        let made = u32::try_from(timestamps.len()).unwrap_or(u32::MAX);
        let reset_time = timestamps
            .first()
            .map_or(now, |oldest| plus(*oldest, delta(window)));

        Ok(RateLimitStatus {
            limit,
            remaining: limit.saturating_sub(made),
            requests_made: made,
            reset_time,
            algorithm: Algorithm::SlidingWindow,
        })
    }

    async fn token_bucket_status(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<RateLimitStatus, StoreError> {
        let tokens = self.current_tokens(key, limit, window, now).await?;
        let remaining = whole_tokens(tokens).min(limit);
        let missing = f64::from(limit) - tokens;
        let reset_time = if missing > 0.0 && limit > 0 {
            let secs = missing * window.as_secs_f64() / f64::from(limit);
            Duration::try_from_secs_f64(secs).map_or(now, |d| plus(now, delta(d)))
        } else {
            now
        };

        Ok(RateLimitStatus {
            limit,
            remaining,
            requests_made: limit - remaining,
            reset_time,
            algorithm: Algorithm::TokenBucket,
        })
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Forgets all state for `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot delete the record.
    pub async fn reset_rate_limit(&self, key: &str) -> Result<bool, StoreError> {
        let existed = self.store.delete(key).await?;
        debug!(key, existed, "Rate limit reset");
        Ok(existed)
    }

    /// Deletes every record past its expiry.
    ///
    /// # Errors
    ///
    /// Returns an error if the scan or the batch delete fails.
    pub async fn cleanup_expired_entries(&self) -> Result<usize, StoreError> {
        self.cleanup_expired_entries_at(Utc::now()).await
    }

    /// [`Self::cleanup_expired_entries`] at a fixed instant.
    ///
    /// # Errors
    ///
    /// Returns an error if the scan or the batch delete fails.
    pub async fn cleanup_expired_entries_at(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let expired = self.store.scan_expired(now).await?;
        if expired.is_empty() {
            return Ok(0);
        }
        let removed = self.store.delete_batch(&expired).await?;
        info!(removed, "Cleaned up expired rate limit records");
        Ok(removed)
    }
}
