//! Keyed storage for rate-limit records.
//!
//! [`RecordStore`] is the seam to whatever shared key-value backend the
//! deployment uses. Two implementations ship here:
//!
//! - [`InMemoryRecordStore`] - process-local map
//! - [`JsonFileRecordStore`] - map mirrored to a JSON file on every write

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::error::StoreError;
use crate::persistence::{load_json, save_json};

// ============================================================================
// Rate Limit Record
// ============================================================================

/// Persisted state of one rate-limit key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "algorithm", rename_all = "snake_case")]
pub enum RateLimitRecord {
    /// Admission timestamps inside the trailing window.
    SlidingWindow {
        /// Admitted request times.
        timestamps: Vec<DateTime<Utc>>,
        /// When the record may be swept.
        expiry: DateTime<Utc>,
    },
    /// Remaining capacity of a token bucket.
    TokenBucket {
        /// Tokens left (fractional).
        tokens: f64,
        /// When tokens were last refilled.
        last_refill: DateTime<Utc>,
        /// When the record may be swept.
        expiry: DateTime<Utc>,
    },
}

impl RateLimitRecord {
    /// When the record may be swept.
    pub fn expiry(&self) -> DateTime<Utc> {
        match self {
            Self::SlidingWindow { expiry, .. } | Self::TokenBucket { expiry, .. } => *expiry,
        }
    }

    /// Returns true once `now` is past the expiry.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry() <= now
    }
}

// ============================================================================
// Record Store Trait
// ============================================================================

/// Async key-value store for rate-limit records.
///
/// Reads and writes are independent; there is no compare-and-set, so two
/// callers racing on one key can both observe the same state.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetches a record.
    async fn get(&self, key: &str) -> Result<Option<RateLimitRecord>, StoreError>;

    /// Inserts or replaces a record.
    async fn put(&self, key: &str, record: RateLimitRecord) -> Result<(), StoreError>;

    /// Deletes a record, returning whether it existed.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Keys whose records expired at or before `now`.
    async fn scan_expired(&self, now: DateTime<Utc>) -> Result<Vec<String>, StoreError>;

    /// Deletes many records, returning how many existed.
    async fn delete_batch(&self, keys: &[String]) -> Result<usize, StoreError>;
}

fn expired_keys(records: &HashMap<String, RateLimitRecord>, now: DateTime<Utc>) -> Vec<String> {
    let mut keys: Vec<String> = records
        .iter()
        .filter(|(_, record)| record.is_expired_at(now))
        .map(|(key, _)| key.clone())
        .collect();
    keys.sort();
    keys
}

// ============================================================================
// In-Memory Store
// ============================================================================

/// Process-local record store.
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    records: RwLock<HashMap<String, RateLimitRecord>>,
}

impl InMemoryRecordStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Returns true if the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn get(&self, key: &str) -> Result<Option<RateLimitRecord>, StoreError> {
        Ok(self.records.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, record: RateLimitRecord) -> Result<(), StoreError> {
        self.records.write().await.insert(key.to_string(), record);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.records.write().await.remove(key).is_some())
    }

    async fn scan_expired(&self, now: DateTime<Utc>) -> Result<Vec<String>, StoreError> {
        Ok(expired_keys(&*self.records.read().await, now))
    }

    async fn delete_batch(&self, keys: &[String]) -> Result<usize, StoreError> {
        let mut records = self.records.write().await;
        Ok(keys.iter().filter(|k| records.remove(*k).is_some()).count())
    }
}

// ============================================================================
// JSON File Store
// ============================================================================

/// Record store mirrored to a JSON file.
///
/// The whole map is rewritten atomically after each mutation. Mutations
/// snapshot the map and release the record lock before touching the file.
/// Each snapshot carries a generation; a snapshot older than the last one
/// saved is dropped, so the file never moves backwards.
#[derive(Debug)]
pub struct JsonFileRecordStore {
    path: PathBuf,
    records: RwLock<HashMap<String, RateLimitRecord>>,
    generation: AtomicU64,
    // Last generation written to disk. Only file writes wait on this.
    saved: Mutex<u64>,
}

impl JsonFileRecordStore {
    /// Opens the store at `path`, loading existing records.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let records = if path.exists() {
            let records: HashMap<String, RateLimitRecord> = load_json(&path).await?;
            info!(path = %path.display(), count = records.len(), "Loaded rate-limit records");
            records
        } else {
            debug!(path = %path.display(), "Rate-limit file not found, starting empty");
            HashMap::new()
        };

        Ok(Self {
            path,
            records: RwLock::new(records),
            generation: AtomicU64::new(0),
            saved: Mutex::new(0),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copies the map and stamps it; call with the write guard held.
    fn snapshot(
        &self,
        records: &HashMap<String, RateLimitRecord>,
    ) -> (HashMap<String, RateLimitRecord>, u64) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        (records.clone(), generation)
    }

    async fn persist(
        &self,
        snapshot: HashMap<String, RateLimitRecord>,
        generation: u64,
    ) -> Result<(), StoreError> {
        let mut saved = self.saved.lock().await;
        if *saved >= generation {
            debug!(generation, saved = *saved, "Newer snapshot already saved");
            return Ok(());
        }
        save_json(&self.path, &snapshot).await?;
        *saved = generation;
        Ok(())
    }
}

#[async_trait]
impl RecordStore for JsonFileRecordStore {
    async fn get(&self, key: &str) -> Result<Option<RateLimitRecord>, StoreError> {
        Ok(self.records.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, record: RateLimitRecord) -> Result<(), StoreError> {
        let (snapshot, generation) = {
            let mut records = self.records.write().await;
            records.insert(key.to_string(), record);
            self.snapshot(&records)
        };
        self.persist(snapshot, generation).await
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let pending = {
            let mut records = self.records.write().await;
            records.remove(key).map(|_| self.snapshot(&records))
        };
        match pending {
            Some((snapshot, generation)) => {
                self.persist(snapshot, generation).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn scan_expired(&self, now: DateTime<Utc>) -> Result<Vec<String>, StoreError> {
        Ok(expired_keys(&*self.records.read().await, now))
    }

    async fn delete_batch(&self, keys: &[String]) -> Result<usize, StoreError> {
        let (removed, pending) = {
            let mut records = self.records.write().await;
            let removed = keys.iter().filter(|k| records.remove(*k).is_some()).count();
            (removed, (removed > 0).then(|| self.snapshot(&records)))
        };
        if let Some((snapshot, generation)) = pending {
            self.persist(snapshot, generation).await?;
        }
        Ok(removed)
    }
}

// ============================================================================
// Tests
// ============================================================================
