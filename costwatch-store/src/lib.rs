// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # `costwatch` Store
//!
//! Admission control, settings, and the service context for `costwatch`.
//!
//! This crate provides:
//!
//! - **RateLimiter**: Sliding-window and token-bucket limits over a shared record store
//! - **RecordStore**: Async key-value seam, in memory or mirrored to a JSON file
//! - **SettingsStore**: Service configuration with persistence and change notification
//! - **ServiceContext**: Error handler, adapter manager and limiter built from settings
//!
//! ## Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use costwatch_store::{Algorithm, InMemoryRecordStore, RateLimiter};
//!
//! let limiter = RateLimiter::new(Arc::new(InMemoryRecordStore::new()));
//!
//! if limiter
//!     .check_rate_limit("acme:aws", 100, Duration::from_secs(60), Algorithm::TokenBucket)
//!     .await
//! {
//!     // call the provider
//! }
//! ```

pub mod context;
pub mod error;
pub mod persistence;
pub mod rate_limit_table;
pub mod rate_limiter;
pub mod record_store;
pub mod settings_store;

pub use context::ServiceContext;
pub use error::StoreError;
pub use persistence::{
    default_config_dir, default_data_dir, default_rate_limit_path, default_settings_path,
    ensure_dir, load_json, load_json_or_default, save_json,
};
pub use rate_limit_table::{Algorithm, EndpointClass, RateLimitRule, RateLimitTable};
pub use rate_limiter::{RateLimitStatus, RateLimiter};
pub use record_store::{InMemoryRecordStore, JsonFileRecordStore, RateLimitRecord, RecordStore};
pub use settings_store::{
    CollectionSettings, LogLevel, RateLimitStorage, RetrySettings, Settings, SettingsStore,
    TenantConfig,
};

#[cfg(test)]
mod persistence_tests;
