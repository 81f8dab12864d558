// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # `costwatch` Fetch
//!
//! Adapter contract, concurrent fan-out, and error recovery for `costwatch`.
//!
//! ## Adapters
//!
//! - [`adapter::ProviderAdapter`] - Trait every provider integration implements
//! - [`http::HttpClient`] - HTTP client with tracing, basic auth, and domain allowlist
//!
//! ## Fan-out
//!
//! - [`manager::AdapterManager`] - Registry keyed by `(tenant, provider)` that
//!   runs a tenant's adapters concurrently and isolates their failures
//!
//! ## Recovery
//!
//! - [`error_handler::ErrorHandler`] - Classifies failures and picks a
//!   [`error_handler::RecoveryStrategy`], escalating noisy keys to skip
//! - [`retry::retry_with_handler`] - Generic retry loop driven by the handler
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use costwatch_core::DateRange;
//! use costwatch_fetch::{AdapterManager, ErrorHandler};
//!
//! let manager = AdapterManager::new(Arc::new(ErrorHandler::new()));
//! manager.add_adapter("acme", Arc::new(my_aws_adapter));
//!
//! let results = manager
//!     .collect_all_cost_data("acme", &DateRange::last_n_days(7))
//!     .await;
//! ```

// Core modules
pub mod adapter;
pub mod error;
pub mod error_handler;
pub mod http;
pub mod manager;
pub mod retry;


// Re-export key types at crate root

// Errors
pub use error::{FetchError, HttpError};

// Adapters
pub use adapter::{ProviderAdapter, normalize_cost_data, translate_error};
pub use http::{BasicAuth, HttpClient, ResponseExt};

// Fan-out
pub use manager::AdapterManager;

// Recovery
pub use error_handler::{
    ErrorContext, ErrorHandler, ErrorHandlerConfig, ErrorHandlingResult, ErrorStatistics,
    RecoveryAction, RecoveryStrategy, Severity, classify_error, classify_message,
};
pub use retry::{
    Attempt, DEFAULT_MAX_ATTEMPTS, RetryOutcome, RetryTarget, retry_with_handler, run_with_retry,
};
