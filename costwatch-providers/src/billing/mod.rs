//! Billing-export gateway integration shared by every provider.

mod adapter;
pub mod wire;


pub use adapter::{BillingExportAdapter, build_adapter};
