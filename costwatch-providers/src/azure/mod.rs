//! Microsoft Azure.

mod descriptor;

pub use descriptor::azure_descriptor;
