//! Google Cloud Platform.

mod descriptor;

pub use descriptor::gcp_descriptor;
