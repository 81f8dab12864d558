//! Amazon Web Services.

mod descriptor;

pub use descriptor::aws_descriptor;
