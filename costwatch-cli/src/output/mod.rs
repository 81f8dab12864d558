//! Output formatting for CLI.

mod json;
mod text;

pub use json::{CollectOutput, ConfigView, JsonFormatter, LimitEntry, ProviderInfoOutput};
pub use text::TextFormatter;
