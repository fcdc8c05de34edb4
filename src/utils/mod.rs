pub mod formatting;

pub use formatting::{format_named, format_positional, sanitize_path_comp, value_to_string};
