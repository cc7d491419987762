//! Utility functions for string formatting and manipulation.

pub mod format;

pub use format::{format_date, redact_token, truncate_string};
