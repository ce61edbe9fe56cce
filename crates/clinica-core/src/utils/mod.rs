//! Utility functions for string formatting and manipulation.

pub mod format;

// Re-export commonly used functions at module level
pub use format::{format_clp, format_date, format_rut, normalize_rut, truncate_string};
