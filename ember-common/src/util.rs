//! Utility functions shared by Ember crates.

use chrono::NaiveDate;

use crate::error::{Error, Result};

/// Date format used in config files, CSV files, and logs.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Turn a ticker into a file stem (`^GSPC` -> `GSPC`).
pub fn safe_file_name(ticker: &str) -> String {
    ticker.replace('^', "")
}

/// Parse a `YYYY-MM-DD` date.
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT)
        .map_err(|e| Error::InvalidInput(format!("invalid date '{}': {}", s, e)))
}

/// Render the first `limit` items of a list, appending "..." when cut.
pub fn preview_list<S: AsRef<str>>(items: &[S], limit: usize) -> String {
    let shown: Vec<&str> = items.iter().take(limit).map(AsRef::as_ref).collect();
    let mut out = format!("[{}]", shown.join(", "));
    if items.len() > limit {
        out.push_str("...");
    }
    out
}

/// Format a fraction as a percentage string (0.1234 -> "12.34%").
pub fn format_pct(value: f64) -> String {
    if value.is_finite() {
        format!("{:.2}%", value * 100.0)
    } else {
        "-".to_string()
    }
}
