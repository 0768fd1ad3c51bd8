//! Cleaning rules for the raw CSV rows.
//!
//! Coercions never fail: anything unparseable becomes the column's default so a
//! single bad cell cannot drop an otherwise useful row.

pub mod reviews;
pub mod sales;

pub use reviews::{clean_review, clean_reviews, ReviewBatch, ReviewFilter, ReviewRejection};
pub use sales::{clean_sales, clean_sales_row, SalesAggregator};

/// Trim whitespace and stray double quotes.
pub fn clean_text(raw: &str) -> String {
    raw.trim().trim_matches('"').trim().to_string()
}

/// Integer coercion accepting `2006` and `2006.0`; anything else is `None`.
pub fn parse_int(raw: &str) -> Option<i64> {
    let s = raw.trim();
    if let Ok(v) = s.parse::<i64>() {
        return Some(v);
    }
    let f = s.parse::<f64>().ok()?;
    if f.is_finite() && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
        Some(f.trunc() as i64)
    } else {
        None
    }
}

/// Like [`parse_int`] but narrowed to `i32`.
pub fn parse_i32(raw: &str) -> Option<i32> {
    parse_int(raw).and_then(|v| i32::try_from(v).ok())
}

/// Year column: non-negative integer, 0 when missing or unparseable.
pub fn coerce_year(raw: &str) -> i32 {
    match parse_i32(raw) {
        Some(y) if y >= 0 => y,
        _ => 0,
    }
}

/// Sales figure: finite non-negative float, 0 otherwise.
pub fn coerce_sales(raw: &str) -> f64 {
    match raw.trim().parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 => v,
        _ => 0.0,
    }
}
