//! SQL literal rendering for the batch insert paths.
//!
//! The high-volume tables (leads, conversions) are written with multi-row
//! `VALUES` statements instead of parameterized binds. Every free-text value
//! interpolated into such a statement must have embedded single quotes
//! doubled; that invariant lives here and nowhere else.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

/// Quote a string as a SQL literal, doubling embedded single quotes.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Quote an optional string, mapping absent or empty values to `NULL`.
pub fn quote_nullable(value: Option<&str>) -> String {
    match value {
        Some(v) if !v.is_empty() => quote_literal(v),
        _ => "NULL".to_string(),
    }
}

/// Render a timestamp as a quoted RFC 3339 literal.
pub fn timestamp_literal(ts: &DateTime<Utc>) -> String {
    quote_literal(&ts.to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// Render an optional timestamp, mapping absence to `NULL`.
pub fn nullable_timestamp(ts: Option<&DateTime<Utc>>) -> String {
    ts.map(timestamp_literal).unwrap_or_else(|| "NULL".to_string())
}

/// Render an optional number, mapping absence to `NULL`.
pub fn nullable_number(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "NULL".to_string())
}

/// Render a JSON array of tags as a typed Postgres array literal.
///
/// Elements are escaped individually; an empty or unreadable array produces
/// an explicitly typed empty literal, never `NULL`.
pub fn tags_array_literal(tags_json: Option<&str>) -> String {
    let tags: Vec<String> = tags_json
        .and_then(|text| serde_json::from_str::<Value>(text).ok())
        .and_then(|value| match value {
            Value::Array(items) => Some(
                items
                    .into_iter()
                    .filter_map(|item| item.as_str().map(str::to_string))
                    .collect(),
            ),
            _ => None,
        })
        .unwrap_or_default();

    if tags.is_empty() {
        return "ARRAY[]::text[]".to_string();
    }

    let elements: Vec<String> = tags.iter().map(|tag| quote_literal(tag)).collect();
    format!("ARRAY[{}]::text[]", elements.join(","))
}
