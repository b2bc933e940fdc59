//! Lenient accessors over webhook payloads.
//!
//! Formatters read many optional fields; these helpers turn a missing or
//! mistyped field into a readable default instead of an error.

use pipeline::FormatError;
use serde_json::Value;

pub(crate) const UNKNOWN: &str = "unknown";

/// The string at `pointer`, or `default` if absent or not a string.
pub(crate) fn str_or<'a>(payload: &'a Value, pointer: &str, default: &'a str) -> &'a str {
    payload
        .pointer(pointer)
        .and_then(Value::as_str)
        .unwrap_or(default)
}

/// The non-empty string at `pointer`.
pub(crate) fn non_empty<'a>(payload: &'a Value, pointer: &str) -> Option<&'a str> {
    payload
        .pointer(pointer)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

pub(crate) fn u64_or(payload: &Value, pointer: &str, default: u64) -> u64 {
    payload
        .pointer(pointer)
        .and_then(Value::as_u64)
        .unwrap_or(default)
}

/// The array at `pointer`, or an empty slice.
pub(crate) fn array<'a>(payload: &'a Value, pointer: &str) -> &'a [Value] {
    payload
        .pointer(pointer)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// `repository.full_name`, the repository every event is about.
pub(crate) fn repository(payload: &Value) -> &str {
    str_or(payload, "/repository/full_name", "unknown/repo")
}

/// `sender.login`.
pub(crate) fn sender(payload: &Value) -> &str {
    str_or(payload, "/sender/login", UNKNOWN)
}

/// The object at `field`, which the event cannot be described without.
pub(crate) fn required<'a>(
    payload: &'a Value,
    event_type: &str,
    field: &str,
) -> Result<&'a Value, FormatError> {
    payload
        .get(field)
        .filter(|v| v.is_object())
        .ok_or_else(|| FormatError::MissingField {
            event_type: event_type.to_string(),
            field: field.to_string(),
        })
}

/// Shortens `text` to at most `max` characters, marking the cut with `...`.
pub(crate) fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let kept: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{kept}...")
}

/// First line of a commit message.
pub(crate) fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or("")
}

/// Human-readable byte count (`512 B`, `1.50 KB`, `2.00 MB`, ...).
pub(crate) fn human_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    let b = bytes as f64;
    if b < KB {
        format!("{bytes} B")
    } else if b < KB * KB {
        format!("{:.2} KB", b / KB)
    } else if b < KB * KB * KB {
        format!("{:.2} MB", b / (KB * KB))
    } else {
        format!("{:.2} GB", b / (KB * KB * KB))
    }
}
