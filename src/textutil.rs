//! Shared UTF-8-safe truncation helpers.
//!
//! Chat platforms count characters, not bytes, and byte slicing panics when a
//! cut lands inside a multi-byte character. Every bound applied to rendered
//! text goes through these helpers.

/// Trim surrounding whitespace and keep at most `max_chars` characters.
///
/// A `max_chars` of zero disables the bound.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    if max_chars == 0 || trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    trimmed.chars().take(max_chars).collect()
}

/// Return `value` unless it is blank, in which case return `fallback`.
pub fn non_empty<'a>(value: Option<&'a str>, fallback: &'a str) -> &'a str {
    match value {
        Some(v) if !v.trim().is_empty() => v,
        _ => fallback,
    }
}
