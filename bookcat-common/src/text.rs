//! Text normalization for user-entered catalog values
//!
//! Every free-text field (titles, names, notes) passes through [`normalize`]
//! before it reaches the database, so lookups by name compare like with like.

use unicode_normalization::UnicodeNormalization;

/// Zero-width and BOM characters that sneak in from copy/paste
const INVISIBLE_FORMAT_CHARS: [char; 5] = ['\u{200B}', '\u{200C}', '\u{200D}', '\u{FEFF}', '\u{2060}'];

/// Strip invisible format characters, NFC-normalize and trim.
///
/// Returns `None` when nothing is left.
pub fn normalize(input: &str) -> Option<String> {
    let nfc: String = input
        .chars()
        .filter(|c| !INVISIBLE_FORMAT_CHARS.contains(c))
        .nfc()
        .collect();
    let trimmed = nfc.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// [`normalize`] over an optional value
pub fn normalize_opt(input: Option<&str>) -> Option<String> {
    input.and_then(normalize)
}

/// Collapse whitespace runs into single spaces and trim the ends
pub fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Keep only `[A-Za-z0-9_-]`, for labels embedded in download filenames
pub fn sanitize_label(input: &str) -> String {
    input
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect()
}

/// Keep only `[A-Za-z0-9._-]`, for whole download filenames
pub fn sanitize_filename(input: &str) -> String {
    input
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        .collect()
}

/// Truncate to at most `max_bytes`, backing off to a char boundary
pub fn truncate_bytes(input: &str, max_bytes: usize) -> &str {
    if input.len() <= max_bytes {
        return input;
    }
    let mut end = max_bytes;
    while !input.is_char_boundary(end) {
        end -= 1;
    }
    &input[..end]
}

/// Check a strict `YYYY-MM-DD` calendar date
pub fn is_iso_date(input: &str) -> bool {
    input.len() == 10 && chrono::NaiveDate::parse_from_str(input, "%Y-%m-%d").is_ok()
}

/// Lenient boolean parsing for form values (`1/0`, `true/false`, `yes/no`, `on/off`)
pub fn parse_bool(input: &str) -> Option<bool> {
    match input.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

/// Operating-system label used in export filenames
pub fn os_label() -> String {
    let os = match std::env::consts::OS {
        "macos" => "macos",
        "windows" => "windows",
        "linux" => "linux",
        other => other,
    };
    let label = sanitize_label(os);
    if label.is_empty() {
        "unknown".to_string()
    } else {
        label
    }
}
