//! Comparison normalization for names and free text.

use unicode_normalization::UnicodeNormalization;

/// Collapse runs of whitespace into single spaces and trim the ends.
pub fn squash_spaces(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;
    for ch in text.chars() {
        if ch.is_whitespace() {
            pending_space = !out.is_empty();
        } else {
            if pending_space {
                out.push(' ');
                pending_space = false;
            }
            out.push(ch);
        }
    }
    out
}

/// Normalize a value for comparison: lowercase, Unicode NFC, squashed
/// whitespace.
pub fn comparison_form(text: &str) -> String {
    let lowered = text.to_lowercase();
    let composed: String = lowered.nfc().collect();
    squash_spaces(&composed)
}

/// Make a value coming from the API safe for comparison: NFC, control
/// characters removed, trimmed.
pub fn safe_string(value: &str) -> String {
    let composed: String = value.nfc().collect();
    composed.chars().filter(|c| !c.is_control()).collect::<String>().trim().to_string()
}

/// Split a normalized name into word tokens, trimming punctuation from the
/// token edges. Tokens that are punctuation only are dropped.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|token| token.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}
