//! Phonetic codes for name tokens.

use once_cell::sync::Lazy;
use rphonetic::{Encoder, Metaphone};

static METAPHONE: Lazy<Metaphone> = Lazy::new(|| Metaphone::new(None));

/// Compute the Metaphone code of a token.
///
/// Tokens of a single character, or containing anything but ASCII letters,
/// carry no useful phonetic signal and yield `None`.
pub fn phonetic_code(token: &str) -> Option<String> {
    if token.chars().count() < 2 {
        return None;
    }
    if !token.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    let code = METAPHONE.encode(token);
    if code.is_empty() {
        None
    } else {
        Some(code)
    }
}
