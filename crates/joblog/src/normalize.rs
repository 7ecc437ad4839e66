//! Text normalization shared by the parser, discovery and suggestions.
//!
//! Normalized text is lower-cased with diacritics removed, so `"Pérez"` and
//! `"PEREZ"` compare equal. Everything that matches vocabulary against input
//! goes through [`normalize`] on both sides.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Lower-cases `text`, strips combining marks and recomposes the result.
///
/// Idempotent: `normalize(&normalize(s)) == normalize(s)`.
pub fn normalize(text: &str) -> String {
    let lowered = text.to_lowercase();
    let stripped: String = lowered.nfd().filter(|c| !is_combining_mark(*c)).collect();
    stripped.nfc().collect()
}

/// Splits normalized text into tokens on anything that is not alphanumeric.
pub fn tokenize(text: &str) -> Vec<String> {
    normalize(text)
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Returns true if `c` counts as part of a word for boundary checks.
pub fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}
