//! Vocabulary suggestions for records that failed to verify.
//!
//! When a record is saved as NeedsReview, the first token of its text that the
//! template does not know is classified in the background. A confident
//! prediction becomes a pending [`TemplateSuggestion`](crate::model::TemplateSuggestion)
//! that a person can accept into the template or reject.

pub mod job;
pub mod worker;

use std::collections::HashSet;

use crate::normalize::tokenize;

pub use job::{SuggestionJob, SuggestionOutcome};
pub use worker::SuggestionEngine;

/// Shortest token, in characters, considered as a suggestion term.
pub const MIN_TERM_CHARS: usize = 4;

/// First token of `text`, left to right, with at least `min_chars`
/// characters that is not part of `vocabulary`.
///
/// Vocabulary entries may span several words; each of their tokens counts as
/// known.
pub fn first_unknown_token(
    text: &str,
    vocabulary: &HashSet<String>,
    min_chars: usize,
) -> Option<String> {
    let known: HashSet<String> = vocabulary.iter().flat_map(|term| tokenize(term)).collect();
    tokenize(text)
        .into_iter()
        .find(|token| token.chars().count() >= min_chars && !known.contains(token))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vocab(terms: &[&str]) -> HashSet<String> {
        terms.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_first_unknown_token() {
        let cases: &[(&str, &[&str], Option<&str>)] = &[
            ("trabajo para Pedro", &["trabajo"], Some("para")),
            ("trabajo para Pedro", &["trabajo", "para"], Some("pedro")),
            ("con la de", &[], None),
            ("Poda en Campo Norte", &["campo norte", "poda"], None),
            ("Cosecha de limón", &["cosecha"], Some("limon")),
            ("", &["x"], None),
        ];

        for (text, known, expected) in cases {
            assert_eq!(
                first_unknown_token(text, &vocab(known), MIN_TERM_CHARS).as_deref(),
                *expected,
                "text: {}",
                text
            );
        }
    }

    #[test]
    fn test_min_chars_is_respected() {
        let vocabulary = vocab(&[]);
        assert_eq!(
            first_unknown_token("sol luna", &vocabulary, 4).as_deref(),
            Some("luna")
        );
        assert_eq!(
            first_unknown_token("sol luna", &vocabulary, 3).as_deref(),
            Some("sol")
        );
    }
}
