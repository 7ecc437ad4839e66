use std::sync::Arc;

use log::trace;
use thiserror::Error;

use crate::model::{
    EntityDefinition, MatchStrategy, ParsedItem, RecordStatus, WorkTemplate,
};
use crate::normalize::{is_word_char, normalize};

use super::PatternCache;

/// Confidence for a keyword hit.
pub const KEYWORD_CONFIDENCE: f64 = 1.0;
/// Confidence for a synonym hit.
pub const SYNONYM_CONFIDENCE: f64 = 0.9;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Failed to compile pattern for term '{term}': {reason}")]
    Pattern { term: String, reason: String },
}

/// Result of parsing one input against one template.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseOutcome {
    pub items: Vec<ParsedItem>,
    pub status: RecordStatus,
    /// Labels of required entities that had no match.
    pub missing_required: Vec<String>,
}

impl ParseOutcome {
    fn unstructured() -> Self {
        Self {
            items: Vec::new(),
            status: RecordStatus::Unstructured,
            missing_required: Vec::new(),
        }
    }
}

/// Builds the regex for one normalized term.
///
/// Word-character ends get a `\b` boundary; an end that is punctuation is
/// matched literally. Number-capturing terms accept whitespace and one `:` or
/// `=` between the term and the number.
pub fn term_pattern(term: &str, strategy: MatchStrategy) -> String {
    let escaped = regex::escape(term);
    let lead = if term.chars().next().is_some_and(is_word_char) {
        r"\b"
    } else {
        ""
    };
    let trail = if term.chars().next_back().is_some_and(is_word_char) {
        r"\b"
    } else {
        ""
    };
    match strategy {
        MatchStrategy::Term => format!("{lead}{escaped}{trail}"),
        MatchStrategy::TermWithNumber => {
            format!(r"{lead}{escaped}{trail}\s*[:=]?\s*(\d+(?:[.,]\d+)?)")
        }
    }
}

/// Stateless parser over a shared pattern cache. Cheap to clone and safe to
/// call from many threads.
#[derive(Clone)]
pub struct ParsingEngine {
    cache: Arc<PatternCache>,
}

impl ParsingEngine {
    /// Engine backed by the process-wide pattern cache.
    pub fn new() -> Self {
        Self::with_cache(PatternCache::global())
    }

    pub fn with_cache(cache: Arc<PatternCache>) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &PatternCache {
        &self.cache
    }

    /// Matches `template`'s vocabulary against `input`.
    ///
    /// Required entities are tried first, in declared order. Within an entity
    /// keywords are tried before synonyms and the first hit wins.
    pub fn parse(&self, input: &str, template: &WorkTemplate) -> Result<ParseOutcome, ParseError> {
        if input.trim().is_empty() {
            return Ok(ParseOutcome::unstructured());
        }

        let text = normalize(input);
        let mut ordered: Vec<&EntityDefinition> = template.entities().iter().collect();
        ordered.sort_by_key(|e| !e.is_required());

        let mut items = Vec::new();
        let mut missing_required = Vec::new();

        for entity in ordered {
            match self.match_entity(&text, entity)? {
                Some(item) => {
                    trace!(
                        "Entity '{}' matched '{}' at {}",
                        entity.label(),
                        item.value(),
                        item.position()
                    );
                    items.push(item);
                }
                None if entity.is_required() => missing_required.push(entity.label().to_string()),
                None => {}
            }
        }

        let status = if missing_required.is_empty() {
            RecordStatus::Verified
        } else {
            RecordStatus::NeedsReview
        };

        Ok(ParseOutcome {
            items,
            status,
            missing_required,
        })
    }

    fn match_entity(
        &self,
        text: &str,
        entity: &EntityDefinition,
    ) -> Result<Option<ParsedItem>, ParseError> {
        let strategy = entity.entity_type().match_strategy();
        let candidates = entity
            .keywords()
            .iter()
            .map(|t| (t, KEYWORD_CONFIDENCE))
            .chain(entity.synonyms().iter().map(|t| (t, SYNONYM_CONFIDENCE)));

        for (term, confidence) in candidates {
            let regex = self
                .cache
                .get_or_compile(&term_pattern(term, strategy))
                .map_err(|e| ParseError::Pattern {
                    term: term.clone(),
                    reason: e.to_string(),
                })?;

            let Some(caps) = regex.captures(text) else {
                continue;
            };
            let Some(whole) = caps.get(0) else {
                continue;
            };
            let value = match strategy {
                MatchStrategy::Term => whole.as_str().to_string(),
                MatchStrategy::TermWithNumber => match caps.get(1) {
                    Some(number) => number.as_str().to_string(),
                    None => continue,
                },
            };
            let position = text[..whole.start()].chars().count();

            // Labels are validated non-blank and both confidences are in range.
            if let Ok(item) = ParsedItem::new(entity.label(), value, confidence, position) {
                return Ok(Some(item));
            }
        }

        Ok(None)
    }
}

impl Default for ParsingEngine {
    fn default() -> Self {
        Self::new()
    }
}
