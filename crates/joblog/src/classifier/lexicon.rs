//! Lexicon-backed entity classifier.
//!
//! The lexicon is a JSON asset:
//!
//! ```json
//! {
//!   "terms": [{ "term": "tractor", "entityType": "product", "confidence": 0.95 }],
//!   "suffixes": [{ "suffix": "ería", "entityType": "location", "confidence": 0.8 }]
//! }
//! ```
//!
//! Exact terms win over suffix hints; among suffixes the longest match wins.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::model::EntityType;
use crate::normalize::normalize;

use super::model_manager::{ModelError, ModelManager};
use super::{Classification, ClassifierError, EntityClassifier};

/// Confidence for quantity guesses made from the surrounding text.
const NUMBER_CONTEXT_CONFIDENCE: f64 = 0.8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LexiconTerm {
    pub term: String,
    pub entity_type: EntityType,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuffixHint {
    pub suffix: String,
    pub entity_type: EntityType,
    pub confidence: f64,
}

/// Raw lexicon as stored in the asset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Lexicon {
    #[serde(default)]
    pub terms: Vec<LexiconTerm>,
    #[serde(default)]
    pub suffixes: Vec<SuffixHint>,
}

/// Classifies terms by exact lexicon lookup, then by suffix, then by whether
/// the term is followed by a number in its context.
#[derive(Debug, Clone)]
pub struct LexiconClassifier {
    terms: HashMap<String, Classification>,
    /// Sorted longest suffix first.
    suffixes: Vec<(String, Classification)>,
}

impl LexiconClassifier {
    /// Loads the lexicon through `manager`, which verifies the asset first.
    pub fn load(manager: &ModelManager) -> Result<Self, ModelError> {
        let bytes = manager.read_verified()?;
        let lexicon: Lexicon =
            serde_json::from_slice(&bytes).map_err(|e| ModelError::InvalidAsset {
                path: manager.asset_path().to_path_buf(),
                reason: e.to_string(),
            })?;
        Ok(Self::from_lexicon(lexicon))
    }

    pub fn from_lexicon(lexicon: Lexicon) -> Self {
        let terms = lexicon
            .terms
            .into_iter()
            .map(|t| {
                (
                    normalize(t.term.trim()),
                    Classification {
                        entity_type: t.entity_type,
                        confidence: t.confidence.clamp(0.0, 1.0),
                    },
                )
            })
            .filter(|(term, _)| !term.is_empty())
            .collect();

        let mut suffixes: Vec<(String, Classification)> = lexicon
            .suffixes
            .into_iter()
            .map(|s| {
                (
                    normalize(s.suffix.trim()),
                    Classification {
                        entity_type: s.entity_type,
                        confidence: s.confidence.clamp(0.0, 1.0),
                    },
                )
            })
            .filter(|(suffix, _)| !suffix.is_empty())
            .collect();
        suffixes.sort_by(|a, b| {
            b.0.chars()
                .count()
                .cmp(&a.0.chars().count())
                .then_with(|| a.0.cmp(&b.0))
        });

        Self { terms, suffixes }
    }

    pub fn term_count(&self) -> usize {
        self.terms.len()
    }

    fn followed_by_number(term: &str, context: &str) -> bool {
        let context = normalize(context);
        let mut rest = context.as_str();
        while let Some(idx) = rest.find(term) {
            let after = rest[idx + term.len()..]
                .trim_start_matches(|c: char| c.is_whitespace() || c == ':' || c == '=');
            if after.starts_with(|c: char| c.is_ascii_digit()) {
                return true;
            }
            rest = &rest[idx + term.len()..];
        }
        false
    }
}

impl EntityClassifier for LexiconClassifier {
    fn classify(
        &self,
        term: &str,
        context: &str,
    ) -> Result<Option<Classification>, ClassifierError> {
        let term = normalize(term.trim());
        if term.is_empty() {
            return Err(ClassifierError::Inference {
                term,
                reason: "blank term".to_string(),
            });
        }

        if let Some(found) = self.terms.get(&term) {
            return Ok(Some(*found));
        }

        if let Some((_, found)) = self
            .suffixes
            .iter()
            .find(|(suffix, _)| term.len() > suffix.len() && term.ends_with(suffix.as_str()))
        {
            return Ok(Some(*found));
        }

        if Self::followed_by_number(&term, context) {
            return Ok(Some(Classification {
                entity_type: EntityType::Quantity,
                confidence: NUMBER_CONTEXT_CONFIDENCE,
            }));
        }

        Ok(None)
    }
}
