//! Entity-type classification for discovered and suggested terms.
//!
//! Discovery and the suggestion engine only depend on the
//! [`EntityClassifier`] trait. The bundled implementation is a lexicon loaded
//! from a checksum-verified JSON asset; [`NullClassifier`] is used when no
//! asset is configured.

pub mod lexicon;
pub mod model_manager;

use std::sync::Arc;

use thiserror::Error;

use crate::model::EntityType;

pub use lexicon::{Lexicon, LexiconClassifier, LexiconTerm, SuffixHint};
pub use model_manager::{ModelError, ModelManager};

/// Errors from a classifier call.
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("Classifier is unavailable: {0}")]
    Unavailable(String),

    #[error("Classification failed for '{term}': {reason}")]
    Inference { term: String, reason: String },
}

/// A predicted entity type with its confidence in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub entity_type: EntityType,
    pub confidence: f64,
}

/// Predicts the entity type of a term seen in some context.
///
/// Implementations must be callable from the background suggestion worker.
/// `Ok(None)` means the classifier has no opinion.
pub trait EntityClassifier: Send + Sync {
    fn classify(&self, term: &str, context: &str)
        -> Result<Option<Classification>, ClassifierError>;
}

impl<T: EntityClassifier + ?Sized> EntityClassifier for Arc<T> {
    fn classify(
        &self,
        term: &str,
        context: &str,
    ) -> Result<Option<Classification>, ClassifierError> {
        (**self).classify(term, context)
    }
}

/// Classifier that never has an opinion.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullClassifier;

impl EntityClassifier for NullClassifier {
    fn classify(
        &self,
        _term: &str,
        _context: &str,
    ) -> Result<Option<Classification>, ClassifierError> {
        Ok(None)
    }
}

/// Classifies `term` and keeps the prediction only if it reaches
/// `min_confidence`. Errors are logged and treated as "no opinion".
pub(crate) fn confident_type(
    classifier: &dyn EntityClassifier,
    term: &str,
    context: &str,
    min_confidence: f64,
) -> Option<Classification> {
    match classifier.classify(term, context) {
        Ok(Some(c)) if c.confidence >= min_confidence => Some(c),
        Ok(_) => None,
        Err(e) => {
            log::warn!("Classifier failed for '{}': {}", term, e);
            None
        }
    }
}
