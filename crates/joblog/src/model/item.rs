use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// One value extracted from a record's text for a template entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawParsedItem")]
pub struct ParsedItem {
    entity_label: String,
    value: String,
    confidence: f64,
    position: usize,
}

impl ParsedItem {
    /// Creates an item, rejecting blank labels and confidences outside [0, 1].
    pub fn new(
        entity_label: impl Into<String>,
        value: impl Into<String>,
        confidence: f64,
        position: usize,
    ) -> Result<Self, ValidationError> {
        let entity_label = entity_label.into();
        if entity_label.trim().is_empty() {
            return Err(ValidationError::BlankLabel);
        }
        if !(0.0..=1.0).contains(&confidence) {
            return Err(ValidationError::ConfidenceOutOfRange(confidence));
        }
        Ok(Self {
            entity_label,
            value: value.into(),
            confidence,
            position,
        })
    }

    pub fn entity_label(&self) -> &str {
        &self.entity_label
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    /// Character offset of the match start in the normalized input.
    pub fn position(&self) -> usize {
        self.position
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawParsedItem {
    entity_label: String,
    value: String,
    confidence: f64,
    position: usize,
}

impl TryFrom<RawParsedItem> for ParsedItem {
    type Error = ValidationError;

    fn try_from(raw: RawParsedItem) -> Result<Self, Self::Error> {
        ParsedItem::new(raw.entity_label, raw.value, raw.confidence, raw.position)
    }
}
