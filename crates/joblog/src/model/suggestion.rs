use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

use super::EntityType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SuggestionStatus {
    Pending,
    Accepted,
    Rejected,
}

impl SuggestionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for SuggestionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SuggestionStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "accepted" => Ok(Self::Accepted),
            "rejected" => Ok(Self::Rejected),
            other => Err(ValidationError::UnknownVariant {
                kind: "suggestion status",
                value: other.to_string(),
            }),
        }
    }
}

/// A proposed vocabulary extension waiting for a person to accept or reject it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateSuggestion {
    pub id: String,
    pub template_id: String,
    pub suggested_term: String,
    pub suggested_entity_type: EntityType,
    pub confidence: f64,
    pub source_record_id: String,
    /// Raw text of the record that produced the suggestion.
    pub context: String,
    pub created_at: DateTime<Utc>,
    status: SuggestionStatus,
}

impl TemplateSuggestion {
    pub fn new(
        template_id: impl Into<String>,
        suggested_term: impl Into<String>,
        suggested_entity_type: EntityType,
        confidence: f64,
        source_record_id: impl Into<String>,
        context: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(ValidationError::ConfidenceOutOfRange(confidence));
        }
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            template_id: template_id.into(),
            suggested_term: suggested_term.into(),
            suggested_entity_type,
            confidence,
            source_record_id: source_record_id.into(),
            context: context.into(),
            created_at: Utc::now(),
            status: SuggestionStatus::Pending,
        })
    }

    pub(crate) fn with_status(mut self, status: SuggestionStatus) -> Self {
        self.status = status;
        self
    }

    pub fn status(&self) -> SuggestionStatus {
        self.status
    }

    pub fn accept(&mut self) -> Result<(), ValidationError> {
        self.finalize(SuggestionStatus::Accepted)
    }

    pub fn reject(&mut self) -> Result<(), ValidationError> {
        self.finalize(SuggestionStatus::Rejected)
    }

    fn finalize(&mut self, to: SuggestionStatus) -> Result<(), ValidationError> {
        if self.status.is_terminal() {
            return Err(ValidationError::SuggestionFinalized {
                id: self.id.clone(),
                status: self.status.to_string(),
            });
        }
        self.status = to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TemplateSuggestion {
        TemplateSuggestion::new("tpl", "tractor", EntityType::Product, 0.8, "rec", "usar tractor")
            .unwrap()
    }

    #[test]
    fn test_new_suggestion_is_pending() {
        assert_eq!(sample().status(), SuggestionStatus::Pending);
    }

    #[test]
    fn test_accept_is_terminal() {
        let mut s = sample();
        s.accept().unwrap();
        assert_eq!(s.status(), SuggestionStatus::Accepted);
        assert!(s.reject().is_err());
        assert!(s.accept().is_err());
        assert_eq!(s.status(), SuggestionStatus::Accepted);
    }

    #[test]
    fn test_reject_is_terminal() {
        let mut s = sample();
        s.reject().unwrap();
        assert!(matches!(
            s.accept(),
            Err(ValidationError::SuggestionFinalized { .. })
        ));
    }

    #[test]
    fn test_confidence_validated() {
        assert!(
            TemplateSuggestion::new("t", "x", EntityType::Other, 1.5, "r", "c").is_err()
        );
    }
}
