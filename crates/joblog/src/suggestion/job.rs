use chrono::{DateTime, Utc};

use crate::model::{JobRecordEntry, TemplateSuggestion};

/// A NeedsReview record queued for vocabulary suggestion.
#[derive(Debug, Clone)]
pub struct SuggestionJob {
    pub record_id: String,
    pub template_id: String,
    pub original_input: String,
    pub queued_at: DateTime<Utc>,
}

impl SuggestionJob {
    /// Builds a job from a parsed record. Returns `None` when the record has
    /// no template to extend.
    pub fn for_record(record: &JobRecordEntry) -> Option<Self> {
        let template_id = record.template_id()?;
        Some(Self {
            record_id: record.id().to_string(),
            template_id: template_id.to_string(),
            original_input: record.original_input().to_string(),
            queued_at: Utc::now(),
        })
    }
}

/// What the worker did with one job.
#[derive(Debug, Clone, PartialEq)]
pub enum SuggestionOutcome {
    /// A pending suggestion was persisted.
    Created(TemplateSuggestion),
    /// Every token of the input is already in the vocabulary.
    NoCandidate { record_id: String },
    /// The classifier had no prediction at or above the threshold.
    LowConfidence {
        record_id: String,
        term: String,
        confidence: Option<f64>,
    },
    /// The source record was deleted or its job cancelled.
    Stale { record_id: String },
    Failed { record_id: String, reason: String },
}

impl SuggestionOutcome {
    pub fn record_id(&self) -> &str {
        match self {
            Self::Created(s) => &s.source_record_id,
            Self::NoCandidate { record_id }
            | Self::LowConfidence { record_id, .. }
            | Self::Stale { record_id }
            | Self::Failed { record_id, .. } => record_id,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}
