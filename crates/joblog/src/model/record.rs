use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;
use crate::parser::ParseOutcome;

use super::ParsedItem;

/// Lifecycle state of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordStatus {
    /// Saved as raw text, never parsed against a template.
    Unstructured,
    /// Parsed, but at least one required entity is missing.
    NeedsReview,
    /// Every required entity was found (or a person corrected it).
    Verified,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unstructured => "unstructured",
            Self::NeedsReview => "needs_review",
            Self::Verified => "verified",
        }
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unstructured" => Ok(Self::Unstructured),
            "needs_review" => Ok(Self::NeedsReview),
            "verified" => Ok(Self::Verified),
            other => Err(ValidationError::UnknownVariant {
                kind: "record status",
                value: other.to_string(),
            }),
        }
    }
}

/// One work-log submission.
///
/// `original_input` and `timestamp` are fixed at construction and have no
/// setters. The timestamp also decides which monthly partition holds the
/// record, so it can never move between files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawJobRecordEntry")]
pub struct JobRecordEntry {
    id: String,
    original_input: String,
    timestamp: DateTime<Utc>,
    template_id: Option<String>,
    parsed_items: Vec<ParsedItem>,
    status: RecordStatus,
    last_modified: DateTime<Utc>,
    retry_count: u32,
}

impl JobRecordEntry {
    /// Creates an unstructured record stamped with the current time.
    pub fn new(original_input: impl Into<String>) -> Result<Self, ValidationError> {
        Self::with_timestamp(original_input, Utc::now())
    }

    /// Creates an unstructured record with an explicit creation instant.
    pub fn with_timestamp(
        original_input: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        let original_input = original_input.into();
        if original_input.trim().is_empty() {
            return Err(ValidationError::BlankInput);
        }
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            original_input,
            timestamp,
            template_id: None,
            parsed_items: Vec::new(),
            status: RecordStatus::Unstructured,
            last_modified: timestamp,
            retry_count: 0,
        })
    }

    /// Rebuilds a record from persisted columns.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        id: String,
        original_input: String,
        timestamp: DateTime<Utc>,
        template_id: Option<String>,
        parsed_items: Vec<ParsedItem>,
        status: RecordStatus,
        last_modified: DateTime<Utc>,
        retry_count: u32,
    ) -> Self {
        Self {
            id,
            original_input,
            timestamp,
            template_id,
            parsed_items,
            status,
            last_modified,
            retry_count,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn original_input(&self) -> &str {
        &self.original_input
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn template_id(&self) -> Option<&str> {
        self.template_id.as_deref()
    }

    pub fn parsed_items(&self) -> &[ParsedItem] {
        &self.parsed_items
    }

    pub fn status(&self) -> RecordStatus {
        self.status
    }

    pub fn last_modified(&self) -> DateTime<Utc> {
        self.last_modified
    }

    /// Number of times the record was re-parsed after its first parse.
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Replaces the parse result wholesale with `outcome` against `template_id`.
    pub fn apply_parse(&mut self, template_id: &str, outcome: &ParseOutcome) {
        if self.template_id.is_some() {
            self.retry_count += 1;
        }
        self.template_id = Some(template_id.to_string());
        self.parsed_items = outcome.items.clone();
        self.status = outcome.status;
        self.last_modified = Utc::now();
    }

    /// Stores a manual correction. Corrected records are always verified.
    pub fn apply_correction(
        &mut self,
        template_id: &str,
        items: Vec<ParsedItem>,
    ) -> Result<(), ValidationError> {
        if template_id.trim().is_empty() {
            return Err(ValidationError::VerifiedWithoutTemplate);
        }
        self.template_id = Some(template_id.to_string());
        self.parsed_items = items;
        self.status = RecordStatus::Verified;
        self.last_modified = Utc::now();
        Ok(())
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawJobRecordEntry {
    id: String,
    original_input: String,
    timestamp: DateTime<Utc>,
    template_id: Option<String>,
    #[serde(default)]
    parsed_items: Vec<ParsedItem>,
    status: RecordStatus,
    last_modified: DateTime<Utc>,
    #[serde(default)]
    retry_count: u32,
}

impl TryFrom<RawJobRecordEntry> for JobRecordEntry {
    type Error = ValidationError;

    fn try_from(raw: RawJobRecordEntry) -> Result<Self, Self::Error> {
        if raw.original_input.trim().is_empty() {
            return Err(ValidationError::BlankInput);
        }
        let has_template = raw
            .template_id
            .as_deref()
            .is_some_and(|id| !id.trim().is_empty());
        if raw.status == RecordStatus::Verified && !has_template {
            return Err(ValidationError::VerifiedWithoutTemplate);
        }
        Ok(Self::from_parts(
            raw.id,
            raw.original_input,
            raw.timestamp,
            raw.template_id,
            raw.parsed_items,
            raw.status,
            raw.last_modified,
            raw.retry_count,
        ))
    }
}
