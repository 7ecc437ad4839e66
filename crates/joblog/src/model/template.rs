use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;
use crate::normalize::normalize;

/// Kind of field an entity captures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Client,
    Product,
    Caliber,
    Quantity,
    Location,
    Other,
}

/// How the parser matches an entity's terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStrategy {
    /// The term alone is the value.
    Term,
    /// The term must be followed by a number, which becomes the value.
    TermWithNumber,
}

impl EntityType {
    pub const ALL: [EntityType; 6] = [
        Self::Client,
        Self::Product,
        Self::Caliber,
        Self::Quantity,
        Self::Location,
        Self::Other,
    ];

    pub fn match_strategy(&self) -> MatchStrategy {
        match self {
            Self::Quantity => MatchStrategy::TermWithNumber,
            Self::Client | Self::Product | Self::Caliber | Self::Location | Self::Other => {
                MatchStrategy::Term
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Product => "product",
            Self::Caliber => "caliber",
            Self::Quantity => "quantity",
            Self::Location => "location",
            Self::Other => "other",
        }
    }

    /// Label used when an entity has to be created for this type.
    pub fn default_label(&self) -> &'static str {
        match self {
            Self::Client => "Client",
            Self::Product => "Product",
            Self::Caliber => "Caliber",
            Self::Quantity => "Quantity",
            Self::Location => "Location",
            Self::Other => "Other",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ValidationError::UnknownVariant {
                kind: "entity type",
                value: s.to_string(),
            })
    }
}

/// One field a template recognizes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawEntityDefinition")]
pub struct EntityDefinition {
    id: String,
    label: String,
    entity_type: EntityType,
    keywords: Vec<String>,
    synonyms: Vec<String>,
    is_required: bool,
}

impl EntityDefinition {
    pub fn new(label: impl Into<String>, entity_type: EntityType) -> Result<Self, ValidationError> {
        let label = label.into().trim().to_string();
        if label.is_empty() {
            return Err(ValidationError::BlankLabel);
        }
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            label,
            entity_type,
            keywords: Vec::new(),
            synonyms: Vec::new(),
            is_required: false,
        })
    }

    pub fn keyword(mut self, term: &str) -> Self {
        self.add_keyword(term);
        self
    }

    pub fn synonym(mut self, term: &str) -> Self {
        self.add_synonym(term);
        self
    }

    pub fn required(mut self, is_required: bool) -> Self {
        self.is_required = is_required;
        self
    }

    /// Adds a normalized keyword. Returns false for blanks and duplicates.
    pub fn add_keyword(&mut self, term: &str) -> bool {
        push_term(&mut self.keywords, term)
    }

    /// Adds a normalized synonym. Returns false for blanks and duplicates.
    pub fn add_synonym(&mut self, term: &str) -> bool {
        push_term(&mut self.synonyms, term)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    pub fn synonyms(&self) -> &[String] {
        &self.synonyms
    }

    pub fn is_required(&self) -> bool {
        self.is_required
    }

    /// True if `term` (normalized) is already a keyword or synonym.
    pub fn knows(&self, term: &str) -> bool {
        let term = normalize(term.trim());
        self.keywords.contains(&term) || self.synonyms.contains(&term)
    }
}

fn push_term(terms: &mut Vec<String>, term: &str) -> bool {
    let term = normalize(term.trim());
    if term.is_empty() || terms.contains(&term) {
        return false;
    }
    terms.push(term);
    true
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEntityDefinition {
    id: String,
    label: String,
    entity_type: EntityType,
    #[serde(default)]
    keywords: Vec<String>,
    #[serde(default)]
    synonyms: Vec<String>,
    #[serde(default)]
    is_required: bool,
}

impl TryFrom<RawEntityDefinition> for EntityDefinition {
    type Error = ValidationError;

    fn try_from(raw: RawEntityDefinition) -> Result<Self, Self::Error> {
        let mut entity = EntityDefinition::new(raw.label, raw.entity_type)?.required(raw.is_required);
        entity.id = raw.id;
        for keyword in &raw.keywords {
            entity.add_keyword(keyword);
        }
        for synonym in &raw.synonyms {
            entity.add_synonym(synonym);
        }
        Ok(entity)
    }
}

/// A named vocabulary of entities used to structure raw text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkTemplate {
    pub id: String,
    pub name: String,
    entities: Vec<EntityDefinition>,
    pub created_at: DateTime<Utc>,
    pub last_used: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub usage_count: u64,
}

impl WorkTemplate {
    pub fn new(name: impl Into<String>) -> Result<Self, ValidationError> {
        let name = name.into().trim().to_string();
        if name.is_empty() {
            return Err(ValidationError::BlankTemplateName);
        }
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            name,
            entities: Vec::new(),
            created_at: Utc::now(),
            last_used: None,
            is_active: false,
            usage_count: 0,
        })
    }

    /// Rebuilds a template from persisted columns.
    pub(crate) fn from_parts(
        id: String,
        name: String,
        entities: Vec<EntityDefinition>,
        created_at: DateTime<Utc>,
        last_used: Option<DateTime<Utc>>,
        is_active: bool,
        usage_count: u64,
    ) -> Self {
        Self {
            id,
            name,
            entities,
            created_at,
            last_used,
            is_active,
            usage_count,
        }
    }

    /// Builder form of [`WorkTemplate::add_entity`].
    pub fn with_entity(mut self, entity: EntityDefinition) -> Result<Self, ValidationError> {
        self.add_entity(entity)?;
        Ok(self)
    }

    /// Adds an entity; labels are unique ignoring case.
    pub fn add_entity(&mut self, entity: EntityDefinition) -> Result<(), ValidationError> {
        if self.entity_by_label(entity.label()).is_some() {
            return Err(ValidationError::DuplicateLabel(entity.label().to_string()));
        }
        self.entities.push(entity);
        Ok(())
    }

    pub fn entities(&self) -> &[EntityDefinition] {
        &self.entities
    }

    pub fn entity_by_label(&self, label: &str) -> Option<&EntityDefinition> {
        let wanted = normalize(label.trim());
        self.entities
            .iter()
            .find(|e| normalize(e.label()) == wanted)
    }

    /// Every keyword and synonym across all entities, normalized.
    pub fn vocabulary(&self) -> HashSet<String> {
        self.entities
            .iter()
            .flat_map(|e| e.keywords().iter().chain(e.synonyms().iter()))
            .cloned()
            .collect()
    }

    /// Adds `term` as a keyword to the first entity of `entity_type`, creating
    /// an optional entity for that type when none exists. Returns the label of
    /// the entity that received the term.
    pub fn merge_keyword(
        &mut self,
        term: &str,
        entity_type: EntityType,
    ) -> Result<String, ValidationError> {
        if let Some(entity) = self
            .entities
            .iter_mut()
            .find(|e| e.entity_type() == entity_type)
        {
            entity.add_keyword(term);
            return Ok(entity.label().to_string());
        }

        let mut label = entity_type.default_label().to_string();
        let mut suffix = 2;
        while self.entity_by_label(&label).is_some() {
            label = format!("{} {}", entity_type.default_label(), suffix);
            suffix += 1;
        }
        let entity = EntityDefinition::new(label.clone(), entity_type)?.keyword(term);
        self.add_entity(entity)?;
        Ok(label)
    }

    /// Counts one successful parse against this template.
    pub fn record_usage(&mut self, at: DateTime<Utc>) {
        self.usage_count += 1;
        self.last_used = Some(at);
    }
}
