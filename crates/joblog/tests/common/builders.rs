//! Builders for test data.

#![allow(dead_code)]

use std::collections::HashMap;

use joblog::classifier::{Classification, ClassifierError, EntityClassifier};
use joblog::config::JoblogConfig;
use joblog::model::{EntityDefinition, EntityType, WorkTemplate};

/// Builder for `WorkTemplate` instances.
pub struct TemplateBuilder {
    name: String,
    entities: Vec<EntityDefinition>,
}

impl TemplateBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entities: Vec::new(),
        }
    }

    /// Add a required entity with the given keywords.
    pub fn required(self, label: &str, entity_type: EntityType, keywords: &[&str]) -> Self {
        self.entity(label, entity_type, keywords, &[], true)
    }

    /// Add an optional entity with the given keywords.
    pub fn optional(self, label: &str, entity_type: EntityType, keywords: &[&str]) -> Self {
        self.entity(label, entity_type, keywords, &[], false)
    }

    pub fn entity(
        mut self,
        label: &str,
        entity_type: EntityType,
        keywords: &[&str],
        synonyms: &[&str],
        required: bool,
    ) -> Self {
        let mut entity = EntityDefinition::new(label, entity_type)
            .expect("valid label")
            .required(required);
        for keyword in keywords {
            entity = entity.keyword(keyword);
        }
        for synonym in synonyms {
            entity = entity.synonym(synonym);
        }
        self.entities.push(entity);
        self
    }

    pub fn build(self) -> WorkTemplate {
        let mut template = WorkTemplate::new(self.name).expect("valid template name");
        for entity in self.entities {
            template.add_entity(entity).expect("unique labels");
        }
        template
    }
}

/// The template from the parsing scenarios: required `Cliente`, optional
/// `Cantidad`.
pub fn client_quantity_template() -> WorkTemplate {
    TemplateBuilder::new("Trabajos")
        .required("Cliente", EntityType::Client, &["cliente"])
        .optional("Cantidad", EntityType::Quantity, &["cantidad"])
        .build()
}

/// Builder for `JoblogConfig` instances pointing at a test directory.
pub struct ConfigBuilder {
    config: JoblogConfig,
}

impl ConfigBuilder {
    pub fn new(data_directory: &str) -> Self {
        let mut config = JoblogConfig::default();
        config.data_directory = data_directory.to_string();
        Self { config }
    }

    pub fn learning_threshold(mut self, threshold: usize) -> Self {
        self.config.learning_threshold = threshold;
        self
    }

    pub fn suggestion_confidence(mut self, min_confidence: f64) -> Self {
        self.config.suggestions.min_confidence = min_confidence;
        self
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.suggestions.queue_capacity = capacity;
        self
    }

    pub fn build(self) -> JoblogConfig {
        self.config
    }
}

/// Classifier answering from a fixed term table.
#[derive(Default)]
pub struct TableClassifier {
    terms: HashMap<String, Classification>,
}

impl TableClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn term(mut self, term: &str, entity_type: EntityType, confidence: f64) -> Self {
        self.terms.insert(
            term.to_string(),
            Classification {
                entity_type,
                confidence,
            },
        );
        self
    }
}

impl EntityClassifier for TableClassifier {
    fn classify(
        &self,
        term: &str,
        _context: &str,
    ) -> Result<Option<Classification>, ClassifierError> {
        Ok(self.terms.get(term).copied())
    }
}
