//! Template discovery from unstructured history and the migration that
//! adopts a discovered template.
//!
//! While the application is in learning mode every entry is saved raw. Once
//! enough raw entries exist, the tokens that recur across many of them become
//! the entities of a draft template. Adopting the draft re-parses the whole
//! unstructured backlog inside one unit of work.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use log::{debug, info, warn};

use crate::classifier::{confident_type, EntityClassifier};
use crate::config::DiscoveryConfig;
use crate::error::{JoblogError, ValidationError};
use crate::model::{
    AppMode, AppSettings, EntityDefinition, EntityType, JobRecordEntry, RecordStatus, WorkTemplate,
};
use crate::normalize::tokenize;
use crate::parser::ParsingEngine;
use crate::store::{Store, UnitOfWork};

/// Name given to drafts produced by [`DiscoveryEngine::propose`].
pub const DISCOVERED_TEMPLATE_NAME: &str = "Discovered template";

/// True when the application is still learning and the unstructured backlog
/// has reached the threshold.
pub fn should_trigger(settings: &AppSettings, unstructured_count: usize) -> bool {
    settings.mode == AppMode::Learning && unstructured_count >= settings.learning_threshold
}

/// A recurring token and the number of distinct records containing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub term: String,
    pub document_frequency: usize,
}

/// Ranks tokens by document frequency over `records`.
///
/// A token qualifies when it has at least `min_token_len` characters and
/// appears in at least `min_document_ratio` of the records. The top
/// `max_candidates` are returned, ties broken alphabetically.
pub fn candidate_terms(records: &[JobRecordEntry], config: &DiscoveryConfig) -> Vec<Candidate> {
    let total = records.len();
    if total == 0 {
        return Vec::new();
    }

    let mut frequencies: HashMap<String, usize> = HashMap::new();
    for record in records {
        let distinct: HashSet<String> = tokenize(record.original_input())
            .into_iter()
            .filter(|t| t.chars().count() >= config.min_token_len)
            .collect();
        for token in distinct {
            *frequencies.entry(token).or_insert(0) += 1;
        }
    }

    let mut candidates: Vec<Candidate> = frequencies
        .into_iter()
        .filter(|(_, df)| *df as f64 / total as f64 >= config.min_document_ratio)
        .map(|(term, document_frequency)| Candidate {
            term,
            document_frequency,
        })
        .collect();
    candidates.sort_by(|a, b| {
        b.document_frequency
            .cmp(&a.document_frequency)
            .then_with(|| a.term.cmp(&b.term))
    });
    candidates.truncate(config.max_candidates);
    candidates
}

/// A candidate with the entity type discovery settled on.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedCandidate {
    pub term: String,
    pub document_frequency: usize,
    pub entity_type: EntityType,
    /// Classifier confidence, `None` when the type defaulted to Other.
    pub confidence: Option<f64>,
}

/// A draft template and how it was derived. Nothing is persisted.
#[derive(Debug, Clone)]
pub struct Proposal {
    pub template: WorkTemplate,
    pub candidates: Vec<ClassifiedCandidate>,
    pub records_analyzed: usize,
}

/// Progress of a template migration.
#[derive(Debug, Clone, PartialEq)]
pub enum MigrationEvent {
    Started {
        template_id: String,
        total: usize,
    },
    Reprocessed {
        index: usize,
        total: usize,
        record_id: String,
        status: RecordStatus,
    },
    Completed(MigrationSummary),
    RolledBack {
        processed: usize,
        reason: String,
    },
}

pub trait MigrationReporter: Send + Sync {
    fn report(&self, event: MigrationEvent);
}

/// No-op reporter.
pub struct NoopReporter;

impl MigrationReporter for NoopReporter {
    fn report(&self, _event: MigrationEvent) {}
}

/// Shared flag that cancels a running migration before its next record.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationSummary {
    pub template_id: String,
    pub migrated: usize,
    pub verified: usize,
    pub needs_review: usize,
}

pub struct DiscoveryEngine {
    config: DiscoveryConfig,
    min_confidence: f64,
    classifier: Arc<dyn EntityClassifier>,
    parser: ParsingEngine,
}

impl DiscoveryEngine {
    pub fn new(
        config: DiscoveryConfig,
        min_confidence: f64,
        classifier: Arc<dyn EntityClassifier>,
        parser: ParsingEngine,
    ) -> Self {
        Self {
            config,
            min_confidence,
            classifier,
            parser,
        }
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// Builds a draft template from `records`. Returns `None` when no token
    /// qualifies.
    pub fn propose(&self, records: &[JobRecordEntry]) -> Result<Option<Proposal>, ValidationError> {
        let candidates = candidate_terms(records, &self.config);
        if candidates.is_empty() {
            debug!(
                "No discovery candidates among {} unstructured records",
                records.len()
            );
            return Ok(None);
        }

        let tokenized: Vec<(HashSet<String>, &str)> = records
            .iter()
            .map(|r| {
                (
                    tokenize(r.original_input()).into_iter().collect(),
                    r.original_input(),
                )
            })
            .collect();

        let mut template = WorkTemplate::new(DISCOVERED_TEMPLATE_NAME)?;
        let mut classified = Vec::with_capacity(candidates.len());

        for candidate in candidates {
            let context = self.context_for(&candidate.term, &tokenized);
            let prediction = confident_type(
                self.classifier.as_ref(),
                &candidate.term,
                &context,
                self.min_confidence,
            );
            let entity_type = prediction.map_or(EntityType::Other, |c| c.entity_type);

            template.add_entity(
                EntityDefinition::new(capitalize(&candidate.term), entity_type)?
                    .keyword(&candidate.term),
            )?;
            debug!(
                "Discovered '{}' (df {}) as {}",
                candidate.term, candidate.document_frequency, entity_type
            );
            classified.push(ClassifiedCandidate {
                term: candidate.term,
                document_frequency: candidate.document_frequency,
                entity_type,
                confidence: prediction.map(|c| c.confidence),
            });
        }

        info!(
            "Proposed template with {} entities from {} records",
            classified.len(),
            records.len()
        );

        Ok(Some(Proposal {
            template,
            candidates: classified,
            records_analyzed: records.len(),
        }))
    }

    /// Raw text of the records containing `term`, joined and capped at
    /// `context_chars` characters.
    fn context_for(&self, term: &str, tokenized: &[(HashSet<String>, &str)]) -> String {
        let joined = tokenized
            .iter()
            .filter(|(tokens, _)| tokens.contains(term))
            .map(|(_, text)| *text)
            .collect::<Vec<_>>()
            .join("\n");
        joined.chars().take(self.config.context_chars).collect()
    }

    /// Adopts `template` and re-parses every unstructured record with it, as
    /// one unit of work.
    ///
    /// Any previously active template is deactivated, the template is saved
    /// as active, each record gets the new parse result, and settings switch
    /// to structured mode. If anything fails, or `cancel` is raised, every
    /// change is rolled back.
    pub fn migrate(
        &self,
        store: &Store,
        template: WorkTemplate,
        reporter: &dyn MigrationReporter,
        cancel: &CancelFlag,
    ) -> Result<MigrationSummary, JoblogError> {
        let template_id = template.id.clone();
        self.run_migration(store, &template_id, reporter, cancel, move |_| Ok(template))
    }

    /// Same as [`migrate`](Self::migrate) for a template already in the
    /// store. The template is read inside the unit of work, so concurrent
    /// vocabulary changes are never overwritten.
    pub fn migrate_to_stored(
        &self,
        store: &Store,
        template_id: &str,
        reporter: &dyn MigrationReporter,
        cancel: &CancelFlag,
    ) -> Result<MigrationSummary, JoblogError> {
        self.run_migration(store, template_id, reporter, cancel, |uow| {
            uow.get_template(template_id)?
                .ok_or_else(|| JoblogError::TemplateNotFound {
                    id: template_id.to_string(),
                })
        })
    }

    fn run_migration<L>(
        &self,
        store: &Store,
        template_id: &str,
        reporter: &dyn MigrationReporter,
        cancel: &CancelFlag,
        load: L,
    ) -> Result<MigrationSummary, JoblogError>
    where
        L: FnOnce(&UnitOfWork<'_>) -> Result<WorkTemplate, JoblogError>,
    {
        let span = tracing::info_span!("migration", template_id = %template_id);
        let _enter = span.enter();

        let mut processed = 0;
        let result = store.transaction(|uow| -> Result<MigrationSummary, JoblogError> {
            let mut template = load(&*uow)?;
            let mut records = uow.records_by_status(RecordStatus::Unstructured)?;
            records.reverse();
            let total = records.len();
            reporter.report(MigrationEvent::Started {
                template_id: template.id.clone(),
                total,
            });

            template.is_active = true;
            uow.deactivate_templates()?;
            uow.save_template(&template)?;

            let mut summary = MigrationSummary {
                template_id: template.id.clone(),
                migrated: 0,
                verified: 0,
                needs_review: 0,
            };

            for (index, mut record) in records.into_iter().enumerate() {
                if cancel.is_cancelled() {
                    return Err(JoblogError::MigrationCancelled { processed });
                }

                let outcome = self.parser.parse(record.original_input(), &template).map_err(|e| {
                    JoblogError::ParseFailed {
                        template_id: template.id.clone(),
                        input: record.original_input().to_string(),
                        reason: e.to_string(),
                    }
                })?;
                record.apply_parse(&template.id, &outcome);
                if !uow.update_record(&record)? {
                    return Err(JoblogError::RecordNotFound {
                        id: record.id().to_string(),
                    });
                }

                match outcome.status {
                    RecordStatus::Verified => {
                        template.record_usage(Utc::now());
                        summary.verified += 1;
                    }
                    RecordStatus::NeedsReview => summary.needs_review += 1,
                    RecordStatus::Unstructured => {}
                }
                summary.migrated += 1;
                processed = index + 1;

                reporter.report(MigrationEvent::Reprocessed {
                    index: index + 1,
                    total,
                    record_id: record.id().to_string(),
                    status: outcome.status,
                });
            }

            uow.save_template(&template)?;

            let mut settings = uow.load_settings()?;
            settings.mode = AppMode::Structured;
            settings.active_template_id = Some(template.id.clone());
            settings.first_launch = false;
            uow.save_settings(&settings)?;

            Ok(summary)
        });

        match result {
            Ok(summary) => {
                info!(
                    "Migrated {} records ({} verified, {} need review)",
                    summary.migrated, summary.verified, summary.needs_review
                );
                reporter.report(MigrationEvent::Completed(summary.clone()));
                Ok(summary)
            }
            Err(e) => {
                warn!("Migration rolled back after {} records: {}", processed, e);
                reporter.report(MigrationEvent::RolledBack {
                    processed,
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }
}

fn capitalize(term: &str) -> String {
    let mut chars = term.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
