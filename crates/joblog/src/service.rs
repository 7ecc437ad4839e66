//! Application-facing entry point tying parsing, storage, discovery and
//! suggestions together.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};

use crate::classifier::{EntityClassifier, LexiconClassifier, ModelManager, NullClassifier};
use crate::config::JoblogConfig;
use crate::discovery::{
    should_trigger, CancelFlag, DiscoveryEngine, MigrationReporter, MigrationSummary,
    NoopReporter, Proposal,
};
use crate::error::{JoblogError, Result};
use crate::model::{
    AppMode, AppSettings, JobRecordEntry, ParsedItem, RecordStatus, SuggestionStatus,
    TemplateSuggestion, WorkTemplate,
};
use crate::parser::{ParseOutcome, ParsingEngine};
use crate::store::{RecordFilter, Scan, Store};
use crate::suggestion::{SuggestionEngine, SuggestionJob, SuggestionOutcome};

/// A work log backed by one store directory.
///
/// Owns the background suggestion worker; call [`JobLog::shutdown`] to drain
/// it before exit.
pub struct JobLog {
    config: JoblogConfig,
    store: Arc<Store>,
    parser: ParsingEngine,
    discovery: DiscoveryEngine,
    suggestions: SuggestionEngine,
}

impl JobLog {
    /// Opens the store named by `config`, loading the configured lexicon
    /// classifier if there is one.
    pub fn open(config: JoblogConfig) -> Result<Self> {
        let classifier: Arc<dyn EntityClassifier> = match config.classifier.lexicon_path {
            Some(_) => {
                let manager = ModelManager::from_config(&config.classifier)?;
                Arc::new(LexiconClassifier::load(&manager)?)
            }
            None => {
                info!("No classifier lexicon configured, suggestions and discovery will use type Other");
                Arc::new(NullClassifier)
            }
        };
        Self::with_classifier(config, classifier)
    }

    pub fn with_classifier(
        config: JoblogConfig,
        classifier: Arc<dyn EntityClassifier>,
    ) -> Result<Self> {
        let data_dir = config.data_dir();
        let store = Arc::new(Store::open(&data_dir)?);

        let mut settings = store.load_settings()?;
        if settings.mode == AppMode::Learning
            && settings.learning_threshold != config.learning_threshold
        {
            debug!(
                "Learning threshold {} -> {}",
                settings.learning_threshold, config.learning_threshold
            );
            settings.learning_threshold = config.learning_threshold;
            store.save_settings(&settings)?;
        }

        let parser = ParsingEngine::new();
        let discovery = DiscoveryEngine::new(
            config.discovery.clone(),
            config.classifier.min_confidence,
            Arc::clone(&classifier),
            parser.clone(),
        );
        let suggestions =
            SuggestionEngine::start(Arc::clone(&store), classifier, &config.suggestions);

        info!(
            "Opened work log at {:?} in {} mode",
            data_dir, settings.mode
        );

        Ok(Self {
            config,
            store,
            parser,
            discovery,
            suggestions,
        })
    }

    pub fn config(&self) -> &JoblogConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn suggestions(&self) -> &SuggestionEngine {
        &self.suggestions
    }

    pub fn settings(&self) -> Result<AppSettings> {
        Ok(self.store.load_settings()?)
    }

    // -- Records ------------------------------------------------------------

    /// Saves a new entry. In structured mode it is parsed against the active
    /// template first; a NeedsReview result is queued for suggestions.
    pub fn submit(&self, text: &str) -> Result<JobRecordEntry> {
        self.submit_at(text, Utc::now())
    }

    /// [`submit`](Self::submit) with an explicit creation instant.
    pub fn submit_at(&self, text: &str, timestamp: DateTime<Utc>) -> Result<JobRecordEntry> {
        let span = tracing::info_span!("ingest");
        let _enter = span.enter();

        let mut record = JobRecordEntry::with_timestamp(text, timestamp)?;
        let settings = self.store.load_settings()?;

        let template = match settings.mode {
            AppMode::Structured => {
                let active = self.store.active_template()?;
                if active.is_none() {
                    warn!("Structured mode without an active template, saving entry raw");
                }
                active
            }
            AppMode::Learning => None,
        };

        if let Some(template) = template.as_ref() {
            let outcome = self.parse_with(record.original_input(), template)?;
            record.apply_parse(&template.id, &outcome);
        }

        self.store.add_record(&record)?;
        debug!("Saved record {} as {}", record.id(), record.status());

        if let Some(template) = template.as_ref() {
            self.note_usage(&template.id, &record)?;
        }
        self.queue_suggestion(&record);

        Ok(record)
    }

    /// Re-parses a stored record against the active template.
    pub fn reparse(&self, record_id: &str) -> Result<JobRecordEntry> {
        let mut record = self.require_record(record_id)?;
        let template = self
            .store
            .active_template()?
            .ok_or(JoblogError::NoActiveTemplate)?;

        let outcome = self.parse_with(record.original_input(), &template)?;
        record.apply_parse(&template.id, &outcome);
        if !self.store.update_record(&record)? {
            return Err(JoblogError::RecordNotFound {
                id: record_id.to_string(),
            });
        }

        self.note_usage(&template.id, &record)?;
        self.queue_suggestion(&record);
        Ok(record)
    }

    /// Replaces a record's items by hand, marking it Verified. Records that
    /// were never parsed are attributed to the active template.
    pub fn correct(&self, record_id: &str, items: Vec<ParsedItem>) -> Result<JobRecordEntry> {
        let mut record = self.require_record(record_id)?;
        let template_id = match record.template_id() {
            Some(id) => id.to_string(),
            None => self
                .store
                .active_template()?
                .ok_or(JoblogError::NoActiveTemplate)?
                .id,
        };
        if self.store.get_template(&template_id)?.is_none() {
            return Err(JoblogError::TemplateNotFound { id: template_id });
        }

        record.apply_correction(&template_id, items)?;
        if !self.store.update_record(&record)? {
            return Err(JoblogError::RecordNotFound {
                id: record_id.to_string(),
            });
        }
        info!("Record {} corrected by hand", record_id);
        Ok(record)
    }

    /// Deletes a record together with its pending suggestions, and discards
    /// any suggestion job still queued for it. Returns false if no such
    /// record exists.
    pub fn delete_record(&self, record_id: &str) -> Result<bool> {
        let Some(record) = self.store.get_record(record_id)?.value else {
            return Ok(false);
        };

        self.suggestions.cancel_record(record_id)?;

        let removed = self.store.transaction(|uow| -> Result<usize> {
            if !uow.delete_record(&record)? {
                return Err(JoblogError::RecordNotFound {
                    id: record_id.to_string(),
                });
            }
            Ok(uow.delete_pending_suggestions_for_record(record_id)?)
        })?;

        info!(
            "Deleted record {} and {} pending suggestions",
            record_id, removed
        );
        Ok(true)
    }

    pub fn get_record(&self, record_id: &str) -> Result<Scan<Option<JobRecordEntry>>> {
        Ok(self.store.get_record(record_id)?)
    }

    pub fn records_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Scan<Vec<JobRecordEntry>>> {
        Ok(self.store.records_in_range(start, end)?)
    }

    // -- Discovery and templates ---------------------------------------------

    /// Proposes a template when the learning threshold has been reached.
    pub fn check_discovery(&self) -> Result<Option<Proposal>> {
        let settings = self.store.load_settings()?;
        if settings.mode != AppMode::Learning {
            return Ok(None);
        }

        let count = self
            .store
            .count_where(&RecordFilter::status(RecordStatus::Unstructured))?;
        if !count.is_complete() {
            warn!(
                "Counting unstructured records skipped {} partitions",
                count.skipped.len()
            );
        }
        let unstructured = usize::try_from(count.value).unwrap_or(usize::MAX);
        if !should_trigger(&settings, unstructured) {
            debug!(
                "{} of {} unstructured records needed for discovery",
                unstructured, settings.learning_threshold
            );
            return Ok(None);
        }

        let records = self
            .store
            .records_by_status(RecordStatus::Unstructured)?
            .into_value();
        Ok(self.discovery.propose(&records)?)
    }

    /// Adopts `template` and migrates the unstructured backlog onto it.
    pub fn adopt_template(&self, template: WorkTemplate) -> Result<MigrationSummary> {
        self.adopt_template_with(template, &NoopReporter, &CancelFlag::new())
    }

    pub fn adopt_template_with(
        &self,
        template: WorkTemplate,
        reporter: &dyn MigrationReporter,
        cancel: &CancelFlag,
    ) -> Result<MigrationSummary> {
        self.discovery.migrate(&self.store, template, reporter, cancel)
    }

    /// Stores a hand-built template without activating it.
    pub fn create_template(&self, mut template: WorkTemplate) -> Result<WorkTemplate> {
        template.is_active = false;
        self.store.save_template(&template)?;
        info!("Created template '{}' ({})", template.name, template.id);
        Ok(template)
    }

    /// Makes the stored template `template_id` the only active one. The
    /// unstructured backlog is migrated onto it in the same unit of work,
    /// exactly as when adopting a discovered template.
    pub fn activate_template(&self, template_id: &str) -> Result<MigrationSummary> {
        let summary = self.discovery.migrate_to_stored(
            &self.store,
            template_id,
            &NoopReporter,
            &CancelFlag::new(),
        )?;
        info!("Activated template {}", template_id);
        Ok(summary)
    }

    pub fn list_templates(&self) -> Result<Vec<WorkTemplate>> {
        Ok(self.store.list_templates()?)
    }

    pub fn active_template(&self) -> Result<Option<WorkTemplate>> {
        Ok(self.store.active_template()?)
    }

    // -- Suggestions ----------------------------------------------------------

    pub fn pending_suggestions(&self, template_id: &str) -> Result<Vec<TemplateSuggestion>> {
        Ok(self
            .store
            .suggestions_for_template(template_id, Some(SuggestionStatus::Pending))?)
    }

    /// Merges the suggested term into its template and re-parses the
    /// template's NeedsReview records with the extended vocabulary.
    pub fn accept_suggestion(&self, suggestion_id: &str) -> Result<TemplateSuggestion> {
        let suggestion = self.store.transaction(|uow| -> Result<TemplateSuggestion> {
            let mut suggestion =
                uow.get_suggestion(suggestion_id)?
                    .ok_or_else(|| JoblogError::SuggestionNotFound {
                        id: suggestion_id.to_string(),
                    })?;
            let mut template = uow.get_template(&suggestion.template_id)?.ok_or_else(|| {
                JoblogError::TemplateNotFound {
                    id: suggestion.template_id.clone(),
                }
            })?;

            suggestion.accept()?;
            let label = template
                .merge_keyword(&suggestion.suggested_term, suggestion.suggested_entity_type)?;
            debug!(
                "Merged '{}' into entity '{}'",
                suggestion.suggested_term, label
            );

            let filter = RecordFilter {
                status: Some(RecordStatus::NeedsReview),
                template_id: Some(template.id.clone()),
                ..RecordFilter::default()
            };
            let mut resolved = 0;
            for mut record in uow.records_where(&filter)? {
                let outcome = self.parse_with(record.original_input(), &template)?;
                record.apply_parse(&template.id, &outcome);
                uow.update_record(&record)?;
                if outcome.status == RecordStatus::Verified {
                    template.record_usage(Utc::now());
                    resolved += 1;
                }
            }

            uow.save_template(&template)?;
            uow.update_suggestion(&suggestion)?;
            info!(
                "Accepted '{}' for template {}, {} records now verified",
                suggestion.suggested_term, template.id, resolved
            );
            Ok(suggestion)
        })?;
        Ok(suggestion)
    }

    pub fn reject_suggestion(&self, suggestion_id: &str) -> Result<TemplateSuggestion> {
        let mut suggestion = self.store.get_suggestion(suggestion_id)?.ok_or_else(|| {
            JoblogError::SuggestionNotFound {
                id: suggestion_id.to_string(),
            }
        })?;
        suggestion.reject()?;
        self.store.update_suggestion(&suggestion)?;
        info!("Rejected suggestion '{}'", suggestion.suggested_term);
        Ok(suggestion)
    }

    /// Next suggestion outcome, waiting up to `timeout`.
    pub fn recv_suggestion_outcome(&self, timeout: Duration) -> Option<SuggestionOutcome> {
        self.suggestions.recv_outcome_timeout(timeout)
    }

    /// Processes every queued suggestion job, then stops the worker.
    pub fn shutdown(self) -> Vec<SuggestionOutcome> {
        self.suggestions.wait()
    }

    // -- Internals ------------------------------------------------------------

    fn parse_with(&self, input: &str, template: &WorkTemplate) -> Result<ParseOutcome> {
        self.parser
            .parse(input, template)
            .map_err(|e| JoblogError::ParseFailed {
                template_id: template.id.clone(),
                input: input.to_string(),
                reason: e.to_string(),
            })
    }

    fn require_record(&self, record_id: &str) -> Result<JobRecordEntry> {
        self.store
            .get_record(record_id)?
            .into_value()
            .ok_or_else(|| JoblogError::RecordNotFound {
                id: record_id.to_string(),
            })
    }

    /// Bumps the usage counters only; entities are never written from here.
    fn note_usage(&self, template_id: &str, record: &JobRecordEntry) -> Result<()> {
        if record.status() == RecordStatus::Verified
            && !self.store.record_template_usage(template_id, Utc::now())?
        {
            warn!("Template {} vanished before its usage was recorded", template_id);
        }
        Ok(())
    }

    fn queue_suggestion(&self, record: &JobRecordEntry) {
        if record.status() != RecordStatus::NeedsReview {
            return;
        }
        let Some(job) = SuggestionJob::for_record(record) else {
            return;
        };
        match self.suggestions.submit(job) {
            Ok(true) => debug!("Queued suggestion job for record {}", record.id()),
            Ok(false) => {}
            Err(e) => warn!("Could not queue suggestion job for {}: {}", record.id(), e),
        }
    }
}
