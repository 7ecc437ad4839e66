//! Discovery trigger, candidate mining and the atomic migration onto a
//! discovered template.

mod common;

use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use common::harness::utc;
use common::{client_quantity_template, TableClassifier, TestHarness};
use joblog::discovery::{
    CancelFlag, MigrationEvent, MigrationReporter, DISCOVERED_TEMPLATE_NAME,
};
use joblog::model::{AppMode, EntityType, RecordStatus};
use joblog::{JobLog, JoblogError};

/// Records events and raises the cancel flag after `cancel_after` records.
struct CancellingReporter {
    cancel_after: usize,
    flag: CancelFlag,
    events: Mutex<Vec<MigrationEvent>>,
}

impl CancellingReporter {
    fn new(cancel_after: usize, flag: CancelFlag) -> Self {
        Self {
            cancel_after,
            flag,
            events: Mutex::new(Vec::new()),
        }
    }

    fn events(&self) -> Vec<MigrationEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl MigrationReporter for CancellingReporter {
    fn report(&self, event: MigrationEvent) {
        if let MigrationEvent::Reprocessed { index, .. } = event {
            if index == self.cancel_after {
                self.flag.cancel();
            }
        }
        self.events.lock().unwrap().push(event);
    }
}

/// Overwrites `partition` with garbage once `after` records are done, keeping
/// a copy of the original bytes at `saved`.
struct CorruptingReporter {
    after: usize,
    partition: PathBuf,
    saved: PathBuf,
    events: Mutex<Vec<MigrationEvent>>,
}

impl MigrationReporter for CorruptingReporter {
    fn report(&self, event: MigrationEvent) {
        if let MigrationEvent::Reprocessed { index, .. } = event {
            if index == self.after {
                fs::copy(&self.partition, &self.saved).unwrap();
                fs::write(&self.partition, b"not a database").unwrap();
            }
        }
        self.events.lock().unwrap().push(event);
    }
}

fn statuses(joblog: &JobLog) -> Vec<RecordStatus> {
    joblog
        .store()
        .all_records()
        .unwrap()
        .value
        .iter()
        .map(|r| r.status())
        .collect()
}

#[test]
fn test_trigger_waits_for_threshold() {
    let harness = TestHarness::new();
    let joblog = harness.joblog();

    for i in 0..19 {
        joblog.submit(&format!("poda del olivar {}", i)).unwrap();
    }
    assert!(joblog.check_discovery().unwrap().is_none());

    joblog.submit("poda del olivar final").unwrap();
    let proposal = joblog.check_discovery().unwrap().unwrap();
    assert_eq!(proposal.records_analyzed, 20);
    assert_eq!(proposal.template.name, DISCOVERED_TEMPLATE_NAME);
    joblog.shutdown();
}

#[test]
fn test_configured_threshold_is_used() {
    let harness = TestHarness::new();
    let joblog = harness.joblog_with(
        harness.config().learning_threshold(3).build(),
        Arc::new(TableClassifier::new()),
    );
    assert_eq!(joblog.settings().unwrap().learning_threshold, 3);

    for _ in 0..3 {
        joblog.submit("riego por goteo").unwrap();
    }
    assert!(joblog.check_discovery().unwrap().is_some());
    joblog.shutdown();
}

#[test]
fn test_tractor_in_forty_percent_is_a_candidate() {
    let harness = TestHarness::new();
    let classifier = TableClassifier::new().term("tractor", EntityType::Product, 0.92);
    let joblog = harness.joblog_with(harness.config().build(), Arc::new(classifier));

    for i in 0..10 {
        joblog
            .submit(&format!("reparación del tractor número {}", i))
            .unwrap();
    }
    for i in 0..15 {
        joblog.submit(&format!("riego de huerta {}", i)).unwrap();
    }

    let proposal = joblog.check_discovery().unwrap().unwrap();
    let terms: Vec<(&str, usize)> = proposal
        .candidates
        .iter()
        .map(|c| (c.term.as_str(), c.document_frequency))
        .collect();
    assert_eq!(
        terms,
        [
            ("huerta", 15),
            ("riego", 15),
            ("numero", 10),
            ("reparacion", 10),
            ("tractor", 10),
        ]
    );

    let tractor = proposal.template.entity_by_label("Tractor").unwrap();
    assert_eq!(tractor.entity_type(), EntityType::Product);
    assert_eq!(
        proposal.template.entity_by_label("Huerta").unwrap().entity_type(),
        EntityType::Other
    );

    // Nothing is persisted until adoption.
    assert!(joblog.list_templates().unwrap().is_empty());
    joblog.shutdown();
}

#[test]
fn test_no_discovery_in_structured_mode() {
    let harness = TestHarness::new();
    let joblog = harness.joblog();
    let template = joblog.create_template(client_quantity_template()).unwrap();
    joblog.activate_template(&template.id).unwrap();

    for _ in 0..25 {
        joblog.submit("sin cliente conocido").unwrap();
    }
    assert!(joblog.check_discovery().unwrap().is_none());
    joblog.shutdown();
}

#[test]
fn test_migration_reparses_backlog() {
    let harness = TestHarness::new();
    let joblog = harness.joblog();

    for i in 0..10 {
        joblog.submit(&format!("poda para cliente {} cantidad 3", i)).unwrap();
        joblog.submit(&format!("riego en la finca {}", i)).unwrap();
    }
    let template = client_quantity_template();
    let template_id = template.id.clone();

    let summary = joblog.adopt_template(template).unwrap();
    assert_eq!(summary.migrated, 20);
    assert_eq!(summary.verified, 10);
    assert_eq!(summary.needs_review, 10);

    let settings = joblog.settings().unwrap();
    assert_eq!(settings.mode, AppMode::Structured);
    assert_eq!(settings.active_template_id.as_deref(), Some(template_id.as_str()));
    assert!(!settings.first_launch);

    let active = joblog.active_template().unwrap().unwrap();
    assert_eq!(active.id, template_id);
    assert_eq!(active.usage_count, 10);

    let records = joblog.store().all_records().unwrap().value;
    assert!(records
        .iter()
        .all(|r| r.template_id() == Some(template_id.as_str())));
    assert!(records.iter().all(|r| r.retry_count() == 0));
    let verified = records
        .iter()
        .filter(|r| r.status() == RecordStatus::Verified)
        .count();
    assert_eq!(verified, 10);
    joblog.shutdown();
}

#[test]
fn test_migration_replaces_previous_active_template() {
    let harness = TestHarness::new();
    let joblog = harness.joblog();
    let first = joblog.create_template(client_quantity_template()).unwrap();
    joblog.activate_template(&first.id).unwrap();

    let second = client_quantity_template();
    let second_id = second.id.clone();
    joblog.adopt_template(second).unwrap();

    let templates = joblog.list_templates().unwrap();
    let active: Vec<_> = templates.iter().filter(|t| t.is_active).collect();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, second_id);
    joblog.shutdown();
}

#[test]
fn test_cancelled_migration_rolls_everything_back() {
    let harness = TestHarness::new();
    let joblog = harness.joblog();

    for i in 0..20 {
        joblog
            .submit(&format!("entrega al cliente {} de cajas", i))
            .unwrap();
    }
    let proposal = joblog.check_discovery().unwrap().unwrap();

    let flag = CancelFlag::new();
    let reporter = CancellingReporter::new(12, flag.clone());
    let result = joblog.adopt_template_with(proposal.template, &reporter, &flag);

    assert!(matches!(
        result,
        Err(JoblogError::MigrationCancelled { processed: 12 })
    ));

    let settings = joblog.settings().unwrap();
    assert_eq!(settings.mode, AppMode::Learning);
    assert!(settings.first_launch);
    assert!(settings.active_template_id.is_none());

    let statuses = statuses(&joblog);
    assert_eq!(statuses.len(), 20);
    assert!(statuses.iter().all(|s| *s == RecordStatus::Unstructured));
    assert!(joblog
        .store()
        .all_records()
        .unwrap()
        .value
        .iter()
        .all(|r| r.template_id().is_none()));
    assert!(joblog.list_templates().unwrap().is_empty());

    let events = reporter.events();
    assert!(matches!(
        events.first(),
        Some(MigrationEvent::Started { total: 20, .. })
    ));
    assert!(matches!(
        events.last(),
        Some(MigrationEvent::RolledBack { processed: 12, .. })
    ));
    joblog.shutdown();
}

#[test]
fn test_failed_record_update_rolls_everything_back() {
    let harness = TestHarness::new();
    let joblog = harness.joblog();

    // Oldest first: records 1-12 live in January, 13-20 in February.
    for day in 1..=12 {
        joblog
            .submit_at(&format!("entrega al cliente {} de cajas", day), utc(2024, 1, day, 9, 0, 0))
            .unwrap();
    }
    for day in 1..=8 {
        joblog
            .submit_at(&format!("entrega al cliente {} de sacos", day), utc(2024, 2, day, 9, 0, 0))
            .unwrap();
    }

    let reporter = CorruptingReporter {
        after: 12,
        partition: harness.partition_file(2024, 2),
        saved: harness.path().join("february.bak"),
        events: Mutex::new(Vec::new()),
    };
    let result =
        joblog.adopt_template_with(client_quantity_template(), &reporter, &CancelFlag::new());
    assert!(matches!(result, Err(JoblogError::Store(_))));

    let events = reporter.events.lock().unwrap().clone();
    assert!(matches!(
        events.last(),
        Some(MigrationEvent::RolledBack { processed: 12, .. })
    ));

    let settings = joblog.settings().unwrap();
    assert_eq!(settings.mode, AppMode::Learning);
    assert!(settings.active_template_id.is_none());
    assert!(joblog.list_templates().unwrap().is_empty());

    fs::copy(&reporter.saved, &reporter.partition).unwrap();
    let records = joblog.store().all_records().unwrap();
    assert!(records.is_complete());
    assert_eq!(records.value.len(), 20);
    assert!(records
        .value
        .iter()
        .all(|r| r.status() == RecordStatus::Unstructured && r.template_id().is_none()));
    joblog.shutdown();
}

#[test]
fn test_activating_stored_template_migrates_backlog() {
    let harness = TestHarness::new();
    let joblog = harness.joblog();

    for i in 0..25 {
        joblog.submit(&format!("poda para cliente {}", i)).unwrap();
    }
    let template = joblog.create_template(client_quantity_template()).unwrap();
    assert_eq!(joblog.settings().unwrap().mode, AppMode::Learning);

    let summary = joblog.activate_template(&template.id).unwrap();
    assert_eq!(summary.template_id, template.id);
    assert_eq!(summary.migrated, 25);
    assert_eq!(summary.verified, 25);

    let settings = joblog.settings().unwrap();
    assert_eq!(settings.mode, AppMode::Structured);
    assert_eq!(settings.active_template_id.as_deref(), Some(template.id.as_str()));
    assert!(!settings.first_launch);

    assert!(statuses(&joblog)
        .iter()
        .all(|s| *s == RecordStatus::Verified));
    assert_eq!(joblog.active_template().unwrap().unwrap().usage_count, 25);

    assert!(matches!(
        joblog.activate_template("missing"),
        Err(JoblogError::TemplateNotFound { .. })
    ));
    assert_eq!(
        joblog.active_template().unwrap().unwrap().id,
        template.id
    );
    joblog.shutdown();
}
