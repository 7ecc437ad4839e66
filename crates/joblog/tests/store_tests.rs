//! Partition routing, range queries, fault isolation and atomicity of the
//! record store.

mod common;

use common::harness::utc;
use common::{client_quantity_template, TestHarness};
use joblog::model::{AppMode, JobRecordEntry, RecordStatus};
use joblog::parser::ParsingEngine;
use joblog::store::{PartitionKey, StoreError};
use joblog::JoblogError;

fn record_at(text: &str, year: i32, month: u32, day: u32) -> JobRecordEntry {
    JobRecordEntry::with_timestamp(text, utc(year, month, day, 12, 0, 0)).unwrap()
}

#[test]
fn test_records_route_to_their_month() {
    let harness = TestHarness::new();
    let store = harness.open_store();

    let cases = [
        ("año nuevo", utc(2024, 1, 1, 0, 0, 0), (2024, 1)),
        ("fin de enero", utc(2024, 1, 31, 23, 59, 59), (2024, 1)),
        ("bisiesto", utc(2024, 2, 29, 8, 0, 0), (2024, 2)),
        ("nochevieja", utc(2023, 12, 31, 23, 59, 59), (2023, 12)),
    ];
    for (text, timestamp, (year, month)) in cases {
        let record = JobRecordEntry::with_timestamp(text, timestamp).unwrap();
        store.add_record(&record).unwrap();
        assert!(
            harness.partition_file(year, month).exists(),
            "{} should land in {}-{}",
            text,
            year,
            month
        );
    }

    let keys: Vec<(i32, u32)> = store
        .list_partitions()
        .unwrap()
        .iter()
        .map(|k| (k.year(), k.month()))
        .collect();
    assert_eq!(keys, [(2024, 2), (2024, 1), (2023, 12)]);
}

#[test]
fn test_update_and_delete_stay_in_partition() {
    let harness = TestHarness::new();
    let store = harness.open_store();
    let template = client_quantity_template();
    store.save_template(&template).unwrap();

    let mut record = record_at("cliente Juan", 2023, 6, 15);
    store.add_record(&record).unwrap();

    let outcome = ParsingEngine::new()
        .parse(record.original_input(), &template)
        .unwrap();
    record.apply_parse(&template.id, &outcome);
    assert!(store.update_record(&record).unwrap());

    let stored = store.get_record(record.id()).unwrap().value.unwrap();
    assert_eq!(stored.status(), RecordStatus::Verified);
    assert_eq!(stored.timestamp(), record.timestamp());
    assert_eq!(store.list_partitions().unwrap().len(), 1);

    assert!(store.delete_record(&record).unwrap());
    assert!(store.get_record(record.id()).unwrap().value.is_none());
    assert!(!store.delete_record(&record).unwrap());
}

#[test]
fn test_range_query_spans_boundary_months() {
    let harness = TestHarness::new();
    let store = harness.open_store();

    let inside = [
        JobRecordEntry::with_timestamp("inicio exacto", utc(2024, 1, 31, 23, 0, 0)).unwrap(),
        record_at("febrero", 2024, 2, 10),
        JobRecordEntry::with_timestamp("fin exacto", utc(2024, 3, 1, 1, 0, 0)).unwrap(),
    ];
    let outside = [
        JobRecordEntry::with_timestamp("antes", utc(2024, 1, 31, 22, 59, 59)).unwrap(),
        JobRecordEntry::with_timestamp("después", utc(2024, 3, 1, 1, 0, 1)).unwrap(),
        record_at("diciembre", 2023, 12, 5),
    ];
    for record in inside.iter().chain(outside.iter()) {
        store.add_record(record).unwrap();
    }

    let scan = store
        .records_in_range(utc(2024, 1, 31, 23, 0, 0), utc(2024, 3, 1, 1, 0, 0))
        .unwrap();
    assert!(scan.is_complete());

    let texts: Vec<&str> = scan.value.iter().map(|r| r.original_input()).collect();
    assert_eq!(texts, ["fin exacto", "febrero", "inicio exacto"]);

    let empty = store
        .records_in_range(utc(2024, 3, 1, 0, 0, 0), utc(2024, 1, 1, 0, 0, 0))
        .unwrap();
    assert!(empty.value.is_empty());
}

#[test]
fn test_corrupt_partition_is_skipped() {
    let harness = TestHarness::new();
    let store = harness.open_store();

    store.add_record(&record_at("marzo", 2024, 3, 3)).unwrap();
    store.add_record(&record_at("abril", 2024, 4, 4)).unwrap();
    harness.corrupt_partition(2024, 3);

    let scan = store.all_records().unwrap();
    assert_eq!(scan.value.len(), 1);
    assert_eq!(scan.value[0].original_input(), "abril");
    assert_eq!(scan.skipped.len(), 1);
    assert_eq!(scan.skipped[0].key, PartitionKey::new(2024, 3).unwrap());

    let counted = store
        .count_records(|r| r.status() == RecordStatus::Unstructured)
        .unwrap();
    assert_eq!(counted.value, 1);
    assert!(!counted.is_complete());

    // Configuration is unaffected.
    assert_eq!(store.load_settings().unwrap().mode, AppMode::Learning);
}

#[test]
fn test_failed_transaction_leaves_every_file_untouched() {
    let harness = TestHarness::new();
    let store = harness.open_store();
    let existing = record_at("registro previo", 2024, 5, 1);
    store.add_record(&existing).unwrap();
    let before_settings = store.load_settings().unwrap();

    let template = client_quantity_template();
    let result = store.transaction(|uow| -> Result<(), JoblogError> {
        uow.add_record(&record_at("mes nuevo", 2024, 7, 1))?;
        uow.delete_record(&existing)?;
        uow.save_template(&template)?;
        let mut settings = uow.load_settings()?;
        settings.mode = AppMode::Structured;
        uow.save_settings(&settings)?;
        Err(JoblogError::NoActiveTemplate)
    });
    assert!(matches!(result, Err(JoblogError::NoActiveTemplate)));

    assert!(!harness.partition_file(2024, 7).exists());
    assert!(store.get_record(existing.id()).unwrap().value.is_some());
    assert!(store.get_template(&template.id).unwrap().is_none());
    assert_eq!(store.load_settings().unwrap(), before_settings);
}

#[test]
fn test_committed_transaction_survives_reopen() {
    let harness = TestHarness::new();
    let template = client_quantity_template();
    let record = record_at("cliente Luis", 2024, 8, 8);
    {
        let store = harness.open_store();
        store
            .transaction(|uow| -> Result<(), StoreError> {
                uow.add_record(&record)?;
                uow.save_template(&template)?;
                Ok(())
            })
            .unwrap();
    }

    let store = harness.open_store();
    assert!(store.get_record(record.id()).unwrap().value.is_some());
    assert!(store.get_template(&template.id).unwrap().is_some());
    assert!(!harness.data_dir.join("uow").join("manifest.json").exists());
}
