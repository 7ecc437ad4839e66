//! Test harness for isolated test execution.
//!
//! The `TestHarness` owns a temporary store directory and opens either a bare
//! `Store` or a full `JobLog` on it.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;

use joblog::classifier::{EntityClassifier, NullClassifier};
use joblog::config::JoblogConfig;
use joblog::store::Store;
use joblog::suggestion::SuggestionOutcome;
use joblog::JobLog;

use super::builders::ConfigBuilder;

pub const OUTCOME_WAIT: Duration = Duration::from_secs(5);

pub struct TestHarness {
    temp_dir: TempDir,
    /// Store directory inside `temp_dir`.
    pub data_dir: PathBuf,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let data_dir = temp_dir.path().join("data");
        Self { temp_dir, data_dir }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn config(&self) -> ConfigBuilder {
        ConfigBuilder::new(&self.data_dir.to_string_lossy())
    }

    pub fn open_store(&self) -> Store {
        Store::open(&self.data_dir).expect("Failed to open store")
    }

    /// A `JobLog` with default settings and no classifier.
    pub fn joblog(&self) -> JobLog {
        self.joblog_with(self.config().build(), Arc::new(NullClassifier))
    }

    pub fn joblog_with(
        &self,
        config: JoblogConfig,
        classifier: Arc<dyn EntityClassifier>,
    ) -> JobLog {
        JobLog::with_classifier(config, classifier).expect("Failed to open joblog")
    }

    /// Path of the partition file for `year`/`month`.
    pub fn partition_file(&self, year: i32, month: u32) -> PathBuf {
        self.data_dir
            .join(format!("records_{:04}_{:02}.db", year, month))
    }

    /// Overwrites a partition file with bytes SQLite cannot read.
    pub fn corrupt_partition(&self, year: i32, month: u32) {
        fs::write(
            self.partition_file(year, month),
            b"definitely not a sqlite database, just some bytes",
        )
        .expect("Failed to corrupt partition");
    }
}

pub fn utc(year: i32, month: u32, day: u32, hour: u32, minute: u32, second: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, minute, second)
        .single()
        .expect("valid timestamp")
}

/// Waits for the next suggestion outcome or fails the test.
pub fn next_outcome(joblog: &JobLog) -> SuggestionOutcome {
    joblog
        .recv_suggestion_outcome(OUTCOME_WAIT)
        .expect("timed out waiting for a suggestion outcome")
}
