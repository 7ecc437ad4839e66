//! Persistent storage for records, templates, suggestions and settings.
//!
//! A store is a directory holding one long-lived configuration database
//! (`config.db`, WAL mode, opened once) and one SQLite file per calendar month
//! of records (`records_<YYYY>_<MM>.db`, opened per operation). There is no
//! global record index: lookups scan partitions newest month first.
//!
//! Reads that span several partitions return a [`Scan`], which lists any
//! partition that could not be read instead of failing the whole read.

use std::fs;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Connection;

use crate::model::{
    AppSettings, JobRecordEntry, RecordStatus, SuggestionStatus, TemplateSuggestion, WorkTemplate,
};

pub mod error;
pub mod migrations;
pub mod partition;
pub mod record_repo;
pub mod settings_repo;
pub mod suggestion_repo;
pub mod template_repo;
pub mod unit_of_work;

pub use error::StoreError;
pub use partition::{PartitionKey, Scan, SkippedPartition};
pub use record_repo::RecordFilter;
pub use unit_of_work::UnitOfWork;

use migrations::CONFIG_MIGRATIONS;
use partition::ScanPolicy;

/// File name of the configuration database inside the store directory.
pub const CONFIG_FILE_NAME: &str = "config.db";
/// Directory holding the unit-of-work journal inside the store directory.
pub const JOURNAL_DIR: &str = "uow";

const CONFIG_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub(crate) fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub(crate) fn parse_timestamp(id: &str, raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::corrupt(id, e))
}

/// Handle to a store directory.
///
/// Share it behind an `Arc`. While a [`UnitOfWork`] is open it holds the
/// store's exclusive gate; every other operation waits for it to finish, so
/// code running inside a unit of work must use the unit's own methods.
pub struct Store {
    root: PathBuf,
    config: Mutex<Connection>,
    gate: RwLock<()>,
}

impl Store {
    /// Opens (or creates) the store at `root`.
    ///
    /// A unit of work interrupted by a crash is rolled back before anything
    /// else happens.
    pub fn open(root: &Path) -> Result<Self, StoreError> {
        fs::create_dir_all(root).map_err(|e| StoreError::io(root, e))?;

        let mut conn = Connection::open(root.join(CONFIG_FILE_NAME))?;
        conn.busy_timeout(CONFIG_BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        if unit_of_work::recover(root, &mut conn)? {
            log::warn!(
                "Rolled back an interrupted unit of work in {}",
                root.display()
            );
        }

        migrations::run_all(&conn, CONFIG_MIGRATIONS)?;

        log::info!("Store opened at {}", root.display());

        Ok(Self {
            root: root.to_path_buf(),
            config: Mutex::new(conn),
            gate: RwLock::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn shared(&self) -> Result<RwLockReadGuard<'_, ()>, StoreError> {
        self.gate.read().map_err(|_| StoreError::LockPoisoned)
    }

    fn lock_config(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.config.lock().map_err(|_| StoreError::LockPoisoned)
    }

    /// Provides locked access to the configuration connection.
    fn with_config<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError>,
    {
        let _shared = self.shared()?;
        let conn = self.lock_config()?;
        f(&conn)
    }

    /// Opens a unit of work. Blocks until every other store operation is done.
    pub fn begin(&self) -> Result<UnitOfWork<'_>, StoreError> {
        UnitOfWork::begin(self)
    }

    /// Runs `f` inside a unit of work: commits when it returns `Ok`, rolls
    /// every touched file back when it returns `Err`.
    pub fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut UnitOfWork<'_>) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut uow = self.begin()?;
        match f(&mut uow) {
            Ok(value) => {
                uow.commit()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_err) = uow.rollback() {
                    log::error!("Rollback failed: {}", rollback_err);
                }
                Err(e)
            }
        }
    }

    // -- Records ------------------------------------------------------------

    /// Lists the partitions present on disk, newest month first.
    pub fn list_partitions(&self) -> Result<Vec<PartitionKey>, StoreError> {
        let _shared = self.shared()?;
        partition::discover(&self.root)
    }

    /// Writes a new record into the partition of its timestamp.
    pub fn add_record(&self, record: &JobRecordEntry) -> Result<(), StoreError> {
        let _shared = self.shared()?;
        records::insert(&self.root, record)
    }

    /// Updates a record in place. Returns false if it does not exist.
    pub fn update_record(&self, record: &JobRecordEntry) -> Result<bool, StoreError> {
        let _shared = self.shared()?;
        records::update(&self.root, record)
    }

    /// Deletes a record. Returns false if it does not exist.
    pub fn delete_record(&self, record: &JobRecordEntry) -> Result<bool, StoreError> {
        let _shared = self.shared()?;
        records::delete(&self.root, record)
    }

    /// Finds a record by id, scanning partitions newest month first.
    pub fn get_record(&self, id: &str) -> Result<Scan<Option<JobRecordEntry>>, StoreError> {
        let _shared = self.shared()?;
        records::find(&self.root, id, ScanPolicy::SkipUnreadable)
    }

    pub fn all_records(&self) -> Result<Scan<Vec<JobRecordEntry>>, StoreError> {
        self.records_where(&RecordFilter::default())
    }

    /// Records for which `predicate` holds, newest first.
    pub fn records_matching<P>(&self, predicate: P) -> Result<Scan<Vec<JobRecordEntry>>, StoreError>
    where
        P: Fn(&JobRecordEntry) -> bool,
    {
        Ok(self
            .all_records()?
            .map(|records| records.into_iter().filter(|r| predicate(r)).collect()))
    }

    pub fn records_by_template(
        &self,
        template_id: &str,
    ) -> Result<Scan<Vec<JobRecordEntry>>, StoreError> {
        self.records_where(&RecordFilter::template(template_id))
    }

    pub fn records_by_status(
        &self,
        status: RecordStatus,
    ) -> Result<Scan<Vec<JobRecordEntry>>, StoreError> {
        self.records_where(&RecordFilter::status(status))
    }

    /// Records with `start <= timestamp <= end`, newest first.
    pub fn records_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Scan<Vec<JobRecordEntry>>, StoreError> {
        let _shared = self.shared()?;
        records::in_range(&self.root, start, end)
    }

    /// Records matching an SQL-side filter, newest first.
    pub fn records_where(
        &self,
        filter: &RecordFilter,
    ) -> Result<Scan<Vec<JobRecordEntry>>, StoreError> {
        let _shared = self.shared()?;
        let keys = partition::discover(&self.root)?;
        records::select(&self.root, &keys, filter, ScanPolicy::SkipUnreadable)
    }

    /// Number of records for which `predicate` holds.
    pub fn count_records<P>(&self, predicate: P) -> Result<Scan<usize>, StoreError>
    where
        P: Fn(&JobRecordEntry) -> bool,
    {
        Ok(self.records_matching(predicate)?.map(|records| records.len()))
    }

    /// Number of records matching an SQL-side filter, counted without
    /// decoding rows.
    pub fn count_where(&self, filter: &RecordFilter) -> Result<Scan<u64>, StoreError> {
        let _shared = self.shared()?;
        records::count(&self.root, filter, ScanPolicy::SkipUnreadable)
    }

    // -- Templates ----------------------------------------------------------

    pub fn save_template(&self, template: &WorkTemplate) -> Result<(), StoreError> {
        self.with_config(|conn| template_repo::upsert(conn, template))
    }

    pub fn get_template(&self, id: &str) -> Result<Option<WorkTemplate>, StoreError> {
        self.with_config(|conn| template_repo::find_by_id(conn, id))
    }

    pub fn list_templates(&self) -> Result<Vec<WorkTemplate>, StoreError> {
        self.with_config(template_repo::list)
    }

    pub fn active_template(&self) -> Result<Option<WorkTemplate>, StoreError> {
        self.with_config(template_repo::find_active)
    }

    /// Counts one use of template `id` without rewriting its entities.
    pub fn record_template_usage(&self, id: &str, at: DateTime<Utc>) -> Result<bool, StoreError> {
        self.with_config(|conn| template_repo::record_usage(conn, id, at))
    }

    pub fn delete_template(&self, id: &str) -> Result<bool, StoreError> {
        self.with_config(|conn| template_repo::delete(conn, id))
    }

    // -- Suggestions --------------------------------------------------------

    pub fn save_suggestion(&self, suggestion: &TemplateSuggestion) -> Result<(), StoreError> {
        self.with_config(|conn| suggestion_repo::insert(conn, suggestion))
    }

    pub fn update_suggestion(&self, suggestion: &TemplateSuggestion) -> Result<bool, StoreError> {
        self.with_config(|conn| suggestion_repo::update_status(conn, suggestion))
    }

    pub fn get_suggestion(&self, id: &str) -> Result<Option<TemplateSuggestion>, StoreError> {
        self.with_config(|conn| suggestion_repo::find_by_id(conn, id))
    }

    pub fn suggestions_for_template(
        &self,
        template_id: &str,
        status: Option<SuggestionStatus>,
    ) -> Result<Vec<TemplateSuggestion>, StoreError> {
        self.with_config(|conn| suggestion_repo::list_for_template(conn, template_id, status))
    }

    pub fn delete_pending_suggestions_for_record(&self, record_id: &str) -> Result<usize, StoreError> {
        self.with_config(|conn| suggestion_repo::delete_pending_for_record(conn, record_id))
    }

    // -- Settings -----------------------------------------------------------

    pub fn load_settings(&self) -> Result<AppSettings, StoreError> {
        self.with_config(settings_repo::load)
    }

    pub fn save_settings(&self, settings: &AppSettings) -> Result<(), StoreError> {
        self.with_config(|conn| settings_repo::save(conn, settings))
    }
}

/// Partition-level record operations shared by [`Store`] and [`UnitOfWork`].
/// Callers hold the gate.
pub(crate) mod records {
    use super::*;

    pub(crate) fn path_for(root: &Path, record: &JobRecordEntry) -> PathBuf {
        partition::partition_path(root, PartitionKey::for_timestamp(record.timestamp()))
    }

    pub(crate) fn insert(root: &Path, record: &JobRecordEntry) -> Result<(), StoreError> {
        let conn = partition::open(&path_for(root, record))?;
        record_repo::insert(&conn, record)
    }

    pub(crate) fn update(root: &Path, record: &JobRecordEntry) -> Result<bool, StoreError> {
        let path = path_for(root, record);
        if !path.is_file() {
            return Ok(false);
        }
        let conn = partition::open(&path)?;
        record_repo::update(&conn, record)
    }

    pub(crate) fn delete(root: &Path, record: &JobRecordEntry) -> Result<bool, StoreError> {
        let path = path_for(root, record);
        if !path.is_file() {
            return Ok(false);
        }
        let conn = partition::open(&path)?;
        record_repo::delete(&conn, record.id())
    }

    pub(crate) fn find(
        root: &Path,
        id: &str,
        policy: ScanPolicy,
    ) -> Result<Scan<Option<JobRecordEntry>>, StoreError> {
        let keys = partition::discover(root)?;
        let mut found = None;
        let skipped = partition::for_each(root, &keys, policy, |_, conn| {
            found = record_repo::find_by_id(conn, id)?;
            Ok(if found.is_some() {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            })
        })?;
        Ok(Scan {
            value: found,
            skipped,
        })
    }

    pub(crate) fn select(
        root: &Path,
        keys: &[PartitionKey],
        filter: &RecordFilter,
        policy: ScanPolicy,
    ) -> Result<Scan<Vec<JobRecordEntry>>, StoreError> {
        let mut merged = Vec::new();
        let skipped = partition::for_each(root, keys, policy, |_, conn| {
            merged.extend(record_repo::select(conn, filter)?);
            Ok(ControlFlow::Continue(()))
        })?;
        sort_newest_first(&mut merged);
        Ok(Scan {
            value: merged,
            skipped,
        })
    }

    pub(crate) fn count(
        root: &Path,
        filter: &RecordFilter,
        policy: ScanPolicy,
    ) -> Result<Scan<u64>, StoreError> {
        let keys = partition::discover(root)?;
        let mut total = 0;
        let skipped = partition::for_each(root, &keys, policy, |_, conn| {
            total += record_repo::count(conn, filter)?;
            Ok(ControlFlow::Continue(()))
        })?;
        Ok(Scan {
            value: total,
            skipped,
        })
    }

    pub(crate) fn in_range(
        root: &Path,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Scan<Vec<JobRecordEntry>>, StoreError> {
        if start > end {
            return Ok(Scan::complete(Vec::new()));
        }
        let keys: Vec<PartitionKey> = partition::discover(root)?
            .into_iter()
            .filter(|k| k.overlaps(start, end))
            .collect();
        // Millisecond bounds are floors of the instants, so the SQL window
        // is a superset of [start, end].
        let filter = RecordFilter {
            from_ms: Some(start.timestamp_millis()),
            to_ms: Some(end.timestamp_millis()),
            ..RecordFilter::default()
        };
        Ok(select(root, &keys, &filter, ScanPolicy::SkipUnreadable)?.map(|records| {
            records
                .into_iter()
                .filter(|r| r.timestamp() >= start && r.timestamp() <= end)
                .collect()
        }))
    }

    fn sort_newest_first(records: &mut [JobRecordEntry]) {
        records.sort_by(|a, b| {
            b.timestamp()
                .cmp(&a.timestamp())
                .then_with(|| a.id().cmp(b.id()))
        });
    }
}
