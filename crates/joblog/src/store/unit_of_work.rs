//! One commit/rollback boundary over the configuration store and any number
//! of record partitions.
//!
//! SQLite transactions cannot span files, so a unit of work keeps an undo
//! journal instead. Before a file is first mutated inside the scope it is
//! copied with the online backup API into `uow/`, and `uow/manifest.json`
//! lists every snapshot plus every partition file created during the scope.
//! The manifest is always replaced atomically (temp file + rename).
//!
//! * Commit removes the manifest, which is the commit point, then the
//!   snapshots.
//! * Rollback restores each snapshot through the backup API, deletes created
//!   partition files and removes the journal.
//! * A manifest found when the store is opened belongs to a scope that never
//!   finished and is rolled back.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::RwLockWriteGuard;

use chrono::{DateTime, Utc};
use log::{debug, error, warn};
use rusqlite::backup::Progress;
use rusqlite::{Connection, DatabaseName};
use serde::{Deserialize, Serialize};

use crate::model::{
    AppSettings, JobRecordEntry, RecordStatus, TemplateSuggestion, WorkTemplate,
};

use super::error::StoreError;
use super::partition::{self, PartitionKey, ScanPolicy};
use super::record_repo::RecordFilter;
use super::{
    records, settings_repo, suggestion_repo, template_repo, Store, CONFIG_FILE_NAME, JOURNAL_DIR,
};

const MANIFEST_FILE: &str = "manifest.json";
const MANIFEST_TMP_FILE: &str = "manifest.json.tmp";
const SIDECAR_SUFFIXES: [&str; 3] = ["-journal", "-wal", "-shm"];

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Snapshot {
    /// Database file name relative to the store root.
    file: String,
    /// Backup file name relative to the journal directory.
    backup: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Manifest {
    started_at: DateTime<Utc>,
    snapshots: Vec<Snapshot>,
    created: Vec<String>,
}

/// Undo journal for one scope. Nothing is written to disk until the first
/// mutation, so read-only scopes leave no trace.
struct Journal {
    root: PathBuf,
    dir: PathBuf,
    manifest: Manifest,
    persisted: bool,
}

impl Journal {
    fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            dir: root.join(JOURNAL_DIR),
            manifest: Manifest {
                started_at: Utc::now(),
                snapshots: Vec::new(),
                created: Vec::new(),
            },
            persisted: false,
        }
    }

    fn is_tracked(&self, file: &str) -> bool {
        self.manifest.snapshots.iter().any(|s| s.file == file)
            || self.manifest.created.iter().any(|f| f == file)
    }

    fn ensure_dir(&self) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir).map_err(|e| StoreError::io(&self.dir, e))
    }

    fn persist(&mut self) -> Result<(), StoreError> {
        self.ensure_dir()?;
        let bytes = serde_json::to_vec_pretty(&self.manifest).map_err(|e| StoreError::Journal {
            path: self.dir.clone(),
            reason: e.to_string(),
        })?;
        let tmp = self.dir.join(MANIFEST_TMP_FILE);
        fs::write(&tmp, bytes).map_err(|e| StoreError::io(&tmp, e))?;
        let target = self.dir.join(MANIFEST_FILE);
        fs::rename(&tmp, &target).map_err(|e| StoreError::io(&target, e))?;
        self.persisted = true;
        Ok(())
    }

    fn backup_name(file: &str) -> String {
        format!("{}.bak", file)
    }

    /// Snapshots the configuration database before its first mutation.
    fn track_config(&mut self, conn: &Connection) -> Result<(), StoreError> {
        if self.is_tracked(CONFIG_FILE_NAME) {
            return Ok(());
        }
        self.ensure_dir()?;
        let backup = Self::backup_name(CONFIG_FILE_NAME);
        conn.backup(DatabaseName::Main, self.dir.join(&backup), None)?;
        self.manifest.snapshots.push(Snapshot {
            file: CONFIG_FILE_NAME.to_string(),
            backup,
        });
        self.persist()
    }

    /// Snapshots a partition before its first mutation, or records that the
    /// scope is about to create it.
    fn track_partition(&mut self, key: PartitionKey) -> Result<(), StoreError> {
        let file = key.file_name();
        if self.is_tracked(&file) {
            return Ok(());
        }
        let path = partition::partition_path(&self.root, key);
        if path.is_file() {
            self.ensure_dir()?;
            let backup = Self::backup_name(&file);
            let conn = partition::open(&path)?;
            conn.backup(DatabaseName::Main, self.dir.join(&backup), None)?;
            self.manifest.snapshots.push(Snapshot { file, backup });
        } else {
            self.manifest.created.push(file);
        }
        self.persist()
    }
}

/// Restores every snapshot and deletes created files. The journal is removed
/// only if everything was undone, so a failed rollback is retried on the
/// next open.
fn roll_back(
    root: &Path,
    dir: &Path,
    manifest: &Manifest,
    config: &mut Connection,
) -> Result<(), StoreError> {
    let mut failures = Vec::new();

    for snapshot in manifest.snapshots.iter().rev() {
        let backup = dir.join(&snapshot.backup);
        let result = if snapshot.file == CONFIG_FILE_NAME {
            config.restore(DatabaseName::Main, &backup, None::<fn(Progress)>)
        } else {
            Connection::open(root.join(&snapshot.file)).and_then(|mut conn| {
                conn.restore(DatabaseName::Main, &backup, None::<fn(Progress)>)
            })
        };
        if let Err(e) = result {
            failures.push(format!("{}: {}", snapshot.file, e));
        }
    }

    for file in &manifest.created {
        if let Err(e) = remove_database_file(&root.join(file)) {
            failures.push(format!("{}: {}", file, e));
        }
    }

    if !failures.is_empty() {
        return Err(StoreError::Journal {
            path: dir.to_path_buf(),
            reason: failures.join("; "),
        });
    }

    clear(dir)
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

fn remove_database_file(path: &Path) -> io::Result<()> {
    remove_if_exists(path)?;
    for suffix in SIDECAR_SUFFIXES {
        let mut sidecar = path.as_os_str().to_owned();
        sidecar.push(suffix);
        remove_if_exists(Path::new(&sidecar))?;
    }
    Ok(())
}

fn clear(dir: &Path) -> Result<(), StoreError> {
    let manifest = dir.join(MANIFEST_FILE);
    remove_if_exists(&manifest).map_err(|e| StoreError::io(&manifest, e))?;
    match fs::remove_dir_all(dir) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(StoreError::io(dir, e)),
        _ => Ok(()),
    }
}

/// Rolls back a scope left behind by a crash. Returns true if one was found.
pub(crate) fn recover(root: &Path, config: &mut Connection) -> Result<bool, StoreError> {
    let dir = root.join(JOURNAL_DIR);
    let manifest_path = dir.join(MANIFEST_FILE);

    if !manifest_path.is_file() {
        // Snapshots without a manifest belong to a committed scope whose
        // cleanup did not finish.
        if dir.exists() {
            clear(&dir)?;
        }
        return Ok(false);
    }

    let bytes = fs::read(&manifest_path).map_err(|e| StoreError::io(&manifest_path, e))?;
    let manifest: Manifest = serde_json::from_slice(&bytes).map_err(|e| StoreError::Journal {
        path: manifest_path.clone(),
        reason: e.to_string(),
    })?;
    warn!(
        "Found unit of work started at {} that never finished; rolling back {} snapshot(s) and {} created file(s)",
        manifest.started_at,
        manifest.snapshots.len(),
        manifest.created.len()
    );
    roll_back(root, &dir, &manifest, config)?;
    Ok(true)
}

/// An open commit/rollback scope. Obtained from [`Store::begin`].
///
/// Holds the store's exclusive gate until committed, rolled back or dropped.
/// Dropping without [`UnitOfWork::commit`] rolls back.
pub struct UnitOfWork<'s> {
    store: &'s Store,
    journal: Journal,
    finished: bool,
    _exclusive: RwLockWriteGuard<'s, ()>,
}

impl<'s> UnitOfWork<'s> {
    pub(crate) fn begin(store: &'s Store) -> Result<Self, StoreError> {
        let exclusive = store.gate.write().map_err(|_| StoreError::LockPoisoned)?;
        {
            // A previous scope whose rollback failed left its journal behind.
            let mut conn = store.lock_config()?;
            if recover(&store.root, &mut conn)? {
                warn!("Rolled back a leftover journal before starting a unit of work");
            }
        }
        debug!("Unit of work started");
        Ok(Self {
            store,
            journal: Journal::new(&store.root),
            finished: false,
            _exclusive: exclusive,
        })
    }

    fn mutate_config<T, F>(&mut self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError>,
    {
        let conn = self.store.lock_config()?;
        self.journal.track_config(&conn)?;
        f(&conn)
    }

    fn read_config<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError>,
    {
        let conn = self.store.lock_config()?;
        f(&conn)
    }

    // -- Records ------------------------------------------------------------

    pub fn add_record(&mut self, record: &JobRecordEntry) -> Result<(), StoreError> {
        self.journal
            .track_partition(PartitionKey::for_timestamp(record.timestamp()))?;
        records::insert(&self.store.root, record)
    }

    /// Returns false, touching nothing, if the record does not exist.
    pub fn update_record(&mut self, record: &JobRecordEntry) -> Result<bool, StoreError> {
        if !records::path_for(&self.store.root, record).is_file() {
            return Ok(false);
        }
        self.journal
            .track_partition(PartitionKey::for_timestamp(record.timestamp()))?;
        records::update(&self.store.root, record)
    }

    pub fn delete_record(&mut self, record: &JobRecordEntry) -> Result<bool, StoreError> {
        if !records::path_for(&self.store.root, record).is_file() {
            return Ok(false);
        }
        self.journal
            .track_partition(PartitionKey::for_timestamp(record.timestamp()))?;
        records::delete(&self.store.root, record)
    }

    /// Finds a record by id. Any unreadable partition fails the lookup.
    pub fn get_record(&self, id: &str) -> Result<Option<JobRecordEntry>, StoreError> {
        Ok(records::find(&self.store.root, id, ScanPolicy::Strict)?.value)
    }

    /// Records matching `filter`, newest first. Any unreadable partition
    /// fails the read.
    pub fn records_where(&self, filter: &RecordFilter) -> Result<Vec<JobRecordEntry>, StoreError> {
        let keys = partition::discover(&self.store.root)?;
        Ok(records::select(&self.store.root, &keys, filter, ScanPolicy::Strict)?.value)
    }

    pub fn records_by_status(&self, status: RecordStatus) -> Result<Vec<JobRecordEntry>, StoreError> {
        self.records_where(&RecordFilter::status(status))
    }

    // -- Templates ----------------------------------------------------------

    pub fn save_template(&mut self, template: &WorkTemplate) -> Result<(), StoreError> {
        self.mutate_config(|conn| template_repo::upsert(conn, template))
    }

    pub fn get_template(&self, id: &str) -> Result<Option<WorkTemplate>, StoreError> {
        self.read_config(|conn| template_repo::find_by_id(conn, id))
    }

    pub fn active_template(&self) -> Result<Option<WorkTemplate>, StoreError> {
        self.read_config(template_repo::find_active)
    }

    pub fn deactivate_templates(&mut self) -> Result<(), StoreError> {
        self.mutate_config(template_repo::deactivate_all)
    }

    // -- Suggestions --------------------------------------------------------

    pub fn get_suggestion(&self, id: &str) -> Result<Option<TemplateSuggestion>, StoreError> {
        self.read_config(|conn| suggestion_repo::find_by_id(conn, id))
    }

    pub fn update_suggestion(&mut self, suggestion: &TemplateSuggestion) -> Result<bool, StoreError> {
        self.mutate_config(|conn| suggestion_repo::update_status(conn, suggestion))
    }

    pub fn delete_pending_suggestions_for_record(
        &mut self,
        record_id: &str,
    ) -> Result<usize, StoreError> {
        self.mutate_config(|conn| suggestion_repo::delete_pending_for_record(conn, record_id))
    }

    // -- Settings -----------------------------------------------------------

    pub fn load_settings(&self) -> Result<AppSettings, StoreError> {
        self.read_config(settings_repo::load)
    }

    pub fn save_settings(&mut self, settings: &AppSettings) -> Result<(), StoreError> {
        self.mutate_config(|conn| settings_repo::save(conn, settings))
    }

    // -- Completion ---------------------------------------------------------

    /// Makes every change in the scope permanent.
    pub fn commit(mut self) -> Result<(), StoreError> {
        self.finished = true;
        if !self.journal.persisted {
            debug!("Unit of work committed (no changes)");
            return Ok(());
        }
        let manifest = self.journal.dir.join(MANIFEST_FILE);
        remove_if_exists(&manifest).map_err(|e| StoreError::io(&manifest, e))?;
        if let Err(e) = fs::remove_dir_all(&self.journal.dir) {
            warn!(
                "Committed, but could not remove journal {}: {}",
                self.journal.dir.display(),
                e
            );
        }
        debug!(
            "Unit of work committed ({} snapshot(s), {} created file(s))",
            self.journal.manifest.snapshots.len(),
            self.journal.manifest.created.len()
        );
        Ok(())
    }

    /// Restores every file touched in the scope to its state at first touch.
    pub fn rollback(mut self) -> Result<(), StoreError> {
        self.finished = true;
        self.undo()
    }

    fn undo(&mut self) -> Result<(), StoreError> {
        if !self.journal.persisted {
            return Ok(());
        }
        let mut conn = self.store.lock_config()?;
        roll_back(
            &self.store.root,
            &self.journal.dir,
            &self.journal.manifest,
            &mut conn,
        )?;
        warn!(
            "Unit of work rolled back ({} snapshot(s), {} created file(s))",
            self.journal.manifest.snapshots.len(),
            self.journal.manifest.created.len()
        );
        Ok(())
    }
}

impl Drop for UnitOfWork<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(e) = self.undo() {
            error!("Rollback of abandoned unit of work failed: {}", e);
        }
    }
}
