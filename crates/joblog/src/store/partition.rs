//! Monthly partition keys, file naming and per-partition access.
//!
//! Records live in one SQLite file per calendar month (UTC), named
//! `records_<YYYY>_<MM>.db`. Files are discovered by scanning the data
//! directory, opened for a single operation and closed again.

use std::fmt;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Datelike, TimeZone, Utc};
use log::warn;
use rusqlite::Connection;
use walkdir::WalkDir;

use super::error::StoreError;
use super::migrations::{self, PARTITION_MIGRATIONS};

const FILE_PREFIX: &str = "records_";
const FILE_SUFFIX: &str = ".db";
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// A calendar month identifying one record partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PartitionKey {
    year: i32,
    month: u32,
}

impl PartitionKey {
    /// Returns `None` unless `month` is in 1..=12.
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    /// The partition that owns records created at `timestamp`.
    pub fn for_timestamp(timestamp: DateTime<Utc>) -> Self {
        Self {
            year: timestamp.year(),
            month: timestamp.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn file_name(&self) -> String {
        format!("{}{:04}_{:02}{}", FILE_PREFIX, self.year, self.month, FILE_SUFFIX)
    }

    /// Parses a name produced by [`PartitionKey::file_name`].
    pub fn parse_file_name(name: &str) -> Option<Self> {
        let stem = name.strip_prefix(FILE_PREFIX)?.strip_suffix(FILE_SUFFIX)?;
        let (year, month) = stem.split_once('_')?;
        if year.len() < 4 || month.len() != 2 {
            return None;
        }
        if !year.chars().all(|c| c.is_ascii_digit()) || !month.chars().all(|c| c.is_ascii_digit())
        {
            return None;
        }
        Self::new(year.parse().ok()?, month.parse().ok()?)
    }

    pub fn next(&self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    /// First instant of the month.
    pub fn start(&self) -> Option<DateTime<Utc>> {
        Utc.with_ymd_and_hms(self.year, self.month, 1, 0, 0, 0)
            .single()
    }

    /// True if the month `[start of month, start of next month)` intersects
    /// the inclusive range `[from, to]`.
    pub fn overlaps(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> bool {
        let (Some(month_start), Some(next_start)) = (self.start(), self.next().start()) else {
            return false;
        };
        month_start <= to && from < next_start
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// A partition left out of a multi-partition read.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedPartition {
    pub key: PartitionKey,
    pub path: PathBuf,
    pub reason: String,
}

/// Result of a read across partitions.
///
/// Unreadable partitions do not fail the read. They are listed in `skipped`
/// and `value` holds what the remaining partitions returned.
#[derive(Debug, Clone, PartialEq)]
pub struct Scan<T> {
    pub value: T,
    pub skipped: Vec<SkippedPartition>,
}

impl<T> Scan<T> {
    pub fn complete(value: T) -> Self {
        Self {
            value,
            skipped: Vec::new(),
        }
    }

    /// True if every partition was read.
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }

    pub fn into_value(self) -> T {
        self.value
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Scan<U> {
        Scan {
            value: f(self.value),
            skipped: self.skipped,
        }
    }
}

/// How multi-partition reads treat a partition that cannot be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ScanPolicy {
    /// Log, record in `Scan::skipped`, continue.
    SkipUnreadable,
    /// Fail the whole read.
    Strict,
}

pub(crate) fn partition_path(root: &Path, key: PartitionKey) -> PathBuf {
    root.join(key.file_name())
}

/// Lists existing partitions, newest month first.
pub(crate) fn discover(root: &Path) -> Result<Vec<PartitionKey>, StoreError> {
    let mut keys = Vec::new();
    for entry in WalkDir::new(root).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| StoreError::Io {
            path: root.to_path_buf(),
            source: e.into(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        if let Some(key) = entry.file_name().to_str().and_then(PartitionKey::parse_file_name) {
            keys.push(key);
        }
    }
    keys.sort_unstable_by(|a, b| b.cmp(a));
    Ok(keys)
}

/// Opens (creating if needed) a partition file and brings its schema up to date.
pub(crate) fn open(path: &Path) -> Result<Connection, StoreError> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    migrations::run_all(&conn, PARTITION_MIGRATIONS)?;
    Ok(conn)
}

/// Runs `op` against each partition in `keys` order, opening and closing each.
///
/// `op` can stop the scan early with `ControlFlow::Break`. Under
/// [`ScanPolicy::SkipUnreadable`] a partition whose open or `op` fails is
/// reported in the returned list; under [`ScanPolicy::Strict`] the first
/// failure is returned as an error.
pub(crate) fn for_each<F>(
    root: &Path,
    keys: &[PartitionKey],
    policy: ScanPolicy,
    mut op: F,
) -> Result<Vec<SkippedPartition>, StoreError>
where
    F: FnMut(PartitionKey, &Connection) -> Result<ControlFlow<()>, StoreError>,
{
    let mut skipped = Vec::new();
    for &key in keys {
        let path = partition_path(root, key);
        let result = open(&path).and_then(|conn| op(key, &conn));
        match result {
            Ok(ControlFlow::Continue(())) => {}
            Ok(ControlFlow::Break(())) => break,
            Err(e) => match policy {
                ScanPolicy::Strict => {
                    return Err(StoreError::PartitionUnavailable {
                        path,
                        reason: e.to_string(),
                    })
                }
                ScanPolicy::SkipUnreadable => {
                    warn!("Skipping partition {} ({}): {}", key, path.display(), e);
                    skipped.push(SkippedPartition {
                        key,
                        path,
                        reason: e.to_string(),
                    });
                }
            },
        }
    }
    Ok(skipped)
}
