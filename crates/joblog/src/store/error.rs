//! Storage error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from the configuration store and record partitions.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error from rusqlite.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error when creating directories or files.
    #[error("IO error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A migration failed to apply.
    #[error("Migration failed at version {version}: {reason}")]
    Migration { version: u32, reason: String },

    /// The store lock was poisoned.
    #[error("Store lock poisoned")]
    LockPoisoned,

    /// A persisted row could not be decoded.
    #[error("Corrupt row '{id}': {reason}")]
    Corrupt { id: String, reason: String },

    /// A record partition could not be opened or read.
    #[error("Partition '{path}' unavailable: {reason}")]
    PartitionUnavailable { path: PathBuf, reason: String },

    /// The unit-of-work journal could not be written, read or replayed.
    #[error("Journal error at '{path}': {reason}")]
    Journal { path: PathBuf, reason: String },

    /// A record with the same id already exists in its partition.
    #[error("Record already exists: {0}")]
    DuplicateRecord(String),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn corrupt(id: impl Into<String>, reason: impl ToString) -> Self {
        Self::Corrupt {
            id: id.into(),
            reason: reason.to_string(),
        }
    }
}
