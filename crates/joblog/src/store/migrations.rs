//! Schema migrations for the configuration store and record partitions.
//!
//! Each database file tracks applied migrations in a `_migrations` table and
//! applies pending ones in order. The configuration store and the monthly
//! partitions have separate migration sets.

use rusqlite::Connection;

use super::error::StoreError;

/// A single migration definition.
pub struct Migration {
    version: u32,
    description: &'static str,
    sql: &'static str,
}

/// Migrations for `config.db`.
pub const CONFIG_MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "create_templates_table",
        sql: include_str!("sql/001_create_templates.sql"),
    },
    Migration {
        version: 2,
        description: "create_suggestions_table",
        sql: include_str!("sql/002_create_suggestions.sql"),
    },
    Migration {
        version: 3,
        description: "create_settings_table",
        sql: include_str!("sql/003_create_settings.sql"),
    },
];

/// Migrations for every `records_YYYY_MM.db` partition.
pub const PARTITION_MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    description: "create_records_table",
    sql: include_str!("sql/101_create_records.sql"),
}];

/// Runs all pending migrations from `migrations` on the given connection.
pub fn run_all(conn: &Connection, migrations: &[Migration]) -> Result<(), StoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    let current_version: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM _migrations",
        [],
        |r| r.get(0),
    )?;

    for migration in migrations {
        if migration.version <= current_version {
            continue;
        }

        log::debug!(
            "Running migration v{}: {}",
            migration.version,
            migration.description
        );

        conn.execute_batch(migration.sql)
            .map_err(|e| StoreError::Migration {
                version: migration.version,
                reason: e.to_string(),
            })?;

        conn.execute(
            "INSERT INTO _migrations (version, description) VALUES (?1, ?2)",
            rusqlite::params![migration.version, migration.description],
        )?;
    }

    Ok(())
}
