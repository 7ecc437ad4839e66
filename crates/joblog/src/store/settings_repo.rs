//! Settings repository: `AppSettings` persisted as key/value rows.

use rusqlite::{params, Connection, OptionalExtension};

use crate::model::{AppMode, AppSettings};

use super::error::StoreError;

const KEY_MODE: &str = "mode";
const KEY_FIRST_LAUNCH: &str = "first_launch";
const KEY_LEARNING_THRESHOLD: &str = "learning_threshold";
const KEY_ACTIVE_TEMPLATE: &str = "active_template_id";

fn get(conn: &Connection, key: &str) -> Result<Option<String>, StoreError> {
    let value = conn
        .query_row(
            "SELECT value FROM settings WHERE key = ?1",
            params![key],
            |r| r.get(0),
        )
        .optional()?;
    Ok(value)
}

fn put(conn: &Connection, key: &str, value: &str) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO settings (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value],
    )?;
    Ok(())
}

/// Loads settings. Missing keys fall back to [`AppSettings::default`].
pub fn load(conn: &Connection) -> Result<AppSettings, StoreError> {
    let mut settings = AppSettings::default();

    if let Some(mode) = get(conn, KEY_MODE)? {
        settings.mode = mode
            .parse::<AppMode>()
            .map_err(|e| StoreError::corrupt(KEY_MODE, e))?;
    }
    if let Some(first_launch) = get(conn, KEY_FIRST_LAUNCH)? {
        settings.first_launch = first_launch
            .parse()
            .map_err(|e| StoreError::corrupt(KEY_FIRST_LAUNCH, e))?;
    }
    if let Some(threshold) = get(conn, KEY_LEARNING_THRESHOLD)? {
        settings.learning_threshold = threshold
            .parse()
            .map_err(|e| StoreError::corrupt(KEY_LEARNING_THRESHOLD, e))?;
    }
    settings.active_template_id = get(conn, KEY_ACTIVE_TEMPLATE)?;

    Ok(settings)
}

/// Writes every settings key in one transaction.
pub fn save(conn: &Connection, settings: &AppSettings) -> Result<(), StoreError> {
    let tx = conn.unchecked_transaction()?;
    put(&tx, KEY_MODE, settings.mode.as_str())?;
    put(&tx, KEY_FIRST_LAUNCH, &settings.first_launch.to_string())?;
    put(
        &tx,
        KEY_LEARNING_THRESHOLD,
        &settings.learning_threshold.to_string(),
    )?;
    match settings.active_template_id {
        Some(ref id) => put(&tx, KEY_ACTIVE_TEMPLATE, id)?,
        None => {
            tx.execute(
                "DELETE FROM settings WHERE key = ?1",
                params![KEY_ACTIVE_TEMPLATE],
            )?;
        }
    }
    tx.commit()?;
    Ok(())
}
