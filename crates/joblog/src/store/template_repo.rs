//! Template repository: CRUD for the `templates` table in `config.db`.
//!
//! Entities are stored as a JSON array next to the template row.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};

use crate::model::{EntityDefinition, WorkTemplate};

use super::error::StoreError;
use super::{format_timestamp, parse_timestamp};

#[derive(Debug, Clone)]
struct TemplateRow {
    id: String,
    name: String,
    entities: String,
    created_at: String,
    last_used: Option<String>,
    is_active: bool,
    usage_count: i64,
}

impl TemplateRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            entities: row.get("entities")?,
            created_at: row.get("created_at")?,
            last_used: row.get("last_used")?,
            is_active: row.get("is_active")?,
            usage_count: row.get("usage_count")?,
        })
    }

    fn into_template(self) -> Result<WorkTemplate, StoreError> {
        let entities: Vec<EntityDefinition> =
            serde_json::from_str(&self.entities).map_err(|e| StoreError::corrupt(&self.id, e))?;
        let created_at = parse_timestamp(&self.id, &self.created_at)?;
        let last_used = self
            .last_used
            .as_deref()
            .map(|s| parse_timestamp(&self.id, s))
            .transpose()?;
        Ok(WorkTemplate::from_parts(
            self.id,
            self.name,
            entities,
            created_at,
            last_used,
            self.is_active,
            self.usage_count.max(0) as u64,
        ))
    }
}

/// Inserts the template or overwrites every column of an existing one.
///
/// Saving an active template while another one is active violates the
/// single-active index; call [`deactivate_all`] first.
pub fn upsert(conn: &Connection, template: &WorkTemplate) -> Result<(), StoreError> {
    let entities =
        serde_json::to_string(template.entities()).map_err(|e| StoreError::corrupt(&template.id, e))?;
    conn.execute(
        "INSERT INTO templates (id, name, entities, created_at, last_used, is_active, usage_count)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(id) DO UPDATE SET name=excluded.name, entities=excluded.entities,
         last_used=excluded.last_used, is_active=excluded.is_active,
         usage_count=excluded.usage_count",
        params![
            template.id,
            template.name,
            entities,
            format_timestamp(template.created_at),
            template.last_used.map(format_timestamp),
            template.is_active,
            template.usage_count as i64,
        ],
    )?;
    Ok(())
}

/// Counts one use of template `id` at `at`. Only the usage columns are
/// written. Returns false if the template does not exist.
pub fn record_usage(conn: &Connection, id: &str, at: DateTime<Utc>) -> Result<bool, StoreError> {
    let changed = conn.execute(
        "UPDATE templates SET usage_count = usage_count + 1, last_used = ?2 WHERE id = ?1",
        params![id, format_timestamp(at)],
    )?;
    Ok(changed > 0)
}

/// Finds a template by its id.
pub fn find_by_id(conn: &Connection, id: &str) -> Result<Option<WorkTemplate>, StoreError> {
    let mut stmt = conn.prepare("SELECT * FROM templates WHERE id = ?1")?;
    let mut rows = stmt.query_map(params![id], TemplateRow::from_row)?;
    match rows.next() {
        Some(Ok(row)) => Ok(Some(row.into_template()?)),
        Some(Err(e)) => Err(StoreError::Sqlite(e)),
        None => Ok(None),
    }
}

/// Lists all templates, oldest first.
pub fn list(conn: &Connection) -> Result<Vec<WorkTemplate>, StoreError> {
    let mut stmt = conn.prepare("SELECT * FROM templates ORDER BY created_at ASC, id ASC")?;
    let rows: Vec<TemplateRow> = stmt
        .query_map([], TemplateRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(TemplateRow::into_template).collect()
}

/// Returns the active template, if any.
pub fn find_active(conn: &Connection) -> Result<Option<WorkTemplate>, StoreError> {
    let mut stmt = conn.prepare("SELECT * FROM templates WHERE is_active = 1")?;
    let mut rows = stmt.query_map([], TemplateRow::from_row)?;
    match rows.next() {
        Some(Ok(row)) => Ok(Some(row.into_template()?)),
        Some(Err(e)) => Err(StoreError::Sqlite(e)),
        None => Ok(None),
    }
}

/// Clears the active flag on every template.
pub fn deactivate_all(conn: &Connection) -> Result<(), StoreError> {
    conn.execute("UPDATE templates SET is_active = 0 WHERE is_active = 1", [])?;
    Ok(())
}

/// Deletes a template. Returns false if it did not exist.
pub fn delete(conn: &Connection, id: &str) -> Result<bool, StoreError> {
    let changed = conn.execute("DELETE FROM templates WHERE id = ?1", params![id])?;
    Ok(changed > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EntityType;
    use crate::store::migrations::{self, CONFIG_MIGRATIONS};

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        migrations::run_all(&conn, CONFIG_MIGRATIONS).unwrap();
        conn
    }

    fn template(name: &str) -> WorkTemplate {
        WorkTemplate::new(name)
            .unwrap()
            .with_entity(
                EntityDefinition::new("Cliente", EntityType::Client)
                    .unwrap()
                    .keyword("cliente")
                    .synonym("comprador")
                    .required(true),
            )
            .unwrap()
    }

    #[test]
    fn test_upsert_and_find() {
        let conn = setup();
        let mut tpl = template("Campo");
        upsert(&conn, &tpl).unwrap();
        assert_eq!(find_by_id(&conn, &tpl.id).unwrap().unwrap(), tpl);

        tpl.record_usage(Utc::now());
        tpl.name = "Campo norte".into();
        upsert(&conn, &tpl).unwrap();
        let found = find_by_id(&conn, &tpl.id).unwrap().unwrap();
        assert_eq!(found.name, "Campo norte");
        assert_eq!(found.usage_count, 1);
        assert_eq!(found.entities()[0].keywords(), ["cliente"]);
        assert_eq!(list(&conn).unwrap().len(), 1);
    }

    #[test]
    fn test_single_active_template() {
        let conn = setup();
        let mut a = template("A");
        let mut b = template("B");
        a.is_active = true;
        upsert(&conn, &a).unwrap();
        upsert(&conn, &b).unwrap();
        assert_eq!(find_active(&conn).unwrap().unwrap().id, a.id);

        b.is_active = true;
        assert!(upsert(&conn, &b).is_err());

        deactivate_all(&conn).unwrap();
        upsert(&conn, &b).unwrap();
        assert_eq!(find_active(&conn).unwrap().unwrap().id, b.id);
        assert!(!find_by_id(&conn, &a.id).unwrap().unwrap().is_active);
    }

    #[test]
    fn test_delete_and_deactivate_all() {
        let conn = setup();
        let mut a = template("A");
        a.is_active = true;
        upsert(&conn, &a).unwrap();
        deactivate_all(&conn).unwrap();
        assert!(find_active(&conn).unwrap().is_none());
        assert!(delete(&conn, &a.id).unwrap());
        assert!(find_by_id(&conn, &a.id).unwrap().is_none());
    }

    #[test]
    fn test_record_usage_keeps_newer_vocabulary() {
        let conn = setup();
        let tpl = template("Campo");
        upsert(&conn, &tpl).unwrap();

        let mut newer = find_by_id(&conn, &tpl.id).unwrap().unwrap();
        newer
            .merge_keyword("pedro", EntityType::Client)
            .unwrap();
        upsert(&conn, &newer).unwrap();

        // `tpl` is now stale; counting a use through it must not undo the merge.
        let at = Utc::now();
        assert!(record_usage(&conn, &tpl.id, at).unwrap());
        assert!(record_usage(&conn, &tpl.id, at).unwrap());

        let found = find_by_id(&conn, &tpl.id).unwrap().unwrap();
        assert_eq!(found.usage_count, 2);
        assert!(found.last_used.is_some());
        assert_eq!(found.entities()[0].keywords(), ["cliente", "pedro"]);
        assert!(!record_usage(&conn, "nope", at).unwrap());
    }
}
