//! Suggestion repository: CRUD for the `suggestions` table in `config.db`.

use rusqlite::{params, Connection, Row};

use crate::model::{EntityType, SuggestionStatus, TemplateSuggestion};

use super::error::StoreError;
use super::{format_timestamp, parse_timestamp};

#[derive(Debug, Clone)]
struct SuggestionRow {
    id: String,
    template_id: String,
    suggested_term: String,
    suggested_entity_type: String,
    confidence: f64,
    source_record_id: String,
    context: String,
    created_at: String,
    status: String,
}

impl SuggestionRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            template_id: row.get("template_id")?,
            suggested_term: row.get("suggested_term")?,
            suggested_entity_type: row.get("suggested_entity_type")?,
            confidence: row.get("confidence")?,
            source_record_id: row.get("source_record_id")?,
            context: row.get("context")?,
            created_at: row.get("created_at")?,
            status: row.get("status")?,
        })
    }

    fn into_suggestion(self) -> Result<TemplateSuggestion, StoreError> {
        let entity_type: EntityType = self
            .suggested_entity_type
            .parse()
            .map_err(|e| StoreError::corrupt(&self.id, e))?;
        let status: SuggestionStatus = self
            .status
            .parse()
            .map_err(|e| StoreError::corrupt(&self.id, e))?;
        let created_at = parse_timestamp(&self.id, &self.created_at)?;

        let mut suggestion = TemplateSuggestion::new(
            self.template_id,
            self.suggested_term,
            entity_type,
            self.confidence,
            self.source_record_id,
            self.context,
        )
        .map_err(|e| StoreError::corrupt(&self.id, e))?
        .with_status(status);
        suggestion.id = self.id;
        suggestion.created_at = created_at;
        Ok(suggestion)
    }
}

/// Inserts a new suggestion row.
pub fn insert(conn: &Connection, suggestion: &TemplateSuggestion) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO suggestions (id, template_id, suggested_term, suggested_entity_type,
         confidence, source_record_id, context, created_at, status)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            suggestion.id,
            suggestion.template_id,
            suggestion.suggested_term,
            suggestion.suggested_entity_type.as_str(),
            suggestion.confidence,
            suggestion.source_record_id,
            suggestion.context,
            format_timestamp(suggestion.created_at),
            suggestion.status().as_str(),
        ],
    )?;
    Ok(())
}

/// Writes the suggestion's current status. Returns false if it does not exist.
pub fn update_status(conn: &Connection, suggestion: &TemplateSuggestion) -> Result<bool, StoreError> {
    let changed = conn.execute(
        "UPDATE suggestions SET status = ?2 WHERE id = ?1",
        params![suggestion.id, suggestion.status().as_str()],
    )?;
    Ok(changed > 0)
}

/// Finds a suggestion by its id.
pub fn find_by_id(conn: &Connection, id: &str) -> Result<Option<TemplateSuggestion>, StoreError> {
    let mut stmt = conn.prepare("SELECT * FROM suggestions WHERE id = ?1")?;
    let mut rows = stmt.query_map(params![id], SuggestionRow::from_row)?;
    match rows.next() {
        Some(Ok(row)) => Ok(Some(row.into_suggestion()?)),
        Some(Err(e)) => Err(StoreError::Sqlite(e)),
        None => Ok(None),
    }
}

/// Lists a template's suggestions, optionally restricted to one status,
/// oldest first.
pub fn list_for_template(
    conn: &Connection,
    template_id: &str,
    status: Option<SuggestionStatus>,
) -> Result<Vec<TemplateSuggestion>, StoreError> {
    let rows: Vec<SuggestionRow> = match status {
        Some(status) => {
            let mut stmt = conn.prepare(
                "SELECT * FROM suggestions WHERE template_id = ?1 AND status = ?2
                 ORDER BY created_at ASC, id ASC",
            )?;
            let rows = stmt
                .query_map(params![template_id, status.as_str()], SuggestionRow::from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
        None => {
            let mut stmt = conn.prepare(
                "SELECT * FROM suggestions WHERE template_id = ?1 ORDER BY created_at ASC, id ASC",
            )?;
            let rows = stmt
                .query_map(params![template_id], SuggestionRow::from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
    };
    rows.into_iter().map(SuggestionRow::into_suggestion).collect()
}

/// Deletes the pending suggestions produced from `record_id`. Finalized
/// suggestions are kept as history. Returns the number of rows removed.
pub fn delete_pending_for_record(conn: &Connection, record_id: &str) -> Result<usize, StoreError> {
    let removed = conn.execute(
        "DELETE FROM suggestions WHERE source_record_id = ?1 AND status = ?2",
        params![record_id, SuggestionStatus::Pending.as_str()],
    )?;
    Ok(removed)
}
