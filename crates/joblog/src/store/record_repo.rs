//! Record repository: row-level operations on one partition's `records` table.
//!
//! Every function takes an open partition connection. Routing to the right
//! partition and scanning across partitions is done by [`super::Store`].

use rusqlite::{params, Connection, ErrorCode, Row};

use crate::model::{JobRecordEntry, ParsedItem, RecordStatus};

use super::error::StoreError;
use super::{format_timestamp, parse_timestamp};

/// A raw record row from a partition.
#[derive(Debug, Clone)]
struct RecordRow {
    id: String,
    original_input: String,
    timestamp: String,
    template_id: Option<String>,
    parsed_items: String,
    status: String,
    last_modified: String,
    retry_count: u32,
}

impl RecordRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            original_input: row.get("original_input")?,
            timestamp: row.get("timestamp")?,
            template_id: row.get("template_id")?,
            parsed_items: row.get("parsed_items")?,
            status: row.get("status")?,
            last_modified: row.get("last_modified")?,
            retry_count: row.get("retry_count")?,
        })
    }

    fn into_entry(self) -> Result<JobRecordEntry, StoreError> {
        let timestamp = parse_timestamp(&self.id, &self.timestamp)?;
        let last_modified = parse_timestamp(&self.id, &self.last_modified)?;
        let status: RecordStatus = self
            .status
            .parse()
            .map_err(|e| StoreError::corrupt(&self.id, e))?;
        let parsed_items: Vec<ParsedItem> = serde_json::from_str(&self.parsed_items)
            .map_err(|e| StoreError::corrupt(&self.id, e))?;
        if status == RecordStatus::Verified && self.template_id.is_none() {
            return Err(StoreError::corrupt(&self.id, "verified record without template"));
        }
        Ok(JobRecordEntry::from_parts(
            self.id,
            self.original_input,
            timestamp,
            self.template_id,
            parsed_items,
            status,
            last_modified,
            self.retry_count,
        ))
    }
}

/// SQL-side filter for record selection.
///
/// `from_ms`/`to_ms` bound `timestamp_ms` inclusively; callers needing
/// sub-millisecond precision filter the returned records again.
#[derive(Debug, Default, Clone)]
pub struct RecordFilter {
    pub status: Option<RecordStatus>,
    pub template_id: Option<String>,
    pub from_ms: Option<i64>,
    pub to_ms: Option<i64>,
}

impl RecordFilter {
    pub fn status(status: RecordStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn template(template_id: &str) -> Self {
        Self {
            template_id: Some(template_id.to_string()),
            ..Self::default()
        }
    }

    fn where_clause(&self) -> (String, Vec<Box<dyn rusqlite::types::ToSql>>) {
        let mut conditions = Vec::new();
        let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(status) = self.status {
            conditions.push(format!("status = ?{}", param_values.len() + 1));
            param_values.push(Box::new(status.as_str()));
        }
        if let Some(ref template_id) = self.template_id {
            conditions.push(format!("template_id = ?{}", param_values.len() + 1));
            param_values.push(Box::new(template_id.clone()));
        }
        if let Some(from_ms) = self.from_ms {
            conditions.push(format!("timestamp_ms >= ?{}", param_values.len() + 1));
            param_values.push(Box::new(from_ms));
        }
        if let Some(to_ms) = self.to_ms {
            conditions.push(format!("timestamp_ms <= ?{}", param_values.len() + 1));
            param_values.push(Box::new(to_ms));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };
        (where_clause, param_values)
    }
}

/// Inserts a new record row.
pub fn insert(conn: &Connection, record: &JobRecordEntry) -> Result<(), StoreError> {
    let parsed_items =
        serde_json::to_string(record.parsed_items()).map_err(|e| StoreError::corrupt(record.id(), e))?;
    let result = conn.execute(
        "INSERT INTO records (id, original_input, timestamp, timestamp_ms, template_id,
         parsed_items, status, last_modified, retry_count)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            record.id(),
            record.original_input(),
            format_timestamp(record.timestamp()),
            record.timestamp().timestamp_millis(),
            record.template_id(),
            parsed_items,
            record.status().as_str(),
            format_timestamp(record.last_modified()),
            record.retry_count(),
        ],
    );
    match result {
        Ok(_) => Ok(()),
        Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
            Err(StoreError::DuplicateRecord(record.id().to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

/// Overwrites the mutable columns of an existing record. `original_input`
/// and `timestamp` are never written. Returns false if no row had that id.
pub fn update(conn: &Connection, record: &JobRecordEntry) -> Result<bool, StoreError> {
    let parsed_items =
        serde_json::to_string(record.parsed_items()).map_err(|e| StoreError::corrupt(record.id(), e))?;
    let changed = conn.execute(
        "UPDATE records SET template_id=?2, parsed_items=?3, status=?4, last_modified=?5,
         retry_count=?6 WHERE id=?1",
        params![
            record.id(),
            record.template_id(),
            parsed_items,
            record.status().as_str(),
            format_timestamp(record.last_modified()),
            record.retry_count(),
        ],
    )?;
    Ok(changed > 0)
}

/// Deletes a record by id. Returns false if it did not exist.
pub fn delete(conn: &Connection, id: &str) -> Result<bool, StoreError> {
    let changed = conn.execute("DELETE FROM records WHERE id = ?1", params![id])?;
    Ok(changed > 0)
}

/// Finds a record by its id.
pub fn find_by_id(conn: &Connection, id: &str) -> Result<Option<JobRecordEntry>, StoreError> {
    let mut stmt = conn.prepare("SELECT * FROM records WHERE id = ?1")?;
    let mut rows = stmt.query_map(params![id], RecordRow::from_row)?;
    match rows.next() {
        Some(Ok(row)) => Ok(Some(row.into_entry()?)),
        Some(Err(e)) => Err(StoreError::Sqlite(e)),
        None => Ok(None),
    }
}

/// Selects records matching `filter`, newest first.
pub fn select(conn: &Connection, filter: &RecordFilter) -> Result<Vec<JobRecordEntry>, StoreError> {
    let (where_clause, param_values) = filter.where_clause();
    let sql = format!(
        "SELECT * FROM records {} ORDER BY timestamp_ms DESC, id ASC",
        where_clause
    );
    let params_ref: Vec<&dyn rusqlite::types::ToSql> =
        param_values.iter().map(|p| p.as_ref()).collect();

    let mut stmt = conn.prepare(&sql)?;
    let rows: Vec<RecordRow> = stmt
        .query_map(params_ref.as_slice(), RecordRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(RecordRow::into_entry).collect()
}

/// Counts records matching `filter`.
pub fn count(conn: &Connection, filter: &RecordFilter) -> Result<u64, StoreError> {
    let (where_clause, param_values) = filter.where_clause();
    let sql = format!("SELECT COUNT(*) FROM records {}", where_clause);
    let params_ref: Vec<&dyn rusqlite::types::ToSql> =
        param_values.iter().map(|p| p.as_ref()).collect();
    let total: u64 = conn.query_row(&sql, params_ref.as_slice(), |r| r.get(0))?;
    Ok(total)
}
