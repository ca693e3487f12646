//! SQL access to the `records` table.
//!
//! # Responsibility
//! - Keep every statement touching stored payloads in one place.
//!
//! # Invariants
//! - Sort fields are bound as JSON paths, never spliced into SQL text.
//! - Read paths reject malformed ids or payloads instead of masking them.

use crate::model::record::PersistentId;
use crate::query::descriptor::{FetchWindow, SortDescriptor, SortDirection};
use crate::store::error::{StoreError, StoreResult};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, Row};
use serde_json::Value;

const RECORD_SELECT_SQL: &str = "SELECT persistent_id, entity, payload FROM records";

/// One stored record as read from SQLite.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct StoredRow {
    pub id: PersistentId,
    pub entity: String,
    pub payload: Value,
}

/// Reads every record of `entity` in sort order, optionally windowed in SQL.
///
/// Without sort descriptors rows come back in insertion order.
pub(crate) fn select_entity(
    conn: &Connection,
    entity: &str,
    sort: &[SortDescriptor],
    window: FetchWindow,
) -> StoreResult<Vec<StoredRow>> {
    let mut sql = format!("{RECORD_SELECT_SQL} WHERE entity = ?");
    let mut bind_values = vec![SqlValue::Text(entity.to_string())];

    if sort.is_empty() {
        sql.push_str(" ORDER BY rowid ASC");
    } else {
        let keys = sort
            .iter()
            .map(|descriptor| {
                bind_values.push(SqlValue::Text(format!("$.{}", descriptor.field)));
                match descriptor.direction {
                    SortDirection::Ascending => "json_extract(payload, ?) ASC",
                    SortDirection::Descending => "json_extract(payload, ?) DESC",
                }
            })
            .collect::<Vec<_>>();
        sql.push_str(" ORDER BY ");
        sql.push_str(&keys.join(", "));
    }

    if let FetchWindow::Paging { offset, limit } = window {
        sql.push_str(" LIMIT ? OFFSET ?");
        bind_values.push(SqlValue::Integer(i64::from(limit.get())));
        bind_values.push(SqlValue::Integer(i64::from(offset)));
    }

    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params_from_iter(bind_values))?;
    let mut stored = Vec::new();
    while let Some(row) = rows.next()? {
        stored.push(parse_row(row)?);
    }

    Ok(stored)
}

pub(crate) fn count_entity(conn: &Connection, entity: &str) -> StoreResult<usize> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM records WHERE entity = ?1;",
        [entity],
        |row| row.get(0),
    )?;
    usize::try_from(count).map_err(|_| StoreError::InvalidData(format!("negative count {count}")))
}

pub(crate) fn select_by_id(conn: &Connection, id: PersistentId) -> StoreResult<Option<StoredRow>> {
    let mut stmt = conn.prepare(&format!("{RECORD_SELECT_SQL} WHERE persistent_id = ?1;"))?;
    let mut rows = stmt.query([id.to_string()])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_row(row)?));
    }

    Ok(None)
}

pub(crate) fn select_by_ids(conn: &Connection, ids: &[PersistentId]) -> StoreResult<Vec<StoredRow>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let placeholders = vec!["?"; ids.len()].join(", ");
    let mut stmt = conn.prepare(&format!(
        "{RECORD_SELECT_SQL} WHERE persistent_id IN ({placeholders});"
    ))?;
    let mut rows = stmt.query(params_from_iter(ids.iter().map(ToString::to_string)))?;
    let mut stored = Vec::new();
    while let Some(row) = rows.next()? {
        stored.push(parse_row(row)?);
    }

    Ok(stored)
}

pub(crate) fn insert(
    conn: &Connection,
    id: PersistentId,
    entity: &str,
    payload: &Value,
) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO records (persistent_id, entity, payload) VALUES (?1, ?2, ?3);",
        params![id.to_string(), entity, payload.to_string()],
    )?;
    Ok(())
}

pub(crate) fn update(
    conn: &Connection,
    id: PersistentId,
    entity: &str,
    payload: &Value,
) -> StoreResult<()> {
    let changed = conn.execute(
        "UPDATE records
         SET
            payload = ?3,
            updated_at = (strftime('%s', 'now') * 1000)
         WHERE persistent_id = ?1
           AND entity = ?2;",
        params![id.to_string(), entity, payload.to_string()],
    )?;

    if changed == 0 {
        return Err(StoreError::NotFound(id));
    }

    Ok(())
}

pub(crate) fn delete(conn: &Connection, id: PersistentId) -> StoreResult<()> {
    let changed = conn.execute(
        "DELETE FROM records WHERE persistent_id = ?1;",
        [id.to_string()],
    )?;

    if changed == 0 {
        return Err(StoreError::NotFound(id));
    }

    Ok(())
}

fn parse_row(row: &Row<'_>) -> StoreResult<StoredRow> {
    let id_text: String = row.get("persistent_id")?;
    let id = id_text.parse::<PersistentId>().map_err(|_| {
        StoreError::InvalidData(format!(
            "invalid id value `{id_text}` in records.persistent_id"
        ))
    })?;

    let payload_text: String = row.get("payload")?;
    let payload = serde_json::from_str(&payload_text).map_err(|err| {
        StoreError::InvalidData(format!("invalid payload for record {id}: {err}"))
    })?;

    Ok(StoredRow {
        id,
        entity: row.get("entity")?,
        payload,
    })
}
