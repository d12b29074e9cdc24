//! Append-only dead-letter sink.
//!
//! Terminal channel for events that failed at publish-transport,
//! validation, or persistence. Records are excluded from the normal query
//! paths and are never reprocessed by the pipeline; [`dead_letters`]
//! exists for operational inspection and tests.

use rusqlite::{params, Connection, Row};
use streamlens_types::{DeadLetterRecord, FailureStage};

use crate::error::StoreError;

/// Appends one dead-letter record and returns its row ID.
///
/// `event_json` should carry the event as serialized JSON, or the raw
/// payload as received when the event never parsed.
///
/// # Errors
///
/// Returns `StoreError::Database` on SQL failure.
pub fn record_dead_letter(
    conn: &Connection,
    stage: FailureStage,
    reason: &str,
    event_json: &str,
) -> Result<i64, StoreError> {
    conn.execute(
        "INSERT INTO dead_letters (stage, reason, event_json) VALUES (?1, ?2, ?3)",
        params![stage.as_str(), reason, event_json],
    )?;
    let id = conn.last_insert_rowid();
    tracing::warn!(stage = stage.as_str(), reason, id, "event dead-lettered");
    Ok(id)
}

/// Returns all dead-letter records, optionally filtered by stage, oldest
/// first.
///
/// # Errors
///
/// Returns `StoreError::Database` on SQL failure.
pub fn dead_letters(
    conn: &Connection,
    stage: Option<FailureStage>,
) -> Result<Vec<DeadLetterRecord>, StoreError> {
    let mut records = Vec::new();

    match stage {
        Some(stage) => {
            let mut stmt = conn.prepare(
                "SELECT id, stage, reason, event_json, created_at
                 FROM dead_letters WHERE stage = ?1 ORDER BY id ASC",
            )?;
            let rows = stmt.query_map([stage.as_str()], map_row_to_record)?;
            for row in rows {
                records.push(row?);
            }
        }
        None => {
            let mut stmt = conn.prepare(
                "SELECT id, stage, reason, event_json, created_at
                 FROM dead_letters ORDER BY id ASC",
            )?;
            let rows = stmt.query_map([], map_row_to_record)?;
            for row in rows {
                records.push(row?);
            }
        }
    }

    Ok(records)
}

fn map_row_to_record(row: &Row<'_>) -> rusqlite::Result<DeadLetterRecord> {
    Ok(DeadLetterRecord {
        id: row.get(0)?,
        stage: row.get(1)?,
        reason: row.get(2)?,
        event_json: row.get(3)?,
        created_at: row.get(4)?,
    })
}
