//! Persistence operations for the `session_events` hot store.
//!
//! All writes go through [`insert_event`], a single-row INSERT with the
//! embedded metrics flattened into columns. Reads go through
//! [`recent_events`], which applies the retention window and returns rows
//! newest-first.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use streamlens_types::{QualityMetrics, SessionEvent};

use crate::error::StoreError;
use crate::retention::retention_cutoff;

/// Inserts one event into the hot store and returns the assigned row ID.
///
/// The embedded metrics are flattened into columns. `end_time_ms` is not
/// persisted — it survives only on the wire and in archived copies.
///
/// No deduplication happens here: two logically identical events produce
/// two independent rows, which is what makes broker redelivery safe to
/// absorb (at-least-once, not exactly-once).
///
/// # Errors
///
/// Returns `StoreError::Database` on SQL failure.
pub fn insert_event(conn: &Connection, event: &SessionEvent) -> Result<i64, StoreError> {
    conn.execute(
        "INSERT INTO session_events (
            session_id, event_type, timestamp,
            startup_time_ms, buffering_duration_ms, bitrate, buffering_ratio,
            error_count, device_type, region, content_id
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            event.session_id,
            event.event_type,
            event.timestamp.timestamp_millis(),
            event.metrics.startup_time_ms,
            event.metrics.buffering_duration_ms,
            event.metrics.bitrate,
            event.metrics.buffering_ratio,
            event.metrics.error_count,
            event.device_type,
            event.region,
            event.content_id,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Returns a session's events inside the retention window, newest first.
///
/// Filters to `session_id` matches with `timestamp > now - retention` and
/// orders by timestamp descending. Event-type filtering is deliberately
/// not done here — that is a boundary-layer concern.
///
/// # Errors
///
/// Returns `StoreError::Database` on SQL failure.
pub fn recent_events(
    conn: &Connection,
    session_id: &str,
    now: DateTime<Utc>,
) -> Result<Vec<SessionEvent>, StoreError> {
    let cutoff_ms = retention_cutoff(now).timestamp_millis();

    let mut stmt = conn.prepare(
        "SELECT
            id, session_id, event_type, timestamp,
            startup_time_ms, buffering_duration_ms, bitrate, buffering_ratio,
            error_count, device_type, region, content_id
        FROM session_events
        WHERE session_id = ?1 AND timestamp > ?2
        ORDER BY timestamp DESC",
    )?;

    let rows = stmt.query_map(params![session_id, cutoff_ms], map_row_to_event)?;

    let mut events = Vec::new();
    for row in rows {
        events.push(row?);
    }
    Ok(events)
}

fn map_row_to_event(row: &Row<'_>) -> rusqlite::Result<SessionEvent> {
    let timestamp_ms: i64 = row.get(3)?;
    let timestamp = DateTime::<Utc>::from_timestamp_millis(timestamp_ms).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            rusqlite::types::Type::Integer,
            format!("timestamp out of range: {timestamp_ms}").into(),
        )
    })?;

    Ok(SessionEvent {
        id: Some(row.get(0)?),
        session_id: row.get(1)?,
        event_type: row.get(2)?,
        timestamp,
        metrics: QualityMetrics {
            startup_time_ms: row.get(4)?,
            buffering_duration_ms: row.get(5)?,
            // end_time_ms never reaches the hot store.
            end_time_ms: None,
            bitrate: row.get(6)?,
            buffering_ratio: row.get(7)?,
            error_count: row.get(8)?,
        },
        device_type: row.get(9)?,
        region: row.get(10)?,
        content_id: row.get(11)?,
    })
}
