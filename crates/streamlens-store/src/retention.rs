//! Retention-window policy.

use chrono::{DateTime, Duration, Utc};
use streamlens_types::SessionEvent;

/// Fixed retention window: events older than this are archival-eligible
/// and fall out of the recency query.
pub const RETENTION_DAYS: i64 = 7;

/// Returns the cutoff instant: events with a timestamp at or before this
/// are outside the retention window.
pub fn retention_cutoff(now: DateTime<Utc>) -> DateTime<Utc> {
    now - Duration::days(RETENTION_DAYS)
}

/// Returns `true` if the event's timestamp is already past the retention
/// window at `now`.
///
/// Callers evaluate this once, at persistence time. An event that ages
/// past the window while sitting in the hot store is never re-examined —
/// archival is a write-time decision only.
pub fn is_archival_eligible(event: &SessionEvent, now: DateTime<Utc>) -> bool {
    event.timestamp < retention_cutoff(now)
}
