//! Shared types for the StreamLens telemetry pipeline.
//!
//! This crate provides the foundational data model used across all
//! StreamLens crates: the [`SessionEvent`] telemetry record, its embedded
//! [`QualityMetrics`], the derived [`SessionAnalytics`] aggregate, and the
//! dead-letter vocabulary ([`FailureStage`], [`DeadLetterRecord`]).
//!
//! No crate in the workspace depends on anything *except*
//! `streamlens-types` for cross-cutting type definitions. This keeps the
//! dependency graph clean and prevents circular dependencies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One playback-quality telemetry record emitted by a streaming client.
///
/// Events are created at the API boundary from caller input and are
/// immutable once published. The row `id` is assigned by the hot store at
/// persistence time, never before.
///
/// `session_id` and `event_type` are required to be non-empty, but the
/// check lives in the consumer rather than the deserializer: a missing
/// field deserializes to the empty string so the invalid event can still
/// travel the dead-letter path instead of being rejected at the boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEvent {
    /// Hot-store row ID. `None` until the event has been persisted.
    #[serde(default)]
    pub id: Option<i64>,
    /// The playback session this event belongs to.
    #[serde(default)]
    pub session_id: String,
    /// The kind of event (e.g. `playback-start`, `rebuffer`, `error`).
    #[serde(default)]
    pub event_type: String,
    /// The point in time the event describes. Drives both the recency
    /// query ordering and the archival-eligibility decision.
    pub timestamp: DateTime<Utc>,
    /// Embedded quality measurements. Every field is optional — absence
    /// means "not measured", not zero.
    #[serde(default)]
    pub metrics: QualityMetrics,
    /// Client device class (e.g. `tv`, `mobile`), if reported.
    #[serde(default)]
    pub device_type: Option<String>,
    /// Geographic region of the client, if reported.
    #[serde(default)]
    pub region: Option<String>,
    /// The content being played. Doubles as the broker partition key, so
    /// events for the same content share an ordered delivery lane.
    #[serde(default)]
    pub content_id: Option<String>,
}

impl SessionEvent {
    /// Returns the broker partition key for this event.
    ///
    /// Events without a `content_id` get the empty key — they still
    /// publish, but per-content ordering is not meaningful for them.
    pub fn partition_key(&self) -> &str {
        self.content_id.as_deref().unwrap_or("")
    }

    /// Returns `true` when both required fields are present and non-empty.
    pub fn has_required_fields(&self) -> bool {
        !self.session_id.is_empty() && !self.event_type.is_empty()
    }
}

/// Quality measurements embedded in a [`SessionEvent`].
///
/// All fields are optional; a `None` means the client did not measure the
/// value for this event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityMetrics {
    /// Time from play intent to first frame, in milliseconds.
    #[serde(default)]
    pub startup_time_ms: Option<i64>,
    /// Total time spent rebuffering, in milliseconds.
    #[serde(default)]
    pub buffering_duration_ms: Option<i64>,
    /// Playback end offset, in milliseconds. Carried on the wire and in
    /// archived copies but not persisted as a hot-store column.
    #[serde(default)]
    pub end_time_ms: Option<i64>,
    /// Average delivered bitrate, in kbps.
    #[serde(default)]
    pub bitrate: Option<i32>,
    /// Fraction of playback time spent buffering.
    #[serde(default)]
    pub buffering_ratio: Option<f64>,
    /// Number of playback errors observed.
    #[serde(default)]
    pub error_count: Option<i32>,
}

/// Aggregate analytics derived from a set of session events.
///
/// Computed on read, never persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionAnalytics {
    /// Mean startup time over events that measured it; `0.0` if none did.
    pub average_startup_time_ms: f64,
    /// Sum of buffering durations over events that measured it.
    pub total_buffering_ms: i64,
    /// Mean bitrate over events that measured it; `0.0` if none did.
    pub average_bitrate_kbps: f64,
    /// Sum of error counts over all events.
    pub total_errors: i64,
}

/// The pipeline stage at which a dead-lettered event failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureStage {
    /// The broker rejected the publish or was unreachable.
    #[serde(rename = "publish-transport")]
    PublishTransport,
    /// A required field was missing or the payload was malformed.
    #[serde(rename = "validation")]
    Validation,
    /// The hot-store insert failed.
    #[serde(rename = "persistence")]
    Persistence,
}

impl FailureStage {
    /// Returns the canonical label for this stage.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PublishTransport => "publish-transport",
            Self::Validation => "validation",
            Self::Persistence => "persistence",
        }
    }
}

impl std::fmt::Display for FailureStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FailureStage {
    type Err = ParseFailureStageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "publish-transport" => Ok(Self::PublishTransport),
            "validation" => Ok(Self::Validation),
            "persistence" => Ok(Self::Persistence),
            _ => Err(ParseFailureStageError(s.to_string())),
        }
    }
}

/// Error returned when parsing an unknown failure stage label.
#[derive(Debug, Clone)]
pub struct ParseFailureStageError(pub String);

impl std::fmt::Display for ParseFailureStageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown failure stage: {}", self.0)
    }
}

impl std::error::Error for ParseFailureStageError {}

/// A single row from the `dead_letters` table.
///
/// Wraps the original event (or its raw serialized form, if even
/// deserialization failed) plus the failure reason and stage. Append-only;
/// reprocessing is out of scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterRecord {
    /// Auto-incremented row ID.
    pub id: i64,
    /// The stage label (`publish-transport`, `validation`, `persistence`).
    pub stage: String,
    /// Human-readable failure reason.
    pub reason: String,
    /// The event as JSON, or the raw payload when it never parsed.
    pub event_json: String,
    /// ISO 8601 timestamp of when the record was appended.
    pub created_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_event() -> SessionEvent {
        SessionEvent {
            id: None,
            session_id: "s1".to_string(),
            event_type: "playback-start".to_string(),
            timestamp: Utc.with_ymd_and_hms(2025, 3, 14, 9, 26, 53).unwrap(),
            metrics: QualityMetrics {
                startup_time_ms: Some(420),
                bitrate: Some(4800),
                ..QualityMetrics::default()
            },
            device_type: Some("tv".to_string()),
            region: None,
            content_id: Some("c42".to_string()),
        }
    }

    #[test]
    fn event_serializes_camel_case() {
        let json = serde_json::to_value(sample_event()).expect("should serialize");
        assert_eq!(json["sessionId"], "s1");
        assert_eq!(json["eventType"], "playback-start");
        assert_eq!(json["metrics"]["startupTimeMs"], 420);
        assert_eq!(json["contentId"], "c42");
        // Unmeasured metrics serialize as explicit nulls.
        assert!(json["metrics"]["errorCount"].is_null());
    }

    #[test]
    fn missing_required_fields_deserialize_to_empty() {
        // Validation happens in the consumer, so a payload without
        // sessionId must still deserialize.
        let event: SessionEvent =
            serde_json::from_str(r#"{"eventType":"rebuffer","timestamp":"2025-03-14T09:26:53Z"}"#)
                .expect("should deserialize");
        assert_eq!(event.session_id, "");
        assert!(!event.has_required_fields());
    }

    #[test]
    fn partition_key_defaults_to_empty() {
        let mut event = sample_event();
        assert_eq!(event.partition_key(), "c42");
        event.content_id = None;
        assert_eq!(event.partition_key(), "");
    }

    #[test]
    fn failure_stage_labels_round_trip() {
        for stage in [
            FailureStage::PublishTransport,
            FailureStage::Validation,
            FailureStage::Persistence,
        ] {
            let parsed: FailureStage = stage.as_str().parse().expect("should parse");
            assert_eq!(parsed, stage);
        }
        assert!("retry".parse::<FailureStage>().is_err());
    }
}
