//! Session telemetry API handlers.
//!
//! Provides:
//! - `POST /api/sessions/events` — publish one telemetry event
//! - `GET /api/sessions/{sessionId}/events` — recent events, newest first
//! - `GET /api/sessions/{sessionId}/analytics` — derived aggregates

use crate::AppState;
use axum::{
    extract::{Extension, Path, Query},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use streamlens_pipeline::compute_analytics;
use streamlens_store::recent_events;
use streamlens_types::{SessionAnalytics, SessionEvent};

/// Returns the already-authenticated caller identity supplied by the
/// upstream auth layer, for log context. The pipeline itself performs no
/// identity or role checks.
fn caller_identity(headers: &HeaderMap) -> &str {
    headers
        .get("x-authenticated-caller")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
}

fn internal_error(message: String) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({ "error": message })),
    )
        .into_response()
}

/// Handler for `POST /api/sessions/events`.
///
/// Hands the event to the publisher and acknowledges as soon as the broker
/// accepts it — fire-and-forget from the caller's perspective. Transport
/// failures are absorbed into the dead-letter sink by the publisher and
/// still acknowledge successfully.
pub async fn publish_event_handler(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    Json(event): Json<SessionEvent>,
) -> Result<StatusCode, Response> {
    tracing::debug!(
        caller = caller_identity(&headers),
        session_id = %event.session_id,
        "publish requested"
    );

    state
        .publisher
        .publish(&event)
        .await
        .map_err(|e| internal_error(e.to_string()))?;

    Ok(StatusCode::OK)
}

/// Query parameters for `GET /api/sessions/{sessionId}/events`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEventsQuery {
    /// Optional event-type filter, applied here at the boundary — the
    /// store's recency query knows nothing about event types.
    pub event_type: Option<String>,
}

/// Handler for `GET /api/sessions/{sessionId}/events`.
///
/// Returns the session's events inside the retention window, newest
/// first.
pub async fn get_session_events_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(session_id): Path<String>,
    Query(params): Query<SessionEventsQuery>,
) -> Result<Json<Vec<SessionEvent>>, Response> {
    let mut events = fetch_recent_events(&state, session_id).await?;

    if let Some(event_type) = params.event_type {
        events.retain(|e| e.event_type == event_type);
    }

    Ok(Json(events))
}

/// Handler for `GET /api/sessions/{sessionId}/analytics`.
///
/// Computes the aggregate over the session's recent events. Derived and
/// ephemeral — nothing is persisted.
pub async fn get_session_analytics_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionAnalytics>, Response> {
    let events = fetch_recent_events(&state, session_id).await?;
    Ok(Json(compute_analytics(&events)))
}

async fn fetch_recent_events(
    state: &AppState,
    session_id: String,
) -> Result<Vec<SessionEvent>, Response> {
    let pool = state.pool.clone();

    tokio::task::spawn_blocking(move || {
        let conn = pool.get().map_err(|e| e.to_string())?;
        recent_events(&conn, &session_id, Utc::now()).map_err(|e| e.to_string())
    })
    .await
    .map_err(|e| internal_error(format!("task join error: {e}")))?
    .map_err(internal_error)
}
