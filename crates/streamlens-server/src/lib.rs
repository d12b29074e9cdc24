//! StreamLens server library logic.
//!
//! Exposes the pipeline's three operations over HTTP: publish an event,
//! query a session's recent events, and compute a session's analytics.
//! Authentication and authorization are external collaborators — the
//! already-authenticated caller identity arrives as a request header and
//! is used for log context only; no role checks happen here.

pub mod api;
pub mod config;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Extension, Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use streamlens_db::DbPool;
use streamlens_pipeline::EventPublisher;
use tower_http::cors::{Any, CorsLayer};

/// Application state shared across all request handlers.
///
/// Assembled once at process start by explicit constructor injection —
/// the broker client, store pool, and object-store client are all wired
/// in `main` and threaded through here.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool (hot store + dead-letter sink).
    pub pool: DbPool,
    /// Publisher half of the pipeline.
    pub publisher: Arc<EventPublisher>,
}

/// Maximum request body size (1 MiB). A telemetry event is a few hundred
/// bytes; anything near this limit is malformed or abusive.
const MAX_REQUEST_BODY_BYTES: usize = 1024 * 1024;

/// Health check handler.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/sessions/events", post(api::publish_event_handler))
        .route(
            "/api/sessions/{sessionId}/events",
            get(api::get_session_events_handler),
        )
        .route(
            "/api/sessions/{sessionId}/analytics",
            get(api::get_session_analytics_handler),
        )
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(Extension(Arc::new(state)))
}
