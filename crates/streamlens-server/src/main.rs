//! StreamLens server binary — ingests playback-quality telemetry, persists
//! it, tiers aged events to cold storage, and serves aggregate analytics.
//!
//! Starts an axum HTTP server with structured logging, database
//! initialization, broker wiring, and graceful shutdown on SIGTERM/SIGINT.

use std::net::SocketAddr;
use std::sync::Arc;

use streamlens_pipeline::{
    ArchivalMover, DeadLetterSink, EventConsumer, EventPublisher, HttpObjectStore,
    InProcessBroker, MemoryObjectStore, ObjectStore,
};
use streamlens_server::{app, config, AppState};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

fn resolve_config_path() -> (Option<String>, &'static str) {
    if let Some(path) = std::env::args()
        .nth(1)
        .filter(|value| !value.trim().is_empty())
    {
        return (Some(path), "cli-arg");
    }

    if let Ok(path) = std::env::var("STREAMLENS_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (Some(path), "env-var");
        }
    }

    (None, "default")
}

#[tokio::main]
async fn main() {
    let (resolved_config_path, config_source) = resolve_config_path();
    let selected_config_path = resolved_config_path.as_deref().or(Some("config.toml"));

    // Load configuration
    let config = config::load_config(selected_config_path)
        .expect("failed to load configuration — the server cannot start without valid config");

    // Initialize tracing
    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(
        source = config_source,
        path = selected_config_path.unwrap_or("<none>"),
        "resolved startup configuration path"
    );

    // Initialize database
    let pool = streamlens_db::create_pool(
        &config.database.path,
        streamlens_db::DbRuntimeSettings {
            busy_timeout_ms: config.database.busy_timeout_ms,
            pool_max_size: config.database.pool_max_size,
        },
    )
    .expect("failed to create database pool — check database.path in config");

    {
        let conn = pool
            .get()
            .expect("failed to get database connection for migrations");
        let applied =
            streamlens_db::run_migrations(&conn).expect("failed to run database migrations");
        if applied > 0 {
            tracing::info!(count = applied, "applied database migrations");
        }
    }

    // Object store for archival
    let object_store: Arc<dyn ObjectStore> = match &config.archive.endpoint {
        Some(endpoint) => {
            tracing::info!(endpoint = %endpoint, bucket = %config.archive.bucket, "using HTTP object store for archival");
            Arc::new(HttpObjectStore::new(
                endpoint.clone(),
                config.archive.bucket.clone(),
            ))
        }
        None => {
            tracing::warn!(
                "archive.endpoint not configured; archived events go to a non-durable in-memory store"
            );
            MemoryObjectStore::new()
        }
    };

    // Assemble the pipeline: explicit constructor injection, wired once.
    let topics = config.broker.topics.clone();
    let sink = DeadLetterSink::new(pool.clone(), topics.dead_letter.clone());
    let mover = ArchivalMover::new(object_store);
    let consumer = Arc::new(EventConsumer::new(pool.clone(), mover, sink.clone()));

    let broker = InProcessBroker::new(config.broker.partitions);
    broker.register_handler(&topics.events, consumer);
    tracing::info!(
        topic = %topics.events,
        partitions = config.broker.partitions,
        "registered event consumer"
    );

    let publisher = Arc::new(EventPublisher::new(broker, topics, sink));

    // Build application
    let state = AppState {
        pool,
        publisher,
    };
    let app = app(state);
    let addr = SocketAddr::new(config.server.host, config.server.port);

    tracing::info!(%addr, "starting streamlens server");

    let listener = TcpListener::bind(addr)
        .await
        .expect("failed to bind to address — is another process using this port?");

    // Serve with graceful shutdown. In-flight archival uploads are
    // detached tasks and may be abandoned here; acceptable under the
    // try-once archival contract.
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    tracing::info!("streamlens server shut down");
}

/// Waits for a SIGINT (Ctrl+C) or SIGTERM signal for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { tracing::info!("received SIGINT, initiating graceful shutdown"); }
        () = terminate => { tracing::info!("received SIGTERM, initiating graceful shutdown"); }
    }
}
