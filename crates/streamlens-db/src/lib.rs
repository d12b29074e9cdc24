//! Database layer for the StreamLens pipeline.
//!
//! Provides SQLite connection pooling (via `r2d2`), WAL-mode
//! initialization, and embedded SQL migrations. The hot store
//! (`session_events`) and the dead-letter sink (`dead_letters`) are both
//! created through versioned migrations managed by this crate.
//!
//! # Design decisions
//!
//! - **SQLite with WAL mode**: the hot store only ever sees single-row
//!   inserts and indexed recency reads, so WAL's concurrent-readers /
//!   single-writer model is a good match without an external database
//!   process.
//! - **`r2d2` connection pool**: bounded connection reuse; consumer
//!   workers and API handlers each check out a connection for the
//!   duration of one operation.
//! - **Embedded migrations**: SQL files are compiled into the binary via
//!   `include_str!`, so the schema ships with the code that depends on it.

mod migrations;
mod pool;

pub use migrations::{run_migrations, MigrationError};
pub use pool::{create_pool, DbPool, DbRuntimeSettings, PoolError};
