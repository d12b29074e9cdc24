//! Event consumer: validate, persist, then decide tiering.

use async_trait::async_trait;
use chrono::Utc;
use streamlens_db::DbPool;
use streamlens_store::{insert_event, is_archival_eligible, StoreError};
use streamlens_types::{FailureStage, SessionEvent};

use crate::archive::ArchivalMover;
use crate::broker::MessageHandler;
use crate::error::PipelineError;
use crate::sink::DeadLetterSink;

/// Broker-delivered handler for the main telemetry topic.
///
/// Runs once per delivered message. Delivery is at-least-once and there is
/// no deduplication: redelivering a message yields a second independent
/// row. A crash between delivery and commit yields redelivery, not loss.
pub struct EventConsumer {
    pool: DbPool,
    mover: ArchivalMover,
    sink: DeadLetterSink,
}

impl EventConsumer {
    /// Creates a consumer writing to `pool`, tiering through `mover`, and
    /// dead-lettering through `sink`.
    pub fn new(pool: DbPool, mover: ArchivalMover, sink: DeadLetterSink) -> Self {
        Self { pool, mover, sink }
    }

    /// Inserts the event inside an explicit transaction scope around the
    /// single row. The transaction is released on every exit path.
    async fn persist(&self, event: SessionEvent) -> Result<Result<i64, PipelineError>, PipelineError> {
        let pool = self.pool.clone();
        let result = tokio::task::spawn_blocking(move || -> Result<i64, PipelineError> {
            let conn = pool.get()?;
            let tx = conn.unchecked_transaction().map_err(StoreError::from)?;
            let id = insert_event(&tx, &event)?;
            tx.commit().map_err(StoreError::from)?;
            Ok(id)
        })
        .await?;
        Ok(result)
    }
}

#[async_trait]
impl MessageHandler for EventConsumer {
    async fn handle(&self, key: &str, payload: &[u8]) -> Result<(), PipelineError> {
        // A payload that never parses still gets dead-lettered, wrapping
        // the raw bytes as received.
        let mut event: SessionEvent = match serde_json::from_slice(payload) {
            Ok(event) => event,
            Err(e) => {
                self.sink
                    .record(
                        FailureStage::Validation,
                        format!("malformed payload: {e}"),
                        String::from_utf8_lossy(payload).into_owned(),
                    )
                    .await?;
                return Ok(());
            }
        };

        if !event.has_required_fields() {
            self.sink
                .record(
                    FailureStage::Validation,
                    "sessionId and eventType must be non-empty".to_string(),
                    serde_json::to_string(&event)?,
                )
                .await?;
            return Ok(());
        }

        match self.persist(event.clone()).await? {
            Ok(id) => {
                event.id = Some(id);
                tracing::info!(
                    session_id = %event.session_id,
                    key,
                    id,
                    "processed event"
                );

                // Tiering is decided exactly once, at this instant. Events
                // that age past the window while resident in the hot store
                // are never re-examined — there is no background sweep.
                if is_archival_eligible(&event, Utc::now()) {
                    self.mover.archive(&event);
                }
                Ok(())
            }
            Err(e) => {
                tracing::error!(
                    session_id = %event.session_id,
                    key,
                    error = %e,
                    "persistence failed, routing to dead-letter sink"
                );
                self.sink
                    .record(
                        FailureStage::Persistence,
                        e.to_string(),
                        serde_json::to_string(&event)?,
                    )
                    .await?;
                Ok(())
            }
        }
    }
}
