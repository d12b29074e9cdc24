//! Async wrapper over the durable dead-letter sink.

use streamlens_db::DbPool;
use streamlens_types::FailureStage;

use crate::error::PipelineError;

/// Handle to the append-only dead-letter channel.
///
/// Wraps the blocking store write in `spawn_blocking` so publisher and
/// consumer code can record failures from async context. The channel name
/// (the would-be DLQ topic) is carried for log context only — the durable
/// copy lives in the `dead_letters` table.
#[derive(Clone)]
pub struct DeadLetterSink {
    pool: DbPool,
    channel: String,
}

impl DeadLetterSink {
    /// Creates a sink writing through `pool`, labelled `channel` in logs.
    pub fn new(pool: DbPool, channel: String) -> Self {
        Self { pool, channel }
    }

    /// Appends one dead-letter record.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError` if the sink write itself fails — the one
    /// failure the pipeline cannot absorb.
    pub async fn record(
        &self,
        stage: FailureStage,
        reason: String,
        event_json: String,
    ) -> Result<i64, PipelineError> {
        let pool = self.pool.clone();
        let channel = self.channel.clone();
        let id = tokio::task::spawn_blocking(move || -> Result<i64, PipelineError> {
            let conn = pool.get()?;
            let id = streamlens_store::record_dead_letter(&conn, stage, &reason, &event_json)?;
            tracing::debug!(channel = %channel, stage = stage.as_str(), id, "dead letter recorded");
            Ok(id)
        })
        .await??;
        Ok(id)
    }
}
