//! Event publisher: the boundary-facing entry to the write path.

use std::sync::Arc;

use streamlens_types::{FailureStage, SessionEvent};

use crate::broker::{BrokerClient, BrokerTopics};
use crate::error::PipelineError;
use crate::sink::DeadLetterSink;

/// Accepts validated-shape events from the API boundary and hands them to
/// the broker, keyed by content ID.
pub struct EventPublisher {
    broker: Arc<dyn BrokerClient>,
    topics: BrokerTopics,
    sink: DeadLetterSink,
}

impl EventPublisher {
    /// Creates a publisher over the given broker, topic set, and sink.
    pub fn new(broker: Arc<dyn BrokerClient>, topics: BrokerTopics, sink: DeadLetterSink) -> Self {
        Self {
            broker,
            topics,
            sink,
        }
    }

    /// Publishes one event to the main topic.
    ///
    /// Success means broker handoff only — fire-and-forget past the broker
    /// acknowledgment; the consumer may not have run yet.
    ///
    /// On transport failure the event is synchronously re-routed to the
    /// dead-letter sink with `stage=publish-transport` and the call still
    /// returns `Ok`: the failure is absorbed rather than surfaced to the
    /// boundary caller. That policy trades caller visibility for
    /// operational simplicity and is deliberate.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError` only when the event cannot be serialized or
    /// the dead-letter write itself fails.
    pub async fn publish(&self, event: &SessionEvent) -> Result<(), PipelineError> {
        let payload = serde_json::to_string(event)?;
        let key = event.partition_key();

        match self
            .broker
            .send(&self.topics.events, key, payload.clone().into_bytes())
            .await
        {
            Ok(()) => {
                tracing::info!(
                    session_id = %event.session_id,
                    key,
                    topic = %self.topics.events,
                    "published event"
                );
                Ok(())
            }
            Err(e) => {
                tracing::error!(
                    session_id = %event.session_id,
                    key,
                    error = %e,
                    "publish transport failed, routing to dead-letter sink"
                );
                self.sink
                    .record(FailureStage::PublishTransport, e.to_string(), payload)
                    .await?;
                Ok(())
            }
        }
    }
}
