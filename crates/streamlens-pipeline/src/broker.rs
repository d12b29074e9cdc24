//! Broker seam: the transport trait, topic configuration, and an
//! in-process partitioned broker.
//!
//! The real broker is an external collaborator; the pipeline only depends
//! on the [`BrokerClient`] trait. [`InProcessBroker`] is the bundled
//! implementation: ordered delivery lanes (one mpsc channel + one worker
//! task per partition), at-least-once semantics, and an explicit
//! handler-registration table built at startup before any message flows.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::PipelineError;

/// Errors raised by the broker transport on publish.
///
/// Non-retryable at this layer: the publisher dead-letters the event
/// instead of retrying.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The broker (or its delivery lane) is not accepting messages.
    #[error("broker unreachable: {0}")]
    Unreachable(String),

    /// The broker rejected the write.
    #[error("broker rejected write to topic '{topic}': {reason}")]
    Rejected {
        /// The topic the write was addressed to.
        topic: String,
        /// Why the broker refused it.
        reason: String,
    },
}

/// Topic names used by the pipeline, passed explicitly to the publisher
/// and broker wiring at construction instead of living as global
/// constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerTopics {
    /// Main telemetry topic.
    #[serde(default = "default_events_topic")]
    pub events: String,
    /// Dead-letter channel name, recorded for operational context.
    #[serde(default = "default_dead_letter_topic")]
    pub dead_letter: String,
}

fn default_events_topic() -> String {
    "session-events".to_string()
}

fn default_dead_letter_topic() -> String {
    "session-events-dlq".to_string()
}

impl Default for BrokerTopics {
    fn default() -> Self {
        Self {
            events: default_events_topic(),
            dead_letter: default_dead_letter_topic(),
        }
    }
}

/// Client half of the broker seam.
///
/// Messages sharing a key land on the same partition and are delivered in
/// order relative to each other; there is no ordering across keys.
/// Delivery is at-least-once — a consumer crash between delivery and
/// acknowledgment yields redelivery, never loss.
#[async_trait]
pub trait BrokerClient: Send + Sync {
    /// Hands one message to the broker.
    ///
    /// Success means broker acknowledgment only; it says nothing about
    /// consumer processing.
    async fn send(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<(), TransportError>;
}

/// Consumer half of the broker seam: invoked once per delivered message.
///
/// Implementations must tolerate duplicate deliveries. Returned errors are
/// logged by the partition worker; they do not trigger redelivery by the
/// in-process broker.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Processes one delivered message.
    async fn handle(&self, key: &str, payload: &[u8]) -> Result<(), PipelineError>;
}

struct Delivery {
    key: String,
    payload: Vec<u8>,
}

/// In-process partitioned broker.
///
/// Each registered topic gets a fixed number of partitions; each partition
/// is an unbounded mpsc channel drained by its own worker task, so
/// per-partition ordering holds while partitions process in parallel.
pub struct InProcessBroker {
    partitions: usize,
    // Registration table: topic name -> one sender per partition. Built
    // at startup via `register_handler`; `send` only ever reads it. Lock
    // acquisitions are brief map operations that never span an await.
    senders: RwLock<HashMap<String, Vec<mpsc::UnboundedSender<Delivery>>>>,
}

impl InProcessBroker {
    /// Creates a broker where every topic has `partitions` delivery lanes.
    pub fn new(partitions: usize) -> Arc<Self> {
        Arc::new(Self {
            partitions: partitions.max(1),
            senders: RwLock::new(HashMap::new()),
        })
    }

    /// Registers `handler` for `topic` and spawns one worker task per
    /// partition.
    ///
    /// Call once per topic during startup, before publishing begins.
    /// Returns the worker handles; dropping them is fine — workers run
    /// until the broker (and with it the senders) is dropped.
    pub fn register_handler(
        &self,
        topic: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Vec<JoinHandle<()>> {
        let mut topic_senders = Vec::with_capacity(self.partitions);
        let mut workers = Vec::with_capacity(self.partitions);

        for partition in 0..self.partitions {
            let (tx, mut rx) = mpsc::unbounded_channel::<Delivery>();
            topic_senders.push(tx);

            let handler = Arc::clone(&handler);
            let topic = topic.to_string();
            workers.push(tokio::spawn(async move {
                while let Some(delivery) = rx.recv().await {
                    if let Err(e) = handler.handle(&delivery.key, &delivery.payload).await {
                        tracing::error!(
                            topic = %topic,
                            partition,
                            error = %e,
                            "message handler failed"
                        );
                    }
                }
                tracing::debug!(topic = %topic, partition, "partition worker stopped");
            }));
        }

        let mut senders = self.senders.write().unwrap_or_else(|e| e.into_inner());
        senders.insert(topic.to_string(), topic_senders);
        workers
    }

    fn partition_for(&self, key: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % self.partitions
    }
}

#[async_trait]
impl BrokerClient for InProcessBroker {
    async fn send(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        let sender = {
            let senders = self.senders.read().unwrap_or_else(|e| e.into_inner());
            let topic_senders = senders.get(topic).ok_or_else(|| TransportError::Rejected {
                topic: topic.to_string(),
                reason: "no handler registered for topic".to_string(),
            })?;
            topic_senders[self.partition_for(key)].clone()
        };

        sender
            .send(Delivery {
                key: key.to_string(),
                payload,
            })
            .map_err(|_| TransportError::Unreachable("partition worker gone".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    struct Recorder {
        seen: Mutex<Vec<(String, Vec<u8>)>>,
        count: AtomicUsize,
    }

    impl Recorder {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                seen: Mutex::new(Vec::new()),
                count: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl MessageHandler for Recorder {
        async fn handle(&self, key: &str, payload: &[u8]) -> Result<(), PipelineError> {
            self.seen
                .lock()
                .unwrap()
                .push((key.to_string(), payload.to_vec()));
            self.count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    async fn wait_for(recorder: &Recorder, n: usize) {
        for _ in 0..100 {
            if recorder.count.load(Ordering::SeqCst) >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("handler never saw {n} messages");
    }

    #[tokio::test]
    async fn delivers_to_registered_handler() {
        let broker = InProcessBroker::new(4);
        let recorder = Recorder::new();
        broker.register_handler("session-events", recorder.clone());

        broker
            .send("session-events", "c1", b"hello".to_vec())
            .await
            .expect("send should succeed");

        wait_for(&recorder, 1).await;
        let seen = recorder.seen.lock().unwrap();
        assert_eq!(seen[0], ("c1".to_string(), b"hello".to_vec()));
    }

    #[tokio::test]
    async fn unregistered_topic_is_rejected() {
        let broker = InProcessBroker::new(2);
        let err = broker
            .send("nope", "", Vec::new())
            .await
            .expect_err("unregistered topic should be rejected");
        assert!(matches!(err, TransportError::Rejected { .. }));
    }

    #[tokio::test]
    async fn same_key_preserves_order() {
        let broker = InProcessBroker::new(8);
        let recorder = Recorder::new();
        broker.register_handler("session-events", recorder.clone());

        for i in 0u8..20 {
            broker
                .send("session-events", "same-content", vec![i])
                .await
                .expect("send should succeed");
        }

        wait_for(&recorder, 20).await;
        let seen = recorder.seen.lock().unwrap();
        let order: Vec<u8> = seen.iter().map(|(_, p)| p[0]).collect();
        assert_eq!(order, (0u8..20).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn empty_key_is_accepted() {
        let broker = InProcessBroker::new(3);
        let recorder = Recorder::new();
        broker.register_handler("session-events", recorder.clone());

        broker
            .send("session-events", "", b"x".to_vec())
            .await
            .expect("empty partition key should still publish");
        wait_for(&recorder, 1).await;
    }
}
