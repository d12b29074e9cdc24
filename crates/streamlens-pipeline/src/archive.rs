//! Archival mover: best-effort, try-once copies to cold storage.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Datelike;
use streamlens_types::SessionEvent;
use thiserror::Error;

/// Errors raised by an object-store upload.
///
/// Logged only: there is no dead-letter record and no retry for archival.
/// A failed upload leaves the event solely in the hot store.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The HTTP upload failed (connect, send, or non-2xx status).
    #[error("object store upload failed: {0}")]
    Upload(#[from] reqwest::Error),

    /// The store refused the object.
    #[error("object store rejected key '{key}': {reason}")]
    Rejected {
        /// The object key that was refused.
        key: String,
        /// Why the store refused it.
        reason: String,
    },
}

/// Write half of the object-store seam.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Stores `body` under `key`, overwriting any existing object.
    async fn put(&self, key: &str, body: Vec<u8>) -> Result<(), ArchiveError>;
}

/// Computes the deterministic object key for an archived event:
/// `{year}/{month:02}/{day:02}/{sessionId}/{eventType}-{epochMillis}.json`,
/// all date parts taken from the event timestamp in UTC.
pub fn object_key(event: &SessionEvent) -> String {
    let ts = event.timestamp;
    format!(
        "{:04}/{:02}/{:02}/{}/{}-{}.json",
        ts.year(),
        ts.month(),
        ts.day(),
        event.session_id,
        event.event_type,
        ts.timestamp_millis()
    )
}

/// Asynchronous, best-effort copier from hot-store records to the object
/// store.
///
/// [`archive`](ArchivalMover::archive) launches a detached upload task and
/// returns immediately; the consumer never waits on completion and never
/// retries. In-flight uploads may be abandoned at process shutdown —
/// acceptable under the try-once contract.
#[derive(Clone)]
pub struct ArchivalMover {
    store: Arc<dyn ObjectStore>,
}

impl ArchivalMover {
    /// Creates a mover uploading through `store`.
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Submits one event for archival and returns without waiting.
    ///
    /// The event is serialized to its wire JSON (including fields like
    /// `endTimeMs` that the hot store drops) and uploaded under
    /// [`object_key`]. Failures are logged and have no further effect.
    pub fn archive(&self, event: &SessionEvent) {
        let key = object_key(event);
        let body = match serde_json::to_vec(event) {
            Ok(body) => body,
            Err(e) => {
                tracing::error!(key = %key, error = %e, "failed to serialize event for archival");
                return;
            }
        };

        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            match store.put(&key, body).await {
                Ok(()) => {
                    tracing::info!(key = %key, "archived event to object store");
                }
                Err(e) => {
                    tracing::error!(
                        key = %key,
                        error = %e,
                        "archival upload failed; event remains in hot store only"
                    );
                }
            }
        });
    }
}

/// Object store client speaking S3-style HTTP PUT:
/// `PUT {endpoint}/{bucket}/{key}`.
pub struct HttpObjectStore {
    client: reqwest::Client,
    endpoint: String,
    bucket: String,
}

impl HttpObjectStore {
    /// Creates a client uploading into `bucket` at `endpoint`.
    pub fn new(endpoint: String, bucket: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            bucket,
        }
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn put(&self, key: &str, body: Vec<u8>) -> Result<(), ArchiveError> {
        let url = format!(
            "{}/{}/{}",
            self.endpoint.trim_end_matches('/'),
            self.bucket,
            key
        );
        self.client
            .put(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// In-memory object store for tests and local development.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryObjectStore {
    /// Creates an empty store.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Returns all stored keys, unordered.
    pub fn keys(&self) -> Vec<String> {
        self.objects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect()
    }

    /// Returns the object stored under `key`, if any.
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, key: &str, body: Vec<u8>) -> Result<(), ArchiveError> {
        self.objects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), body);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use streamlens_types::QualityMetrics;

    #[test]
    fn object_key_uses_date_partitioned_layout() {
        let timestamp = Utc.with_ymd_and_hms(2025, 3, 7, 23, 59, 59).unwrap();
        let event = SessionEvent {
            id: None,
            session_id: "s1".to_string(),
            event_type: "playback-start".to_string(),
            timestamp,
            metrics: QualityMetrics::default(),
            device_type: None,
            region: None,
            content_id: None,
        };

        let key = object_key(&event);
        assert_eq!(
            key,
            format!("2025/03/07/s1/playback-start-{}.json", timestamp.timestamp_millis())
        );
    }

    #[tokio::test]
    async fn memory_store_round_trips() {
        let store = MemoryObjectStore::new();
        store
            .put("2025/01/01/s1/x-1.json", b"{}".to_vec())
            .await
            .expect("put should succeed");
        assert_eq!(store.keys(), vec!["2025/01/01/s1/x-1.json".to_string()]);
        assert_eq!(store.get("2025/01/01/s1/x-1.json"), Some(b"{}".to_vec()));
    }
}
