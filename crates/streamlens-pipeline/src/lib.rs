//! The StreamLens event processing pipeline.
//!
//! Implements the write path (publish → broker delivery → validate →
//! persist → conditionally archive) and the read-side aggregation, with
//! at-least-once reliability semantics:
//!
//! - [`EventPublisher`] hands events to the broker keyed by content ID and
//!   absorbs transport failures into the dead-letter sink.
//! - [`EventConsumer`] runs once per delivered message: validate, persist
//!   inside a single-insert transaction, then — only at that instant —
//!   decide archival eligibility. Redelivered messages produce duplicate
//!   rows by design.
//! - [`ArchivalMover`] copies aged events to the object store as detached,
//!   try-once background uploads.
//! - [`compute_analytics`] is the pure read-side aggregate.
//!
//! Collaborators (broker transport, object store) are injected through the
//! [`BrokerClient`] and [`ObjectStore`] traits; everything is wired by
//! explicit constructor injection at process start.

mod analytics;
mod archive;
mod broker;
mod consumer;
mod error;
mod publisher;
mod sink;

pub use analytics::compute_analytics;
pub use archive::{
    object_key, ArchivalMover, ArchiveError, HttpObjectStore, MemoryObjectStore, ObjectStore,
};
pub use broker::{
    BrokerClient, BrokerTopics, InProcessBroker, MessageHandler, TransportError,
};
pub use consumer::EventConsumer;
pub use error::PipelineError;
pub use publisher::EventPublisher;
pub use sink::DeadLetterSink;
