//! Hot store and dead-letter sink for the StreamLens pipeline.
//!
//! The hot store is the durable relational home of recent telemetry
//! events: single-row inserts via [`insert_event`], recency reads via
//! [`recent_events`]. The dead-letter sink ([`record_dead_letter`]) is the
//! append-only terminal channel for events that failed publish,
//! validation, or persistence.
//!
//! Retention policy lives here too: [`RETENTION_DAYS`] defines "recent"
//! for both the recency query and the archival-eligibility check
//! ([`is_archival_eligible`]). Eligibility is evaluated exactly once, at
//! persistence time — there is no background sweep that re-examines rows
//! already resident in the store.

mod dead_letter;
mod error;
mod events;
mod retention;


pub use dead_letter::{dead_letters, record_dead_letter};
pub use error::StoreError;
pub use events::{insert_event, recent_events};
pub use retention::{is_archival_eligible, retention_cutoff, RETENTION_DAYS};
