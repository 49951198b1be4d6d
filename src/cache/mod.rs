//! Cache Module
//!
//! Provides the cache engine: records, their eviction and expiry indices,
//! the record store and the event log.

mod engine;
mod events;
mod index;
mod record;
mod store;


// Re-export public types
pub use engine::{Cache, CacheKey, CacheValue};
pub use events::{Event, EventKind, EventLog, EventSummary, EvictionReason};
pub use index::{BucketIndex, ExpiryIndex, PriorityIndex, PriorityKey};
pub use record::{AccessDetails, Record, RecordSnapshot};
pub use store::{RecordComputation, RecordStore};
