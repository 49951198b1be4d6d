//! Laned Cache - An embeddable key/value cache engine
//!
//! Fronts a slower data source with bounded, LRU or LFU evicted storage,
//! optional record expiry and write-through or write-back persistence.
//! Operations on one key run in order on the lane owning it; different
//! lanes run in parallel.

pub mod cache;
pub mod config;
pub mod error;
pub mod lanes;
pub mod logging;
pub mod source;
pub mod timer;

pub use cache::{
    AccessDetails, Cache, Event, EventKind, EventLog, EventSummary, EvictionReason, RecordSnapshot,
};
pub use config::{CacheConfig, CacheSettings, EvictionAlgorithm, FetchAlgorithm};
pub use error::{CacheError, DataSourceError, Result};
pub use logging::init_tracing;
pub use source::{DataSource, MemoryDataSource};
pub use timer::{ManualTimer, MonotonicTimer, Timer};
