//! Lanes Module
//!
//! Partitioned execution model for the cache engine.
//!
//! # Lanes
//! - A fixed number of single-threaded lanes, each owning the keys that hash to it
//! - Per-key FIFO ordering, cross-key parallelism across lanes

mod pool;

pub use pool::LanePool;
