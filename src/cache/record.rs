//! Record Module
//!
//! Defines cached records and the access metadata that orders them for eviction.

use parking_lot::Mutex;
use serde::Serialize;

// == Access Details ==
/// Access metadata of a record.
///
/// Immutable value: every access produces a new one via [`AccessDetails::update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct AccessDetails {
    /// Logical time of the most recent access
    pub last_access_time: u64,
    /// Number of successful reads
    pub access_count: u64,
}

impl AccessDetails {
    /// Metadata of a record that has never been read.
    pub fn new(now: u64) -> Self {
        Self {
            last_access_time: now,
            access_count: 0,
        }
    }

    /// Returns the metadata after one more access at `now`.
    pub fn update(&self, now: u64) -> Self {
        Self {
            last_access_time: now,
            access_count: self.access_count + 1,
        }
    }
}

// == Record ==
/// A cached value together with its insertion time and access metadata.
///
/// Key, value and insertion time never change; only the access details are
/// swapped on each successful read.
#[derive(Debug)]
pub struct Record<K, V> {
    key: K,
    value: V,
    insertion_time: u64,
    access: Mutex<AccessDetails>,
}

impl<K, V> Record<K, V> {
    // == Constructor ==
    /// Creates a record inserted at `now` with fresh access details.
    pub fn new(key: K, value: V, now: u64) -> Self {
        Self {
            key,
            value,
            insertion_time: now,
            access: Mutex::new(AccessDetails::new(now)),
        }
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn value(&self) -> &V {
        &self.value
    }

    pub fn insertion_time(&self) -> u64 {
        self.insertion_time
    }

    /// Current access details.
    pub fn access_details(&self) -> AccessDetails {
        *self.access.lock()
    }

    /// Swaps the access details for the result of `next`, if it returns one.
    ///
    /// `next` runs while the details are locked, so index bookkeeping done
    /// inside it cannot interleave with another swap of the same record.
    pub(crate) fn swap_access_details<F>(&self, next: F) -> bool
    where
        F: FnOnce(AccessDetails) -> Option<AccessDetails>,
    {
        let mut access = self.access.lock();
        match next(*access) {
            Some(updated) => {
                *access = updated;
                true
            }
            None => false,
        }
    }
}

impl<K: Clone, V: Clone> Record<K, V> {
    /// Frozen copy of the record for the event log.
    pub fn snapshot(&self) -> RecordSnapshot<K, V> {
        RecordSnapshot {
            key: self.key.clone(),
            value: self.value.clone(),
            insertion_time: self.insertion_time,
            access_details: self.access_details(),
        }
    }
}

// == Record Snapshot ==
/// Immutable point-in-time view of a [`Record`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordSnapshot<K, V> {
    pub key: K,
    pub value: V,
    pub insertion_time: u64,
    pub access_details: AccessDetails,
}
