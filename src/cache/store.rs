//! Record Store Module
//!
//! Concurrent map from key to the in-flight or resolved computation of its
//! record. Single source of truth for whether a key is cached.

use std::hash::Hash;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, Shared};

use crate::cache::record::Record;
use crate::error::Result;

/// Shareable computation producing a key's record.
///
/// Every waiter observes the same outcome, including a failure.
pub type RecordComputation<K, V> = Shared<BoxFuture<'static, Result<Arc<Record<K, V>>>>>;

// == Record Store ==
pub struct RecordStore<K, V> {
    slots: DashMap<K, RecordComputation<K, V>>,
}

impl<K, V> RecordStore<K, V>
where
    K: Eq + Hash + Clone,
{
    // == Constructor ==
    pub fn new() -> Self {
        Self {
            slots: DashMap::new(),
        }
    }

    // == Slot ==
    /// Current computation for `key`, if the key is cached.
    pub fn slot(&self, key: &K) -> Option<RecordComputation<K, V>> {
        self.slots.get(key).map(|slot| slot.value().clone())
    }

    // == Claim ==
    /// Installs `computation` for `key`, returning the one it displaced.
    pub fn claim(
        &self,
        key: K,
        computation: RecordComputation<K, V>,
    ) -> Option<RecordComputation<K, V>> {
        self.slots.insert(key, computation)
    }

    /// Installs the computation built by `build` from the displaced one.
    ///
    /// The read of the old slot and the write of the new one happen under the
    /// same shard lock.
    pub fn claim_with<F>(&self, key: K, build: F) -> RecordComputation<K, V>
    where
        F: FnOnce(Option<RecordComputation<K, V>>) -> RecordComputation<K, V>,
    {
        match self.slots.entry(key) {
            Entry::Occupied(mut occupied) => {
                let computation = build(Some(occupied.get().clone()));
                occupied.insert(computation.clone());
                computation
            }
            Entry::Vacant(vacant) => {
                let computation = build(None);
                vacant.insert(computation.clone());
                computation
            }
        }
    }

    // == Is Current ==
    /// True if `slot` is still the computation installed for `key`.
    pub fn is_current(&self, key: &K, slot: &RecordComputation<K, V>) -> bool {
        self.slots
            .get(key)
            .is_some_and(|current| current.value().ptr_eq(slot))
    }

    // == Holds ==
    /// True if `key` currently resolves to exactly `record`.
    pub fn holds(&self, key: &K, record: &Arc<Record<K, V>>) -> bool {
        self.slots.get(key).is_some_and(|current| {
            matches!(current.value().peek(), Some(Ok(resolved)) if Arc::ptr_eq(resolved, record))
        })
    }

    // == Remove If Resolved ==
    /// Removes `key` if its computation already produced a record matching
    /// `predicate`, returning that record.
    ///
    /// Pending or failed computations are left untouched.
    pub fn remove_if_resolved<P>(&self, key: &K, predicate: P) -> Option<Arc<Record<K, V>>>
    where
        P: Fn(&Record<K, V>) -> bool,
    {
        let (_, removed) = self.slots.remove_if(key, |_, slot| {
            matches!(slot.peek(), Some(Ok(record)) if predicate(record))
        })?;
        match removed.peek() {
            Some(Ok(record)) => Some(Arc::clone(record)),
            _ => None,
        }
    }

    // == Remove Failed ==
    /// Drops every slot whose load failed, returning their keys.
    pub fn remove_failed(&self) -> Vec<K> {
        let failed: Vec<K> = self
            .slots
            .iter()
            .filter(|slot| has_failed(slot.value()))
            .map(|slot| slot.key().clone())
            .collect();
        failed
            .into_iter()
            .filter(|key| {
                self.slots
                    .remove_if(key, |_, slot| has_failed(slot))
                    .is_some()
            })
            .collect()
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.slots.contains_key(key)
    }

    pub fn keys(&self) -> Vec<K> {
        self.slots.iter().map(|slot| slot.key().clone()).collect()
    }

    // == Length ==
    /// Number of claimed slots, in-flight and failed ones included.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

fn has_failed<K, V>(slot: &RecordComputation<K, V>) -> bool {
    matches!(slot.peek(), Some(Err(_)))
}

impl<K, V> Default for RecordStore<K, V>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
