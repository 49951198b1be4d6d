//! Cache Engine Module
//!
//! Combines the record store, the priority and expiry indices, the event log
//! and the data source into `get`, `set`, capacity management and eager
//! warm-up. Every operation runs on the lane owning its key.

use std::fmt::{self, Debug};
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{join_all, FutureExt};
use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::cache::events::{Event, EventKind, EventLog, EvictionReason};
use crate::cache::index::{ExpiryIndex, PriorityIndex, PriorityKey};
use crate::cache::record::{AccessDetails, Record, RecordSnapshot};
use crate::cache::store::{RecordComputation, RecordStore};
use crate::config::{CacheConfig, EvictionAlgorithm, FetchAlgorithm};
use crate::error::{CacheError, Result};
use crate::lanes::LanePool;
use crate::source::DataSource;
use crate::timer::Timer;

// == Key / Value Bounds ==
/// Bounds shared by every cache key.
pub trait CacheKey: Eq + Hash + Clone + Debug + Send + Sync + 'static {}

impl<T> CacheKey for T where T: Eq + Hash + Clone + Debug + Send + Sync + 'static {}

/// Bounds shared by every cached value.
pub trait CacheValue: Clone + Send + Sync + 'static {}

impl<T> CacheValue for T where T: Clone + Send + Sync + 'static {}

// == Engine Core ==
/// State shared by every lane task.
pub(crate) struct CacheCore<K, V> {
    maximum_size: usize,
    expiry_time: Duration,
    eviction_algorithm: EvictionAlgorithm,
    fetch_algorithm: FetchAlgorithm,
    store: RecordStore<K, V>,
    priority: PriorityIndex<K>,
    expiry: ExpiryIndex<K>,
    events: EventLog<K, V>,
    data_source: Arc<dyn DataSource<K, V>>,
    timer: Arc<dyn Timer>,
    /// Serializes the size check and the evictions it triggers
    capacity_guard: Mutex<()>,
}

impl<K: CacheKey, V: CacheValue> CacheCore<K, V> {
    // == Get ==
    async fn get(self: Arc<Self>, key: K) -> Result<V> {
        let record = loop {
            let Some(slot) = self.store.slot(&key) else {
                break self.load(key.clone()).await?;
            };
            // a failed load stays in its slot until a set overwrites it
            let record = slot.clone().await?;
            if !self.has_expired(record.insertion_time()) {
                break record;
            }
            if self.store.is_current(&key, &slot) {
                self.expire(&record);
                break self.load(key.clone()).await?;
            }
            // expired and already replaced, read the replacement
        };
        self.touch(&record);
        Ok(record.value().clone())
    }

    // == Set ==
    async fn set(self: Arc<Self>, key: K, value: V) -> Result<()> {
        let record = self.replace(key, value).await?;
        let persist = Arc::clone(&self).persist(record);
        match self.fetch_algorithm {
            FetchAlgorithm::WriteThrough => persist.await,
            FetchAlgorithm::WriteBack => {
                // stays on this lane's runtime
                tokio::spawn(async move {
                    if let Err(e) = persist.await {
                        warn!(error = %e, "write-back persistence failed");
                    }
                });
                Ok(())
            }
        }
    }

    // == Load ==
    /// Claims the slot for `key` with a load from the data source.
    ///
    /// Capacity is made before the slot is claimed, under the same guard.
    /// The record is indexed only once the load succeeds.
    fn load(self: &Arc<Self>, key: K) -> RecordComputation<K, V> {
        let _capacity = self.manage_entries(&key);
        let core = Arc::clone(self);
        let loading = key.clone();
        let computation = async move {
            let value = match core.data_source.load(&loading).await {
                Ok(value) => value,
                Err(e) => {
                    debug!(key = ?loading, error = %e, "load failed");
                    return Err(CacheError::load(&loading, e));
                }
            };
            let record = Arc::new(Record::new(loading, value, core.timer.now()));
            core.emit(record.snapshot(), EventKind::Load);
            core.register(&record);
            debug!(key = ?record.key(), "loaded record");
            Ok(record)
        }
        .boxed()
        .shared();
        self.store.claim(key, computation.clone());
        computation
    }

    // == Replace ==
    /// Claims the slot for `key` with a new record holding `value`.
    ///
    /// The new computation first waits for the one it displaced, so writes
    /// to one key land in submission order.
    fn replace(self: &Arc<Self>, key: K, value: V) -> RecordComputation<K, V> {
        let core = Arc::clone(self);
        self.store.claim_with(key.clone(), move |previous| {
            async move {
                let previous = match previous {
                    Some(previous) => previous.await.ok(),
                    None => None,
                };
                let record = Arc::new(Record::new(key, value, core.timer.now()));
                if let Some(old) = previous {
                    core.retire(&old, &record);
                }
                let _capacity = core.manage_entries(record.key());
                core.register(&record);
                Ok(record)
            }
            .boxed()
            .shared()
        })
    }

    // == Persist ==
    async fn persist(self: Arc<Self>, record: Arc<Record<K, V>>) -> Result<()> {
        self.data_source
            .persist(record.key(), record.value(), record.insertion_time())
            .await
            .map_err(|e| CacheError::persist(record.key(), e))?;
        self.emit(record.snapshot(), EventKind::Write);
        debug!(key = ?record.key(), "persisted record");
        Ok(())
    }

    // == Touch ==
    /// Records a successful read of `record`.
    fn touch(&self, record: &Arc<Record<K, V>>) {
        if !self.store.holds(record.key(), record) {
            return;
        }
        let now = self.timer.now();
        record.swap_access_details(|current| {
            let updated = current.update(now);
            self.priority
                .reposition(
                    record.key(),
                    self.priority_of(&current),
                    self.priority_of(&updated),
                )
                .then_some(updated)
        });
    }

    // == Retire ==
    /// Unindexes `old`, replaced in the store by `new`.
    fn retire(&self, old: &Record<K, V>, new: &Record<K, V>) {
        self.unregister(old);
        if self.has_expired(old.insertion_time()) {
            debug!(key = ?old.key(), "replaced expired record");
            self.emit(
                old.snapshot(),
                EventKind::Eviction {
                    reason: EvictionReason::Expiry,
                },
            );
        } else {
            debug!(key = ?old.key(), "updated record");
            self.emit(
                new.snapshot(),
                EventKind::Update {
                    previous: old.snapshot(),
                },
            );
        }
    }

    // == Expire ==
    fn expire(&self, record: &Arc<Record<K, V>>) {
        let removed = self
            .store
            .remove_if_resolved(record.key(), |current| std::ptr::eq(current, record.as_ref()));
        if removed.is_none() {
            // already evicted by capacity management
            return;
        }
        self.unregister(record);
        debug!(key = ?record.key(), "expired record on read");
        self.emit(
            record.snapshot(),
            EventKind::Eviction {
                reason: EvictionReason::Expiry,
            },
        );
    }

    // == Manage Entries ==
    /// Makes room before `incoming` is inserted.
    ///
    /// Drops every expired bucket, then, if the store is still full, the
    /// lowest-priority bucket. The slot of `incoming` itself does not count
    /// towards the size. The returned guard is held until `incoming` is in
    /// the store.
    fn manage_entries(&self, incoming: &K) -> MutexGuard<'_, ()> {
        let guard = self.capacity_guard.lock();
        self.sweep_expired();
        let occupied = self.store.len() - usize::from(self.store.contains_key(incoming));
        if occupied >= self.maximum_size {
            self.evict_lowest_priority();
        }
        guard
    }

    fn sweep_expired(&self) {
        while let Some((inserted_at, keys)) = self
            .expiry
            .pop_first_if(|inserted_at| self.has_expired(*inserted_at))
        {
            for key in keys {
                let Some(record) = self
                    .store
                    .remove_if_resolved(&key, |record| record.insertion_time() == inserted_at)
                else {
                    continue;
                };
                self.unindex_priority(&record);
                debug!(key = ?key, "evicted expired record");
                self.emit(
                    record.snapshot(),
                    EventKind::Eviction {
                        reason: EvictionReason::Expiry,
                    },
                );
            }
        }
    }

    /// Evicts every key of the lowest non-empty priority bucket.
    ///
    /// Keys tied on priority leave together, which can take the store more
    /// than one entry below the maximum. With no record to evict, failed
    /// loads give up their slots instead.
    fn evict_lowest_priority(&self) {
        while let Some((priority, keys)) = self.priority.pop_first() {
            let mut evicted = 0usize;
            for key in keys {
                let Some(record) = self.store.remove_if_resolved(&key, |record| {
                    self.priority_of(&record.access_details()) == priority
                }) else {
                    continue;
                };
                self.expiry.remove(record.insertion_time(), &key);
                debug!(key = ?key, "evicted record to make room");
                self.emit(
                    record.snapshot(),
                    EventKind::Eviction {
                        reason: EvictionReason::Replacement,
                    },
                );
                evicted += 1;
            }
            if evicted > 0 {
                return;
            }
        }
        let failed = self.store.remove_failed();
        if !failed.is_empty() {
            debug!(keys = ?failed, "dropped failed loads to make room");
            return;
        }
        warn!(
            size = self.store.len(),
            maximum_size = self.maximum_size,
            "cache is full but holds no evictable records"
        );
    }

    // == Index Bookkeeping ==
    fn register(&self, record: &Record<K, V>) {
        self.expiry
            .insert(record.insertion_time(), record.key().clone());
        self.priority.insert(
            self.priority_of(&record.access_details()),
            record.key().clone(),
        );
    }

    fn unregister(&self, record: &Record<K, V>) {
        self.unindex_priority(record);
        self.expiry.remove(record.insertion_time(), record.key());
    }

    /// Removes `record` from the priority index under its access lock, so a
    /// concurrent touch either moves it first or finds it gone.
    fn unindex_priority(&self, record: &Record<K, V>) {
        record.swap_access_details(|current| {
            self.priority
                .remove(self.priority_of(&current), record.key());
            None
        });
    }

    fn priority_of(&self, access: &AccessDetails) -> PriorityKey {
        PriorityKey::new(self.eviction_algorithm, access)
    }

    fn has_expired(&self, inserted_at: u64) -> bool {
        let age = self.timer.now().saturating_sub(inserted_at);
        u128::from(age) > self.expiry_time.as_nanos()
    }

    fn emit(&self, record: RecordSnapshot<K, V>, kind: EventKind<K, V>) {
        self.events
            .append(Event::new(record, kind, self.timer.now()));
    }
}

// == Cache ==
/// Handle to a running cache engine.
///
/// Dropping it stops the lanes; write-back persistence still pending at
/// that point is abandoned.
pub struct Cache<K, V> {
    core: Arc<CacheCore<K, V>>,
    lanes: LanePool,
}

impl<K: CacheKey, V: CacheValue> Cache<K, V> {
    // == Constructor ==
    /// Validates `config`, starts the lanes and loads every key in
    /// `keys_to_eagerly_load` before returning.
    ///
    /// Fails with [`CacheError::Configuration`] when no data source is set,
    /// or with the first load error of the warm-up.
    pub async fn new(config: CacheConfig<K, V>) -> Result<Self> {
        let data_source = config.validate()?;
        let lanes = LanePool::new(config.lane_pool_size)?;
        let core = Arc::new(CacheCore {
            maximum_size: config.maximum_size,
            expiry_time: config.expiry_time,
            eviction_algorithm: config.eviction_algorithm,
            fetch_algorithm: config.fetch_algorithm,
            store: RecordStore::new(),
            priority: PriorityIndex::new(),
            expiry: ExpiryIndex::new(),
            events: EventLog::new(),
            data_source,
            timer: config.timer,
            capacity_guard: Mutex::new(()),
        });
        info!(
            maximum_size = config.maximum_size,
            eviction = %config.eviction_algorithm,
            fetch = %config.fetch_algorithm,
            lanes = config.lane_pool_size,
            "cache engine started"
        );

        let cache = Self { core, lanes };
        let warm_keys = config.keys_to_eagerly_load.len();
        cache.warm_up(config.keys_to_eagerly_load).await?;
        if warm_keys > 0 {
            info!(keys = warm_keys, "eager load complete");
        }
        Ok(cache)
    }

    /// Loads `keys` in parallel, one lane task per key.
    async fn warm_up(&self, keys: impl IntoIterator<Item = K>) -> Result<()> {
        let loads: Vec<_> = keys
            .into_iter()
            .map(|key| {
                let core = Arc::clone(&self.core);
                let loading = key.clone();
                self.lanes.submit(&key, async move {
                    core.load(loading).await.map(|_| ())
                })
            })
            .collect();
        join_all(loads).await.into_iter().collect()
    }

    // == Get ==
    /// Returns the value for `key`, loading it from the data source on a
    /// miss or after expiry.
    ///
    /// The operation is queued immediately; the returned future only waits
    /// for its outcome.
    pub fn get(&self, key: K) -> impl Future<Output = Result<V>> + Send + 'static {
        let task = Arc::clone(&self.core).get(key.clone());
        self.lanes.submit(&key, task)
    }

    // == Set ==
    /// Caches `value` for `key` and persists it.
    ///
    /// Under write-through the future resolves after the data source
    /// acknowledged the write; under write-back as soon as the value is
    /// cached.
    pub fn set(&self, key: K, value: V) -> impl Future<Output = Result<()>> + Send + 'static {
        let task = Arc::clone(&self.core).set(key.clone(), value);
        self.lanes.submit(&key, task)
    }

    // == Introspection ==
    /// The accumulated event log.
    pub fn event_log(&self) -> &EventLog<K, V> {
        &self.core.events
    }

    /// Snapshot of every event so far.
    pub fn events(&self) -> Vec<Event<K, V>> {
        self.core.events.events()
    }

    /// Number of claimed slots, including in-flight and failed loads.
    pub fn len(&self) -> usize {
        self.core.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.core.store.is_empty()
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.core.store.contains_key(key)
    }

    pub fn keys(&self) -> Vec<K> {
        self.core.store.keys()
    }

    pub fn lane_count(&self) -> usize {
        self.lanes.len()
    }

    #[cfg(test)]
    pub(crate) fn index_keys(&self) -> (Vec<K>, Vec<K>) {
        (self.core.priority.keys(), self.core.expiry.keys())
    }
}

impl<K, V> Debug for Cache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("maximum_size", &self.core.maximum_size)
            .field("expiry_time", &self.core.expiry_time)
            .field("eviction_algorithm", &self.core.eviction_algorithm)
            .field("fetch_algorithm", &self.core.fetch_algorithm)
            .field("lanes", &self.lanes)
            .finish()
    }
}
