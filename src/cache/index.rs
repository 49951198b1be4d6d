//! Index Module
//!
//! Ordered bucket indices driving capacity eviction and TTL expiry.
//!
//! Each index maps an ordering value to the keys currently sharing it. The
//! lowest bucket is always the next to go.

use std::collections::BTreeMap;

use parking_lot::Mutex;

use crate::cache::record::AccessDetails;
use crate::config::EvictionAlgorithm;

// == Priority Key ==
/// Ordering value of a record in the priority index.
///
/// Compared field by field: access count first, then last access time.
/// Under LRU the count is pinned to zero so only recency matters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PriorityKey {
    access_count: u64,
    last_access_time: u64,
}

impl PriorityKey {
    pub fn new(algorithm: EvictionAlgorithm, access: &AccessDetails) -> Self {
        match algorithm {
            EvictionAlgorithm::Lru => Self {
                access_count: 0,
                last_access_time: access.last_access_time,
            },
            EvictionAlgorithm::Lfu => Self {
                access_count: access.access_count,
                last_access_time: access.last_access_time,
            },
        }
    }
}

// == Bucket Index ==
/// Ordered map from an ordering value to the keys sharing it.
///
/// Keys inside a bucket keep their insertion order. Empty buckets are
/// dropped eagerly.
#[derive(Debug)]
pub struct BucketIndex<O, K> {
    buckets: Mutex<BTreeMap<O, Vec<K>>>,
}

/// Capacity-eviction index keyed by access metadata.
pub type PriorityIndex<K> = BucketIndex<PriorityKey, K>;

/// TTL index keyed by insertion time.
pub type ExpiryIndex<K> = BucketIndex<u64, K>;

impl<O, K> BucketIndex<O, K>
where
    O: Ord + Copy,
    K: Eq + Clone,
{
    // == Constructor ==
    pub fn new() -> Self {
        Self {
            buckets: Mutex::new(BTreeMap::new()),
        }
    }

    // == Insert ==
    /// Adds `key` to the bucket for `order`. No-op if already there.
    pub fn insert(&self, order: O, key: K) {
        let mut buckets = self.buckets.lock();
        let bucket = buckets.entry(order).or_default();
        if !bucket.contains(&key) {
            bucket.push(key);
        }
    }

    // == Remove ==
    /// Removes `key` from the bucket for `order`.
    ///
    /// Returns false if the key was not in that bucket.
    pub fn remove(&self, order: O, key: &K) -> bool {
        let mut buckets = self.buckets.lock();
        Self::take(&mut buckets, order, key)
    }

    // == Reposition ==
    /// Moves `key` from bucket `from` to bucket `to` in one step.
    ///
    /// Nothing is inserted if the key was no longer in `from`, e.g. because
    /// its bucket was popped by an eviction in the meantime.
    pub fn reposition(&self, key: &K, from: O, to: O) -> bool {
        let mut buckets = self.buckets.lock();
        if !Self::take(&mut buckets, from, key) {
            return false;
        }
        buckets.entry(to).or_default().push(key.clone());
        true
    }

    // == Pop First ==
    /// Removes and returns the lowest non-empty bucket.
    pub fn pop_first(&self) -> Option<(O, Vec<K>)> {
        self.pop_first_if(|_| true)
    }

    /// Removes and returns the lowest non-empty bucket if `condition` holds
    /// for its ordering value.
    pub fn pop_first_if<F>(&self, condition: F) -> Option<(O, Vec<K>)>
    where
        F: Fn(&O) -> bool,
    {
        let mut buckets = self.buckets.lock();
        loop {
            let (order, empty) = buckets
                .first_key_value()
                .map(|(order, keys)| (*order, keys.is_empty()))?;
            if empty {
                buckets.remove(&order);
                continue;
            }
            if !condition(&order) {
                return None;
            }
            return buckets.pop_first();
        }
    }

    // == Peek First ==
    /// Returns the lowest ordering value without removing it.
    pub fn first_order(&self) -> Option<O> {
        self.buckets.lock().keys().next().copied()
    }

    // == Contains ==
    pub fn contains(&self, order: O, key: &K) -> bool {
        self.buckets
            .lock()
            .get(&order)
            .is_some_and(|bucket| bucket.contains(key))
    }

    // == Keys ==
    /// All indexed keys, lowest bucket first.
    pub fn keys(&self) -> Vec<K> {
        self.buckets.lock().values().flatten().cloned().collect()
    }

    // == Length ==
    /// Total number of indexed keys across all buckets.
    pub fn len(&self) -> usize {
        self.buckets.lock().values().map(Vec::len).sum()
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn take(buckets: &mut BTreeMap<O, Vec<K>>, order: O, key: &K) -> bool {
        let Some(bucket) = buckets.get_mut(&order) else {
            return false;
        };
        let Some(position) = bucket.iter().position(|k| k == key) else {
            return false;
        };
        bucket.remove(position);
        if bucket.is_empty() {
            buckets.remove(&order);
        }
        true
    }
}

impl<O, K> Default for BucketIndex<O, K>
where
    O: Ord + Copy,
    K: Eq + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    fn lru(time: u64, count: u64) -> PriorityKey {
        PriorityKey::new(
            EvictionAlgorithm::Lru,
            &AccessDetails {
                last_access_time: time,
                access_count: count,
            },
        )
    }

    fn lfu(time: u64, count: u64) -> PriorityKey {
        PriorityKey::new(
            EvictionAlgorithm::Lfu,
            &AccessDetails {
                last_access_time: time,
                access_count: count,
            },
        )
    }

    #[test]
    fn test_index_new() {
        let index: ExpiryIndex<String> = BucketIndex::new();
        assert!(index.is_empty());
        assert_eq!(index.len(), 0);
        assert_eq!(index.first_order(), None);
    }

    #[test]
    fn test_lru_ignores_access_count() {
        assert!(lru(1, 9) < lru(2, 0));
        assert_eq!(lru(3, 1), lru(3, 7));
    }

    #[test]
    fn test_lfu_orders_by_count_then_time() {
        assert!(lfu(9, 0) < lfu(1, 1));
        assert!(lfu(1, 2) < lfu(5, 2));
    }

    #[test]
    fn test_insert_groups_keys_by_order() {
        let index = ExpiryIndex::new();
        index.insert(10, "a");
        index.insert(10, "b");
        index.insert(5, "c");
        index.insert(10, "a");

        assert_eq!(index.len(), 3);
        assert_eq!(index.bucket_count(), 2);
        assert_eq!(index.first_order(), Some(5));
        assert_eq!(index.keys(), vec!["c", "a", "b"]);
    }

    #[test]
    fn test_remove_drops_empty_bucket() {
        let index = ExpiryIndex::new();
        index.insert(1, "a");
        index.insert(2, "b");

        assert!(index.remove(1, &"a"));
        assert!(!index.remove(1, &"a"));
        assert!(!index.remove(2, &"missing"));

        assert_eq!(index.bucket_count(), 1);
        assert_eq!(index.first_order(), Some(2));
    }

    #[test]
    fn test_pop_first_returns_whole_bucket_in_insertion_order() {
        let index = ExpiryIndex::new();
        index.insert(7, "x");
        index.insert(3, "first");
        index.insert(3, "second");

        assert_eq!(index.pop_first(), Some((3, vec!["first", "second"])));
        assert_eq!(index.pop_first(), Some((7, vec!["x"])));
        assert_eq!(index.pop_first(), None);
    }

    #[test]
    fn test_pop_first_if_respects_condition() {
        let index = ExpiryIndex::new();
        index.insert(100, "late");
        index.insert(10, "early");

        let cutoff = 50;
        assert_eq!(
            index.pop_first_if(|inserted| *inserted < cutoff),
            Some((10, vec!["early"]))
        );
        assert_eq!(index.pop_first_if(|inserted| *inserted < cutoff), None);
        assert!(index.contains(100, &"late"));
    }

    #[test]
    fn test_reposition_moves_key() {
        let index = PriorityIndex::new();
        index.insert(lfu(1, 0), "a");
        index.insert(lfu(1, 0), "b");

        assert!(index.reposition(&"a", lfu(1, 0), lfu(2, 1)));

        assert!(index.contains(lfu(2, 1), &"a"));
        assert!(!index.contains(lfu(1, 0), &"a"));
        assert_eq!(index.pop_first(), Some((lfu(1, 0), vec!["b"])));
    }

    #[test]
    fn test_reposition_after_pop_is_noop() {
        let index = PriorityIndex::new();
        index.insert(lru(1, 0), "a");
        let popped = index.pop_first();
        assert!(popped.is_some());

        assert!(!index.reposition(&"a", lru(1, 0), lru(2, 1)));
        assert!(index.is_empty());
    }

    #[test]
    fn test_eviction_order_follows_priority() {
        let index = PriorityIndex::new();
        index.insert(lru(3, 0), "c");
        index.insert(lru(1, 0), "a");
        index.insert(lru(2, 0), "b");

        // touch "a" so it becomes the most recent
        index.reposition(&"a", lru(1, 0), lru(4, 1));

        assert_eq!(index.pop_first().map(|(_, keys)| keys), Some(vec!["b"]));
        assert_eq!(index.pop_first().map(|(_, keys)| keys), Some(vec!["c"]));
        assert_eq!(index.pop_first().map(|(_, keys)| keys), Some(vec!["a"]));
    }
}
