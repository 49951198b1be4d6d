//! Data Source Module
//!
//! The slower backing store sitting behind the cache, plus an in-memory
//! implementation useful for tests and embedding.

use std::fmt::Debug;
use std::hash::Hash;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::DataSourceError;

// == Data Source Trait ==
/// Loads and persists values on behalf of the cache.
///
/// Both operations are asynchronous; the cache never blocks a lane while
/// one of them is outstanding. Retrying is left to the implementation.
#[async_trait]
pub trait DataSource<K, V>: Send + Sync {
    /// Fetches the value stored for `key`. Unknown keys must fail.
    async fn load(&self, key: &K) -> Result<V, DataSourceError>;

    /// Stores `value` for `key`, stamped with the cache's logical `timestamp`.
    async fn persist(&self, key: &K, value: &V, timestamp: u64) -> Result<(), DataSourceError>;
}

// == Memory Data Source ==
/// DashMap-backed data source.
#[derive(Debug, Default)]
pub struct MemoryDataSource<K, V>
where
    K: Eq + Hash,
{
    entries: DashMap<K, V>,
}

impl<K, V> MemoryDataSource<K, V>
where
    K: Eq + Hash,
{
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Seeds the store with `entries`.
    pub fn with_entries(entries: impl IntoIterator<Item = (K, V)>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    pub fn insert(&self, key: K, value: V) {
        self.entries.insert(key, value);
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, V> MemoryDataSource<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    /// Returns a copy of the value currently stored for `key`.
    pub fn value_of(&self, key: &K) -> Option<V> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }
}

#[async_trait]
impl<K, V> DataSource<K, V> for MemoryDataSource<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync,
    V: Clone + Send + Sync,
{
    async fn load(&self, key: &K) -> Result<V, DataSourceError> {
        self.value_of(key)
            .ok_or_else(|| DataSourceError::NotFound(format!("{key:?}")))
    }

    async fn persist(&self, key: &K, value: &V, _timestamp: u64) -> Result<(), DataSourceError> {
        self.entries.insert(key.clone(), value.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_load_known_key() {
        let source = MemoryDataSource::with_entries([("a".to_string(), 1u32)]);
        assert_eq!(source.load(&"a".to_string()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_load_unknown_key_fails() {
        let source: MemoryDataSource<String, u32> = MemoryDataSource::new();
        let result = source.load(&"missing".to_string()).await;
        assert!(matches!(result, Err(DataSourceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_persist_then_load() {
        let source = MemoryDataSource::new();
        source.persist(&"k".to_string(), &"v".to_string(), 42).await.unwrap();
        assert_eq!(source.load(&"k".to_string()).await.unwrap(), "v");
        assert_eq!(source.len(), 1);
    }
}
