//! Error types for the cache engine
//!
//! Provides unified error handling using thiserror.

use std::fmt::Debug;
use std::sync::Arc;

use thiserror::Error;

// == Data Source Error ==
/// Failure reported by a [`DataSource`](crate::source::DataSource) implementation.
#[derive(Error, Debug)]
pub enum DataSourceError {
    /// The backing store has no value for the key
    #[error("Key not found: {0}")]
    NotFound(String),

    /// The backing store rejected or failed the operation
    #[error("Backend error: {0}")]
    Backend(String),

    /// Any other failure raised by the implementation
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// == Cache Error Enum ==
/// Unified error type for the cache engine.
///
/// Cloneable so that one failed in-flight load can be observed by every
/// caller waiting on it.
#[derive(Error, Debug, Clone)]
pub enum CacheError {
    /// Loading a key from the data source failed
    #[error("Failed to load key {key}: {source}")]
    Load {
        key: String,
        #[source]
        source: Arc<DataSourceError>,
    },

    /// Persisting a key to the data source failed
    #[error("Failed to persist key {key}: {source}")]
    Persist {
        key: String,
        #[source]
        source: Arc<DataSourceError>,
    },

    /// The engine was configured with invalid or missing settings
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A lane task was cancelled or panicked
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CacheError {
    pub(crate) fn load<K: Debug>(key: &K, source: DataSourceError) -> Self {
        CacheError::Load {
            key: format!("{key:?}"),
            source: Arc::new(source),
        }
    }

    pub(crate) fn persist<K: Debug>(key: &K, source: DataSourceError) -> Self {
        CacheError::Persist {
            key: format!("{key:?}"),
            source: Arc::new(source),
        }
    }

    /// Returns true when the failure stems from the data source not knowing the key.
    pub fn is_not_found(&self) -> bool {
        match self {
            CacheError::Load { source, .. } => {
                matches!(source.as_ref(), DataSourceError::NotFound(_))
            }
            _ => false,
        }
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache engine.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_load_error_formats_key_and_source() {
        let err = CacheError::load(&"user:1", DataSourceError::NotFound("user:1".into()));
        assert_eq!(
            err.to_string(),
            "Failed to load key \"user:1\": Key not found: user:1"
        );
        assert!(err.is_not_found());
        assert!(err.source().is_some());
    }

    #[test]
    fn test_persist_error_is_not_a_miss() {
        let err = CacheError::persist(&7u32, DataSourceError::Backend("disk full".into()));
        assert!(!err.is_not_found());
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn test_cloned_error_shares_source() {
        let err = CacheError::load(&1u8, anyhow::anyhow!("boom").into());
        let cloned = err.clone();
        match (err, cloned) {
            (CacheError::Load { source: a, .. }, CacheError::Load { source: b, .. }) => {
                assert!(Arc::ptr_eq(&a, &b));
            }
            _ => panic!("expected load errors"),
        }
    }
}
