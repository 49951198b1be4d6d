//! Configuration Module
//!
//! Construction-time settings for the cache engine. Scalar knobs can be
//! loaded from environment variables; the data source, timer and warm-up
//! keys are supplied in code.

use std::collections::HashSet;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};
use crate::source::DataSource;
use crate::timer::{MonotonicTimer, Timer};

// == Eviction Algorithm ==
/// Ordering policy used to pick capacity-eviction victims.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionAlgorithm {
    /// Oldest last access first
    #[default]
    Lru,
    /// Lowest access count first, oldest last access breaks ties
    Lfu,
}

impl FromStr for EvictionAlgorithm {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lru" => Ok(Self::Lru),
            "lfu" => Ok(Self::Lfu),
            other => Err(CacheError::Configuration(format!(
                "unknown eviction algorithm: {other}"
            ))),
        }
    }
}

impl fmt::Display for EvictionAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lru => f.write_str("lru"),
            Self::Lfu => f.write_str("lfu"),
        }
    }
}

// == Fetch Algorithm ==
/// When a `set` resolves relative to persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchAlgorithm {
    /// Resolve after the data source acknowledged the write
    #[default]
    WriteThrough,
    /// Resolve once cached; persist in the background
    WriteBack,
}

impl FromStr for FetchAlgorithm {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "write_through" => Ok(Self::WriteThrough),
            "write_back" => Ok(Self::WriteBack),
            other => Err(CacheError::Configuration(format!(
                "unknown fetch algorithm: {other}"
            ))),
        }
    }
}

impl fmt::Display for FetchAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WriteThrough => f.write_str("write_through"),
            Self::WriteBack => f.write_str("write_back"),
        }
    }
}

// == Cache Settings ==
/// Scalar engine parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Maximum number of records the cache holds
    pub maximum_size: usize,
    /// Record lifetime in seconds, None = never expires
    pub expiry_time_secs: Option<u64>,
    pub eviction_algorithm: EvictionAlgorithm,
    pub fetch_algorithm: FetchAlgorithm,
    /// Number of single-threaded lanes
    pub lane_pool_size: usize,
}

impl CacheSettings {
    /// Creates settings by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_MAXIMUM_SIZE` - Maximum records (default: 1000)
    /// - `CACHE_EXPIRY_SECS` - Record lifetime in seconds (default: unbounded)
    /// - `CACHE_EVICTION_ALGORITHM` - `lru` or `lfu` (default: lru)
    /// - `CACHE_FETCH_ALGORITHM` - `write_through` or `write_back` (default: write_through)
    /// - `CACHE_LANE_POOL_SIZE` - Number of lanes (default: 1)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            maximum_size: env::var("CACHE_MAXIMUM_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.maximum_size),
            expiry_time_secs: env::var("CACHE_EXPIRY_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .or(defaults.expiry_time_secs),
            eviction_algorithm: env::var("CACHE_EVICTION_ALGORITHM")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.eviction_algorithm),
            fetch_algorithm: env::var("CACHE_FETCH_ALGORITHM")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.fetch_algorithm),
            lane_pool_size: env::var("CACHE_LANE_POOL_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.lane_pool_size),
        }
    }

    /// Record lifetime as a [`Duration`].
    pub fn expiry_time(&self) -> Duration {
        self.expiry_time_secs
            .map(Duration::from_secs)
            .unwrap_or(Duration::MAX)
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            maximum_size: 1000,
            expiry_time_secs: None,
            eviction_algorithm: EvictionAlgorithm::Lru,
            fetch_algorithm: FetchAlgorithm::WriteThrough,
            lane_pool_size: 1,
        }
    }
}

// == Cache Config ==
/// Full construction-time configuration of a [`Cache`](crate::Cache).
///
/// Every field except `data_source` has a default.
pub struct CacheConfig<K, V> {
    pub maximum_size: usize,
    pub expiry_time: Duration,
    pub eviction_algorithm: EvictionAlgorithm,
    pub fetch_algorithm: FetchAlgorithm,
    /// Keys loaded in parallel before the cache becomes usable
    pub keys_to_eagerly_load: HashSet<K>,
    pub timer: Arc<dyn Timer>,
    pub lane_pool_size: usize,
    pub data_source: Option<Arc<dyn DataSource<K, V>>>,
}

impl<K, V> CacheConfig<K, V> {
    /// Applies scalar `settings` on top of the defaults.
    pub fn from_settings(settings: &CacheSettings) -> Self {
        Self {
            maximum_size: settings.maximum_size,
            expiry_time: settings.expiry_time(),
            eviction_algorithm: settings.eviction_algorithm,
            fetch_algorithm: settings.fetch_algorithm,
            lane_pool_size: settings.lane_pool_size,
            ..Self::default()
        }
    }

    pub fn with_data_source(mut self, data_source: Arc<dyn DataSource<K, V>>) -> Self {
        self.data_source = Some(data_source);
        self
    }

    pub fn with_timer(mut self, timer: Arc<dyn Timer>) -> Self {
        self.timer = timer;
        self
    }

    /// Checks the configuration and hands back the data source.
    pub(crate) fn validate(&self) -> Result<Arc<dyn DataSource<K, V>>> {
        if self.maximum_size == 0 {
            return Err(CacheError::Configuration(
                "maximum_size must be at least 1".to_string(),
            ));
        }
        if self.lane_pool_size == 0 {
            return Err(CacheError::Configuration(
                "lane_pool_size must be at least 1".to_string(),
            ));
        }
        self.data_source
            .clone()
            .ok_or_else(|| CacheError::Configuration("No data source configured".to_string()))
    }
}

impl<K, V> Default for CacheConfig<K, V> {
    fn default() -> Self {
        let settings = CacheSettings::default();
        Self {
            maximum_size: settings.maximum_size,
            expiry_time: settings.expiry_time(),
            eviction_algorithm: settings.eviction_algorithm,
            fetch_algorithm: settings.fetch_algorithm,
            keys_to_eagerly_load: HashSet::new(),
            timer: Arc::new(MonotonicTimer::new()),
            lane_pool_size: settings.lane_pool_size,
            data_source: None,
        }
    }
}

impl<K, V> fmt::Debug for CacheConfig<K, V>
where
    K: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheConfig")
            .field("maximum_size", &self.maximum_size)
            .field("expiry_time", &self.expiry_time)
            .field("eviction_algorithm", &self.eviction_algorithm)
            .field("fetch_algorithm", &self.fetch_algorithm)
            .field("keys_to_eagerly_load", &self.keys_to_eagerly_load)
            .field("timer", &self.timer)
            .field("lane_pool_size", &self.lane_pool_size)
            .field("data_source", &self.data_source.as_ref().map(|_| "<dyn DataSource>"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemoryDataSource;

    #[test]
    fn test_settings_default() {
        let settings = CacheSettings::default();
        assert_eq!(settings.maximum_size, 1000);
        assert_eq!(settings.expiry_time(), Duration::MAX);
        assert_eq!(settings.eviction_algorithm, EvictionAlgorithm::Lru);
        assert_eq!(settings.fetch_algorithm, FetchAlgorithm::WriteThrough);
        assert_eq!(settings.lane_pool_size, 1);
    }

    #[test]
    fn test_settings_from_env() {
        // Single test touches the environment to avoid races between tests
        env::remove_var("CACHE_MAXIMUM_SIZE");
        env::remove_var("CACHE_EXPIRY_SECS");
        env::remove_var("CACHE_EVICTION_ALGORITHM");
        env::remove_var("CACHE_FETCH_ALGORITHM");
        env::remove_var("CACHE_LANE_POOL_SIZE");
        assert_eq!(CacheSettings::from_env(), CacheSettings::default());

        env::set_var("CACHE_MAXIMUM_SIZE", "64");
        env::set_var("CACHE_EXPIRY_SECS", "10");
        env::set_var("CACHE_EVICTION_ALGORITHM", "LFU");
        env::set_var("CACHE_FETCH_ALGORITHM", "write-back");
        env::set_var("CACHE_LANE_POOL_SIZE", "not-a-number");
        let settings = CacheSettings::from_env();
        assert_eq!(settings.maximum_size, 64);
        assert_eq!(settings.expiry_time(), Duration::from_secs(10));
        assert_eq!(settings.eviction_algorithm, EvictionAlgorithm::Lfu);
        assert_eq!(settings.fetch_algorithm, FetchAlgorithm::WriteBack);
        assert_eq!(settings.lane_pool_size, 1);

        env::remove_var("CACHE_MAXIMUM_SIZE");
        env::remove_var("CACHE_EXPIRY_SECS");
        env::remove_var("CACHE_EVICTION_ALGORITHM");
        env::remove_var("CACHE_FETCH_ALGORITHM");
        env::remove_var("CACHE_LANE_POOL_SIZE");
    }

    #[test]
    fn test_settings_deserialize_partial_json() {
        let settings: CacheSettings =
            serde_json::from_str(r#"{"maximum_size":2,"eviction_algorithm":"lfu"}"#).unwrap();
        assert_eq!(settings.maximum_size, 2);
        assert_eq!(settings.eviction_algorithm, EvictionAlgorithm::Lfu);
        assert_eq!(settings.fetch_algorithm, FetchAlgorithm::WriteThrough);
    }

    #[test]
    fn test_algorithm_parse_errors() {
        assert!(matches!(
            "mru".parse::<EvictionAlgorithm>(),
            Err(CacheError::Configuration(_))
        ));
        assert!(matches!(
            "write_around".parse::<FetchAlgorithm>(),
            Err(CacheError::Configuration(_))
        ));
        assert_eq!(FetchAlgorithm::WriteBack.to_string(), "write_back");
    }

    #[test]
    fn test_validate_requires_data_source() {
        let config: CacheConfig<String, String> = CacheConfig::default();
        assert!(matches!(config.validate(), Err(CacheError::Configuration(_))));
    }

    #[test]
    fn test_validate_rejects_zero_sizes() {
        let source: Arc<dyn DataSource<String, String>> = Arc::new(MemoryDataSource::new());
        let mut config = CacheConfig::default().with_data_source(source);
        assert!(config.validate().is_ok());

        config.lane_pool_size = 0;
        assert!(config.validate().is_err());

        config.lane_pool_size = 1;
        config.maximum_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_settings_keeps_defaults_for_the_rest() {
        let settings = CacheSettings {
            maximum_size: 5,
            lane_pool_size: 4,
            ..CacheSettings::default()
        };
        let config: CacheConfig<u32, u32> = CacheConfig::from_settings(&settings);
        assert_eq!(config.maximum_size, 5);
        assert_eq!(config.lane_pool_size, 4);
        assert!(config.data_source.is_none());
        assert!(config.keys_to_eagerly_load.is_empty());
    }
}
