//! Namespaced, fail-soft key/value storage for the cache.
//!
//! [`StorageBackend`] owns exactly one [`Store`]: Redis when it is configured
//! and reachable, otherwise the bounded in-process [`MemoryStore`] (or
//! nothing at all, depending on [`Degrade`]). The choice is made once, on the
//! first [`connect`](StorageBackend::connect), and never revisited.
//!
//! Values are written inside a tagged envelope,
//! `{"kind":"structured"|"scalar","value":…}`, so a read can tell a
//! well-formed entry from anything else living under the same key.

mod memory;
mod redis;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use super::config::{CacheConfig, Degrade};
use super::error::CacheResult;

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
enum StoredValue {
    Structured(Value),
    Scalar(Value),
}

// `None` for null values, which are never stored.
fn encode<T: Serialize>(value: &T) -> CacheResult<Option<String>> {
    let value = serde_json::to_value(value)?;
    let tagged = match value {
        Value::Null => return Ok(None),
        Value::Object(_) | Value::Array(_) => StoredValue::Structured(value),
        scalar => StoredValue::Scalar(scalar),
    };
    Ok(Some(serde_json::to_string(&tagged)?))
}

fn decode<T: DeserializeOwned>(raw: &str) -> Result<T, serde_json::Error> {
    match serde_json::from_str::<StoredValue>(raw)? {
        StoredValue::Structured(value) | StoredValue::Scalar(value) => serde_json::from_value(value),
    }
}

/// One of the interchangeable stores a [`StorageBackend`] can own.
pub enum Store {
    Redis(RedisStore),
    Memory(MemoryStore),
}

impl Store {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        match self {
            Self::Redis(store) => store.get(key).await,
            Self::Memory(store) => Ok(store.get(key)),
        }
    }

    async fn set(&self, key: &str, value: String, ttl_secs: u64) -> CacheResult<()> {
        match self {
            Self::Redis(store) => store.set(key, &value, ttl_secs).await,
            Self::Memory(store) => {
                store.set(key, value, ttl_secs);
                Ok(())
            }
        }
    }

    async fn delete(&self, key: &str) -> CacheResult<usize> {
        match self {
            Self::Redis(store) => store.delete(key).await,
            Self::Memory(store) => Ok(store.delete(key)),
        }
    }

    async fn flush(&self, pattern: &str) -> CacheResult<usize> {
        match self {
            Self::Redis(store) => store.flush(pattern).await,
            Self::Memory(store) => Ok(store.flush(pattern)),
        }
    }
}

/// Observable state of a [`StorageBackend`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendMode {
    /// `connect` has not completed yet.
    Pending,
    /// Connected to Redis.
    Durable,
    /// No Redis configured; the in-process store is the only backend.
    InProcess,
    /// Redis was unreachable; the in-process store stands in for it.
    Fallback,
    /// Caching is off, by configuration or after a failed connection.
    Disabled,
}

/// Namespaced access to the cache store.
///
/// Every operation degrades instead of failing the request it serves:
/// reads return `None` on any problem, and a payload that does not decode is
/// deleted on sight.
pub struct StorageBackend {
    config: CacheConfig,
    store: OnceCell<Option<Store>>,
}

impl StorageBackend {
    /// Creates a backend that connects lazily according to `config`.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            store: OnceCell::new(),
        }
    }

    /// Creates a backend around an already-constructed store.
    pub fn with_store(config: CacheConfig, store: Store) -> Self {
        Self {
            config,
            store: OnceCell::new_with(Some(Some(store))),
        }
    }

    /// Establishes the store connection, at most once.
    ///
    /// Concurrent callers wait for the same attempt. A failed attempt is
    /// logged and turns the backend into its degraded mode for good; this
    /// method itself never fails.
    pub async fn connect(&self) {
        self.store().await;
    }

    async fn store(&self) -> Option<&Store> {
        self.store.get_or_init(|| self.open()).await.as_ref()
    }

    async fn open(&self) -> Option<Store> {
        if !self.config.enabled {
            return None;
        }

        let Some(uri) = self.config.redis_uri.as_deref() else {
            debug!(
                capacity = self.config.fallback_capacity,
                "no redis configured, caching in process"
            );
            return Some(Store::Memory(MemoryStore::new(self.config.fallback_capacity)));
        };

        match RedisStore::connect(uri, self.config.redis_mode).await {
            Ok(store) => {
                info!(uri, mode = ?self.config.redis_mode, "connected to redis");
                Some(Store::Redis(store))
            }
            Err(e) => match self.config.degrade {
                Degrade::Fallback => {
                    warn!(uri, error = %e, "redis unreachable, caching in process");
                    Some(Store::Memory(MemoryStore::new(self.config.fallback_capacity)))
                }
                Degrade::Disable => {
                    warn!(uri, error = %e, "redis unreachable, cache disabled");
                    None
                }
            },
        }
    }

    /// Returns the current mode without attempting a connection.
    pub fn mode(&self) -> BackendMode {
        match self.store.get() {
            None => BackendMode::Pending,
            Some(None) => BackendMode::Disabled,
            Some(Some(Store::Redis(_))) => BackendMode::Durable,
            Some(Some(Store::Memory(_))) if self.config.redis_uri.is_some() => {
                BackendMode::Fallback
            }
            Some(Some(Store::Memory(_))) => BackendMode::InProcess,
        }
    }

    fn physical_key(&self, key: &str) -> String {
        format!("{}:{}", self.config.namespace, key)
    }

    /// Reads and decodes `key`.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let store = self.store().await?;
        let key = self.physical_key(key);

        let raw = match store.get(&key).await {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(key, error = %e, "cache read failed");
                return None;
            }
        };

        match decode(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key, error = %e, "discarding corrupt cache entry");
                if let Err(e) = store.delete(&key).await {
                    warn!(key, error = %e, "failed to delete corrupt cache entry");
                }
                None
            }
        }
    }

    /// Encodes and writes `value` under `key` for `ttl_secs` seconds.
    ///
    /// Null values and a zero TTL write nothing.
    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl_secs: u64) -> CacheResult<()> {
        let Some(store) = self.store().await else {
            return Ok(());
        };
        if ttl_secs == 0 {
            return Ok(());
        }
        let Some(raw) = encode(value)? else {
            return Ok(());
        };
        store.set(&self.physical_key(key), raw, ttl_secs).await
    }

    /// Deletes `key`, returning the number of records removed.
    pub async fn delete(&self, key: &str) -> CacheResult<usize> {
        match self.store().await {
            Some(store) => store.delete(&self.physical_key(key)).await,
            None => Ok(0),
        }
    }

    /// Deletes every key in the namespace, or only those matching `pattern`
    /// (a glob applied after the namespace prefix).
    ///
    /// Keys are enumerated incrementally, so this is safe to run alongside
    /// live traffic. Deletions already issued when an error occurs stay done.
    pub async fn flush(&self, pattern: Option<&str>) -> CacheResult<usize> {
        let Some(store) = self.store().await else {
            return Ok(0);
        };
        let pattern = self.physical_key(pattern.unwrap_or("*"));
        let removed = store.flush(&pattern).await?;
        info!(pattern, removed, "flushed cache");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::entry::HeadersRecord;

    fn memory_backend(namespace: &str) -> StorageBackend {
        StorageBackend::new(CacheConfig::new().namespace(namespace))
    }

    #[test]
    fn envelope_tags_kind() {
        let structured = encode(&HeadersRecord {
            etag: Some("\"a\"".into()),
            last_modified: None,
        })
        .unwrap()
        .unwrap();
        assert!(structured.starts_with(r#"{"kind":"structured","value":{"#));

        let scalar = encode(&"value:a").unwrap().unwrap();
        assert_eq!(scalar, r#"{"kind":"scalar","value":"value:a"}"#);
        assert_eq!(decode::<String>(&scalar).unwrap(), "value:a");

        assert!(encode(&Option::<String>::None).unwrap().is_none());
    }

    #[test]
    fn untagged_payload_is_rejected() {
        assert!(decode::<String>(r#""bare""#).is_err());
        assert!(decode::<String>(r#"{"value":"x"}"#).is_err());
        assert!(decode::<String>("not json").is_err());
    }

    #[tokio::test]
    async fn round_trip_under_namespace() {
        let backend = memory_backend("ns");
        backend.set("k", &vec![1_u8, 2, 3], 60).await.unwrap();
        assert_eq!(backend.get::<Vec<u8>>("k").await, Some(vec![1, 2, 3]));
        assert_eq!(backend.mode(), BackendMode::InProcess);
        assert_eq!(backend.delete("k").await.unwrap(), 1);
        assert_eq!(backend.get::<Vec<u8>>("k").await, None);
    }

    #[tokio::test]
    async fn corrupt_value_is_deleted() {
        let store = MemoryStore::new(10);
        store.set("ns:bad", "{{{".into(), 60);
        let backend = StorageBackend::with_store(CacheConfig::new().namespace("ns"), Store::Memory(store));

        assert_eq!(backend.get::<HeadersRecord>("bad").await, None);
        // already gone
        assert_eq!(backend.delete("bad").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn zero_ttl_writes_nothing() {
        let backend = memory_backend("ns");
        backend.set("k", &"v", 0).await.unwrap();
        assert_eq!(backend.get::<String>("k").await, None);
    }

    #[tokio::test]
    async fn flush_is_scoped_to_namespace() {
        let store = MemoryStore::new(10);
        store.set("other:key", r#"{"kind":"scalar","value":1}"#.into(), 60);
        let backend = StorageBackend::with_store(
            CacheConfig::new().namespace("flushTest"),
            Store::Memory(store),
        );
        for key in ["key:a", "key:b", "key:c", "key:d"] {
            backend.set(key, &format!("value:{key}"), 300).await.unwrap();
        }
        backend.set("keep:e", &"e", 300).await.unwrap();

        assert_eq!(backend.flush(Some("key:*")).await.unwrap(), 4);
        assert_eq!(backend.get::<String>("keep:e").await.as_deref(), Some("e"));
        assert_eq!(backend.flush(None).await.unwrap(), 1);
        assert_eq!(backend.flush(None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn disabled_backend_is_inert() {
        let backend = StorageBackend::new(CacheConfig::new().enabled(false));
        backend.connect().await;
        assert_eq!(backend.mode(), BackendMode::Disabled);
        backend.set("k", &"v", 60).await.unwrap();
        assert_eq!(backend.get::<String>("k").await, None);
        assert_eq!(backend.delete("k").await.unwrap(), 0);
        assert_eq!(backend.flush(None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn unreachable_redis_falls_back_to_memory() {
        let backend = StorageBackend::new(CacheConfig::new().redis_uri("redis://127.0.0.1:1"));
        assert_eq!(backend.mode(), BackendMode::Pending);
        backend.connect().await;
        backend.connect().await;
        assert_eq!(backend.mode(), BackendMode::Fallback);

        backend.set("k", &"v", 60).await.unwrap();
        assert_eq!(backend.get::<String>("k").await.as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn unreachable_redis_can_disable() {
        let backend = StorageBackend::new(
            CacheConfig::new()
                .redis_uri("redis://127.0.0.1:1")
                .degrade(Degrade::Disable),
        );
        backend.connect().await;
        assert_eq!(backend.mode(), BackendMode::Disabled);
        assert_eq!(backend.flush(None).await.unwrap(), 0);
    }
}
