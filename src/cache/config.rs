//! Engine-wide cache configuration.

use serde::Deserialize;

/// Topology of the Redis deployment behind [`CacheConfig::redis_uri`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RedisMode {
    /// One server; the URI names it.
    #[default]
    Single,
    /// A Redis Cluster; the URI is a comma-separated list of primary nodes.
    Clustered,
}

/// What the storage backend turns into when Redis cannot be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Degrade {
    /// Serve from the bounded in-process LRU store instead.
    #[default]
    Fallback,
    /// Stop storing anything; every request is a miss.
    Disable,
}

/// Configuration shared by every interceptor a [`ResponseCache`] hands out.
///
/// Deserializable with every field optional, so hosts can load it from their
/// own config files; or build it in code:
///
/// ```
/// use rttp_cache::cache::{CacheConfig, RedisMode};
///
/// let config = CacheConfig::new()
///     .namespace("storefront")
///     .redis_uri("redis://127.0.0.1:6379")
///     .threshold("2kb");
///
/// assert_eq!(config.namespace, "storefront");
/// assert_eq!(config.redis_mode, RedisMode::Single);
/// ```
///
/// | Setting             | Default                         |
/// |---------------------|---------------------------------|
/// | `enabled`           | `true`                          |
/// | `namespace`         | `rttpCache`                     |
/// | `redis_uri`         | none (in-process store only)    |
/// | `redis_mode`        | `single`                        |
/// | `degrade`           | `fallback`                      |
/// | `fallback_capacity` | `100` entries                   |
/// | `threshold`         | `1kb`                           |
/// | `status_header`     | `X-Cache`                       |
/// | `bypass_param`      | `_`                             |
///
/// [`ResponseCache`]: crate::cache::ResponseCache
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub namespace: String,
    pub redis_uri: Option<String>,
    pub redis_mode: RedisMode,
    pub degrade: Degrade,
    pub fallback_capacity: usize,
    pub threshold: String,
    pub status_header: String,
    pub bypass_param: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            namespace: "rttpCache".to_owned(),
            redis_uri: None,
            redis_mode: RedisMode::Single,
            degrade: Degrade::Fallback,
            fallback_capacity: 100,
            threshold: "1kb".to_owned(),
            status_header: "X-Cache".to_owned(),
            bypass_param: "_".to_owned(),
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Prefix for every physical key; flushes never touch keys outside it.
    #[must_use]
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    #[must_use]
    pub fn redis_uri(mut self, uri: impl Into<String>) -> Self {
        self.redis_uri = Some(uri.into());
        self
    }

    #[must_use]
    pub fn redis_mode(mut self, mode: RedisMode) -> Self {
        self.redis_mode = mode;
        self
    }

    #[must_use]
    pub fn degrade(mut self, degrade: Degrade) -> Self {
        self.degrade = degrade;
        self
    }

    #[must_use]
    pub fn fallback_capacity(mut self, capacity: usize) -> Self {
        self.fallback_capacity = capacity;
        self
    }

    /// Minimum body size that gets a gzip copy, e.g. `"1kb"` or `"512"`.
    #[must_use]
    pub fn threshold(mut self, threshold: impl Into<String>) -> Self {
        self.threshold = threshold.into();
        self
    }

    #[must_use]
    pub fn status_header(mut self, name: impl Into<String>) -> Self {
        self.status_header = name.into();
        self
    }

    #[must_use]
    pub fn bypass_param(mut self, name: impl Into<String>) -> Self {
        self.bypass_param = name.into();
        self
    }
}
