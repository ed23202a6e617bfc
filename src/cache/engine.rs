//! The response cache and the interceptor it hands out.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::{debug, error, warn};

use super::age;
use super::compression::CompressionPolicy;
use super::config::CacheConfig;
use super::entry::DataRecord;
use super::error::CacheResult;
use super::freshness::{FreshnessNegotiator, Outcome};
use super::key::{CacheKey, QuerySelection, build_key};
use super::options::CacheOptions;
use super::storage::{StorageBackend, Store};
use crate::context::Context;
use crate::http::conditional::format_http_date;
use crate::middleware::{Middleware, Next};
use crate::{Response, StatusCode};

const HIT: &str = "HIT";
const MISS: &str = "MISS";

struct Inner {
    config: CacheConfig,
    storage: StorageBackend,
    compression: CompressionPolicy,
}

/// A shared response cache.
///
/// One `ResponseCache` owns the storage connection; every [`CacheLayer`] it
/// creates shares it. Cloning is cheap.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use rttp_cache::cache::{CacheConfig, ResponseCache};
/// use rttp_cache::middleware::{Next, endpoint, from_middleware};
/// use rttp_cache::{Response, StatusCode};
///
/// # async fn run(ctx: rttp_cache::context::Context) -> Result<(), rttp_cache::cache::CacheError> {
/// let cache = ResponseCache::new(CacheConfig::new().redis_uri("redis://127.0.0.1:6379"))?;
/// let chain = vec![
///     from_middleware(Arc::new(cache.cache("1 minute")?)),
///     endpoint(|_ctx| async { Response::new(StatusCode::Ok).body("hello world") }),
/// ];
/// let response = Next::new(chain).run(ctx).await;
///
/// cache.flush_cache().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ResponseCache {
    inner: Arc<Inner>,
}

impl ResponseCache {
    /// Creates a cache; the store is connected on first use.
    ///
    /// # Errors
    ///
    /// [`CacheError::InvalidSize`](super::CacheError::InvalidSize) for a
    /// malformed compression threshold.
    pub fn new(config: CacheConfig) -> CacheResult<Self> {
        let storage = StorageBackend::new(config.clone());
        Self::with_storage(config, storage)
    }

    /// Creates a cache over an existing store.
    pub fn with_store(config: CacheConfig, store: Store) -> CacheResult<Self> {
        let storage = StorageBackend::with_store(config.clone(), store);
        Self::with_storage(config, storage)
    }

    fn with_storage(config: CacheConfig, storage: StorageBackend) -> CacheResult<Self> {
        let compression = CompressionPolicy::new(&config.threshold)?;
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                storage,
                compression,
            }),
        })
    }

    /// Builds an interceptor.
    ///
    /// # Errors
    ///
    /// [`CacheError::InvalidAge`](super::CacheError::InvalidAge) when the age
    /// does not start with a number.
    pub fn cache(&self, options: impl Into<CacheOptions>) -> CacheResult<CacheLayer> {
        let options = options.into();
        let age = options.age.unwrap_or_default().seconds()?;
        let selection = options
            .query
            .as_ref()
            .map(QuerySelection::from)
            .unwrap_or_default();

        debug!(age, ?selection, "built cache layer");
        Ok(CacheLayer {
            cache: self.clone(),
            age,
            selection,
            headers: options.headers.into_iter().collect(),
        })
    }

    /// Deletes every entry in the namespace, or those whose key matches the
    /// glob `pattern`. Returns how many records were removed.
    pub async fn flush(&self, pattern: Option<&str>) -> CacheResult<usize> {
        if !self.inner.config.enabled {
            return Ok(0);
        }
        self.inner.storage.flush(pattern).await
    }

    /// Deletes every entry in the namespace.
    pub async fn flush_cache(&self) -> CacheResult<usize> {
        self.flush(None).await
    }

    /// Deletes both records of one entry.
    pub async fn invalidate(&self, key: &CacheKey) -> CacheResult<usize> {
        let storage = &self.inner.storage;
        Ok(storage.delete(&key.headers_key()).await? + storage.delete(&key.data_key()).await?)
    }

    pub fn storage(&self) -> &StorageBackend {
        &self.inner.storage
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }
}

/// Request interceptor produced by [`ResponseCache::cache`].
///
/// Implements [`Middleware`], so it drops into any pipeline. Hits and `304`s
/// are answered without calling the rest of the chain.
#[derive(Clone)]
pub struct CacheLayer {
    cache: ResponseCache,
    age: u64,
    selection: QuerySelection,
    headers: Vec<(String, String)>,
}

impl CacheLayer {
    /// Entry lifetime in seconds.
    pub fn age(&self) -> u64 {
        self.age
    }

    pub fn selection(&self) -> &QuerySelection {
        &self.selection
    }

    /// Serves one request from the cache or from `next`.
    ///
    /// # Errors
    ///
    /// [`CacheError::AlreadyEncoded`](super::CacheError::AlreadyEncoded) when
    /// the downstream response is content-coded. Storage failures never
    /// surface here.
    pub async fn process(&self, mut ctx: Context, next: Next) -> CacheResult<Response> {
        let inner = &self.cache.inner;
        let config = &inner.config;
        let request = ctx.request();

        if !config.enabled
            || !request.method().is_cacheable()
            || request.query_param(&config.bypass_param).is_some()
        {
            debug!(method = request.method().as_str(), path = request.path(), "cache bypassed");
            let mut response = next.run(ctx).await;
            self.apply_static_headers(&mut response);
            return Ok(response);
        }

        inner.storage.connect().await;

        let key = build_key(request, &self.selection);
        let surrogate_key = format!("{} {}", request.host(), key);
        let accepts_gzip = request.accepts_gzip();

        let mut response = Response::new(StatusCode::Ok);
        match FreshnessNegotiator::new(&inner.storage, &key)
            .negotiate(request, &mut response)
            .await
        {
            Outcome::NotModified => {
                response.set_status(StatusCode::NotModified);
                self.decorate(&mut response, &surrogate_key, HIT);
                return Ok(response);
            }
            Outcome::Hit(record) => {
                debug!(key = %key, "cache hit");
                CompressionPolicy::encode_response(&mut response, &record, accepts_gzip);
                self.decorate(&mut response, &surrogate_key, HIT);
                return Ok(response);
            }
            Outcome::Miss => debug!(key = %key, "cache miss"),
        }

        ctx.extensions_mut().insert(key.clone());
        let mut response = next.run(ctx).await;

        if response.content().is_empty() {
            self.apply_static_headers(&mut response);
            self.apply_cache_headers(&mut response, &surrogate_key);
            return Ok(response);
        }

        if response.status() == StatusCode::Ok {
            CompressionPolicy::ensure_identity(response.headers())?;
            let record = self.fill(&key, &response).await;
            if let Some(etag) = &record.etag {
                response.headers_mut().set_if_absent("ETag", etag.as_str());
            }
            if let Some(date) = record.last_modified.and_then(format_http_date) {
                response.headers_mut().set_if_absent("Last-Modified", date);
            }
            CompressionPolicy::encode_response(&mut response, &record, accepts_gzip);
        }

        self.decorate(&mut response, &surrogate_key, MISS);
        Ok(response)
    }

    // Captures the downstream response and writes both records.
    async fn fill(&self, key: &CacheKey, response: &Response) -> DataRecord {
        let inner = &self.cache.inner;
        let mut record = DataRecord::capture(response);

        if let Err(e) = inner.compression.prepare(&mut record) {
            warn!(key = %key, error = %e, "failed to compress cached body");
        }

        if self.age == 0 {
            return record;
        }

        let stored = async {
            inner
                .storage
                .set(&key.headers_key(), &record.headers_record(), self.age)
                .await?;
            inner.storage.set(&key.data_key(), &record, self.age).await
        };
        match stored.await {
            Ok(()) => debug!(key = %key, age = self.age, "cache filled"),
            Err(e) => warn!(key = %key, error = %e, "failed to store response"),
        }

        record
    }

    fn decorate(&self, response: &mut Response, surrogate_key: &str, status: &str) {
        self.apply_static_headers(response);
        self.apply_cache_headers(response, surrogate_key);
        response.set_header(self.cache.inner.config.status_header.as_str(), status);
    }

    fn apply_cache_headers(&self, response: &mut Response, surrogate_key: &str) {
        response.set_header("Cache-Control", age::cache_control(self.age));
        response.set_header("Surrogate-Control", age::surrogate_control(self.age));
        response.set_header("Surrogate-Key", surrogate_key);
    }

    fn apply_static_headers(&self, response: &mut Response) {
        for (name, value) in &self.headers {
            response
                .headers_mut()
                .set_if_absent(name.as_str(), value.as_str());
        }
    }
}

impl Middleware for CacheLayer {
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        let layer = self.clone();
        Box::pin(async move {
            match layer.process(ctx, next).await {
                Ok(response) => response,
                Err(e) => {
                    error!(error = %e, "response cache misconfigured");
                    Response::new(StatusCode::InternalServerError).body("Internal Server Error")
                }
            }
        })
    }
}

impl std::fmt::Debug for CacheLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheLayer")
            .field("age", &self.age)
            .field("selection", &self.selection)
            .field("headers", &self.headers)
            .finish()
    }
}
