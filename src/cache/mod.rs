//! Response caching middleware.
//!
//! [`ResponseCache`] stores full `200 OK` responses of `GET`/`HEAD` requests
//! in Redis (single node or cluster) or in a bounded in-process LRU store, and
//! replays them on later requests for the same [`CacheKey`]. Conditional
//! requests are answered with `304 Not Modified` from a small validator record
//! without reading the payload, and large textual bodies are kept gzip-coded
//! alongside the plain copy.
//!
//! ## Layout
//!
//! - [`key`] — cache key derivation.
//! - [`age`] — lifetimes, `Cache-Control` and `Surrogate-Control`.
//! - [`storage`] — the fail-soft storage backend and its stores.
//! - [`freshness`] — two-phase conditional lookup.
//! - [`compression`] — gzip storage and encoding negotiation.
//! - [`engine`] — [`ResponseCache`] and its [`CacheLayer`] interceptor.
//!
//! ## Headers written
//!
//! | Header              | Value                                     |
//! |---------------------|-------------------------------------------|
//! | `Cache-Control`     | `public, max-age=<min(age,300)>, must-revalidate` |
//! | `Surrogate-Control` | `max-age=<age>`                           |
//! | `Surrogate-Key`     | `<host> <key>`                            |
//! | `X-Cache`           | `HIT` or `MISS` (name configurable)       |

pub mod age;
pub mod compression;
pub mod config;
pub mod engine;
pub mod entry;
pub mod error;
pub mod freshness;
pub mod key;
pub mod options;
pub mod storage;

pub use age::Age;
pub use compression::CompressionPolicy;
pub use config::{CacheConfig, Degrade, RedisMode};
pub use engine::{CacheLayer, ResponseCache};
pub use entry::{DataRecord, HeadersRecord};
pub use error::{CacheError, CacheResult};
pub use freshness::{FreshnessNegotiator, Outcome};
pub use key::{CacheKey, QueryOption, QuerySelection, build_key};
pub use options::CacheOptions;
pub use storage::{BackendMode, MemoryStore, RedisStore, StorageBackend, Store};
