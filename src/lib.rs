//! # rttp-cache
//!
//! Response caching middleware for the rttp HTTP/1.1 framework, backed by
//! Redis or a bounded in-process store.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rttp_cache::cache::{CacheConfig, CacheOptions, ResponseCache};
//! use rttp_cache::context::Context;
//! use rttp_cache::http::{Request, Response, StatusCode};
//! use rttp_cache::middleware::{Next, endpoint, from_middleware};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cache = ResponseCache::new(
//!         CacheConfig::new().redis_uri("redis://127.0.0.1:6379"),
//!     )?;
//!     let layer = cache.cache(CacheOptions::new().age("10 minutes").query("page"))?;
//!
//!     let raw = b"GET /articles?page=2 HTTP/1.1\r\nHost: example.com\r\n\r\n";
//!     let (request, _) = Request::parse(raw)?;
//!
//!     let chain = vec![
//!         from_middleware(Arc::new(layer)),
//!         endpoint(|_ctx| async { Response::new(StatusCode::Ok).body("page two") }),
//!     ];
//!     let response = Next::new(chain).run(Context::new(request)).await;
//!     assert_eq!(response.header_value("X-Cache"), Some("MISS"));
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod context;
pub mod http;
pub mod middleware;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use cache::{CacheConfig, CacheError, CacheLayer, CacheOptions, ResponseCache};
pub use http::{Headers, Method, Request, Response, StatusCode};
