use thiserror::Error;

/// Errors produced by the response cache.
///
/// Only [`AlreadyEncoded`](CacheError::AlreadyEncoded) ever reaches a client
/// (as a `500`); storage failures on the request path are logged and the
/// request falls through to the downstream handler.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("store error: {0}")]
    Store(#[from] redis::RedisError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("compression error: {0}")]
    Compression(#[from] std::io::Error),

    #[error(
        "response is already encoded with `{encoding}`; place the cache below any compression middleware"
    )]
    AlreadyEncoded { encoding: String },

    #[error("invalid cache age `{value}`: expected seconds or \"<N> <unit>\"")]
    InvalidAge { value: String },

    #[error("invalid size `{value}`: expected bytes or \"<N>kb\"-style size")]
    InvalidSize { value: String },
}

/// Convenience alias used throughout the cache module.
pub type CacheResult<T> = Result<T, CacheError>;
