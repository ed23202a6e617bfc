//! Conditional lookup of a cached entry.
//!
//! Negotiation runs in two phases so a revalidating client costs one small
//! read:
//!
//! 1. Fetch the [`HeadersRecord`]. If it exists, copy its validators onto the
//!    outgoing response and ask whether the request is fresh. If so the
//!    answer is `304`, and the payload is never read.
//! 2. Fetch the [`DataRecord`]. A valid record gets its content type and
//!    validators copied onto the response; freshness is checked once more
//!    (the headers record may have expired first), then the entry is replayed.
//!
//! Anything else is a miss.

use tracing::debug;

use super::entry::{DataRecord, HeadersRecord};
use super::key::CacheKey;
use super::storage::StorageBackend;
use crate::{Request, Response};

/// Result of a lookup.
#[derive(Debug)]
pub enum Outcome {
    /// The client's copy is current; answer `304` with no body.
    NotModified,
    /// Replay this record.
    Hit(DataRecord),
    /// Nothing usable is stored.
    Miss,
}

/// Runs the two-phase lookup for one key.
pub struct FreshnessNegotiator<'a> {
    storage: &'a StorageBackend,
    key: &'a CacheKey,
}

impl<'a> FreshnessNegotiator<'a> {
    pub fn new(storage: &'a StorageBackend, key: &'a CacheKey) -> Self {
        Self { storage, key }
    }

    /// Looks the entry up, applying validators to `response` as a side effect.
    pub async fn negotiate(&self, request: &Request, response: &mut Response) -> Outcome {
        if let Some(headers) = self
            .storage
            .get::<HeadersRecord>(&self.key.headers_key())
            .await
        {
            apply_validators(response, headers.etag.as_deref(), headers.last_modified);
            if response.is_fresh(request) {
                debug!(key = %self.key, "validators match, not modified");
                return Outcome::NotModified;
            }
        }

        let Some(record) = self
            .storage
            .get::<DataRecord>(&self.key.data_key())
            .await
            .filter(DataRecord::is_valid)
        else {
            return Outcome::Miss;
        };

        if let Some(content_type) = &record.content_type {
            response.set_header("Content-Type", content_type.as_str());
        }
        apply_validators(response, record.etag.as_deref(), record.last_modified);

        if response.is_fresh(request) {
            debug!(key = %self.key, "validators match, not modified");
            Outcome::NotModified
        } else {
            Outcome::Hit(record)
        }
    }
}

/// Copies stored validators onto `response`.
pub(crate) fn apply_validators(response: &mut Response, etag: Option<&str>, last_modified: Option<i64>) {
    if let Some(etag) = etag {
        response.set_etag(etag);
    }
    if let Some(secs) = last_modified {
        response.set_last_modified(secs);
    }
}
