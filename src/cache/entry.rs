//! The two records that make up one cached response.
//!
//! Each entry is stored as two physical keys with the same TTL, written one
//! after the other without a transaction:
//!
//! - `<key>:headers` — a [`HeadersRecord`], small enough to fetch on every
//!   conditional request.
//! - `<key>:data` — a [`DataRecord`] with the full payload.
//!
//! A crash between the two writes leaves only one half behind. Readers treat
//! a missing or invalid half as a miss, so the window is harmless.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::Response;
use crate::http::conditional::quote_etag;

const DEFAULT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// Validators of a cached response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadersRecord {
    pub etag: Option<String>,
    /// Unix seconds.
    pub last_modified: Option<i64>,
}

/// Full cached response.
///
/// Bodies are serialized as base64 strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataRecord {
    #[serde(with = "base64_body")]
    pub body: Vec<u8>,
    pub content_type: Option<String>,
    pub etag: Option<String>,
    pub last_modified: Option<i64>,
    /// The body is not valid UTF-8.
    pub is_binary: bool,
    /// gzip copy of `body`, present when the body was worth compressing.
    #[serde(default, with = "base64_body::optional")]
    pub compressed_body: Option<Vec<u8>>,
}

impl DataRecord {
    /// Captures a downstream response.
    ///
    /// Validators the handler set are kept; otherwise the ETag is the SHA-256
    /// of the body and `Last-Modified` is the current time. A missing
    /// `Content-Type` gets the default the response would be serialized with.
    pub fn capture(response: &Response) -> Self {
        let body = response.content().to_vec();
        let etag = response
            .header_value("etag")
            .map(quote_etag)
            .unwrap_or_else(|| quote_etag(&format!("{:x}", Sha256::digest(&body))));
        let last_modified = response
            .last_modified()
            .unwrap_or_else(|| Utc::now().timestamp());

        let is_binary = std::str::from_utf8(&body).is_err();
        let content_type = match response.header_value("content-type") {
            Some(content_type) => content_type.to_owned(),
            None if is_binary => "application/octet-stream".to_owned(),
            None => DEFAULT_CONTENT_TYPE.to_owned(),
        };

        Self {
            is_binary,
            content_type: Some(content_type),
            etag: Some(etag),
            last_modified: Some(last_modified),
            body,
            compressed_body: None,
        }
    }

    /// A record is only replayable with a body and a content type.
    pub fn is_valid(&self) -> bool {
        !self.body.is_empty() && self.content_type.as_deref().is_some_and(|t| !t.is_empty())
    }

    pub fn headers_record(&self) -> HeadersRecord {
        HeadersRecord {
            etag: self.etag.clone(),
            last_modified: self.last_modified,
        }
    }
}

mod base64_body {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD.decode(text).map_err(D::Error::custom)
    }

    pub mod optional {
        use base64::Engine;
        use base64::engine::general_purpose::STANDARD;
        use serde::de::Error;
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            bytes: &Option<Vec<u8>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match bytes {
                Some(bytes) => serializer.serialize_some(&STANDARD.encode(bytes)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Vec<u8>>, D::Error> {
            Option::<String>::deserialize(deserializer)?
                .map(|text| STANDARD.decode(text).map_err(D::Error::custom))
                .transpose()
        }
    }
}
