//! gzip storage and serving of cached bodies.
//!
//! Compression happens once, when an entry is filled. Every response served
//! from the entry afterwards picks the plain or the compressed copy based on
//! the request's `Accept-Encoding`, and always says which one it sent.

use std::io::Write;

use flate2::Compression;
use flate2::write::GzEncoder;

use super::entry::DataRecord;
use super::error::{CacheError, CacheResult};
use crate::http::encoding::ContentCoding;
use crate::{Headers, Response};

/// Decides whether an entry carries a gzip copy and which body a response gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionPolicy {
    threshold: usize,
}

impl CompressionPolicy {
    /// Creates a policy compressing bodies of at least `threshold`
    /// (`"1kb"`, `"0.5mb"`, `"2048"`…).
    pub fn new(threshold: &str) -> CacheResult<Self> {
        Ok(Self {
            threshold: parse_size(threshold)?,
        })
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Fails when the downstream response is already content-coded.
    ///
    /// The cache must sit below any compression middleware; otherwise it
    /// would store (and later re-encode) an opaque coded body.
    pub fn ensure_identity(headers: &Headers) -> CacheResult<()> {
        match headers.get("content-encoding").map(str::trim) {
            Some(encoding) if !encoding.is_empty() && !encoding.eq_ignore_ascii_case("identity") => {
                Err(CacheError::AlreadyEncoded {
                    encoding: encoding.to_owned(),
                })
            }
            _ => Ok(()),
        }
    }

    /// Returns `true` if `record` is large enough and of a compressible type.
    pub fn should_compress(&self, record: &DataRecord) -> bool {
        record.body.len() >= self.threshold
            && record.content_type.as_deref().is_some_and(is_compressible)
    }

    /// Attaches a gzip copy of the body to `record` when it qualifies.
    pub fn prepare(&self, record: &mut DataRecord) -> CacheResult<()> {
        if self.should_compress(record) {
            record.compressed_body = Some(compress(&record.body)?);
        }
        Ok(())
    }

    /// Writes the body of `record` into `response` in the coding the client
    /// can take, along with `Content-Encoding` (and `Vary` for entries that
    /// exist in both codings).
    pub fn encode_response(response: &mut Response, record: &DataRecord, accepts_gzip: bool) {
        let coding = match &record.compressed_body {
            Some(gzipped) if accepts_gzip => {
                response.set_content(gzipped.clone());
                ContentCoding::Gzip
            }
            _ => {
                response.set_content(record.body.clone());
                ContentCoding::Identity
            }
        };
        response.set_header("Content-Encoding", coding.as_str());

        if record.compressed_body.is_some() {
            add_vary(response, "Accept-Encoding");
        }
    }
}

impl Default for CompressionPolicy {
    fn default() -> Self {
        Self { threshold: 1024 }
    }
}

fn add_vary(response: &mut Response, field: &str) {
    let vary = match response.header_value("vary") {
        None => field.to_owned(),
        Some(existing)
            if existing
                .split(',')
                .any(|f| f.trim() == "*" || f.trim().eq_ignore_ascii_case(field)) =>
        {
            return;
        }
        Some(existing) => format!("{existing}, {field}"),
    };
    response.set_header("Vary", vary);
}

/// gzip-compresses `body` at the default level.
pub fn compress(body: &[u8]) -> CacheResult<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(body.len() / 2), Compression::default());
    encoder.write_all(body)?;
    Ok(encoder.finish()?)
}

/// Returns `true` for textual media types that gzip well.
pub fn is_compressible(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    let Some((kind, subtype)) = essence.split_once('/') else {
        return false;
    };

    kind == "text"
        || matches!(
            subtype,
            "json" | "javascript" | "ecmascript" | "xml" | "x-javascript" | "graphql"
        )
        || subtype.ends_with("+json")
        || subtype.ends_with("+xml")
        || subtype.ends_with("+text")
}

/// Parses a byte size: a bare count or a number with a `b`/`kb`/`mb`/`gb`
/// suffix (1024-based, case-insensitive, fractions allowed).
pub fn parse_size(text: &str) -> CacheResult<usize> {
    let invalid = || CacheError::InvalidSize {
        value: text.to_owned(),
    };
    let lower = text.trim().to_ascii_lowercase();
    let split = lower
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(lower.len());
    let (number, unit) = lower.split_at(split);

    let number: f64 = number.parse().map_err(|_| invalid())?;
    let multiplier: f64 = match unit.trim() {
        "" | "b" => 1.0,
        "kb" => 1024.0,
        "mb" => 1024.0 * 1024.0,
        "gb" => 1024.0 * 1024.0 * 1024.0,
        _ => return Err(invalid()),
    };

    Ok((number * multiplier).floor() as usize)
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use flate2::read::GzDecoder;

    use super::*;
    use crate::StatusCode;

    fn record(content_type: &str, body: &[u8]) -> DataRecord {
        DataRecord {
            body: body.to_vec(),
            content_type: Some(content_type.to_owned()),
            etag: Some("\"e\"".into()),
            last_modified: Some(0),
            is_binary: false,
            compressed_body: None,
        }
    }

    fn gunzip(bytes: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        GzDecoder::new(bytes).read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn sizes() {
        assert_eq!(parse_size("1kb").unwrap(), 1024);
        assert_eq!(parse_size("1KB").unwrap(), 1024);
        assert_eq!(parse_size("1.5kb").unwrap(), 1536);
        assert_eq!(parse_size("2mb").unwrap(), 2 * 1024 * 1024);
        assert_eq!(parse_size("512").unwrap(), 512);
        assert_eq!(parse_size("512b").unwrap(), 512);
        assert!(matches!(parse_size("lots"), Err(CacheError::InvalidSize { .. })));
        assert!(parse_size("3 parsecs").is_err());
    }

    #[test]
    fn compressible_types() {
        assert!(is_compressible("text/plain"));
        assert!(is_compressible("text/html; charset=utf-8"));
        assert!(is_compressible("application/json"));
        assert!(is_compressible("application/problem+json"));
        assert!(is_compressible("image/svg+xml"));
        assert!(!is_compressible("image/png"));
        assert!(!is_compressible("application/octet-stream"));
        assert!(!is_compressible("garbage"));
    }

    #[test]
    fn already_encoded_downstream_is_rejected() {
        let mut headers = Headers::new();
        assert!(CompressionPolicy::ensure_identity(&headers).is_ok());
        headers.insert("Content-Encoding", "identity");
        assert!(CompressionPolicy::ensure_identity(&headers).is_ok());
        headers.set("Content-Encoding", "gzip");
        assert!(matches!(
            CompressionPolicy::ensure_identity(&headers),
            Err(CacheError::AlreadyEncoded { encoding }) if encoding == "gzip"
        ));
    }

    #[test]
    fn threshold_gates_compression() {
        let policy = CompressionPolicy::default();

        let mut small = record("text/plain", b"short");
        policy.prepare(&mut small).unwrap();
        assert!(small.compressed_body.is_none());

        let mut binary = record("image/png", &[0_u8; 4096]);
        policy.prepare(&mut binary).unwrap();
        assert!(binary.compressed_body.is_none());

        let mut big = record("text/plain", &[b' '; 2048]);
        policy.prepare(&mut big).unwrap();
        let gz = big.compressed_body.as_deref().unwrap();
        assert!(gz.len() < 2048);
        assert_eq!(gunzip(gz), vec![b' '; 2048]);
    }

    #[test]
    fn gzip_only_for_clients_that_accept_it() {
        let policy = CompressionPolicy::new("1kb").unwrap();
        let mut big = record("text/plain", &[b' '; 2048]);
        policy.prepare(&mut big).unwrap();

        let mut gzipped = Response::new(StatusCode::Ok);
        CompressionPolicy::encode_response(&mut gzipped, &big, true);
        assert_eq!(gzipped.header_value("content-encoding"), Some("gzip"));
        assert_eq!(gzipped.header_value("vary"), Some("Accept-Encoding"));
        assert_eq!(gunzip(gzipped.content()), big.body);

        let mut plain = Response::new(StatusCode::Ok);
        CompressionPolicy::encode_response(&mut plain, &big, false);
        assert_eq!(plain.header_value("content-encoding"), Some("identity"));
        assert_eq!(plain.content(), big.body.as_slice());
    }

    #[test]
    fn uncompressed_entry_is_identity_without_vary() {
        let small = record("text/plain", b"hello world");
        let mut response = Response::new(StatusCode::Ok);
        CompressionPolicy::encode_response(&mut response, &small, true);
        assert_eq!(response.header_value("content-encoding"), Some("identity"));
        assert_eq!(response.header_value("vary"), None);
        assert_eq!(response.content(), b"hello world");
    }

    #[test]
    fn vary_is_merged() {
        let mut response = Response::new(StatusCode::Ok).header("Vary", "Origin");
        add_vary(&mut response, "Accept-Encoding");
        assert_eq!(response.header_value("vary"), Some("Origin, Accept-Encoding"));
        add_vary(&mut response, "accept-encoding");
        assert_eq!(response.header_value("vary"), Some("Origin, Accept-Encoding"));
    }
}
