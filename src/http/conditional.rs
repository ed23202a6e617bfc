//! Conditional requests: validators and freshness (RFC 9110 §13).
//!
//! A response is *fresh* for a request when the client already holds the
//! representation the response describes, i.e. its `If-None-Match` matches
//! the response `ETag` and/or its `If-Modified-Since` is not older than the
//! response `Last-Modified`. Middleware answers fresh requests with
//! `304 Not Modified` and no body.

use chrono::{DateTime, Utc};

use super::{Headers, Method, Request, Response, StatusCode};

/// `strftime` pattern for IMF-fixdate, the preferred HTTP-date format.
const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Formats unix seconds as an HTTP-date (`Sun, 06 Nov 1994 08:49:37 GMT`).
///
/// Returns `None` for timestamps outside chrono's representable range.
pub fn format_http_date(secs: i64) -> Option<String> {
    DateTime::<Utc>::from_timestamp(secs, 0).map(|dt| dt.format(HTTP_DATE_FORMAT).to_string())
}

/// Parses an HTTP-date into unix seconds.
pub fn parse_http_date(value: &str) -> Option<i64> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|dt| dt.timestamp())
}

/// Wraps an opaque tag in double quotes unless it is already a quoted
/// (strong or weak) entity tag.
pub fn quote_etag(tag: &str) -> String {
    if tag.starts_with('"') || tag.starts_with("W/\"") {
        tag.to_owned()
    } else {
        format!("\"{tag}\"")
    }
}

/// Returns `true` when the request's validators match the response's.
///
/// Mirrors the evaluation order caches conventionally use:
///
/// 1. No `If-None-Match` and no `If-Modified-Since` → not fresh.
/// 2. `Cache-Control: no-cache` on the request → not fresh.
/// 3. `If-None-Match` (other than `*`) must contain the response `ETag`,
///    compared weakly.
/// 4. `If-Modified-Since` must not be older than `Last-Modified`.
pub fn fresh(request: &Headers, response: &Headers) -> bool {
    let modified_since = request.get("if-modified-since");
    let none_match = request.get("if-none-match");

    if modified_since.is_none() && none_match.is_none() {
        return false;
    }

    if request
        .get("cache-control")
        .is_some_and(|cc| cc.split(',').any(|d| d.trim().eq_ignore_ascii_case("no-cache")))
    {
        return false;
    }

    if let Some(none_match) = none_match.map(str::trim).filter(|v| *v != "*") {
        let Some(etag) = response.get("etag") else {
            return false;
        };
        let matched = none_match.split(',').map(str::trim).any(|candidate| {
            candidate == etag
                || candidate.strip_prefix("W/") == Some(etag)
                || etag.strip_prefix("W/") == Some(candidate)
        });
        if !matched {
            return false;
        }
    }

    if let Some(modified_since) = modified_since {
        let last_modified = response.get("last-modified").and_then(parse_http_date);
        let since = parse_http_date(modified_since);
        match (last_modified, since) {
            (Some(last), Some(since)) if last <= since => {}
            _ => return false,
        }
    }

    true
}

impl Response {
    /// Sets the `ETag` header, quoting the tag if needed.
    pub fn set_etag(&mut self, etag: &str) {
        self.set_header("ETag", quote_etag(etag));
    }

    /// Sets the `Last-Modified` header from unix seconds.
    pub fn set_last_modified(&mut self, secs: i64) {
        if let Some(date) = format_http_date(secs) {
            self.set_header("Last-Modified", date);
        }
    }

    /// Returns the `Last-Modified` header as unix seconds, if present and valid.
    pub fn last_modified(&self) -> Option<i64> {
        self.header_value("last-modified").and_then(parse_http_date)
    }

    /// Returns `true` if `request` can be answered with `304 Not Modified`.
    ///
    /// Only GET and HEAD requests are considered, and only while this response
    /// is successful (`2xx`) or already a `304`.
    pub fn is_fresh(&self, request: &Request) -> bool {
        if !matches!(request.method(), Method::Get | Method::Head) {
            return false;
        }
        if !(self.status().is_success() || self.status() == StatusCode::NotModified) {
            return false;
        }
        fresh(request.headers(), self.headers())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPOCH_DATE: &str = "Thu, 01 Jan 1970 00:00:00 GMT";

    fn headers(pairs: &[(&str, &str)]) -> Headers {
        let mut h = Headers::new();
        for (k, v) in pairs {
            h.insert(*k, *v);
        }
        h
    }

    fn get(extra: &str) -> Request {
        let raw = format!("GET / HTTP/1.1\r\nHost: localhost\r\n{extra}\r\n");
        Request::parse(raw.as_bytes()).unwrap().0
    }

    #[test]
    fn http_date_round_trip() {
        assert_eq!(format_http_date(0).as_deref(), Some(EPOCH_DATE));
        assert_eq!(
            format_http_date(784111777).as_deref(),
            Some("Sun, 06 Nov 1994 08:49:37 GMT")
        );
        assert_eq!(parse_http_date("Sun, 06 Nov 1994 08:49:37 GMT"), Some(784111777));
        assert_eq!(parse_http_date("yesterday"), None);
    }

    #[test]
    fn etag_quoting() {
        assert_eq!(quote_etag("abc"), "\"abc\"");
        assert_eq!(quote_etag("\"abc\""), "\"abc\"");
        assert_eq!(quote_etag("W/\"abc\""), "W/\"abc\"");
    }

    #[test]
    fn unconditional_request_is_never_fresh() {
        let res = headers(&[("ETag", "\"a\"")]);
        assert!(!fresh(&Headers::new(), &res));
    }

    #[test]
    fn matching_etag_is_fresh() {
        let req = headers(&[("If-None-Match", "\"x\", \"a\"")]);
        assert!(fresh(&req, &headers(&[("ETag", "\"a\"")])));
        assert!(!fresh(&req, &headers(&[("ETag", "\"b\"")])));
        assert!(!fresh(&req, &Headers::new()));
    }

    #[test]
    fn weak_comparison() {
        let req = headers(&[("If-None-Match", "W/\"a\"")]);
        assert!(fresh(&req, &headers(&[("ETag", "\"a\"")])));
        let req = headers(&[("If-None-Match", "\"a\"")]);
        assert!(fresh(&req, &headers(&[("ETag", "W/\"a\"")])));
    }

    #[test]
    fn modified_since() {
        let res = headers(&[("Last-Modified", "Sun, 06 Nov 1994 08:49:37 GMT")]);
        let same = headers(&[("If-Modified-Since", "Sun, 06 Nov 1994 08:49:37 GMT")]);
        let older = headers(&[("If-Modified-Since", EPOCH_DATE)]);
        assert!(fresh(&same, &res));
        assert!(!fresh(&older, &res));
        assert!(!fresh(&same, &Headers::new()));
    }

    #[test]
    fn request_no_cache_forces_full_response() {
        let req = headers(&[("If-None-Match", "\"a\""), ("Cache-Control", "no-cache")]);
        assert!(!fresh(&req, &headers(&[("ETag", "\"a\"")])));
    }

    #[test]
    fn response_freshness_respects_status() {
        let req = get("If-None-Match: \"a\"\r\n");
        let mut res = Response::new(StatusCode::Ok);
        res.set_etag("a");
        assert!(res.is_fresh(&req));

        res.set_status(StatusCode::NotFound);
        assert!(!res.is_fresh(&req));
    }

    #[test]
    fn last_modified_accessors() {
        let mut res = Response::new(StatusCode::Ok);
        res.set_last_modified(784111777);
        assert_eq!(
            res.header_value("last-modified"),
            Some("Sun, 06 Nov 1994 08:49:37 GMT")
        );
        assert_eq!(res.last_modified(), Some(784111777));
    }
}
