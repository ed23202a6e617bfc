//! HTTP/1.1 request parsing using the [`httparse`] crate.

use std::collections::HashMap;

use bytes::Bytes;
use thiserror::Error;

use super::{Headers, Method};

/// Errors that can occur while parsing an HTTP/1.1 request.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request is incomplete — more data needed")]
    Incomplete,

    #[error("HTTP parse error: {0}")]
    Parse(#[from] httparse::Error),

    #[error("missing required field: {field}")]
    MissingField { field: &'static str },
}

/// A fully parsed HTTP/1.1 request.
///
/// Created by [`Request::parse`] from a raw byte buffer. The body is stored
/// as a [`Bytes`] buffer.
///
/// Besides the raw request line, a `Request` answers the questions a response
/// cache asks when fingerprinting it: which [`scheme`](Self::scheme) and
/// [`host`](Self::host) it was addressed to, and what the
/// [`original_url`](Self::original_url) looked like byte for byte.
///
/// # Examples
///
/// ```
/// use rttp_cache::http::request::Request;
///
/// let raw = b"GET /hello?name=world HTTP/1.1\r\nHost: localhost:8080\r\n\r\n";
/// let (request, _offset) = Request::parse(raw).unwrap();
///
/// assert_eq!(request.method().as_str(), "GET");
/// assert_eq!(request.path(), "/hello");
/// assert_eq!(request.query_param("name"), Some("world"));
/// assert_eq!(request.host(), "localhost");
/// assert_eq!(request.original_url(), "/hello?name=world");
/// ```
#[derive(Debug)]
pub struct Request {
    method: Method,
    path: String,
    headers: Headers,
    query: Option<String>,
    body: Bytes,
    params: HashMap<String, String>,
}

impl Request {
    /// Maximum number of headers we support per request.
    const MAX_HEADERS: usize = 64;

    /// Parse a raw HTTP/1.1 request from a byte slice.
    ///
    /// Returns the parsed `Request` and the byte offset at which the body begins
    /// in `buf` (i.e. immediately after the `\r\n\r\n` header terminator).
    ///
    /// # Errors
    ///
    /// - [`RequestError::Incomplete`] — more data is needed to complete the request headers.
    /// - [`RequestError::Parse`] — the data is malformed and cannot be parsed.
    /// - [`RequestError::MissingField`] — a required field (method, path) is absent.
    pub fn parse(buf: &[u8]) -> Result<(Self, usize), RequestError> {
        let mut headers = [httparse::EMPTY_HEADER; Self::MAX_HEADERS];
        let mut raw_req = httparse::Request::new(&mut headers);

        let body_offset = match raw_req.parse(buf)? {
            httparse::Status::Complete(offset) => offset,
            httparse::Status::Partial => return Err(RequestError::Incomplete),
        };

        // `Method::from_str` is infallible.
        let Ok(method) = raw_req
            .method
            .ok_or(RequestError::MissingField { field: "method" })?
            .parse::<Method>();

        let raw_path = raw_req
            .path
            .ok_or(RequestError::MissingField { field: "path" })?;

        let (path, query) = match raw_path.split_once('?') {
            Some((path, query)) => (path.to_owned(), Some(query.to_owned())),
            None => (raw_path.to_owned(), None),
        };

        let mut header_map = Headers::with_capacity(raw_req.headers.len());
        for header in raw_req.headers.iter() {
            if let Ok(value) = std::str::from_utf8(header.value) {
                header_map.insert(header.name, value);
            }
        }

        let params = query.as_deref().map(parse_query_string).unwrap_or_default();
        let body = Bytes::copy_from_slice(&buf[body_offset..]);

        Ok((
            Self {
                method,
                path,
                headers: header_map,
                query,
                body,
                params,
            },
            body_offset,
        ))
    }

    /// Returns the HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the request path (without the query string).
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the request headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the raw query string (without the leading `?`), if any.
    pub fn query_string(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Returns a parsed query parameter value by key.
    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Returns the request body bytes.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Returns the path and query exactly as they appeared on the request line.
    pub fn original_url(&self) -> String {
        match &self.query {
            Some(query) => format!("{}?{}", self.path, query),
            None => self.path.clone(),
        }
    }

    /// Returns the hostname from the `Host` header with any port removed.
    ///
    /// Falls back to `localhost` when the header is missing, which only
    /// happens for HTTP/1.0 clients.
    pub fn host(&self) -> &str {
        let Some(host) = self.headers.get("host").map(str::trim) else {
            return "localhost";
        };

        // IPv6 literal: keep the brackets, drop the port after them.
        if host.starts_with('[') {
            return match host.find(']') {
                Some(end) => &host[..=end],
                None => host,
            };
        }

        match host.rsplit_once(':') {
            Some((name, _port)) => name,
            None => host,
        }
    }

    /// Returns the scheme the client used, honouring `X-Forwarded-Proto`.
    ///
    /// rttp only terminates plain HTTP, so without a proxy header the scheme
    /// is always `http`.
    pub fn scheme(&self) -> &str {
        self.headers
            .get("x-forwarded-proto")
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|proto| !proto.is_empty())
            .unwrap_or("http")
    }
}

/// Parses a URL query string (`key=value&key2=value2`) into a `HashMap`.
///
/// Keys and values are fully decoded (`+` as a space, then `%XX` escapes);
/// a component whose escapes do not decode to UTF-8 is kept as written.
/// Later occurrences of a key overwrite earlier ones.
fn parse_query_string(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter_map(|pair| {
            let mut parts = pair.splitn(2, '=');
            let key = decode_component(parts.next()?);
            let value = decode_component(parts.next().unwrap_or(""));
            Some((key, value))
        })
        .collect()
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => spaced,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(raw: &str) -> Request {
        Request::parse(raw.as_bytes()).unwrap().0
    }

    #[test]
    fn parse_simple_get() {
        let raw = b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n";
        let (req, offset) = Request::parse(raw).unwrap();
        assert_eq!(req.method().as_str(), "GET");
        assert_eq!(req.path(), "/");
        assert_eq!(req.headers().get("host"), Some("localhost"));
        assert_eq!(offset, raw.len()); // no body
    }

    #[test]
    fn parse_query_string() {
        let req = request("GET /search?q=rust&page=2 HTTP/1.1\r\nHost: example.com\r\n\r\n");
        assert_eq!(req.path(), "/search");
        assert_eq!(req.query_string(), Some("q=rust&page=2"));
        assert_eq!(req.query_param("q"), Some("rust"));
        assert_eq!(req.query_param("page"), Some("2"));
    }

    #[test]
    fn query_components_are_fully_decoded() {
        let req = request("GET /?a=x+y&b=x%20y&c%5B%5D=%E2%9C%93&d=%FF HTTP/1.1\r\nHost: a\r\n\r\n");
        assert_eq!(req.query_param("a"), Some("x y"));
        assert_eq!(req.query_param("b"), Some("x y"));
        assert_eq!(req.query_param("c[]"), Some("\u{2713}"));
        // not UTF-8 once decoded
        assert_eq!(req.query_param("d"), Some("%FF"));
        assert_eq!(req.query_string(), Some("a=x+y&b=x%20y&c%5B%5D=%E2%9C%93&d=%FF"));
    }

    #[test]
    fn flag_parameter_has_empty_value() {
        let req = request("GET /?_&x=1 HTTP/1.1\r\nHost: a\r\n\r\n");
        assert_eq!(req.query_param("_"), Some(""));
        assert_eq!(req.query_param("x"), Some("1"));
    }

    #[test]
    fn incomplete_request() {
        let raw = b"GET / HTTP/1.1\r\nHost:";
        assert!(matches!(Request::parse(raw), Err(RequestError::Incomplete)));
    }

    #[test]
    fn original_url_preserves_query_order() {
        let req = request("GET /a?b=1&a=2 HTTP/1.1\r\nHost: x\r\n\r\n");
        assert_eq!(req.original_url(), "/a?b=1&a=2");
        let req = request("GET /a HTTP/1.1\r\nHost: x\r\n\r\n");
        assert_eq!(req.original_url(), "/a");
    }

    #[test]
    fn host_strips_port() {
        let req = request("GET / HTTP/1.1\r\nHost: example.com:8080\r\n\r\n");
        assert_eq!(req.host(), "example.com");
        let req = request("GET / HTTP/1.1\r\nHost: [::1]:8080\r\n\r\n");
        assert_eq!(req.host(), "[::1]");
        let req = request("GET / HTTP/1.0\r\n\r\n");
        assert_eq!(req.host(), "localhost");
    }

    #[test]
    fn scheme_defaults_to_http() {
        let req = request("GET / HTTP/1.1\r\nHost: a\r\n\r\n");
        assert_eq!(req.scheme(), "http");
        let req = request("GET / HTTP/1.1\r\nHost: a\r\nX-Forwarded-Proto: https, http\r\n\r\n");
        assert_eq!(req.scheme(), "https");
    }

    #[test]
    fn body_follows_headers() {
        let raw = b"POST / HTTP/1.1\r\nHost: localhost\r\nContent-Length: 5\r\n\r\nhello";
        let (req, body_offset) = Request::parse(raw).unwrap();
        assert_eq!(&raw[body_offset..], b"hello");
        assert_eq!(req.body().as_ref(), b"hello");
    }
}
