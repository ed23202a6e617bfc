//! Per-route interceptor options.

use std::collections::BTreeMap;

use serde::Deserialize;

use super::age::Age;
use super::key::QueryOption;

/// Options for one [`CacheLayer`](super::CacheLayer).
///
/// A bare age converts directly, so `cache.cache("1 minute")` and
/// `cache.cache(60_u64)` both work.
///
/// ```
/// use rttp_cache::cache::CacheOptions;
///
/// let options = CacheOptions::new()
///     .age("10 minutes")
///     .query(["page", "sort"])
///     .header("X-Served-By", "edge");
/// assert_eq!(options.headers.len(), 1);
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CacheOptions {
    /// Entry lifetime; five minutes when unset.
    pub age: Option<Age>,
    /// Headers added to every response this layer handles, unless the
    /// downstream handler already set them.
    pub headers: BTreeMap<String, String>,
    /// Query parameters that distinguish entries; all of them when unset.
    pub query: Option<QueryOption>,
}

impl CacheOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn age(mut self, age: impl Into<Age>) -> Self {
        self.age = Some(age.into());
        self
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn query(mut self, query: impl Into<QueryOption>) -> Self {
        self.query = Some(query.into());
        self
    }
}

impl From<Age> for CacheOptions {
    fn from(age: Age) -> Self {
        Self::new().age(age)
    }
}

impl From<&str> for CacheOptions {
    fn from(age: &str) -> Self {
        Self::new().age(age)
    }
}

impl From<u64> for CacheOptions {
    fn from(secs: u64) -> Self {
        Self::new().age(secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_age_converts() {
        let options = CacheOptions::from("1 minute");
        assert_eq!(options.age, Some(Age::from("1 minute")));
        assert!(options.query.is_none());

        let options = CacheOptions::from(0_u64);
        assert_eq!(options.age, Some(Age::Seconds(0)));
    }

    #[test]
    fn deserializes_from_json() {
        let options: CacheOptions = serde_json::from_str(
            r#"{"age": "2 hours", "query": "a,b", "headers": {"X-Team": "web"}}"#,
        )
        .unwrap();
        assert_eq!(options.age, Some(Age::from("2 hours")));
        assert_eq!(options.query, Some(QueryOption::from("a,b")));
        assert_eq!(options.headers.get("X-Team").map(String::as_str), Some("web"));

        let options: CacheOptions = serde_json::from_str(r#"{"query": false}"#).unwrap();
        assert_eq!(options.query, Some(QueryOption::Flag(false)));
        assert!(options.age.is_none());
    }
}
