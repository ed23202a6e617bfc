//! Cache key derivation.
//!
//! A key is `scheme://host<path>[?query]`. Which part of the query string
//! participates is decided by a [`QuerySelection`]:
//!
//! | Selection         | Request                 | Key                                |
//! |-------------------|-------------------------|------------------------------------|
//! | `All`             | `/p?b=1&a=2`            | `http://h/p?b=1&a=2`               |
//! | `Fields{a,b}`     | `/p?b=1&a=2&c=3`        | `http://h/p?a=2&b=1`               |
//! | `Fields{z}`       | `/p?b=1`                | `http://h/p`                       |
//! | `Fields{}`        | `/p?b=1`                | `http://h/p`                       |

use std::collections::BTreeSet;
use std::fmt;

use serde::Deserialize;
use urlencoding::encode;

use crate::Request;

/// Canonical fingerprint of a cacheable request variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Logical key of the validator record.
    pub fn headers_key(&self) -> String {
        format!("{}:headers", self.0)
    }

    /// Logical key of the payload record.
    pub fn data_key(&self) -> String {
        format!("{}:data", self.0)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which query parameters distinguish cache entries.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum QuerySelection {
    /// The original query string, verbatim and in its original order.
    #[default]
    All,
    /// Only these fields, sorted; an empty set ignores the query entirely.
    Fields(BTreeSet<String>),
}

impl QuerySelection {
    /// Builds a selection from field names; a `"*"` entry selects everything.
    pub fn fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields: BTreeSet<String> = fields
            .into_iter()
            .map(Into::into)
            .map(|f| f.trim().to_owned())
            .filter(|f| !f.is_empty())
            .collect();
        if fields.contains("*") {
            Self::All
        } else {
            Self::Fields(fields)
        }
    }

    /// Selection that ignores every query parameter.
    pub fn none() -> Self {
        Self::Fields(BTreeSet::new())
    }
}

/// Query selection as written in options: `true`/`false`, `"*"`, a
/// comma-separated field list, or an array of field names.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum QueryOption {
    Flag(bool),
    Text(String),
    Fields(Vec<String>),
}

impl From<bool> for QueryOption {
    fn from(flag: bool) -> Self {
        Self::Flag(flag)
    }
}

impl From<&str> for QueryOption {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<Vec<String>> for QueryOption {
    fn from(fields: Vec<String>) -> Self {
        Self::Fields(fields)
    }
}

impl<const N: usize> From<[&str; N]> for QueryOption {
    fn from(fields: [&str; N]) -> Self {
        Self::Fields(fields.iter().map(|f| (*f).to_owned()).collect())
    }
}

impl From<&QueryOption> for QuerySelection {
    fn from(option: &QueryOption) -> Self {
        match option {
            QueryOption::Flag(true) => Self::All,
            QueryOption::Flag(false) => Self::none(),
            QueryOption::Text(text) => Self::fields(text.split(',')),
            QueryOption::Fields(fields) => Self::fields(fields.iter().map(String::as_str)),
        }
    }
}

/// Derives the cache key for `request` under `selection`.
///
/// Pure: two requests that agree on scheme, host, path and the selected
/// query values always produce the same key, regardless of parameter order.
pub fn build_key(request: &Request, selection: &QuerySelection) -> CacheKey {
    let base = format!("{}://{}", request.scheme(), request.host());

    let fields = match selection {
        QuerySelection::All => return CacheKey(format!("{base}{}", request.original_url())),
        QuerySelection::Fields(fields) => fields,
    };

    // BTreeSet iteration is already lexicographic. Values come decoded from
    // the parser and are re-encoded, so every spelling of a value agrees.
    let query: Vec<String> = fields
        .iter()
        .filter_map(|field| {
            request
                .query_param(field)
                .filter(|value| !value.is_empty())
                .map(|value| format!("{}={}", encode(field), encode(value)))
        })
        .collect();

    if query.is_empty() {
        CacheKey(format!("{base}{}", request.path()))
    } else {
        CacheKey(format!("{base}{}?{}", request.path(), query.join("&")))
    }
}
