//! Cache lifetimes and the headers that advertise them.
//!
//! The configured age is how long the *store* keeps an entry. What we tell
//! downstream caches differs by audience:
//!
//! - `Cache-Control` is public and capped at [`MAX_PUBLIC_AGE`] seconds.
//! - `Surrogate-Control` targets a trusted reverse proxy and carries the full
//!   configured age.

use serde::Deserialize;

use super::error::{CacheError, CacheResult};

/// Default entry lifetime: five minutes.
pub const DEFAULT_AGE: u64 = 300;

/// Upper bound for the `max-age` advertised in `Cache-Control`.
pub const MAX_PUBLIC_AGE: u64 = 300;

const NO_STORE: &str = "private, max-age=0, no-cache, no-store, must-revalidate";

/// A lifetime as written in configuration: seconds, or `"<N> <unit>"`.
///
/// ```
/// use rttp_cache::cache::Age;
///
/// assert_eq!(Age::from("1 minute").seconds().unwrap(), 60);
/// assert_eq!(Age::from("2 weeks").seconds().unwrap(), 1_209_600);
/// assert_eq!(Age::from(45).seconds().unwrap(), 45);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Age {
    Seconds(u64),
    Text(String),
}

impl Default for Age {
    fn default() -> Self {
        Self::Seconds(DEFAULT_AGE)
    }
}

impl From<u64> for Age {
    fn from(secs: u64) -> Self {
        Self::Seconds(secs)
    }
}

impl From<&str> for Age {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<String> for Age {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl Age {
    /// Normalizes the lifetime to whole seconds.
    ///
    /// Units are `second(s)`, `minute(s)`, `hour(s)`, `day(s)` and `week(s)`,
    /// matched case-insensitively. An unknown or missing unit leaves the number
    /// as seconds. Fractions are truncated: `"1.5 hours"` is one hour.
    ///
    /// # Errors
    ///
    /// [`CacheError::InvalidAge`] when the text does not start with an integer.
    pub fn seconds(&self) -> CacheResult<u64> {
        let text = match self {
            Self::Seconds(secs) => return Ok(*secs),
            Self::Text(text) => text.trim(),
        };

        let digits_end = text
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(text.len());
        let value: u64 = text[..digits_end]
            .parse()
            .map_err(|_| CacheError::InvalidAge {
                value: text.to_owned(),
            })?;

        // A fractional part is truncated, never mistaken for the unit.
        let rest = &text[digits_end..];
        let rest = match rest.strip_prefix('.') {
            Some(fraction) => fraction.trim_start_matches(|c: char| c.is_ascii_digit()),
            None => rest,
        };

        let unit = rest
            .split_whitespace()
            .next()
            .unwrap_or("")
            .to_ascii_lowercase();

        let multiplier = match unit.as_str() {
            "second" | "seconds" => 1,
            "minute" | "minutes" => 60,
            "hour" | "hours" => 3_600,
            "day" | "days" => 86_400,
            "week" | "weeks" => 604_800,
            _ => 1,
        };

        Ok(value.saturating_mul(multiplier))
    }
}

/// `Cache-Control` value for an entry with the given lifetime.
pub fn cache_control(age: u64) -> String {
    if age == 0 {
        return NO_STORE.to_owned();
    }
    format!(
        "public, max-age={}, must-revalidate",
        age.min(MAX_PUBLIC_AGE)
    )
}

/// `Surrogate-Control` value for an entry with the given lifetime.
pub fn surrogate_control(age: u64) -> String {
    format!("max-age={age}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn units() {
        assert_eq!(Age::from("1 minute").seconds().unwrap(), 60);
        assert_eq!(Age::from("5 minutes").seconds().unwrap(), 300);
        assert_eq!(Age::from("2 hours").seconds().unwrap(), 7_200);
        assert_eq!(Age::from("1 day").seconds().unwrap(), 86_400);
        assert_eq!(Age::from("3 Weeks").seconds().unwrap(), 1_814_400);
        assert_eq!(Age::from("30 seconds").seconds().unwrap(), 30);
    }

    #[test]
    fn unknown_unit_is_taken_as_seconds() {
        assert_eq!(Age::from("90 fortnights").seconds().unwrap(), 90);
        assert_eq!(Age::from("90").seconds().unwrap(), 90);
    }

    #[test]
    fn fraction_is_truncated_before_the_unit() {
        assert_eq!(Age::from("1.5 hours").seconds().unwrap(), 3_600);
        assert_eq!(Age::from("2.75 minutes").seconds().unwrap(), 120);
        assert_eq!(Age::from("30.9").seconds().unwrap(), 30);
    }

    #[test]
    fn text_without_number_is_rejected() {
        assert!(matches!(
            Age::from("soon").seconds(),
            Err(CacheError::InvalidAge { .. })
        ));
    }

    #[test]
    fn default_is_five_minutes() {
        assert_eq!(Age::default().seconds().unwrap(), DEFAULT_AGE);
    }

    #[test]
    fn deserializes_number_or_text() {
        let age: Age = serde_json::from_str("120").unwrap();
        assert_eq!(age, Age::Seconds(120));
        let age: Age = serde_json::from_str("\"1 hour\"").unwrap();
        assert_eq!(age.seconds().unwrap(), 3_600);
    }

    #[test]
    fn one_minute_headers() {
        let age = Age::from("1 minute").seconds().unwrap();
        assert_eq!(cache_control(age), "public, max-age=60, must-revalidate");
        assert_eq!(surrogate_control(age), "max-age=60");
    }

    #[test]
    fn public_age_is_capped_but_surrogate_is_not() {
        let age = Age::from("1 day").seconds().unwrap();
        assert_eq!(cache_control(age), "public, max-age=300, must-revalidate");
        assert_eq!(surrogate_control(age), "max-age=86400");
    }

    #[test]
    fn zero_age_forbids_storage() {
        assert_eq!(
            cache_control(0),
            "private, max-age=0, no-cache, no-store, must-revalidate"
        );
        assert_eq!(surrogate_control(0), "max-age=0");
    }
}
