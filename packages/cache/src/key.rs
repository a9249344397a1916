//! Deterministic cache keys.

use std::fmt;

use strum_macros::{AsRefStr, Display};

/// Which kind of upstream lookup a cached value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr)]
pub enum CacheNamespace {
    /// Address to coordinates.
    #[strum(serialize = "geocode:address")]
    ForwardGeocode,
    /// Coordinates to address.
    #[strum(serialize = "geocode:reverse")]
    ReverseGeocode,
    /// Provider name search.
    #[strum(serialize = "provider:name")]
    NameSearch,
}

/// A namespaced, normalized cache key.
///
/// Query text is lower-cased and stripped of all whitespace, so
/// `"12 Allen Ave, Ikeja"` and `"12 allen ave,ikeja"` share an entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Builds a key from one or more query parts, joined with `:`.
    #[must_use]
    pub fn new<I, S>(namespace: CacheNamespace, parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let normalized = parts
            .into_iter()
            .map(|part| normalize(part.as_ref()))
            .collect::<Vec<_>>()
            .join(":");
        Self(format!("{}:{normalized}", namespace.as_ref()))
    }

    /// Key for a forward geocode of `address`.
    #[must_use]
    pub fn forward_geocode(address: &str) -> Self {
        Self::new(CacheNamespace::ForwardGeocode, [address])
    }

    /// Key for a reverse geocode of a coordinate pair.
    #[must_use]
    pub fn reverse_geocode(latitude: f64, longitude: f64) -> Self {
        Self::new(
            CacheNamespace::ReverseGeocode,
            [format!("{latitude},{longitude}")],
        )
    }

    /// Key for a provider name search scoped to `country`.
    #[must_use]
    pub fn name_search(name: &str, country: &str) -> Self {
        Self::new(CacheNamespace::NameSearch, [name, country])
    }

    /// The key as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn normalize(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}
