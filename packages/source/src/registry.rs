//! Source registry, loading all source definitions from embedded TOML
//! configs.
//!
//! Each `.toml` file in `packages/source/sources/` is baked into the binary
//! at compile time via [`include_str!`]. Adding a new upstream means adding
//! a TOML file here and, if it speaks a new protocol, a [`FetcherConfig`]
//! variant.
//!
//! [`FetcherConfig`]: crate::source_def::FetcherConfig

use crate::source_def::{SourceDefinition, parse_source_toml};

/// TOML configs embedded at compile time.
const SOURCE_TOMLS: &[(&str, &str)] = &[
    ("overpass", include_str!("../sources/overpass.toml")),
    ("foursquare", include_str!("../sources/foursquare.toml")),
    ("google_places", include_str!("../sources/google_places.toml")),
];

/// Returns all configured source definitions, parsed from embedded TOML.
///
/// # Panics
///
/// Panics if any TOML config is malformed (this is a compile-time guarantee
/// since the configs are embedded).
#[must_use]
pub fn all_sources() -> Vec<SourceDefinition> {
    SOURCE_TOMLS
        .iter()
        .map(|(name, toml)| {
            parse_source_toml(toml).unwrap_or_else(|e| panic!("Failed to parse {name}.toml: {e}"))
        })
        .collect()
}

/// Returns only enabled sources, sorted by priority (ascending).
#[must_use]
pub fn enabled_sources() -> Vec<SourceDefinition> {
    let mut sources: Vec<SourceDefinition> =
        all_sources().into_iter().filter(|s| s.enabled).collect();
    sources.sort_by_key(|s| s.priority);
    sources
}
