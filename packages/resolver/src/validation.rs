//! Data-quality checks for provider records.
//!
//! Confidence is the reliability of the contributing source multiplied by
//! the share of checks that passed. It is informational only; nothing is
//! dropped because of a low score.

use medlocate_provider_models::{
    Address, CanonicalProvider, Coordinates, RawProviderRecord, SourceKind,
};
use serde::Serialize;

/// Reliability assumed for sources without a known track record.
pub const DEFAULT_RELIABILITY: f64 = 0.5;

/// Names of this length or shorter are considered incomplete.
const MIN_NAME_LEN: usize = 2;

/// Outcome of [`assess`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Assessment {
    /// Coordinates are finite and within WGS84 bounds.
    pub has_valid_coordinates: bool,
    /// Name is longer than two characters.
    pub has_complete_name: bool,
    /// Address has street, city and country.
    pub has_valid_address: bool,
    /// Weighted score in `[0, 1]`.
    pub confidence: f64,
}

impl Assessment {
    /// Number of checks that passed.
    #[must_use]
    pub fn passed(&self) -> usize {
        [
            self.has_valid_coordinates,
            self.has_complete_name,
            self.has_valid_address,
        ]
        .into_iter()
        .filter(|ok| *ok)
        .count()
    }
}

/// How much a source's data is trusted.
#[must_use]
pub const fn source_reliability(source: SourceKind) -> f64 {
    match source {
        SourceKind::OpenStreetMap => 0.7,
        SourceKind::GooglePlaces => 0.8,
        SourceKind::Foursquare => 0.6,
    }
}

/// Scores a single source record.
#[must_use]
pub fn assess(record: &RawProviderRecord) -> Assessment {
    score(
        record.coordinates,
        &record.name,
        &record.address,
        source_reliability(record.source),
    )
}

/// Scores a merged provider, trusting its most reliable contributor.
#[must_use]
pub fn assess_canonical(provider: &CanonicalProvider) -> Assessment {
    let reliability = provider
        .source_apis
        .iter()
        .map(|s| source_reliability(*s))
        .reduce(f64::max)
        .unwrap_or(DEFAULT_RELIABILITY);
    score(
        provider.location.coordinates,
        &provider.name,
        &provider.location.address,
        reliability,
    )
}

#[allow(clippy::cast_precision_loss)]
fn score(coordinates: Coordinates, name: &str, address: &Address, reliability: f64) -> Assessment {
    let mut assessment = Assessment {
        has_valid_coordinates: medlocate_geo::validate_coordinates(coordinates).is_ok(),
        has_complete_name: name.trim().chars().count() > MIN_NAME_LEN,
        has_valid_address: address.is_valid(),
        confidence: 0.0,
    };
    assessment.confidence = reliability * assessment.passed() as f64 / 3.0;
    assessment
}
