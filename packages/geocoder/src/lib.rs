#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Geocoding for provider searches.
//!
//! Resolves a free-text address to coordinates and country, or a coordinate
//! pair to a formatted address and country. The backend is configured via
//! TOML files in `services/` (see [`service_registry`]):
//!
//! * [`google::GoogleGeocoder`] calls the Google Geocoding API through a
//!   shared [`medlocate_cache::RateLimiter`].
//! * [`cached::CachedGeocoder`] wraps any [`Geocoder`] with a
//!   [`medlocate_cache::ResponseCache`].
//!
//! Inputs are validated before any cache lookup or network call.

pub mod cached;
pub mod google;
pub mod service_registry;

use async_trait::async_trait;
use medlocate_provider_models::{Coordinates, ErrorKind};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use cached::CachedGeocoder;
pub use google::GoogleGeocoder;

/// Result of a forward geocode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeocodedAddress {
    /// Latitude (WGS84).
    pub latitude: f64,
    /// Longitude (WGS84).
    pub longitude: f64,
    /// The canonical address returned by the geocoder.
    pub formatted_address: String,
    /// Country name, when the geocoder reported one.
    pub country: Option<String>,
    /// Geocoder-specific place identifier.
    pub place_id: Option<String>,
}

impl GeocodedAddress {
    /// The resolved point.
    #[must_use]
    pub const fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.latitude, self.longitude)
    }
}

/// Result of a reverse geocode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReverseGeocodedAddress {
    /// Country name, when the geocoder reported one.
    pub country: Option<String>,
    /// The canonical address returned by the geocoder.
    pub formatted_address: String,
    /// Geocoder-specific place identifier.
    pub place_id: Option<String>,
}

/// Errors from geocoding operations.
#[derive(Debug, Error)]
pub enum GeocodeError {
    /// The address or coordinates were rejected before any lookup.
    #[error("Invalid input: {message}")]
    InvalidInput {
        /// What was wrong with the input.
        message: String,
    },

    /// The geocoder returned zero results.
    #[error("No geocoding results for '{query}'")]
    NotFound {
        /// The query that produced no results.
        query: String,
    },

    /// The local rate limiter or the upstream quota rejected the call.
    #[error("Rate limit exceeded")]
    RateLimited,

    /// The upstream API answered with an error.
    #[error("Upstream geocoder error{}: {message}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Upstream {
        /// HTTP status, when available.
        status: Option<u16>,
        /// Upstream status text or error message.
        message: String,
    },

    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Response parsing failed.
    #[error("Parse error: {message}")]
    Parse {
        /// Description of the parsing failure.
        message: String,
    },
}

impl GeocodeError {
    /// Failure class of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput { .. } => ErrorKind::InvalidInput,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::RateLimited => ErrorKind::RateLimited,
            Self::Upstream { .. } | Self::Http(_) | Self::Parse { .. } => ErrorKind::Upstream,
        }
    }

    /// Upstream HTTP status, when one is known.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Upstream { status, .. } => *status,
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// A geocoding backend.
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Resolves `address` to coordinates, formatted address and country.
    ///
    /// # Errors
    ///
    /// * [`GeocodeError::InvalidInput`] if `address` is blank
    /// * [`GeocodeError::NotFound`] if the backend returns zero results
    /// * [`GeocodeError::RateLimited`] if the rate limiter rejects the call
    /// * any other variant for transport or upstream failures
    async fn geocode_address(&self, address: &str) -> Result<GeocodedAddress, GeocodeError>;

    /// Resolves `point` to a formatted address and country.
    ///
    /// # Errors
    ///
    /// * [`GeocodeError::InvalidInput`] if the coordinates are out of range
    /// * otherwise as [`Geocoder::geocode_address`]
    async fn reverse_geocode(
        &self,
        point: Coordinates,
    ) -> Result<ReverseGeocodedAddress, GeocodeError>;
}

/// Trims `address` and rejects it if empty.
///
/// # Errors
///
/// Returns [`GeocodeError::InvalidInput`] for a blank address.
pub fn validate_address(address: &str) -> Result<&str, GeocodeError> {
    let trimmed = address.trim();
    if trimmed.is_empty() {
        return Err(GeocodeError::InvalidInput {
            message: "address must not be empty".to_string(),
        });
    }
    Ok(trimmed)
}

/// Rejects non-finite or out-of-range coordinates.
///
/// # Errors
///
/// Returns [`GeocodeError::InvalidInput`] describing the bad component.
pub fn validate_point(point: Coordinates) -> Result<Coordinates, GeocodeError> {
    medlocate_geo::validate_coordinates(point).map_err(|e| GeocodeError::InvalidInput {
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_address_is_invalid() {
        let err = validate_address("   ").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert_eq!(validate_address(" Ikeja ").unwrap(), "Ikeja");
    }

    #[test]
    fn out_of_range_points_are_invalid() {
        for point in [Coordinates::new(91.0, 0.0), Coordinates::new(0.0, 181.0)] {
            let err = validate_point(point).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidInput);
        }
        assert!(validate_point(Coordinates::new(6.6, 3.35)).is_ok());
    }

    #[test]
    fn upstream_error_carries_status() {
        let err = GeocodeError::Upstream {
            status: Some(503),
            message: "Service Unavailable".to_string(),
        };
        assert_eq!(err.status(), Some(503));
        assert_eq!(err.kind(), ErrorKind::Upstream);
        assert!(err.to_string().contains("HTTP 503"));
        assert!(GeocodeError::RateLimited.kind().is_retryable());
    }
}
