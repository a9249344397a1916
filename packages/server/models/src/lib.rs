#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! API request and response types for the medlocate server.
//!
//! These types are serialized to JSON for the REST API. They are separate
//! from the engine types so the API contract can evolve independently.

use medlocate_provider_models::ErrorKind;
use serde::{Deserialize, Serialize};

/// Envelope wrapping every API response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    /// Whether the request succeeded.
    pub success: bool,
    /// Payload on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Failure details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

impl<T> ApiResponse<T> {
    /// A successful response carrying `data`.
    pub const fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// A failed response.
    pub fn err(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ApiError {
                kind,
                message: message.into(),
                retryable: kind.is_retryable(),
            }),
        }
    }
}

/// Error details in a failed [`ApiResponse`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    /// Failure class.
    pub kind: ErrorKind,
    /// Human-readable message.
    pub message: String,
    /// Whether the client may retry with backoff.
    pub retryable: bool,
}

/// Body of `POST /api/geocode`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeocodeBody {
    /// Free-text address.
    pub address: String,
}

/// Query parameters for `GET /api/reverse-geocode`.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ReverseGeocodeParams {
    /// Latitude.
    pub lat: f64,
    /// Longitude.
    pub lon: f64,
}

/// Query parameters selecting a result-set scope.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScopeParams {
    /// Scope key. The default scope when absent.
    pub scope: Option<String>,
}

/// Query parameters for `GET /api/providers`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderQueryParams {
    /// Scope key. The default scope when absent.
    pub scope: Option<String>,
    /// Case-insensitive regex over names, city, country and specialties.
    pub keyword: Option<String>,
    /// Institution type, e.g. `hospital`.
    pub institution_type: Option<String>,
    /// Ownership type, e.g. `public`.
    pub ownership_type: Option<String>,
    /// Specialty substring.
    pub specialty: Option<String>,
    /// Spoken language.
    pub language: Option<String>,
    /// Only facilities with emergency services.
    pub emergency_only: Option<bool>,
    /// Only facilities open right now (server local time).
    pub open_now: Option<bool>,
    /// Weekday for an explicit opening-hours check. Requires `openTime`.
    pub open_day: Option<String>,
    /// `HH:MM` time for an explicit opening-hours check. Requires `openDay`.
    pub open_time: Option<String>,
    /// Origin latitude for distance ranking.
    pub lat: Option<f64>,
    /// Origin longitude for distance ranking.
    pub lon: Option<f64>,
    /// Maximum distance from the origin, in km.
    pub max_distance_km: Option<f64>,
}

/// Health check response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiHealth {
    /// Whether the service is healthy.
    pub healthy: bool,
    /// Service version.
    pub version: String,
    /// Ids of the configured provider sources.
    pub sources: Vec<String>,
}
