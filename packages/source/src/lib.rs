#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Healthcare provider source adapters.
//!
//! Each external data provider implements the [`ProviderSource`] trait to
//! fetch facilities for an area or a name and normalize them into
//! [`RawProviderRecord`]s using the canonical vocabulary from
//! [`type_mapping`] and [`hours`].
//!
//! Sources are configured by TOML files in `sources/` (see [`registry`])
//! and instantiated with [`source_def::SourceDefinition::build`].

pub mod cached;
pub mod foursquare;
pub mod google_places;
pub mod hours;
pub mod overpass;
pub mod registry;
pub mod retry;
pub mod source_def;
pub mod type_mapping;

use std::time::Duration;

use async_trait::async_trait;
use medlocate_provider_models::{
    BoundingBox, Coordinates, ErrorKind, RawProviderRecord, SourceKind,
};

/// Errors that can occur during source operations.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// The upstream API answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Requested URL (without credentials).
        url: String,
    },

    /// The upstream API reported that its quota is exhausted.
    #[error("Rate limited by {url}")]
    RateLimited {
        /// Requested URL (without credentials).
        url: String,
    },

    /// A source that needs a credential was built without one.
    #[error("Missing credential: environment variable {env} is not set")]
    MissingCredential {
        /// Name of the environment variable.
        env: String,
    },

    /// The source did not answer within its time budget.
    #[error("Source {source_id} timed out after {timeout:?}")]
    Timeout {
        /// Id of the source that timed out.
        source_id: String,
        /// The time budget that was exceeded.
        timeout: Duration,
    },

    /// The payload did not have the expected shape.
    #[error("Normalization error: {message}")]
    Normalization {
        /// Description of what went wrong.
        message: String,
    },
}

impl SourceError {
    /// Failure class of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::MissingCredential { .. } => ErrorKind::Configuration,
            Self::Http(_)
            | Self::Json(_)
            | Self::Status { .. }
            | Self::Timeout { .. }
            | Self::Normalization { .. } => ErrorKind::Upstream,
        }
    }
}

/// Country context used when a name query has none.
pub const GLOBAL_COUNTRY: &str = "global";

/// What to fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceQuery {
    /// Facilities within `radius_km` of `center`.
    Area {
        /// Search origin.
        center: Coordinates,
        /// Search radius in kilometers.
        radius_km: f64,
        /// Country context from geocoding, if known.
        country: Option<String>,
    },
    /// Facilities matching a free-text name.
    Name {
        /// Facility name as typed by the user.
        name: String,
        /// Country to narrow the search. [`GLOBAL_COUNTRY`] when `None`.
        country: Option<String>,
    },
}

impl SourceQuery {
    /// Bounding box for area queries (`radius / 111` degrees each way).
    #[must_use]
    pub fn bbox(&self) -> Option<BoundingBox> {
        match self {
            Self::Area {
                center, radius_km, ..
            } => Some(medlocate_geo::bounding_box(*center, *radius_km)),
            Self::Name { .. } => None,
        }
    }

    /// Whether this is a name query.
    #[must_use]
    pub const fn is_name(&self) -> bool {
        matches!(self, Self::Name { .. })
    }
}

/// Trait that all provider sources must implement.
///
/// Implementations normalize every record they return; individual records
/// that cannot be normalized are skipped, not reported as errors.
#[async_trait]
pub trait ProviderSource: Send + Sync {
    /// Returns a unique identifier for this source (e.g., `"overpass"`).
    fn id(&self) -> &str;

    /// Which upstream this source's records are attributed to.
    fn kind(&self) -> SourceKind;

    /// Whether this source can answer `query` at all.
    fn supports(&self, query: &SourceQuery) -> bool;

    /// Fetches and normalizes provider records.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] on transport failure or a malformed payload.
    async fn fetch(&self, query: &SourceQuery) -> Result<Vec<RawProviderRecord>, SourceError>;
}

#[async_trait]
impl<S: ProviderSource + ?Sized> ProviderSource for Box<S> {
    fn id(&self) -> &str {
        (**self).id()
    }

    fn kind(&self) -> SourceKind {
        (**self).kind()
    }

    fn supports(&self, query: &SourceQuery) -> bool {
        (**self).supports(query)
    }

    async fn fetch(&self, query: &SourceQuery) -> Result<Vec<RawProviderRecord>, SourceError> {
        (**self).fetch(query).await
    }
}

/// Runs `source.fetch` under `timeout`.
///
/// # Errors
///
/// Returns [`SourceError::Timeout`] if the budget is exceeded, otherwise
/// whatever the source returned. The in-flight request is dropped on
/// timeout.
pub async fn fetch_with_timeout(
    source: &dyn ProviderSource,
    query: &SourceQuery,
    timeout: Duration,
) -> Result<Vec<RawProviderRecord>, SourceError> {
    tokio::time::timeout(timeout, source.fetch(query))
        .await
        .map_err(|_| SourceError::Timeout {
            source_id: source.id().to_string(),
            timeout,
        })?
}

/// Trims a JSON string field, returning `None` when absent or blank.
pub(crate) fn json_str(value: &serde_json::Value) -> Option<String> {
    value
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}
