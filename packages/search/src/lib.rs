#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Healthcare provider search.
//!
//! [`orchestrator::SearchOrchestrator`] drives one search through
//! validation, geocoding, concurrent source fetches, resolution, distance
//! ranking and persistence. [`engine::from_config`] wires the production
//! geocoder, sources, caches and store from a [`config::SearchConfig`].

pub mod config;
pub mod engine;
pub mod orchestrator;
pub mod request;

use medlocate_geocoder::GeocodeError;
use medlocate_provider_models::ErrorKind;
use medlocate_store::StoreError;

pub use config::{ConfigError, SearchConfig};
pub use orchestrator::{SearchOrchestrator, SearchPhase, SearchSettings};
pub use request::{SearchRequest, SearchResponse, SearchType};

/// Errors that end a search or lookup.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// The request was rejected before any external call.
    #[error("Invalid request: {message}")]
    InvalidInput {
        /// What was wrong with the request.
        message: String,
    },

    /// Geocoding the origin failed.
    #[error(transparent)]
    Geocode(#[from] GeocodeError),

    /// Reading or writing the provider store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// No provider with this id exists in the scope.
    #[error("Provider {unique_id} not found")]
    ProviderNotFound {
        /// The requested id.
        unique_id: String,
    },

    /// A background task failed.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the failure.
        message: String,
    },
}

impl SearchError {
    /// Failure class of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput { .. } => ErrorKind::InvalidInput,
            Self::Geocode(e) => e.kind(),
            Self::Store(e) => e.kind(),
            Self::ProviderNotFound { .. } => ErrorKind::NotFound,
            Self::Internal { .. } => ErrorKind::Internal,
        }
    }
}
