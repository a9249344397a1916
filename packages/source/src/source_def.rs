//! Config-driven source definitions.
//!
//! [`SourceDefinition`] captures everything configurable about a provider
//! source. [`SourceDefinition::build`] turns it into a live
//! [`ProviderSource`] once credentials have been resolved.

use std::time::Duration;

use serde::Deserialize;

use crate::{
    ProviderSource, SourceError, foursquare::FoursquareSource,
    google_places::GooglePlacesSource, overpass::OverpassSource,
};

/// A provider source definition loaded from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceDefinition {
    /// Unique identifier (e.g., `"overpass"`).
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Whether searches should use this source.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Fan-out order, lower first. Only affects log and result order.
    pub priority: u32,
    /// Per-request HTTP timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Environment variable holding the API key, if the source needs one.
    pub credential_env: Option<String>,
    /// How to talk to the upstream API.
    pub fetcher: FetcherConfig,
}

/// Upstream API settings, tagged by `type` in TOML.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FetcherConfig {
    /// `OpenStreetMap` via the Overpass API.
    Overpass {
        /// Interpreter endpoint.
        api_url: String,
        /// `amenity=*` values queried in addition to `healthcare=*`.
        #[serde(default)]
        amenities: Vec<String>,
    },
    /// Foursquare Places v3 search.
    Foursquare {
        /// Search endpoint.
        api_url: String,
        /// Comma-separated Foursquare category ids.
        categories: String,
        /// Maximum results per request.
        #[serde(default = "default_limit")]
        limit: u32,
    },
    /// Google Places text search with per-place details.
    GooglePlaces {
        /// Text search endpoint.
        text_search_url: String,
        /// Place details endpoint.
        details_url: String,
        /// Place photo endpoint.
        photo_url: String,
        /// Maximum concurrent details requests.
        #[serde(default = "default_detail_concurrency")]
        detail_concurrency: usize,
        /// Requested photo width in pixels.
        #[serde(default = "default_photo_max_width")]
        photo_max_width: u32,
    },
}

const fn default_true() -> bool {
    true
}

const fn default_timeout_secs() -> u64 {
    15
}

const fn default_limit() -> u32 {
    50
}

const fn default_detail_concurrency() -> usize {
    5
}

const fn default_photo_max_width() -> u32 {
    800
}

impl SourceDefinition {
    /// Returns the unique source identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the human-readable source name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Per-request HTTP timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Instantiates the source.
    ///
    /// `credential` is the value of [`SourceDefinition::credential_env`],
    /// already read by the caller.
    ///
    /// # Errors
    ///
    /// * [`SourceError::MissingCredential`] if the source needs a credential
    ///   and none was supplied
    /// * [`SourceError::Http`] if the HTTP client cannot be built
    pub fn build(&self, credential: Option<String>) -> Result<Box<dyn ProviderSource>, SourceError> {
        let credential = match (&self.credential_env, credential) {
            (Some(env), None) => {
                return Err(SourceError::MissingCredential { env: env.clone() });
            }
            (_, credential) => credential.unwrap_or_default(),
        };
        let client = reqwest::Client::builder()
            .timeout(self.timeout())
            .user_agent("medlocate/0.1")
            .build()?;

        let source: Box<dyn ProviderSource> = match &self.fetcher {
            FetcherConfig::Overpass { api_url, amenities } => Box::new(OverpassSource::new(
                self.id.clone(),
                client,
                api_url.clone(),
                amenities.clone(),
            )),
            FetcherConfig::Foursquare {
                api_url,
                categories,
                limit,
            } => Box::new(FoursquareSource::new(
                self.id.clone(),
                client,
                api_url.clone(),
                credential,
                categories.clone(),
                *limit,
            )),
            FetcherConfig::GooglePlaces {
                text_search_url,
                details_url,
                photo_url,
                detail_concurrency,
                photo_max_width,
            } => Box::new(GooglePlacesSource::new(
                self.id.clone(),
                client,
                crate::google_places::Endpoints {
                    text_search: text_search_url.clone(),
                    details: details_url.clone(),
                    photo: photo_url.clone(),
                },
                credential,
                *detail_concurrency,
                *photo_max_width,
            )?),
        };
        Ok(source)
    }
}

/// Parses a [`SourceDefinition`] from a TOML string.
///
/// # Errors
///
/// Returns an error if the TOML is malformed or missing required fields.
pub fn parse_source_toml(toml_str: &str) -> Result<SourceDefinition, String> {
    toml::de::from_str(toml_str).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use medlocate_provider_models::SourceKind;

    use super::*;

    #[test]
    fn parses_minimal_definition() {
        let def = parse_source_toml(
            r#"
            id = "osm"
            name = "OSM"
            priority = 1

            [fetcher]
            type = "overpass"
            api_url = "http://localhost/api/interpreter"
            "#,
        )
        .unwrap();
        assert!(def.enabled);
        assert_eq!(def.timeout(), Duration::from_secs(15));
        assert!(def.credential_env.is_none());
        assert!(matches!(def.fetcher, FetcherConfig::Overpass { ref amenities, .. } if amenities.is_empty()));
    }

    #[test]
    fn rejects_unknown_fetcher_type() {
        let err = parse_source_toml(
            r#"
            id = "x"
            name = "X"
            priority = 1

            [fetcher]
            type = "carrier_pigeon"
            "#,
        );
        assert!(err.is_err());
    }

    #[test]
    fn build_requires_credential_when_configured() {
        let def = parse_source_toml(
            r#"
            id = "fsq"
            name = "Foursquare"
            priority = 2
            credential_env = "FSQ_TEST_KEY"

            [fetcher]
            type = "foursquare"
            api_url = "http://localhost/places/search"
            categories = "15000"
            "#,
        )
        .unwrap();

        let err = def.build(None).err().unwrap();
        assert!(matches!(err, SourceError::MissingCredential { ref env } if env == "FSQ_TEST_KEY"));

        let source = def.build(Some("secret".to_string())).unwrap();
        assert_eq!(source.id(), "fsq");
        assert_eq!(source.kind(), SourceKind::Foursquare);
    }
}
