//! Google Geocoding API client.
//!
//! Every call first takes a token from the shared [`RateLimiter`]; an empty
//! bucket fails fast with [`GeocodeError::RateLimited`].
//!
//! See <https://developers.google.com/maps/documentation/geocoding/requests-geocoding>

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use medlocate_cache::RateLimiter;
use medlocate_provider_models::Coordinates;

use crate::{
    GeocodeError, GeocodedAddress, Geocoder, ReverseGeocodedAddress,
    service_registry::{GeocodingService, ProviderConfig},
    validate_address, validate_point,
};

/// Geocoder backed by the Google Geocoding API.
#[derive(Debug, Clone)]
pub struct GoogleGeocoder {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    limiter: Arc<RateLimiter>,
}

impl GoogleGeocoder {
    /// Creates a client for `base_url` authenticated with `api_key`.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError::Http`] if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
        limiter: Arc<RateLimiter>,
    ) -> Result<Self, GeocodeError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("medlocate/0.1")
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            limiter,
        })
    }

    /// Creates a client from a registry entry.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError::Http`] if the HTTP client cannot be built.
    pub fn from_service(
        service: &GeocodingService,
        api_key: impl Into<String>,
        limiter: Arc<RateLimiter>,
    ) -> Result<Self, GeocodeError> {
        let ProviderConfig::Google {
            base_url,
            timeout_secs,
            ..
        } = &service.provider;
        Self::new(
            base_url.clone(),
            api_key,
            Duration::from_secs(*timeout_secs),
            limiter,
        )
    }

    async fn request(
        &self,
        params: &[(&str, &str)],
    ) -> Result<serde_json::Value, GeocodeError> {
        if !self.limiter.try_acquire() {
            return Err(GeocodeError::RateLimited);
        }

        let resp = self
            .client
            .get(&self.base_url)
            .query(params)
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await?;

        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(GeocodeError::RateLimited);
        }
        if !status.is_success() {
            log::warn!("Geocoding request to {} failed: HTTP {status}", self.base_url);
            return Err(GeocodeError::Upstream {
                status: Some(status.as_u16()),
                message: status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string(),
            });
        }

        Ok(resp.json().await?)
    }
}

#[async_trait]
impl Geocoder for GoogleGeocoder {
    async fn geocode_address(&self, address: &str) -> Result<GeocodedAddress, GeocodeError> {
        let address = validate_address(address)?;
        let body = self.request(&[("address", address)]).await?;
        parse_forward(&body, address)
    }

    async fn reverse_geocode(
        &self,
        point: Coordinates,
    ) -> Result<ReverseGeocodedAddress, GeocodeError> {
        let point = validate_point(point)?;
        let latlng = format!("{},{}", point.latitude, point.longitude);
        let body = self.request(&[("latlng", latlng.as_str())]).await?;
        parse_reverse(&body, &latlng)
    }
}

/// Returns the first result, mapping the API `status` field to errors.
fn first_result<'a>(
    body: &'a serde_json::Value,
    query: &str,
) -> Result<&'a serde_json::Value, GeocodeError> {
    let status = body["status"].as_str().ok_or_else(|| GeocodeError::Parse {
        message: "Missing status in geocoding response".to_string(),
    })?;

    match status {
        "OK" => {}
        "ZERO_RESULTS" => {
            return Err(GeocodeError::NotFound {
                query: query.to_string(),
            });
        }
        "OVER_QUERY_LIMIT" | "OVER_DAILY_LIMIT" => return Err(GeocodeError::RateLimited),
        other => {
            let message = body["error_message"]
                .as_str()
                .map_or_else(|| other.to_string(), |m| format!("{other}: {m}"));
            return Err(GeocodeError::Upstream {
                status: None,
                message,
            });
        }
    }

    body["results"]
        .as_array()
        .and_then(|results| results.first())
        .ok_or_else(|| GeocodeError::NotFound {
            query: query.to_string(),
        })
}

/// Long name of the first address component tagged `country`.
fn extract_country(result: &serde_json::Value) -> Option<String> {
    result["address_components"]
        .as_array()?
        .iter()
        .find(|component| {
            component["types"]
                .as_array()
                .is_some_and(|types| types.iter().any(|t| t == "country"))
        })
        .and_then(|component| component["long_name"].as_str())
        .map(String::from)
}

fn parse_forward(body: &serde_json::Value, query: &str) -> Result<GeocodedAddress, GeocodeError> {
    let result = first_result(body, query)?;
    let location = &result["geometry"]["location"];

    let latitude = location["lat"].as_f64().ok_or_else(|| GeocodeError::Parse {
        message: "Missing lat in geocoding response".to_string(),
    })?;
    let longitude = location["lng"].as_f64().ok_or_else(|| GeocodeError::Parse {
        message: "Missing lng in geocoding response".to_string(),
    })?;

    Ok(GeocodedAddress {
        latitude,
        longitude,
        formatted_address: result["formatted_address"]
            .as_str()
            .unwrap_or(query)
            .to_string(),
        country: extract_country(result),
        place_id: result["place_id"].as_str().map(String::from),
    })
}

fn parse_reverse(
    body: &serde_json::Value,
    query: &str,
) -> Result<ReverseGeocodedAddress, GeocodeError> {
    let result = first_result(body, query)?;

    Ok(ReverseGeocodedAddress {
        country: extract_country(result),
        formatted_address: result["formatted_address"]
            .as_str()
            .unwrap_or_default()
            .to_string(),
        place_id: result["place_id"].as_str().map(String::from),
    })
}
