//! Caching decorator for any [`Geocoder`].

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use medlocate_cache::{CacheKey, ResponseCache, get_json, set_json};
use medlocate_provider_models::Coordinates;

use crate::{
    GeocodeError, GeocodedAddress, Geocoder, ReverseGeocodedAddress, validate_address,
    validate_point,
};

/// Consults a [`ResponseCache`] before delegating to the wrapped geocoder,
/// and caches successful results for `ttl`.
///
/// Errors are never cached.
pub struct CachedGeocoder<G> {
    inner: G,
    cache: Arc<dyn ResponseCache>,
    ttl: Duration,
}

impl<G: Geocoder> CachedGeocoder<G> {
    /// Wraps `inner` with `cache`.
    pub fn new(inner: G, cache: Arc<dyn ResponseCache>, ttl: Duration) -> Self {
        Self { inner, cache, ttl }
    }

    /// The wrapped geocoder.
    pub const fn inner(&self) -> &G {
        &self.inner
    }
}

#[async_trait]
impl<G: Geocoder> Geocoder for CachedGeocoder<G> {
    async fn geocode_address(&self, address: &str) -> Result<GeocodedAddress, GeocodeError> {
        let address = validate_address(address)?;
        let key = CacheKey::forward_geocode(address);

        if let Some(hit) = get_json::<GeocodedAddress>(self.cache.as_ref(), &key).await {
            return Ok(hit);
        }

        let result = self.inner.geocode_address(address).await?;
        set_json(self.cache.as_ref(), &key, &result, self.ttl).await;
        Ok(result)
    }

    async fn reverse_geocode(
        &self,
        point: Coordinates,
    ) -> Result<ReverseGeocodedAddress, GeocodeError> {
        let point = validate_point(point)?;
        let key = CacheKey::reverse_geocode(point.latitude, point.longitude);

        if let Some(hit) = get_json::<ReverseGeocodedAddress>(self.cache.as_ref(), &key).await {
            return Ok(hit);
        }

        let result = self.inner.reverse_geocode(point).await?;
        set_json(self.cache.as_ref(), &key, &result, self.ttl).await;
        Ok(result)
    }
}
