//! Foursquare Places v3 source.
//!
//! See <https://docs.foursquare.com/developer/reference/place-search>

use async_trait::async_trait;
use medlocate_provider_models::{Coordinates, RawProviderRecord, SourceKind};

use crate::{ProviderSource, SourceError, SourceQuery, hours, json_str, retry, type_mapping};

/// Fields requested from the search endpoint.
const FIELDS: &str = "fsq_id,name,geocodes,location,categories,tel,website,email,hours";

/// Foursquare's maximum search radius in meters.
const MAX_RADIUS_M: f64 = 100_000.0;

/// Foursquare-backed provider source.
#[derive(Debug, Clone)]
pub struct FoursquareSource {
    id: String,
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    categories: String,
    limit: u32,
}

impl FoursquareSource {
    /// Creates a source querying `api_url` with `api_key`.
    #[must_use]
    pub const fn new(
        id: String,
        client: reqwest::Client,
        api_url: String,
        api_key: String,
        categories: String,
        limit: u32,
    ) -> Self {
        Self {
            id,
            client,
            api_url,
            api_key,
            categories,
            limit,
        }
    }
}

#[async_trait]
impl ProviderSource for FoursquareSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Foursquare
    }

    fn supports(&self, query: &SourceQuery) -> bool {
        matches!(query, SourceQuery::Area { .. })
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    async fn fetch(&self, query: &SourceQuery) -> Result<Vec<RawProviderRecord>, SourceError> {
        let SourceQuery::Area {
            center, radius_km, ..
        } = query
        else {
            return Ok(Vec::new());
        };

        let ll = format!("{},{}", center.latitude, center.longitude);
        let radius = (radius_km * 1000.0).clamp(1.0, MAX_RADIUS_M).round() as u32;
        let radius = radius.to_string();
        let limit = self.limit.to_string();

        let body = retry::send_json(|| {
            self.client
                .get(&self.api_url)
                .header(reqwest::header::AUTHORIZATION, &self.api_key)
                .header(reqwest::header::ACCEPT, "application/json")
                .query(&[
                    ("ll", ll.as_str()),
                    ("radius", radius.as_str()),
                    ("categories", self.categories.as_str()),
                    ("limit", limit.as_str()),
                    ("fields", FIELDS),
                ])
        })
        .await?;

        let records = parse_results(&body)?;
        log::info!("{}: {} providers", self.id, records.len());
        Ok(records)
    }
}

/// Normalizes a place search response. Places without an id or
/// coordinates are skipped.
fn parse_results(body: &serde_json::Value) -> Result<Vec<RawProviderRecord>, SourceError> {
    let results = body["results"]
        .as_array()
        .ok_or_else(|| SourceError::Normalization {
            message: "Foursquare response has no results array".to_string(),
        })?;

    Ok(results.iter().filter_map(normalize_place).collect())
}

fn normalize_place(place: &serde_json::Value) -> Option<RawProviderRecord> {
    let fsq_id = json_str(&place["fsq_id"])?;
    let name = json_str(&place["name"])?;
    let main = &place["geocodes"]["main"];
    let (Some(latitude), Some(longitude)) = (main["latitude"].as_f64(), main["longitude"].as_f64())
    else {
        log::debug!("Skipping Foursquare place {fsq_id} without coordinates");
        return None;
    };

    let mut record = RawProviderRecord::new(
        SourceKind::Foursquare,
        fsq_id,
        name,
        Coordinates::new(latitude, longitude),
    );

    // Only the first category is authoritative.
    let category = place["categories"]
        .as_array()
        .and_then(|c| c.first())
        .and_then(|c| json_str(&c["name"]));
    if let Some(category) = category {
        record.institution_type = type_mapping::map_institution_type(&category);
        record.service_capabilities.specialties = type_mapping::infer_specialties(&[category]);
    }

    let location = &place["location"];
    record.address.street = json_str(&location["address"]);
    record.address.city = json_str(&location["locality"]).or_else(|| json_str(&location["city"]));
    record.address.state = json_str(&location["region"]);
    record.address.country = json_str(&location["country"]);
    record.address.postal_code = json_str(&location["postcode"]);
    record.neighborhood = location["neighborhood"]
        .as_array()
        .and_then(|n| n.first())
        .and_then(json_str);
    record.landmark = json_str(&location["cross_street"]);

    record.contact_info.phone_numbers = json_str(&place["tel"]).into_iter().collect();
    record.contact_info.website = json_str(&place["website"]);
    record.contact_info.email = json_str(&place["email"]);

    record.operating_hours = hours::parse_foursquare_regular(&place["hours"]["regular"]);

    Some(record)
}
