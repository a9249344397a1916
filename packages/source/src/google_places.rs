//! Google Places name-search source.
//!
//! A name query runs one text search, then fetches details (phones,
//! hours, reviews, address components, photos) for every hit with at most
//! `detail_concurrency` requests in flight. A failed details or photo
//! request degrades only that record: the text-search hit is used as is,
//! or the photo is left absent.
//!
//! See <https://developers.google.com/maps/documentation/places/web-service>

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::DateTime;
use futures::{StreamExt as _, stream};
use medlocate_provider_models::{
    Address, AppointmentBooking, BookingMethod, Coordinates, RawProviderRecord, SourceKind, Tip,
};

use crate::{
    GLOBAL_COUNTRY, ProviderSource, SourceError, SourceQuery, hours, json_str, retry, type_mapping,
};

/// Fields requested from the details endpoint.
const DETAIL_FIELDS: &str = "place_id,name,formatted_address,geometry,formatted_phone_number,\
international_phone_number,website,opening_hours,types,photos,reviews,address_components";

/// Place type used to narrow text search.
const SEARCH_TYPE: &str = "health";

/// Advance notice assumed for phone bookings, in hours.
const BOOKING_NOTICE_HOURS: u32 = 24;

/// Google Places endpoint URLs.
#[derive(Debug, Clone)]
pub struct Endpoints {
    /// Text search.
    pub text_search: String,
    /// Place details.
    pub details: String,
    /// Place photo.
    pub photo: String,
}

/// Google Places-backed provider source. Answers name queries only.
#[derive(Debug, Clone)]
pub struct GooglePlacesSource {
    id: String,
    client: reqwest::Client,
    photo_client: reqwest::Client,
    endpoints: Endpoints,
    api_key: String,
    detail_concurrency: usize,
    photo_max_width: u32,
}

impl GooglePlacesSource {
    /// Creates a source authenticated with `api_key`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Http`] if the photo client cannot be built.
    pub fn new(
        id: String,
        client: reqwest::Client,
        endpoints: Endpoints,
        api_key: String,
        detail_concurrency: usize,
        photo_max_width: u32,
    ) -> Result<Self, SourceError> {
        // The photo endpoint answers with a redirect to the image; we keep
        // the redirect target instead of downloading the image.
        let photo_client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .user_agent("medlocate/0.1")
            .build()?;
        Ok(Self {
            id,
            client,
            photo_client,
            endpoints,
            api_key,
            detail_concurrency: detail_concurrency.max(1),
            photo_max_width,
        })
    }

    async fn text_search(&self, text: &str) -> Result<Vec<serde_json::Value>, SourceError> {
        let body = retry::send_json(|| {
            self.client.get(&self.endpoints.text_search).query(&[
                ("query", text),
                ("type", SEARCH_TYPE),
                ("key", self.api_key.as_str()),
            ])
        })
        .await?;

        if !check_status(&body, &self.endpoints.text_search)? {
            return Ok(Vec::new());
        }
        Ok(body["results"].as_array().cloned().unwrap_or_default())
    }

    async fn details(&self, place_id: &str) -> Result<serde_json::Value, SourceError> {
        let body = retry::send_json(|| {
            self.client.get(&self.endpoints.details).query(&[
                ("place_id", place_id),
                ("fields", DETAIL_FIELDS),
                ("key", self.api_key.as_str()),
            ])
        })
        .await?;

        if !check_status(&body, &self.endpoints.details)? {
            return Err(SourceError::Normalization {
                message: format!("No details for place {place_id}"),
            });
        }
        Ok(body["result"].clone())
    }

    async fn photo_url(&self, reference: &str) -> Result<Option<String>, SourceError> {
        let width = self.photo_max_width.to_string();
        let response = retry::send(&|| {
            self.photo_client.get(&self.endpoints.photo).query(&[
                ("maxwidth", width.as_str()),
                ("photo_reference", reference),
                ("key", self.api_key.as_str()),
            ])
        })
        .await?;

        Ok(response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(String::from))
    }

    /// Details + photo for one text-search hit.
    async fn resolve_hit(&self, hit: serde_json::Value) -> Option<RawProviderRecord> {
        let place = match json_str(&hit["place_id"]) {
            Some(place_id) => match self.details(&place_id).await {
                Ok(details) => details,
                Err(e) => {
                    log::warn!("{}: details for {place_id} failed: {e}", self.id);
                    hit
                }
            },
            None => hit,
        };

        let photo = match json_str(&place["photos"][0]["photo_reference"]) {
            Some(reference) => self.photo_url(&reference).await.unwrap_or_else(|e| {
                log::warn!("{}: photo fetch failed: {e}", self.id);
                None
            }),
            None => None,
        };

        normalize_place(&place, photo)
    }
}

#[async_trait]
impl ProviderSource for GooglePlacesSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> SourceKind {
        SourceKind::GooglePlaces
    }

    fn supports(&self, query: &SourceQuery) -> bool {
        query.is_name()
    }

    async fn fetch(&self, query: &SourceQuery) -> Result<Vec<RawProviderRecord>, SourceError> {
        let SourceQuery::Name { name, country } = query else {
            return Ok(Vec::new());
        };

        let text = search_text(name, country.as_deref());
        let hits = self.text_search(&text).await?;
        let hit_count = hits.len();

        let records = stream::iter(hits)
            .map(|hit| self.resolve_hit(hit))
            .buffered(self.detail_concurrency)
            .filter_map(|record| async move { record })
            .collect::<Vec<_>>()
            .await;

        log::info!(
            "{}: {} of {hit_count} places normalized for '{text}'",
            self.id,
            records.len()
        );
        Ok(records)
    }
}

/// Text search query for a facility name.
fn search_text(name: &str, country: Option<&str>) -> String {
    let country = country
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or(GLOBAL_COUNTRY);
    format!("{} healthcare {country}", name.trim())
}

/// Interprets the Places API `status` field.
///
/// Returns `Ok(false)` for `ZERO_RESULTS` / `NOT_FOUND`.
fn check_status(body: &serde_json::Value, url: &str) -> Result<bool, SourceError> {
    match body["status"].as_str().unwrap_or("OK") {
        "OK" => Ok(true),
        "ZERO_RESULTS" | "NOT_FOUND" => Ok(false),
        "OVER_QUERY_LIMIT" => Err(SourceError::RateLimited {
            url: url.to_string(),
        }),
        status => Err(SourceError::Normalization {
            message: match body["error_message"].as_str() {
                Some(message) => format!("Google Places status {status}: {message}"),
                None => format!("Google Places status {status}"),
            },
        }),
    }
}

/// Builds an [`Address`] and neighborhood from Google address components.
fn parse_address_components(components: &serde_json::Value) -> (Address, Option<String>) {
    let mut address = Address::default();
    let mut neighborhood = None;
    let mut street_number = None;
    let mut route = None;

    for component in components.as_array().into_iter().flatten() {
        let Some(value) = json_str(&component["long_name"]) else {
            continue;
        };
        let types = component["types"]
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(|t| t.as_str())
            .collect::<Vec<_>>();
        let slot = if types.contains(&"street_number") {
            &mut street_number
        } else if types.contains(&"route") {
            &mut route
        } else if types.contains(&"locality") {
            &mut address.city
        } else if types.contains(&"administrative_area_level_1") {
            &mut address.state
        } else if types.contains(&"country") {
            &mut address.country
        } else if types.contains(&"postal_code") {
            &mut address.postal_code
        } else if types.contains(&"neighborhood") {
            &mut neighborhood
        } else {
            continue;
        };
        slot.get_or_insert(value);
    }

    address.street = match (street_number, route) {
        (Some(number), Some(route)) => Some(format!("{number} {route}")),
        (None, route) => route,
        (Some(number), None) => Some(number),
    };
    (address, neighborhood)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn parse_reviews(reviews: &serde_json::Value) -> Vec<Tip> {
    reviews
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|review| {
            Some(Tip {
                text: json_str(&review["text"])?,
                author: json_str(&review["author_name"]).unwrap_or_else(|| "Anonymous".to_string()),
                likes: review["rating"].as_f64().map_or(0, |r| r.max(0.0).round() as u32),
                date: DateTime::from_timestamp(review["time"].as_i64()?, 0)?,
            })
        })
        .collect()
}

fn normalize_place(place: &serde_json::Value, photo: Option<String>) -> Option<RawProviderRecord> {
    let place_id = json_str(&place["place_id"])?;
    let name = json_str(&place["name"])?;
    let location = &place["geometry"]["location"];
    let (Some(latitude), Some(longitude)) = (location["lat"].as_f64(), location["lng"].as_f64())
    else {
        log::debug!("Skipping Google place {place_id} without coordinates");
        return None;
    };

    let mut record = RawProviderRecord::new(
        SourceKind::GooglePlaces,
        place_id,
        name,
        Coordinates::new(latitude, longitude),
    );

    let types = place["types"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|t| t.as_str())
        .collect::<Vec<_>>();
    record.institution_type = type_mapping::map_first_institution_type(&types);

    let (address, neighborhood) = parse_address_components(&place["address_components"]);
    record.address = address;
    record.neighborhood = neighborhood;

    let contact = &mut record.contact_info;
    contact.phone_numbers = ["formatted_phone_number", "international_phone_number"]
        .into_iter()
        .filter_map(|key| json_str(&place[key]))
        .collect();
    contact.website = json_str(&place["website"]);

    record.operating_hours = hours::parse_google_periods(&place["opening_hours"]["periods"]);

    let capabilities = &mut record.service_capabilities;
    capabilities.specialties = type_mapping::infer_specialties(&types);
    capabilities.languages = BTreeSet::from(["English".to_string()]);
    capabilities.appointment_booking = Some(AppointmentBooking {
        available: record.contact_info.website.is_some(),
        methods: BTreeSet::from([BookingMethod::Phone]),
        advance_notice_hours: Some(BOOKING_NOTICE_HOURS),
    });

    record.tips = parse_reviews(&place["reviews"]);
    record.photo = photo;

    Some(record)
}
