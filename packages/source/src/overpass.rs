//! `OpenStreetMap` source via the Overpass API.
//!
//! Queries `healthcare=*` (plus the configured `amenity=*` values) nodes,
//! ways and relations inside the search bounding box. Ways and relations
//! are located by the `center` Overpass computes for them.
//!
//! See <https://wiki.openstreetmap.org/wiki/Overpass_API>

use std::collections::BTreeMap;

use async_trait::async_trait;
use medlocate_provider_models::{
    BoundingBox, Coordinates, RawProviderRecord, SourceKind,
};

use crate::{
    ProviderSource, SourceError, SourceQuery, hours, json_str, retry,
    type_mapping::{self, humanize},
};

/// Name used when an element has no `name` tag.
const UNNAMED: &str = "Unnamed Provider";

/// Overpass-backed provider source.
#[derive(Debug, Clone)]
pub struct OverpassSource {
    id: String,
    client: reqwest::Client,
    api_url: String,
    amenities: Vec<String>,
}

impl OverpassSource {
    /// Creates a source querying `api_url`.
    #[must_use]
    pub const fn new(
        id: String,
        client: reqwest::Client,
        api_url: String,
        amenities: Vec<String>,
    ) -> Self {
        Self {
            id,
            client,
            api_url,
            amenities,
        }
    }
}

#[async_trait]
impl ProviderSource for OverpassSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> SourceKind {
        SourceKind::OpenStreetMap
    }

    fn supports(&self, query: &SourceQuery) -> bool {
        matches!(query, SourceQuery::Area { .. })
    }

    async fn fetch(&self, query: &SourceQuery) -> Result<Vec<RawProviderRecord>, SourceError> {
        let Some(bbox) = query.bbox() else {
            return Ok(Vec::new());
        };
        let data = build_query(&bbox, &self.amenities);
        log::debug!("Overpass query:\n{data}");

        let body = retry::send_json(|| {
            self.client
                .get(&self.api_url)
                .query(&[("data", data.as_str())])
        })
        .await?;

        let records = parse_elements(&body)?;
        log::info!("{}: {} providers", self.id, records.len());
        Ok(records)
    }
}

/// Builds the Overpass QL query for `bbox`.
fn build_query(bbox: &BoundingBox, amenities: &[String]) -> String {
    let area = format!("{},{},{},{}", bbox.south, bbox.west, bbox.north, bbox.east);
    let mut query = String::from("[out:json][timeout:25];\n(\n");
    for element in ["node", "way", "relation"] {
        query.push_str(&format!("  {element}[\"healthcare\"]({area});\n"));
    }
    if !amenities.is_empty() {
        let pattern = amenities.join("|");
        for element in ["node", "way"] {
            query.push_str(&format!("  {element}[\"amenity\"~\"^({pattern})$\"]({area});\n"));
        }
    }
    query.push_str(");\nout center;");
    query
}

/// Normalizes an Overpass JSON response.
///
/// Elements without usable coordinates are skipped.
fn parse_elements(body: &serde_json::Value) -> Result<Vec<RawProviderRecord>, SourceError> {
    let elements = body["elements"]
        .as_array()
        .ok_or_else(|| SourceError::Normalization {
            message: "Overpass response has no elements array".to_string(),
        })?;

    Ok(elements.iter().filter_map(normalize_element).collect())
}

fn normalize_element(element: &serde_json::Value) -> Option<RawProviderRecord> {
    let id = element["id"].as_u64()?;
    let element_type = element["type"].as_str().unwrap_or("node");
    let latitude = element["lat"]
        .as_f64()
        .or_else(|| element["center"]["lat"].as_f64());
    let longitude = element["lon"]
        .as_f64()
        .or_else(|| element["center"]["lon"].as_f64());
    let (Some(latitude), Some(longitude)) = (latitude, longitude) else {
        log::debug!("Skipping OSM {element_type} {id} without coordinates");
        return None;
    };

    let tags = element["tags"].as_object().cloned().unwrap_or_default();
    let tag = |key: &str| tags.get(key).and_then(json_str);

    let name = tag("name").unwrap_or_else(|| UNNAMED.to_string());
    let mut record = RawProviderRecord::new(
        SourceKind::OpenStreetMap,
        format!("{element_type}-{id}"),
        name,
        Coordinates::new(latitude, longitude),
    );

    let categories = [tag("healthcare"), tag("amenity")]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>();
    record.institution_type = type_mapping::map_first_institution_type(&categories);
    record.ownership_type = tag("operator:type")
        .or_else(|| tag("ownership"))
        .and_then(|o| type_mapping::map_ownership_type(&o));

    record.alternate_names = ["alt_name", "official_name", "short_name"]
        .into_iter()
        .filter_map(|key| tag(key))
        .flat_map(|v| split_list(&v))
        .collect();

    record.address.street = match (tag("addr:housenumber"), tag("addr:street")) {
        (Some(number), Some(street)) => Some(format!("{number} {street}")),
        (None, street) => street,
        (Some(_), None) => None,
    };
    record.address.city = tag("addr:city");
    record.address.state = tag("addr:state");
    record.address.country = tag("addr:country");
    record.address.postal_code = tag("addr:postcode");
    record.neighborhood = tag("addr:suburb").or_else(|| tag("addr:neighbourhood"));

    let contact = &mut record.contact_info;
    contact.phone_numbers = ["phone", "contact:phone"]
        .into_iter()
        .filter_map(|key| tag(key))
        .flat_map(|v| split_list(&v))
        .collect();
    contact.email = tag("email").or_else(|| tag("contact:email"));
    contact.website = tag("website").or_else(|| tag("contact:website"));
    contact.social_links = ["facebook", "instagram", "twitter"]
        .into_iter()
        .filter_map(|network| {
            tag(&format!("contact:{network}")).map(|url| (network.to_string(), url))
        })
        .collect::<BTreeMap<_, _>>();

    if let Some(opening_hours) = tag("opening_hours") {
        record.operating_hours = hours::parse_osm_opening_hours(&opening_hours);
    }

    let capabilities = &mut record.service_capabilities;
    capabilities.specialties = type_mapping::infer_specialties(&categories);
    if let Some(specialities) = tag("healthcare:speciality") {
        capabilities
            .specialties
            .extend(split_list(&specialities).iter().map(String::as_str).map(humanize));
    }
    capabilities.emergency_services = tag("emergency").map(|v| v == "yes");
    if tag("wheelchair").as_deref() == Some("yes") {
        capabilities.accessibility.insert("wheelchair".to_string());
    }
    if let Some(beds) = tag("beds") {
        capabilities.facilities.insert(format!("{beds} beds"));
    }

    Some(record)
}

/// Splits an OSM multi-value tag (`a;b;c`).
fn split_list(value: &str) -> Vec<String> {
    value
        .split(';')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
        .collect()
}
