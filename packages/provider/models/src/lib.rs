#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Healthcare provider schema shared across the medlocate workspace.
//!
//! Every external source (map data, places APIs, name search) produces
//! [`RawProviderRecord`]s. The resolver folds records that denote the same
//! physical facility into one [`CanonicalProvider`], which is what gets
//! persisted and returned to callers.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// A WGS84 point in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    /// Latitude, -90 to 90.
    pub latitude: f64,
    /// Longitude, -180 to 180.
    pub longitude: f64,
}

impl Coordinates {
    /// Creates a new point. No range validation is performed here; see
    /// `medlocate_geo::validate_coordinates`.
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// A geographic bounding box in WGS84 coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Southern latitude boundary.
    pub south: f64,
    /// Western longitude boundary.
    pub west: f64,
    /// Northern latitude boundary.
    pub north: f64,
    /// Eastern longitude boundary.
    pub east: f64,
}

impl BoundingBox {
    /// Creates a new bounding box from the given edges.
    #[must_use]
    pub const fn new(south: f64, west: f64, north: f64, east: f64) -> Self {
        Self {
            south,
            west,
            north,
            east,
        }
    }

    /// Returns `true` if the point lies inside (or on the edge of) the box.
    #[must_use]
    pub fn contains(&self, point: Coordinates) -> bool {
        point.latitude >= self.south
            && point.latitude <= self.north
            && point.longitude >= self.west
            && point.longitude <= self.east
    }
}

/// Failure classes shared by every layer of the engine.
///
/// Each crate's error type maps onto one of these so that outer layers
/// (HTTP handlers, CLI) can pick a status without string matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Malformed or missing input. Never retried.
    InvalidInput,
    /// An authoritative lookup returned zero results.
    NotFound,
    /// A local or upstream rate limit was hit. Retryable with backoff.
    RateLimited,
    /// A third-party transport or HTTP failure.
    Upstream,
    /// Missing credential or malformed configuration. Fatal at startup.
    Configuration,
    /// Storage or other internal failure.
    Internal,
}

impl ErrorKind {
    /// Whether a caller may retry the failed operation.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::RateLimited)
    }
}

/// Kind of healthcare institution.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum InstitutionType {
    /// General or teaching hospital.
    Hospital,
    /// Outpatient clinic or doctor's practice.
    Clinic,
    /// Catch-all for facilities that cannot be classified further.
    #[default]
    MedicalCenter,
    /// Laboratories and imaging centres.
    DiagnosticCenter,
    /// Emergency rooms and urgent care.
    EmergencyCare,
    /// Dentists, physiotherapists and other single-specialty practices.
    SpecializedCare,
}

/// Ownership of a healthcare institution.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum OwnershipType {
    /// Publicly funded.
    Public,
    /// Privately owned. Also the fallback when a source gives no hint.
    #[default]
    Private,
    /// Non-profit organisation.
    NonProfit,
    /// Operated directly by a government body.
    Government,
    /// Charity or religious mission.
    Charitable,
}

/// External data source a record came from.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
pub enum SourceKind {
    /// Crowd-sourced map data via the Overpass API.
    OpenStreetMap,
    /// Foursquare Places search.
    Foursquare,
    /// Google Places text search + details.
    GooglePlaces,
}

impl SourceKind {
    /// Prefix used when deriving a `uniqueId` from a source-native id.
    #[must_use]
    pub const fn id_prefix(self) -> &'static str {
        match self {
            Self::OpenStreetMap => "OSM",
            Self::Foursquare => "FS",
            Self::GooglePlaces => "GOOGLE",
        }
    }
}

/// Day of the week, Monday first.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[strum(ascii_case_insensitive)]
pub enum Weekday {
    /// Monday
    Monday,
    /// Tuesday
    Tuesday,
    /// Wednesday
    Wednesday,
    /// Thursday
    Thursday,
    /// Friday
    Friday,
    /// Saturday
    Saturday,
    /// Sunday
    Sunday,
}

impl Weekday {
    /// All days, Monday first.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Monday,
            Self::Tuesday,
            Self::Wednesday,
            Self::Thursday,
            Self::Friday,
            Self::Saturday,
            Self::Sunday,
        ]
    }

    /// Maps a Sunday-based index (0 = Sunday .. 6 = Saturday), as used by
    /// the Google Places `periods` payload.
    #[must_use]
    pub const fn from_sunday_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(Self::Sunday),
            1 => Some(Self::Monday),
            2 => Some(Self::Tuesday),
            3 => Some(Self::Wednesday),
            4 => Some(Self::Thursday),
            5 => Some(Self::Friday),
            6 => Some(Self::Saturday),
            _ => None,
        }
    }

    /// Zero-based position with Monday = 0.
    #[must_use]
    pub const fn monday_index(self) -> usize {
        self as usize
    }

    /// The following day, wrapping Sunday to Monday.
    #[must_use]
    pub const fn succ(self) -> Self {
        match self {
            Self::Monday => Self::Tuesday,
            Self::Tuesday => Self::Wednesday,
            Self::Wednesday => Self::Thursday,
            Self::Thursday => Self::Friday,
            Self::Friday => Self::Saturday,
            Self::Saturday => Self::Sunday,
            Self::Sunday => Self::Monday,
        }
    }

    /// The preceding day, wrapping Monday to Sunday.
    #[must_use]
    pub const fn pred(self) -> Self {
        match self {
            Self::Monday => Self::Sunday,
            Self::Tuesday => Self::Monday,
            Self::Wednesday => Self::Tuesday,
            Self::Thursday => Self::Wednesday,
            Self::Friday => Self::Thursday,
            Self::Saturday => Self::Friday,
            Self::Sunday => Self::Saturday,
        }
    }
}

impl From<chrono::Weekday> for Weekday {
    fn from(day: chrono::Weekday) -> Self {
        match day {
            chrono::Weekday::Mon => Self::Monday,
            chrono::Weekday::Tue => Self::Tuesday,
            chrono::Weekday::Wed => Self::Wednesday,
            chrono::Weekday::Thu => Self::Thursday,
            chrono::Weekday::Fri => Self::Friday,
            chrono::Weekday::Sat => Self::Saturday,
            chrono::Weekday::Sun => Self::Sunday,
        }
    }
}

/// One opening window on a single day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperatingHours {
    /// Day the window starts on.
    pub day: Weekday,
    /// Opening time (local to the facility).
    pub open: NaiveTime,
    /// Closing time. Earlier than `open` for windows that run past midnight.
    pub close: NaiveTime,
    /// Open around the clock on this day.
    pub is_24_hours: bool,
}

impl OperatingHours {
    /// Creates a window from `open` to `close` on `day`.
    #[must_use]
    pub const fn new(day: Weekday, open: NaiveTime, close: NaiveTime) -> Self {
        Self {
            day,
            open,
            close,
            is_24_hours: false,
        }
    }

    /// Creates a 24-hour entry for `day`.
    #[must_use]
    pub const fn all_day(day: Weekday) -> Self {
        Self {
            day,
            open: NaiveTime::MIN,
            close: NaiveTime::MIN,
            is_24_hours: true,
        }
    }

    /// Whether this window covers `time` on `day`, including the spill-over
    /// of an overnight window into the following morning.
    #[must_use]
    pub fn covers(&self, day: Weekday, time: NaiveTime) -> bool {
        if self.is_24_hours {
            return self.day == day;
        }
        if self.close > self.open {
            return self.day == day && time >= self.open && time < self.close;
        }
        // Overnight: close <= open.
        (self.day == day && time >= self.open) || (self.day.succ() == day && time < self.close)
    }
}

/// Postal address. Every field is optional; see [`Address::is_valid`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    /// Street and house number.
    pub street: Option<String>,
    /// City or locality.
    pub city: Option<String>,
    /// State, region or first-level administrative area.
    pub state: Option<String>,
    /// Country name.
    pub country: Option<String>,
    /// Postal code.
    pub postal_code: Option<String>,
}

impl Address {
    /// A usable address has a street, city and country.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        is_filled(self.street.as_ref())
            && is_filled(self.city.as_ref())
            && is_filled(self.country.as_ref())
    }
}

/// Returns `true` if the optional string holds non-whitespace content.
#[must_use]
pub fn is_filled(value: Option<&String>) -> bool {
    value.is_some_and(|v| !v.trim().is_empty())
}

/// Converts a possibly-blank string into `None`, trimming otherwise.
#[must_use]
pub fn non_empty<S: AsRef<str>>(value: Option<S>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.as_ref().trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

/// Where a facility is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    /// Postal address.
    pub address: Address,
    /// Point location. Always present after normalization.
    pub coordinates: Coordinates,
    /// Nearby landmark used for directions.
    pub landmark: Option<String>,
    /// Neighborhood or district.
    pub neighborhood: Option<String>,
}

/// How to reach a facility.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactInfo {
    /// Phone numbers in any format the source supplied.
    pub phone_numbers: BTreeSet<String>,
    /// Contact e-mail.
    pub email: Option<String>,
    /// Website URL.
    pub website: Option<String>,
    /// Social profile links keyed by network (e.g. `"facebook"`).
    pub social_links: BTreeMap<String, String>,
}

/// Ways an appointment can be booked.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum BookingMethod {
    /// Web booking.
    Online,
    /// Phone booking.
    Phone,
    /// No appointment needed.
    WalkIn,
    /// E-mail booking.
    Email,
}

/// Appointment booking details.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentBooking {
    /// Whether appointments can be booked at all.
    pub available: bool,
    /// Accepted booking channels.
    pub methods: BTreeSet<BookingMethod>,
    /// Required notice in hours.
    pub advance_notice_hours: Option<u32>,
}

/// What a facility offers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceCapabilities {
    /// Medical specialties (e.g. "Dental Care").
    pub specialties: BTreeSet<String>,
    /// On-site facilities (e.g. "pharmacy", "laboratory").
    pub facilities: BTreeSet<String>,
    /// Whether an emergency department is available. `None` when unknown.
    pub emergency_services: Option<bool>,
    /// Languages spoken by staff.
    pub languages: BTreeSet<String>,
    /// Accessibility tags (e.g. "wheelchair").
    pub accessibility: BTreeSet<String>,
    /// Appointment booking details, when known.
    pub appointment_booking: Option<AppointmentBooking>,
}

/// A short user review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tip {
    /// Review body.
    pub text: String,
    /// Display name of the author.
    pub author: String,
    /// Likes or star rating, depending on the source.
    pub likes: u32,
    /// When the review was written.
    pub date: DateTime<Utc>,
}

/// A facility as reported by one external source, already normalized to the
/// canonical vocabulary. Produced per search and never persisted directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawProviderRecord {
    /// Source the record came from.
    pub source: SourceKind,
    /// Source-native identifier (OSM element id, place id, ...).
    pub source_id: String,
    /// Facility name.
    pub name: String,
    /// Other names the source knows the facility by.
    pub alternate_names: Vec<String>,
    /// Mapped institution type. `None` when the source had no type hint.
    pub institution_type: Option<InstitutionType>,
    /// Mapped ownership type. `None` when the source had no ownership hint.
    pub ownership_type: Option<OwnershipType>,
    /// Point location.
    pub coordinates: Coordinates,
    /// Partial address.
    pub address: Address,
    /// Nearby landmark.
    pub landmark: Option<String>,
    /// Neighborhood or district.
    pub neighborhood: Option<String>,
    /// Contact details.
    pub contact_info: ContactInfo,
    /// Opening windows. Empty when absent or unparseable.
    pub operating_hours: Vec<OperatingHours>,
    /// Specialties and service flags.
    pub service_capabilities: ServiceCapabilities,
    /// Photo reference (URL).
    pub photo: Option<String>,
    /// User reviews.
    pub tips: Vec<Tip>,
}

impl RawProviderRecord {
    /// Creates a record with only the mandatory fields set.
    #[must_use]
    pub fn new(
        source: SourceKind,
        source_id: impl Into<String>,
        name: impl Into<String>,
        coordinates: Coordinates,
    ) -> Self {
        Self {
            source,
            source_id: source_id.into(),
            name: name.into(),
            alternate_names: Vec::new(),
            institution_type: None,
            ownership_type: None,
            coordinates,
            address: Address::default(),
            landmark: None,
            neighborhood: None,
            contact_info: ContactInfo::default(),
            operating_hours: Vec::new(),
            service_capabilities: ServiceCapabilities::default(),
            photo: None,
            tips: Vec::new(),
        }
    }

    /// Stable identity derived from the source: `<PREFIX>_<source id>`.
    #[must_use]
    pub fn unique_id(&self) -> String {
        format!("{}_{}", self.source.id_prefix(), self.source_id)
    }
}

/// The merged, persisted representation of one physical facility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalProvider {
    /// Identity of the first-seen contributing record. Immutable.
    pub unique_id: String,
    /// Display name.
    pub name: String,
    /// Other known names.
    pub alternate_names: BTreeSet<String>,
    /// Institution type, or the fallback when unmappable.
    pub institution_type: InstitutionType,
    /// Ownership type, or the fallback when unmappable.
    pub ownership_type: OwnershipType,
    /// Address and point location.
    pub location: Location,
    /// Contact details.
    pub contact_info: ContactInfo,
    /// Opening windows.
    pub operating_hours: Vec<OperatingHours>,
    /// Specialties and service flags.
    pub service_capabilities: ServiceCapabilities,
    /// Photo reference (URL).
    pub photo: Option<String>,
    /// User reviews.
    pub tips: Vec<Tip>,
    /// Sources that contributed to this record. Never empty.
    pub source_apis: BTreeSet<SourceKind>,
    /// When the record was last confirmed by a source.
    pub verified_date: DateTime<Utc>,
    /// When the record was last written.
    pub last_updated: DateTime<Utc>,
}

impl CanonicalProvider {
    /// Point location of the facility.
    #[must_use]
    pub const fn coordinates(&self) -> Coordinates {
        self.location.coordinates
    }

    /// Whether any operating-hours window covers `time` on `day`.
    #[must_use]
    pub fn is_open_at(&self, day: Weekday, time: NaiveTime) -> bool {
        self.operating_hours.iter().any(|h| h.covers(day, time))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn unique_id_uses_source_prefix() {
        let record = RawProviderRecord::new(
            SourceKind::OpenStreetMap,
            "12345",
            "Ikeja General Hospital",
            Coordinates::new(6.6, 3.35),
        );
        assert_eq!(record.unique_id(), "OSM_12345");
    }

    #[test]
    fn institution_type_parses_case_insensitively() {
        assert_eq!(
            "Medical_Center".parse::<InstitutionType>().unwrap(),
            InstitutionType::MedicalCenter
        );
        assert!("spa".parse::<InstitutionType>().is_err());
        assert_eq!(InstitutionType::default(), InstitutionType::MedicalCenter);
        assert_eq!(OwnershipType::default(), OwnershipType::Private);
    }

    #[test]
    fn serializes_enums_in_snake_case() {
        let json = serde_json::to_string(&InstitutionType::EmergencyCare).unwrap();
        assert_eq!(json, "\"emergency_care\"");
        let json = serde_json::to_string(&BookingMethod::WalkIn).unwrap();
        assert_eq!(json, "\"walk-in\"");
    }

    #[test]
    fn sunday_index_maps_to_weekday() {
        assert_eq!(Weekday::from_sunday_index(0), Some(Weekday::Sunday));
        assert_eq!(Weekday::from_sunday_index(1), Some(Weekday::Monday));
        assert_eq!(Weekday::from_sunday_index(7), None);
    }

    #[test]
    fn address_validity_requires_street_city_country() {
        let mut address = Address {
            street: Some("1 Oba Akran Ave".to_string()),
            city: Some("Lagos".to_string()),
            ..Address::default()
        };
        assert!(!address.is_valid());
        address.country = Some("Nigeria".to_string());
        assert!(address.is_valid());
        address.city = Some("  ".to_string());
        assert!(!address.is_valid());
    }

    #[test]
    fn daytime_window_covers_only_its_day() {
        let hours = OperatingHours::new(Weekday::Monday, time(8, 0), time(17, 0));
        assert!(hours.covers(Weekday::Monday, time(8, 0)));
        assert!(hours.covers(Weekday::Monday, time(16, 59)));
        assert!(!hours.covers(Weekday::Monday, time(17, 0)));
        assert!(!hours.covers(Weekday::Tuesday, time(9, 0)));
    }

    #[test]
    fn overnight_window_spills_into_next_day() {
        let hours = OperatingHours::new(Weekday::Sunday, time(22, 0), time(6, 0));
        assert!(hours.covers(Weekday::Sunday, time(23, 0)));
        assert!(hours.covers(Weekday::Monday, time(5, 30)));
        assert!(!hours.covers(Weekday::Monday, time(7, 0)));
    }

    #[test]
    fn all_day_entry_covers_whole_day() {
        let hours = OperatingHours::all_day(Weekday::Friday);
        assert!(hours.covers(Weekday::Friday, time(3, 0)));
        assert!(!hours.covers(Weekday::Saturday, time(3, 0)));
    }

    #[test]
    fn non_empty_trims_and_drops_blanks() {
        assert_eq!(non_empty(Some("  Lagos ")), Some("Lagos".to_string()));
        assert_eq!(non_empty(Some("   ")), None);
        assert_eq!(non_empty::<&str>(None), None);
    }
}
