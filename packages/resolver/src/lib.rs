#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Entity resolution for provider records.
//!
//! Sources report the same physical facility under different ids and with
//! different completeness, and share no identity key. Records are grouped
//! by a heuristic [`GroupKey`] (coordinates rounded to four decimals, about
//! 11 m, plus the lower-cased name) and each group is folded into one
//! [`CanonicalProvider`] with explicit per-field rules:
//!
//! | Field | Rule |
//! |-------|------|
//! | `uniqueId`, `name`, coordinates | first member |
//! | `sourceApis`, `alternateNames` | union |
//! | address subfields | first non-empty wins |
//! | photo, types, landmark, neighborhood | first set wins |
//! | contact info | phones union, other fields last non-empty wins |
//! | operating hours | replaced by a strictly longer schedule |
//! | service capabilities | sets union, flags last set wins |
//! | tips | appended, deduplicated by author and text |
//!
//! The heuristic trades recall for precision: same-facility records with
//! slightly divergent coordinates or spellings stay separate.

pub mod validation;

use std::{
    collections::{BTreeSet, HashMap},
    fmt,
};

use chrono::{DateTime, Utc};
use medlocate_provider_models::{
    Address, CanonicalProvider, ContactInfo, InstitutionType, Location, OwnershipType,
    RawProviderRecord, ServiceCapabilities, is_filled, non_empty,
};

/// Decimal places kept when rounding coordinates for grouping.
const KEY_PRECISION: f64 = 10_000.0;

/// Identity heuristic: records with equal keys denote the same facility.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupKey {
    latitude_e4: i64,
    longitude_e4: i64,
    name: String,
}

impl GroupKey {
    /// Derives the key for `record`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn of(record: &RawProviderRecord) -> Self {
        Self {
            latitude_e4: (record.coordinates.latitude * KEY_PRECISION).round() as i64,
            longitude_e4: (record.coordinates.longitude * KEY_PRECISION).round() as i64,
            name: normalize_name(&record.name),
        }
    }
}

impl fmt::Display for GroupKey {
    #[allow(clippy::cast_precision_loss)]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.4},{:.4}:{}",
            self.latitude_e4 as f64 / KEY_PRECISION,
            self.longitude_e4 as f64 / KEY_PRECISION,
            self.name
        )
    }
}

fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Partitions `records` by [`GroupKey`].
///
/// Groups appear in order of their first member, and members keep their
/// input order.
#[must_use]
pub fn group_records(records: Vec<RawProviderRecord>) -> Vec<Vec<RawProviderRecord>> {
    let mut index = HashMap::<GroupKey, usize>::new();
    let mut groups = Vec::<Vec<RawProviderRecord>>::new();

    for record in records {
        let key = GroupKey::of(&record);
        if let Some(&slot) = index.get(&key) {
            groups[slot].push(record);
        } else {
            index.insert(key, groups.len());
            groups.push(vec![record]);
        }
    }

    groups
}

/// Deduplicates `records` into canonical providers, stamped with `now`.
#[must_use]
pub fn resolve(records: Vec<RawProviderRecord>, now: DateTime<Utc>) -> Vec<CanonicalProvider> {
    let total = records.len();
    let providers = group_records(records)
        .iter()
        .filter_map(|group| merge_group(group, now))
        .collect::<Vec<_>>();

    log::debug!(
        "Resolved {total} records into {} canonical providers",
        providers.len()
    );
    providers
}

/// Merges one group into a canonical provider. Returns `None` for an empty
/// group.
///
/// Merging is idempotent: repeating a member, or merging the same group
/// twice with the same `now`, yields an identical provider.
#[must_use]
pub fn merge_group(group: &[RawProviderRecord], now: DateTime<Utc>) -> Option<CanonicalProvider> {
    let (first, _) = group.split_first()?;
    let mut draft = Draft::seed(first, now);
    for record in group {
        draft.absorb(record);
    }
    Some(draft.finish())
}

/// Canonical provider under construction. The enumerations stay optional
/// until [`Draft::finish`] so "first set wins" can tell unset from default.
struct Draft {
    provider: CanonicalProvider,
    institution_type: Option<InstitutionType>,
    ownership_type: Option<OwnershipType>,
}

impl Draft {
    fn seed(first: &RawProviderRecord, now: DateTime<Utc>) -> Self {
        Self {
            provider: CanonicalProvider {
                unique_id: first.unique_id(),
                name: first.name.trim().to_string(),
                alternate_names: BTreeSet::new(),
                institution_type: InstitutionType::default(),
                ownership_type: OwnershipType::default(),
                location: Location {
                    address: Address::default(),
                    coordinates: first.coordinates,
                    landmark: None,
                    neighborhood: None,
                },
                contact_info: ContactInfo::default(),
                operating_hours: Vec::new(),
                service_capabilities: ServiceCapabilities::default(),
                photo: None,
                tips: Vec::new(),
                source_apis: BTreeSet::new(),
                verified_date: now,
                last_updated: now,
            },
            institution_type: None,
            ownership_type: None,
        }
    }

    fn absorb(&mut self, record: &RawProviderRecord) {
        let provider = &mut self.provider;

        provider.source_apis.insert(record.source);
        let names = record
            .alternate_names
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(record.name.as_str()))
            .filter_map(|n| non_empty(Some(n)))
            .filter(|n| *n != provider.name)
            .collect::<Vec<_>>();
        provider.alternate_names.extend(names);

        merge_address(&mut provider.location.address, &record.address);
        fill_first(&mut provider.location.landmark, record.landmark.as_ref());
        fill_first(&mut provider.location.neighborhood, record.neighborhood.as_ref());
        fill_first(&mut provider.photo, record.photo.as_ref());
        if self.institution_type.is_none() {
            self.institution_type = record.institution_type;
        }
        if self.ownership_type.is_none() {
            self.ownership_type = record.ownership_type;
        }

        merge_contact(&mut provider.contact_info, &record.contact_info);

        if record.operating_hours.len() > provider.operating_hours.len() {
            provider.operating_hours.clone_from(&record.operating_hours);
        }

        merge_capabilities(
            &mut provider.service_capabilities,
            &record.service_capabilities,
        );

        for tip in &record.tips {
            let seen = provider
                .tips
                .iter()
                .any(|t| t.author == tip.author && t.text == tip.text);
            if !seen {
                provider.tips.push(tip.clone());
            }
        }
    }

    fn finish(self) -> CanonicalProvider {
        CanonicalProvider {
            institution_type: self.institution_type.unwrap_or_default(),
            ownership_type: self.ownership_type.unwrap_or_default(),
            ..self.provider
        }
    }
}

/// Sets `slot` from `incoming` only while `slot` holds nothing.
fn fill_first(slot: &mut Option<String>, incoming: Option<&String>) {
    if is_filled(slot.as_ref()) {
        return;
    }
    if let Some(value) = non_empty(incoming) {
        *slot = Some(value);
    }
}

/// Overwrites `slot` with `incoming` when `incoming` holds something.
fn fill_last(slot: &mut Option<String>, incoming: Option<&String>) {
    if let Some(value) = non_empty(incoming) {
        *slot = Some(value);
    }
}

fn merge_address(current: &mut Address, incoming: &Address) {
    fill_first(&mut current.street, incoming.street.as_ref());
    fill_first(&mut current.city, incoming.city.as_ref());
    fill_first(&mut current.state, incoming.state.as_ref());
    fill_first(&mut current.country, incoming.country.as_ref());
    fill_first(&mut current.postal_code, incoming.postal_code.as_ref());
}

fn merge_contact(current: &mut ContactInfo, incoming: &ContactInfo) {
    current.phone_numbers.extend(
        incoming
            .phone_numbers
            .iter()
            .filter_map(|p| non_empty(Some(p))),
    );
    fill_last(&mut current.email, incoming.email.as_ref());
    fill_last(&mut current.website, incoming.website.as_ref());
    current.social_links.extend(
        incoming
            .social_links
            .iter()
            .filter(|(_, url)| !url.trim().is_empty())
            .map(|(network, url)| (network.clone(), url.clone())),
    );
}

fn merge_capabilities(current: &mut ServiceCapabilities, incoming: &ServiceCapabilities) {
    current.specialties.extend(incoming.specialties.iter().cloned());
    current.facilities.extend(incoming.facilities.iter().cloned());
    current.languages.extend(incoming.languages.iter().cloned());
    current
        .accessibility
        .extend(incoming.accessibility.iter().cloned());
    if incoming.emergency_services.is_some() {
        current.emergency_services = incoming.emergency_services;
    }
    if incoming.appointment_booking.is_some() {
        current
            .appointment_booking
            .clone_from(&incoming.appointment_booking);
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveTime, TimeZone as _};
    use medlocate_provider_models::{Coordinates, OperatingHours, SourceKind, Tip, Weekday};

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn record(source: SourceKind, id: &str, name: &str, lat: f64, lon: f64) -> RawProviderRecord {
        RawProviderRecord::new(source, id, name, Coordinates::new(lat, lon))
    }

    fn hours(days: &[Weekday]) -> Vec<OperatingHours> {
        let open = NaiveTime::from_hms_opt(8, 0, 0).unwrap();
        let close = NaiveTime::from_hms_opt(17, 0, 0).unwrap();
        days.iter()
            .map(|d| OperatingHours::new(*d, open, close))
            .collect()
    }

    #[test]
    fn key_rounds_to_four_decimals_and_ignores_case() {
        let a = record(SourceKind::OpenStreetMap, "1", "Ikeja General Hospital", 6.600_01, 3.350_04);
        let b = record(SourceKind::Foursquare, "x", "ikeja  general hospital ", 6.599_99, 3.349_96);
        assert_eq!(GroupKey::of(&a), GroupKey::of(&b));
        assert_eq!(GroupKey::of(&a).to_string(), "6.6000,3.3500:ikeja general hospital");

        let far = record(SourceKind::Foursquare, "y", "Ikeja General Hospital", 6.6012, 3.35);
        assert_ne!(GroupKey::of(&a), GroupKey::of(&far));
    }

    #[test]
    fn groups_preserve_first_seen_order() {
        let groups = group_records(vec![
            record(SourceKind::OpenStreetMap, "1", "A", 1.0, 1.0),
            record(SourceKind::OpenStreetMap, "2", "B", 2.0, 2.0),
            record(SourceKind::Foursquare, "3", "a", 1.0, 1.0),
        ]);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].len(), 2);
        assert_eq!(groups[0][1].source_id, "3");
        assert_eq!(groups[1][0].name, "B");
    }

    #[test]
    fn same_facility_from_two_sources_merges() {
        let providers = resolve(
            vec![
                record(SourceKind::OpenStreetMap, "node-1", "Ikeja General Hospital", 6.6012, 3.3515),
                record(SourceKind::Foursquare, "fsq1", "Ikeja General Hospital", 6.6012, 3.3515),
            ],
            now(),
        );
        assert_eq!(providers.len(), 1);
        let provider = &providers[0];
        assert_eq!(provider.unique_id, "OSM_node-1");
        assert_eq!(
            provider.source_apis,
            BTreeSet::from([SourceKind::OpenStreetMap, SourceKind::Foursquare])
        );
        assert_eq!(provider.verified_date, now());
    }

    #[test]
    fn address_fields_are_first_non_empty_wins_in_any_order() {
        let mut a = record(SourceKind::OpenStreetMap, "1", "Clinic", 1.0, 1.0);
        a.address.city = Some("Lagos".to_string());
        let mut b = record(SourceKind::Foursquare, "2", "Clinic", 1.0, 1.0);
        b.address.city = Some(String::new());
        b.address.street = Some("12 Allen Ave".to_string());

        for group in [vec![a.clone(), b.clone()], vec![b, a]] {
            let provider = merge_group(&group, now()).unwrap();
            assert_eq!(provider.location.address.city.as_deref(), Some("Lagos"));
            assert_eq!(provider.location.address.street.as_deref(), Some("12 Allen Ave"));
        }
    }

    #[test]
    fn earlier_address_is_not_overwritten() {
        let mut a = record(SourceKind::OpenStreetMap, "1", "Clinic", 1.0, 1.0);
        a.address.city = Some("Ikeja".to_string());
        let mut b = record(SourceKind::GooglePlaces, "2", "Clinic", 1.0, 1.0);
        b.address.city = Some("Lagos".to_string());

        let provider = merge_group(&[a, b], now()).unwrap();
        assert_eq!(provider.location.address.city.as_deref(), Some("Ikeja"));
    }

    #[test]
    fn types_are_first_set_wins_with_fallback() {
        let a = record(SourceKind::OpenStreetMap, "1", "Clinic", 1.0, 1.0);
        let mut b = record(SourceKind::Foursquare, "2", "Clinic", 1.0, 1.0);
        b.institution_type = Some(InstitutionType::Clinic);
        let mut c = record(SourceKind::GooglePlaces, "3", "Clinic", 1.0, 1.0);
        c.institution_type = Some(InstitutionType::Hospital);

        let provider = merge_group(&[a.clone(), b, c], now()).unwrap();
        assert_eq!(provider.institution_type, InstitutionType::Clinic);
        assert_eq!(provider.ownership_type, OwnershipType::Private);

        let provider = merge_group(&[a], now()).unwrap();
        assert_eq!(provider.institution_type, InstitutionType::MedicalCenter);
    }

    #[test]
    fn contact_info_unions_phones_and_prefers_later_fields() {
        let mut a = record(SourceKind::OpenStreetMap, "1", "Clinic", 1.0, 1.0);
        a.contact_info.phone_numbers.insert("+234 1".to_string());
        a.contact_info.website = Some("http://old.example".to_string());
        a.contact_info.email = Some("desk@clinic.example".to_string());
        let mut b = record(SourceKind::GooglePlaces, "2", "Clinic", 1.0, 1.0);
        b.contact_info.phone_numbers.insert("+234 2".to_string());
        b.contact_info.website = Some("https://new.example".to_string());

        let provider = merge_group(&[a, b], now()).unwrap();
        assert_eq!(provider.contact_info.phone_numbers.len(), 2);
        assert_eq!(provider.contact_info.website.as_deref(), Some("https://new.example"));
        assert_eq!(provider.contact_info.email.as_deref(), Some("desk@clinic.example"));
    }

    #[test]
    fn longer_schedule_replaces_shorter() {
        let mut a = record(SourceKind::OpenStreetMap, "1", "Clinic", 1.0, 1.0);
        a.operating_hours = hours(&[Weekday::Monday, Weekday::Tuesday]);
        let mut b = record(SourceKind::GooglePlaces, "2", "Clinic", 1.0, 1.0);
        b.operating_hours = hours(&[Weekday::Monday, Weekday::Tuesday, Weekday::Wednesday]);
        let mut c = record(SourceKind::Foursquare, "3", "Clinic", 1.0, 1.0);
        c.operating_hours = hours(&[Weekday::Sunday, Weekday::Saturday, Weekday::Friday]);

        let provider = merge_group(&[a, b, c], now()).unwrap();
        assert_eq!(provider.operating_hours.len(), 3);
        // Equal length does not replace.
        assert_eq!(provider.operating_hours[2].day, Weekday::Wednesday);
    }

    #[test]
    fn capabilities_union_sets_and_take_later_flags() {
        let mut a = record(SourceKind::OpenStreetMap, "1", "Clinic", 1.0, 1.0);
        a.service_capabilities.specialties.insert("Dental Care".to_string());
        a.service_capabilities.emergency_services = Some(false);
        let mut b = record(SourceKind::GooglePlaces, "2", "Clinic", 1.0, 1.0);
        b.service_capabilities.specialties.insert("General Practice".to_string());
        b.service_capabilities.languages.insert("English".to_string());
        b.service_capabilities.emergency_services = Some(true);
        let c = record(SourceKind::Foursquare, "3", "Clinic", 1.0, 1.0);

        let provider = merge_group(&[a, b, c], now()).unwrap();
        let capabilities = &provider.service_capabilities;
        assert_eq!(capabilities.specialties.len(), 2);
        assert!(capabilities.languages.contains("English"));
        assert_eq!(capabilities.emergency_services, Some(true));
    }

    #[test]
    fn merge_is_idempotent() {
        let mut a = record(SourceKind::OpenStreetMap, "1", "Clinic", 1.0, 1.0);
        a.alternate_names.push("The Clinic".to_string());
        a.address.city = Some("Lagos".to_string());
        a.operating_hours = hours(&[Weekday::Monday]);
        a.tips.push(Tip {
            text: "Quick service".to_string(),
            author: "Ada".to_string(),
            likes: 3,
            date: now(),
        });
        let mut b = record(SourceKind::GooglePlaces, "2", "CLINIC", 1.0, 1.0);
        b.contact_info.phone_numbers.insert("+234 1".to_string());

        let once = merge_group(&[a.clone(), b.clone()], now()).unwrap();
        let twice = merge_group(&[a.clone(), b.clone(), a.clone(), b], now()).unwrap();
        assert_eq!(once, twice);
        assert_eq!(once.tips.len(), 1);
        assert_eq!(
            once.alternate_names,
            BTreeSet::from(["CLINIC".to_string(), "The Clinic".to_string()])
        );

        let single = merge_group(&[a.clone()], now()).unwrap();
        assert_eq!(single, merge_group(&[a.clone(), a], now()).unwrap());
    }

    #[test]
    fn empty_group_yields_nothing() {
        assert!(merge_group(&[], now()).is_none());
        assert!(resolve(Vec::new(), now()).is_empty());
    }
}
