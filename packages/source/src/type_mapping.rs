//! Facility type mapping utilities.
//!
//! Maps source-specific category strings (OSM tag values, Foursquare
//! category names, Google place types) to the canonical
//! [`InstitutionType`] / [`OwnershipType`] enumerations. Sources use
//! different naming conventions, so matching is keyword-based and
//! case-insensitive. Unknown values map to `None`; the resolver applies the
//! enumeration defaults when no source supplied a value.

use std::collections::BTreeSet;

use medlocate_provider_models::{InstitutionType, OwnershipType};

/// Attempts to map a raw category string from any source to an
/// institution type.
#[must_use]
pub fn map_institution_type(raw: &str) -> Option<InstitutionType> {
    let lower = raw.trim().to_lowercase();
    if lower.is_empty() {
        return None;
    }

    // Emergency first: "emergency hospital" is emergency care.
    if contains_any(&lower, &["emergency", "urgent care", "urgent_care"]) {
        return Some(InstitutionType::EmergencyCare);
    }
    if lower.contains("hospital") {
        return Some(InstitutionType::Hospital);
    }
    if contains_any(
        &lower,
        &[
            "laborator",
            "diagnostic",
            "imaging",
            "radiolog",
            "blood_bank",
            "blood bank",
            "sample_collection",
        ],
    ) {
        return Some(InstitutionType::DiagnosticCenter);
    }
    if contains_any(
        &lower,
        &[
            "dentist",
            "dental",
            "orthodont",
            "physiotherap",
            "physical therap",
            "optometr",
            "psychotherap",
            "podiatr",
            "chiropract",
            "audiolog",
            "speech_therap",
        ],
    ) {
        return Some(InstitutionType::SpecializedCare);
    }
    if contains_any(&lower, &["clinic", "doctor", "physician", "practice"]) {
        return Some(InstitutionType::Clinic);
    }
    if contains_any(&lower, &["medical", "health", "centre", "center"]) {
        return Some(InstitutionType::MedicalCenter);
    }
    None
}

/// Maps a list of categories, first mapped value wins.
#[must_use]
pub fn map_first_institution_type<S: AsRef<str>>(types: &[S]) -> Option<InstitutionType> {
    types
        .iter()
        .find_map(|t| map_institution_type(t.as_ref()))
}

/// Attempts to map a raw ownership/operator string to an ownership type.
#[must_use]
pub fn map_ownership_type(raw: &str) -> Option<OwnershipType> {
    let lower = raw.trim().to_lowercase();

    if contains_any(&lower, &["government", "state", "municipal", "federal", "military"]) {
        return Some(OwnershipType::Government);
    }
    if contains_any(&lower, &["non_profit", "nonprofit", "non-profit", "community", "ngo"]) {
        return Some(OwnershipType::NonProfit);
    }
    if contains_any(&lower, &["charit", "religious", "mission"]) {
        return Some(OwnershipType::Charitable);
    }
    if lower.contains("public") {
        return Some(OwnershipType::Public);
    }
    if contains_any(&lower, &["private", "commercial"]) {
        return Some(OwnershipType::Private);
    }
    None
}

/// Specialties implied by a facility's categories.
#[must_use]
pub fn infer_specialties<S: AsRef<str>>(types: &[S]) -> BTreeSet<String> {
    types
        .iter()
        .filter_map(|t| specialty_for(t.as_ref()))
        .map(String::from)
        .collect()
}

fn specialty_for(raw: &str) -> Option<&'static str> {
    let lower = raw.trim().to_lowercase();
    if contains_any(&lower, &["dentist", "dental"]) {
        Some("Dental Care")
    } else if contains_any(&lower, &["physiotherap", "physical therap"]) {
        Some("Physical Therapy")
    } else if contains_any(&lower, &["emergency"]) {
        Some("Emergency Medicine")
    } else if contains_any(&lower, &["doctor", "general practice", "physician"]) {
        Some("General Practice")
    } else if lower.contains("hospital") {
        Some("General Medicine")
    } else {
        None
    }
}

/// Turns an OSM-style value like `"general_surgery"` into
/// `"General Surgery"`.
#[must_use]
pub fn humanize(raw: &str) -> String {
    raw.split(['_', ' '])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect()
            })
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Returns `true` if `haystack` contains any of the given `needles`.
fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_osm_tag_values() {
        assert_eq!(map_institution_type("hospital"), Some(InstitutionType::Hospital));
        assert_eq!(map_institution_type("clinic"), Some(InstitutionType::Clinic));
        assert_eq!(map_institution_type("doctors"), Some(InstitutionType::Clinic));
        assert_eq!(map_institution_type("dentist"), Some(InstitutionType::SpecializedCare));
        assert_eq!(
            map_institution_type("physiotherapist"),
            Some(InstitutionType::SpecializedCare)
        );
        assert_eq!(
            map_institution_type("laboratory"),
            Some(InstitutionType::DiagnosticCenter)
        );
        assert_eq!(map_institution_type("pharmacy"), None);
    }

    #[test]
    fn maps_foursquare_category_names() {
        assert_eq!(
            map_institution_type("Emergency Room"),
            Some(InstitutionType::EmergencyCare)
        );
        assert_eq!(
            map_institution_type("Medical Center"),
            Some(InstitutionType::MedicalCenter)
        );
        assert_eq!(
            map_institution_type("Dentist's Office"),
            Some(InstitutionType::SpecializedCare)
        );
    }

    #[test]
    fn first_mapped_google_type_wins() {
        let types = ["point_of_interest", "establishment", "doctor", "health"];
        assert_eq!(map_first_institution_type(&types), Some(InstitutionType::Clinic));

        let types = ["point_of_interest", "health"];
        assert_eq!(
            map_first_institution_type(&types),
            Some(InstitutionType::MedicalCenter)
        );

        let types: [&str; 1] = ["store"];
        assert_eq!(map_first_institution_type(&types), None);
    }

    #[test]
    fn maps_ownership() {
        assert_eq!(map_ownership_type("public"), Some(OwnershipType::Public));
        assert_eq!(map_ownership_type("Government"), Some(OwnershipType::Government));
        assert_eq!(map_ownership_type("community"), Some(OwnershipType::NonProfit));
        assert_eq!(map_ownership_type("religious"), Some(OwnershipType::Charitable));
        assert_eq!(map_ownership_type("private"), Some(OwnershipType::Private));
        assert_eq!(map_ownership_type("consortium"), None);
    }

    #[test]
    fn infers_specialties_from_types() {
        let specialties = infer_specialties(&["dentist", "hospital", "health"]);
        assert_eq!(
            specialties.into_iter().collect::<Vec<_>>(),
            vec!["Dental Care".to_string(), "General Medicine".to_string()]
        );
        let specialties = infer_specialties(&["emergency_room", "doctor"]);
        assert!(specialties.contains("Emergency Medicine"));
        assert!(specialties.contains("General Practice"));
    }

    #[test]
    fn humanizes_tag_values() {
        assert_eq!(humanize("general_surgery"), "General Surgery");
        assert_eq!(humanize("PAEDIATRICS"), "Paediatrics");
        assert_eq!(humanize(""), "");
    }
}
