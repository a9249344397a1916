//! Opening-hours parsers.
//!
//! Every source describes hours differently:
//!
//! * OSM `opening_hours` uses compact day-range notation
//!   (`Mo-Fr 08:00-17:00; Sa 09:00-13:00`, `24/7`).
//! * Google Places reports `periods` of numeric day (0 = Sunday) and
//!   `HHMM` time pairs.
//! * Foursquare reports `hours.regular` with day 1 = Monday and `HHMM`
//!   times.
//!
//! All parsers return an empty list for absent or unparseable input rather
//! than failing, and sort their output Monday first.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use chrono::NaiveTime;
use medlocate_provider_models::{OperatingHours, Weekday};
use regex::Regex;

static TIME_RANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([0-9]{1,2}):([0-9]{2})\s*-\s*([0-9]{1,2}):([0-9]{2})\+?$")
        .unwrap_or_else(|_| unreachable!())
});

/// Parses an OSM `opening_hours` value.
///
/// Supports `24/7`, semicolon-separated rules, day ranges (`Mo-Fr`),
/// day lists (`Mo,We,Fr`), several time ranges per rule
/// (`08:00-12:00,13:00-17:00`), `off`/`closed`, and `24:00` as end of
/// day. Later rules override earlier ones for the days they name, as in
/// OSM. Public-holiday rules (`PH`) are ignored. Anything else makes the
/// whole value unparseable.
#[must_use]
pub fn parse_osm_opening_hours(raw: &str) -> Vec<OperatingHours> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Vec::new();
    }
    if raw == "24/7" {
        return Weekday::all()
            .iter()
            .map(|day| OperatingHours::all_day(*day))
            .collect();
    }

    let mut by_day: BTreeMap<Weekday, Vec<OperatingHours>> = BTreeMap::new();

    for rule in raw.split(';').map(str::trim).filter(|r| !r.is_empty()) {
        let Some(parsed) = parse_osm_rule(rule) else {
            log::debug!("Unparseable opening_hours rule '{rule}' in '{raw}'");
            return Vec::new();
        };
        let Some((days, windows)) = parsed else {
            continue;
        };
        for day in days {
            let entries = windows
                .iter()
                .map(|window| window.on(day))
                .collect::<Vec<_>>();
            by_day.insert(day, entries);
        }
    }

    by_day.into_values().flatten().collect()
}

#[derive(Debug, Clone, Copy)]
enum Window {
    AllDay,
    Span(NaiveTime, NaiveTime),
}

impl Window {
    const fn on(self, day: Weekday) -> OperatingHours {
        match self {
            Self::AllDay => OperatingHours::all_day(day),
            Self::Span(open, close) => OperatingHours::new(day, open, close),
        }
    }
}

/// `None` if unparseable, `Some(None)` for rules to skip.
#[allow(clippy::option_option)]
fn parse_osm_rule(rule: &str) -> Option<Option<(Vec<Weekday>, Vec<Window>)>> {
    let (day_part, time_part) = match rule.split_once(' ') {
        Some((days, times)) if starts_with_day(days) || days.starts_with("PH") => {
            (Some(days), times.trim())
        }
        _ if starts_with_day(rule) => (Some(rule), ""),
        _ => (None, rule),
    };

    if day_part.is_some_and(|d| d.starts_with("PH")) {
        return Some(None);
    }

    let days = match day_part {
        Some(spec) => parse_osm_days(spec)?,
        None => Weekday::all().to_vec(),
    };

    let windows = match time_part {
        "off" | "closed" => Vec::new(),
        "" => vec![Window::AllDay],
        times => times
            .split(',')
            .map(|t| parse_osm_time_range(t.trim()))
            .collect::<Option<Vec<_>>>()?,
    };

    Some(Some((days, windows)))
}

fn starts_with_day(text: &str) -> bool {
    text.get(..2).and_then(osm_day).is_some()
}

fn osm_day(abbr: &str) -> Option<Weekday> {
    Some(match abbr {
        "Mo" => Weekday::Monday,
        "Tu" => Weekday::Tuesday,
        "We" => Weekday::Wednesday,
        "Th" => Weekday::Thursday,
        "Fr" => Weekday::Friday,
        "Sa" => Weekday::Saturday,
        "Su" => Weekday::Sunday,
        _ => return None,
    })
}

/// Parses `Mo-Fr`, `Mo,We,Fr`, `Mo-We,Fr` and wrapping ranges like `Sa-Mo`.
fn parse_osm_days(spec: &str) -> Option<Vec<Weekday>> {
    let mut days = Vec::new();
    for part in spec.split(',').map(str::trim) {
        match part.split_once('-') {
            Some((start, end)) => {
                let start = osm_day(start.trim())?;
                let end = osm_day(end.trim())?;
                let mut day = start;
                loop {
                    days.push(day);
                    if day == end {
                        break;
                    }
                    day = day.succ();
                }
            }
            None => days.push(osm_day(part)?),
        }
    }
    days.sort();
    days.dedup();
    Some(days)
}

fn parse_osm_time_range(range: &str) -> Option<Window> {
    let caps = TIME_RANGE.captures(range)?;
    let field = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u32>().ok());

    let open = clock_time(field(1)?, field(2)?)?;
    let close = clock_time(field(3)?, field(4)?)?;

    if open == NaiveTime::MIN && field(3)? == 24 {
        return Some(Window::AllDay);
    }
    Some(Window::Span(open, close))
}

/// `24:00` is end of day and maps to midnight, which [`OperatingHours`]
/// treats as an overnight close.
fn clock_time(hour: u32, minute: u32) -> Option<NaiveTime> {
    if hour == 24 && minute == 0 {
        return Some(NaiveTime::MIN);
    }
    NaiveTime::from_hms_opt(hour, minute, 0)
}

/// Parses an `HHMM` time as used by Google and Foursquare.
#[must_use]
pub fn parse_hhmm(raw: &str) -> Option<NaiveTime> {
    let raw = raw.trim().trim_start_matches('+');
    if raw.len() != 4 || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let hour = raw[..2].parse().ok()?;
    let minute = raw[2..].parse().ok()?;
    clock_time(hour, minute)
}

/// Parses Google Places `opening_hours.periods`.
///
/// A period without `close` means open around the clock; when it is the
/// only period the facility is open 24/7.
#[must_use]
pub fn parse_google_periods(periods: &serde_json::Value) -> Vec<OperatingHours> {
    let Some(periods) = periods.as_array() else {
        return Vec::new();
    };

    let parse_point = |point: &serde_json::Value| -> Option<(Weekday, NaiveTime)> {
        let day = u8::try_from(point["day"].as_u64()?).ok()?;
        Some((Weekday::from_sunday_index(day)?, parse_hhmm(point["time"].as_str()?)?))
    };

    let mut hours = Vec::new();
    for period in periods {
        let Some((day, open)) = parse_point(&period["open"]) else {
            log::debug!("Skipping unparseable Google period: {period}");
            continue;
        };
        if period["close"].is_null() {
            if periods.len() == 1 {
                return Weekday::all()
                    .iter()
                    .map(|d| OperatingHours::all_day(*d))
                    .collect();
            }
            hours.push(OperatingHours::all_day(day));
            continue;
        }
        let Some((_, close)) = parse_point(&period["close"]) else {
            log::debug!("Skipping unparseable Google period: {period}");
            continue;
        };
        hours.push(OperatingHours::new(day, open, close));
    }

    sort_hours(&mut hours);
    hours
}

/// Parses Foursquare `hours.regular` (day 1 = Monday .. 7 = Sunday).
#[must_use]
pub fn parse_foursquare_regular(regular: &serde_json::Value) -> Vec<OperatingHours> {
    let Some(entries) = regular.as_array() else {
        return Vec::new();
    };

    let mut hours = entries
        .iter()
        .filter_map(|entry| {
            let index = usize::try_from(entry["day"].as_u64()?).ok()?;
            let day = *Weekday::all().get(index.checked_sub(1)?)?;
            let open = parse_hhmm(entry["open"].as_str()?)?;
            let close = parse_hhmm(entry["close"].as_str()?)?;
            Some(if open == NaiveTime::MIN && close == NaiveTime::MIN {
                OperatingHours::all_day(day)
            } else {
                OperatingHours::new(day, open, close)
            })
        })
        .collect::<Vec<_>>();

    sort_hours(&mut hours);
    hours
}

fn sort_hours(hours: &mut [OperatingHours]) {
    hours.sort_by_key(|h| (h.day, h.open));
}
