use chrono::{DateTime, NaiveDateTime, Utc};
use thiserror::Error;

/// A publish date none of the known patterns could read.
///
/// Non-fatal: the item is stored without a publish time.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unrecognized publish date {raw:?}")]
pub struct PubDateError {
    pub raw: String,
}

type Pattern = (&'static str, fn(&str) -> Option<DateTime<Utc>>);

/// Tried in order, first match wins.
const PATTERNS: &[Pattern] = &[
    ("rfc1123", parse_rfc1123),
    ("rfc3339", parse_rfc3339),
    ("rfc1123-named-zone", parse_rfc1123_named_zone),
    ("iso8601-local", parse_iso8601_local),
];

/// Normalize a raw `pubDate` string to a UTC instant.
///
/// Accepts RFC-1123 with named (`GMT`, `EST`) or numeric (`-0700`) zones,
/// RFC-3339, RFC-1123 with any other alphabetic zone abbreviation (read as
/// UTC), and zone-less ISO-8601 date-times (read as UTC).
///
/// ```
/// use gather::feed::normalize_pub_date;
///
/// let at = normalize_pub_date("Mon, 02 Jan 2006 15:04:05 GMT").unwrap();
/// assert_eq!(at.to_rfc3339(), "2006-01-02T15:04:05+00:00");
/// assert!(normalize_pub_date("not-a-date").is_err());
/// ```
pub fn normalize_pub_date(raw: &str) -> Result<DateTime<Utc>, PubDateError> {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
        // A weekday that disagrees with the date is ignored, so retry without it
        let candidates = std::iter::once(trimmed).chain(strip_weekday(trimmed));
        for candidate in candidates {
            for (name, parse) in PATTERNS {
                if let Some(at) = parse(candidate) {
                    tracing::trace!(pattern = name, raw = %trimmed, "Parsed publish date");
                    return Ok(at);
                }
            }
        }
    }
    Err(PubDateError {
        raw: raw.to_string(),
    })
}

const WEEKDAYS: [&str; 7] = [
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
    "sunday",
];

/// The remainder after a leading `"<weekday>, "`, if the prefix names a day.
fn strip_weekday(s: &str) -> Option<&str> {
    let (day, rest) = s.split_once(',')?;
    let day = day.trim().to_ascii_lowercase();
    let known = WEEKDAYS
        .iter()
        .any(|full| day == *full || (day.len() == 3 && full.starts_with(day.as_str())));
    known.then(|| rest.trim_start())
}

// RFC-2822 is a superset of RFC-1123: numeric zones, the named US zones,
// single-digit days and an omitted weekday all parse here.
fn parse_rfc1123(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn parse_rfc3339(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn parse_rfc1123_named_zone(s: &str) -> Option<DateTime<Utc>> {
    let (rest, zone) = s.rsplit_once(' ')?;
    if zone.is_empty() || !zone.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    ["%a, %d %b %Y %H:%M:%S", "%d %b %Y %H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(rest.trim_end(), fmt).ok())
        .map(|naive| naive.and_utc())
}

fn parse_iso8601_local(s: &str) -> Option<DateTime<Utc>> {
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
}
