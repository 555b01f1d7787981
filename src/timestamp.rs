/// Submission timestamp normalization and ordering
///
/// The grading platform reports times as ISO8601 strings with a trailing `Z`;
/// older records and hand-edited files may carry an explicit `UTC` token, a
/// numeric offset, or no zone at all (read as UTC). Ordering is decided on the
/// (year, month, day, hour, minute, second) tuple of the instant in UTC.
use crate::config::types::{GradeError, Result};
use chrono::{DateTime, Datelike, NaiveDateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Rewrite a trailing zulu `Z` into an explicit `UTC` zone token.
pub fn normalize(ts: &str) -> String {
    let trimmed = ts.trim();
    match trimmed
        .strip_suffix('Z')
        .or_else(|| trimmed.strip_suffix('z'))
    {
        Some(prefix) => format!("{}UTC", prefix),
        None => trimmed.to_string(),
    }
}

fn parse_naive(s: &str) -> Option<NaiveDateTime> {
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
}

/// Parse a timestamp into a UTC instant.
pub fn parse(ts: &str) -> Result<DateTime<Utc>> {
    let normalized = normalize(ts);

    if let Some(naive) = normalized.strip_suffix("UTC") {
        return parse_naive(naive.trim_end())
            .map(|n| n.and_utc())
            .ok_or_else(|| GradeError::Timestamp(format!("unparseable timestamp: {}", ts)));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(&normalized) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Ok(dt.with_timezone(&Utc));
    }

    parse_naive(&normalized)
        .map(|n| n.and_utc())
        .ok_or_else(|| GradeError::Timestamp(format!("unparseable timestamp: {}", ts)))
}

fn ordering_key(dt: &DateTime<Utc>) -> (i32, u32, u32, u32, u32, u32) {
    (
        dt.year(),
        dt.month(),
        dt.day(),
        dt.hour(),
        dt.minute(),
        dt.second(),
    )
}

/// Chronological ordering of two timestamps.
pub fn compare(a: &str, b: &str) -> Result<Ordering> {
    let a = parse(a)?;
    let b = parse(b)?;
    Ok(ordering_key(&a).cmp(&ordering_key(&b)))
}

/// A timestamp as recorded on disk. The raw text is kept so that equality
/// checks and rewrites preserve exactly what the platform reported.
/// There is no `Ord`: raw text does not sort chronologically, use `chrono_cmp`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(String);

impl Timestamp {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn to_utc(&self) -> Result<DateTime<Utc>> {
        parse(&self.0)
    }

    /// Chronological comparison; identical raw strings compare equal without parsing.
    pub fn chrono_cmp(&self, other: &Timestamp) -> Result<Ordering> {
        if self.0 == other.0 {
            return Ok(Ordering::Equal);
        }
        compare(&self.0, &other.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Timestamp {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_zulu() {
        assert_eq!(normalize("2016-02-01T12:00:00Z"), "2016-02-01T12:00:00UTC");
        assert_eq!(normalize("2016-02-01T12:00:00UTC"), "2016-02-01T12:00:00UTC");
        assert_eq!(normalize(" 2016-02-01T12:00:00 "), "2016-02-01T12:00:00");
    }

    #[test]
    fn test_compare_ordering() {
        let earlier = "2016-02-01T12:00:00Z";
        let later = "2016-02-01T12:00:01Z";
        assert_eq!(compare(earlier, later).unwrap(), Ordering::Less);
        assert_eq!(compare(later, earlier).unwrap(), Ordering::Greater);
        assert_eq!(compare(earlier, earlier).unwrap(), Ordering::Equal);
    }

    #[test]
    fn test_zulu_and_explicit_utc_are_equal() {
        assert_eq!(
            compare("2016-02-01T12:00:00Z", "2016-02-01T12:00:00UTC").unwrap(),
            Ordering::Equal
        );
        assert_eq!(
            compare("2016-02-01T12:00:00Z", "2016-02-01T12:00:00 UTC").unwrap(),
            Ordering::Equal
        );
        assert_eq!(
            compare("2016-02-01T12:00:00Z", "2016-02-01T12:00:00+00:00").unwrap(),
            Ordering::Equal
        );
    }

    #[test]
    fn test_offsets_are_converted_to_utc() {
        assert_eq!(
            compare("2016-02-01T07:00:00-05:00", "2016-02-01T12:00:00Z").unwrap(),
            Ordering::Equal
        );
        assert_eq!(
            compare("2016-02-01T12:30:00+01:00", "2016-02-01T12:00:00Z").unwrap(),
            Ordering::Less
        );
    }

    #[test]
    fn test_subsecond_precision_is_ignored() {
        assert_eq!(
            compare("2016-02-01T12:00:00.900Z", "2016-02-01T12:00:00Z").unwrap(),
            Ordering::Equal
        );
    }

    #[test]
    fn test_sentinel_is_not_a_timestamp() {
        assert!(parse("N/A").is_err());
        assert!(compare("N/A", "2016-02-01T12:00:00Z").is_err());
    }

    #[test]
    fn test_timestamp_identical_raw_short_circuits() {
        let a = Timestamp::new("garbage");
        assert_eq!(a.chrono_cmp(&a.clone()).unwrap(), Ordering::Equal);
        assert!(a.chrono_cmp(&Timestamp::new("2016-02-01T12:00:00Z")).is_err());
    }

    #[test]
    fn test_timestamp_order_is_chronological_not_textual() {
        // Textually "12:30+01:00" sorts after "12:00Z"; in time it is earlier.
        let offset = Timestamp::new("2016-02-01T12:30:00+01:00");
        let zulu = Timestamp::new("2016-02-01T12:00:00Z");
        assert!(offset.as_str() > zulu.as_str());
        assert_eq!(offset.chrono_cmp(&zulu).unwrap(), Ordering::Less);

        let spaced = Timestamp::new("2016-02-01 13:00:00 UTC");
        assert!(spaced.as_str() < zulu.as_str());
        assert_eq!(spaced.chrono_cmp(&zulu).unwrap(), Ordering::Greater);
    }
}
