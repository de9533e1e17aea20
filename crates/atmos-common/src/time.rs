//! Canonical timestamp keys and time targets.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{CommonError, CommonResult};

const KEY_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// Compact UTC timestamp used in derived keys and indices, e.g. `20250101T010203Z`.
///
/// Fixed width, so lexicographic order equals chronological order and the
/// derived `Ord` can be used to sort frames.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimestampKey(String);

impl TimestampKey {
    /// Format a datetime, truncating sub-second precision.
    pub fn from_datetime(dt: &DateTime<Utc>) -> Self {
        Self(dt.format(KEY_FORMAT).to_string())
    }

    pub fn parse(s: &str) -> CommonResult<Self> {
        let ndt = NaiveDateTime::parse_from_str(s, KEY_FORMAT)
            .map_err(|_| CommonError::InvalidTimestampKey(s.to_string()))?;
        Ok(Self::from_datetime(&Utc.from_utc_datetime(&ndt)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn to_datetime(&self) -> DateTime<Utc> {
        // Construction always goes through KEY_FORMAT, so this cannot fail.
        NaiveDateTime::parse_from_str(&self.0, KEY_FORMAT)
            .map(|ndt| Utc.from_utc_datetime(&ndt))
            .unwrap_or_default()
    }
}

impl fmt::Display for TimestampKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TimestampKey {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for TimestampKey {
    type Error = CommonError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TimestampKey> for String {
    fn from(key: TimestampKey) -> Self {
        key.0
    }
}

/// What time an ingestion run is aimed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeTarget {
    Latest,
    At(DateTime<Utc>),
}

impl TimeTarget {
    /// `"latest"` or the RFC 3339 form of the requested time.
    pub fn marker(&self) -> String {
        match self {
            TimeTarget::Latest => "latest".to_string(),
            TimeTarget::At(dt) => dt.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        }
    }

    /// Parse an optional request value; `None`, empty and "latest" mean latest.
    pub fn from_request(value: Option<&str>) -> CommonResult<Self> {
        match value.map(str::trim) {
            None | Some("") => Ok(TimeTarget::Latest),
            Some(v) if v.eq_ignore_ascii_case("latest") => Ok(TimeTarget::Latest),
            Some(v) => parse_iso8601(v).map(TimeTarget::At),
        }
    }
}

/// Parse an ISO 8601 time, accepting a missing offset (UTC assumed) and the
/// compact timestamp key form.
pub fn parse_iso8601(s: &str) -> CommonResult<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    if let Ok(ndt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Ok(Utc.from_utc_datetime(&ndt));
    }

    if let Ok(ndt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M") {
        return Ok(Utc.from_utc_datetime(&ndt));
    }

    if let Ok(key) = TimestampKey::parse(s) {
        return Ok(key.to_datetime());
    }

    Err(CommonError::InvalidTime(s.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_key_format() {
        let dt = Utc.with_ymd_and_hms(2025, 1, 1, 1, 2, 3).unwrap();
        let key = TimestampKey::from_datetime(&dt);
        assert_eq!(key.as_str(), "20250101T010203Z");
        assert_eq!(key.to_datetime(), dt);
    }

    #[test]
    fn test_timestamp_key_rejects_malformed() {
        assert!(TimestampKey::parse("2025-01-01T01:02:03Z").is_err());
        assert!(TimestampKey::parse("20250101T010203").is_err());
        assert!(TimestampKey::parse("20251301T010203Z").is_err());
    }

    #[test]
    fn test_timestamp_key_ordering_is_chronological() {
        let mut keys = vec![
            TimestampKey::parse("20250101T120000Z").unwrap(),
            TimestampKey::parse("20241231T235959Z").unwrap(),
            TimestampKey::parse("20250101T010203Z").unwrap(),
        ];
        keys.sort();
        let ordered: Vec<&str> = keys.iter().map(|k| k.as_str()).collect();
        assert_eq!(
            ordered,
            vec!["20241231T235959Z", "20250101T010203Z", "20250101T120000Z"]
        );
    }

    #[test]
    fn test_timestamp_key_serde_roundtrip_through_string() {
        let json = serde_json::to_string(&TimestampKey::parse("20250101T010203Z").unwrap()).unwrap();
        assert_eq!(json, "\"20250101T010203Z\"");
        assert!(serde_json::from_str::<TimestampKey>("\"garbage\"").is_err());
    }

    #[test]
    fn test_time_target_from_request() {
        assert_eq!(TimeTarget::from_request(None).unwrap(), TimeTarget::Latest);
        assert_eq!(TimeTarget::from_request(Some("LATEST")).unwrap(), TimeTarget::Latest);

        let at = TimeTarget::from_request(Some("2025-01-01T01:02:03Z")).unwrap();
        assert_eq!(at.marker(), "2025-01-01T01:02:03Z");

        let naive = TimeTarget::from_request(Some("2025-01-01T01:02:03")).unwrap();
        assert_eq!(naive, at);

        assert!(TimeTarget::from_request(Some("yesterday")).is_err());
    }
}
