//! Sortable timestamps and the created/modified section of persisted files.
//!
//! Timestamps are UTC with millisecond precision, rendered as
//! `YYYYMMDDHHMMSSmmm`. Plain string ordering equals chronological ordering.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::types::{MstarError, Result};

const FORMAT: &str = "%Y%m%d%H%M%S%3f";
const WIDTH: usize = 17;

/// 0000-01-01T00:00:00.000Z and 9999-12-31T23:59:59.999Z, the span a
/// four-digit year can render
const MIN_MILLIS: i64 = -62_167_219_200_000;
const MAX_MILLIS: i64 = 253_402_300_799_999;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Current UTC time truncated to milliseconds
    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        let millis = dt.timestamp_millis();
        Self(DateTime::from_timestamp_millis(millis).unwrap_or(dt))
    }

    /// One hour earlier, clamped to year 0000
    pub fn before(&self) -> Self {
        self.shifted(-Duration::hours(1))
    }

    /// One hour later, clamped to year 9999
    pub fn after(&self) -> Self {
        self.shifted(Duration::hours(1))
    }

    fn shifted(&self, delta: Duration) -> Self {
        let millis = self
            .0
            .timestamp_millis()
            .saturating_add(delta.num_milliseconds())
            .clamp(MIN_MILLIS, MAX_MILLIS);
        Self(DateTime::from_timestamp_millis(millis).unwrap_or(self.0))
    }

    pub fn datetime(&self) -> DateTime<Utc> {
        self.0
    }

    pub fn parse(s: &str) -> Result<Self> {
        if s.len() != WIDTH || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(MstarError::InvalidTimestamp(format!(
                "'{}' is not {} digits",
                s, WIDTH
            )));
        }

        let field = |range: std::ops::Range<usize>| -> u32 {
            // all-digit and fixed width, so every slice parses
            s[range].parse().unwrap_or(0)
        };

        let year = field(0..4) as i32;
        let date = NaiveDate::from_ymd_opt(year, field(4..6), field(6..8))
            .ok_or_else(|| MstarError::InvalidTimestamp(format!("'{}' has no such date", s)))?;
        let naive: NaiveDateTime = date
            .and_hms_milli_opt(field(8..10), field(10..12), field(12..14), field(14..17))
            .ok_or_else(|| MstarError::InvalidTimestamp(format!("'{}' has no such time", s)))?;

        Ok(Self(naive.and_utc()))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(FORMAT))
    }
}

impl FromStr for Timestamp {
    type Err = MstarError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Created/modified metadata carried by every persisted file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimestampedSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<Timestamp>,
}

impl TimestampedSection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamp a persistence event at the current time
    pub fn touch(&mut self) {
        self.touch_at(Timestamp::now());
    }

    /// Stamp a persistence event at `now`.
    ///
    /// `created` is set once. `modified` never moves backwards, even if the
    /// wall clock does.
    pub fn touch_at(&mut self, now: Timestamp) {
        let created = *self.created.get_or_insert(now);
        let modified = match self.modified {
            Some(previous) if previous > now => previous,
            _ => now,
        };
        self.modified = Some(modified.max(created));
    }

    pub fn is_persisted(&self) -> bool {
        self.created.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_is_fixed_width() {
        let ts = Timestamp::parse("20261018093015123").unwrap();
        assert_eq!(ts.to_string(), "20261018093015123");
        assert_eq!(Timestamp::now().to_string().len(), WIDTH);
    }

    #[test]
    fn test_string_order_matches_time_order() {
        let ts = Timestamp::now();
        let earlier = ts.before();
        let later = ts.after();

        assert!(earlier.to_string() < ts.to_string());
        assert!(ts.to_string() < later.to_string());
        assert_eq!(later.datetime() - earlier.datetime(), Duration::hours(2));
    }

    #[test]
    fn test_shift_stays_within_four_digit_years() {
        let last = Timestamp::parse("99991231233000000").unwrap();
        let later = last.after();
        assert_eq!(later.to_string(), "99991231235959999");
        assert_eq!(Timestamp::parse(&later.to_string()).unwrap(), later);

        let first = Timestamp::parse("00000101003000000").unwrap();
        let earlier = first.before();
        assert_eq!(earlier.to_string(), "00000101000000000");
        assert_eq!(Timestamp::parse(&earlier.to_string()).unwrap(), earlier);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in ["", "2026101809301512", "2026101809301512x", "20261318093015123"] {
            assert!(
                matches!(Timestamp::parse(bad), Err(MstarError::InvalidTimestamp(_))),
                "accepted {bad:?}"
            );
        }
    }

    #[test]
    fn test_touch_freezes_created() {
        let first = Timestamp::parse("20260101000000000").unwrap();
        let second = first.after();

        let mut section = TimestampedSection::new();
        assert!(!section.is_persisted());

        section.touch_at(first);
        assert_eq!(section.created, Some(first));
        assert_eq!(section.modified, Some(first));

        section.touch_at(second);
        assert_eq!(section.created, Some(first));
        assert_eq!(section.modified, Some(second));
    }

    #[test]
    fn test_modified_never_moves_backwards() {
        let now = Timestamp::parse("20260101120000000").unwrap();
        let mut section = TimestampedSection::new();
        section.touch_at(now);
        section.touch_at(now.before());

        assert_eq!(section.modified, Some(now));
        assert!(section.created <= section.modified);
    }

    #[test]
    fn test_section_toml_round_trip() {
        let mut section = TimestampedSection::new();
        section.touch_at(Timestamp::parse("20260101120000500").unwrap());

        let text = toml::to_string(&section).unwrap();
        assert!(text.contains("created = \"20260101120000500\""));
        let back: TimestampedSection = toml::from_str(&text).unwrap();
        assert_eq!(back, section);
    }
}
