//! Timestamp wire format.
//!
//! Stored dates are always millisecond-precision RFC 3339 in UTC
//! (`2024-05-01T09:30:00.000Z`). The fixed width makes lexicographic order
//! equal chronological order, which the store relies on for range filters.
//! Incoming dates are accepted as RFC 3339, a bare `YYYY-MM-DD`, or epoch
//! milliseconds.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::de::{self, Visitor};
use serde::{Deserializer, Serializer};
use std::fmt;

pub fn format(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn now() -> String {
  format(Utc::now())
}

pub fn parse(s: &str) -> Option<DateTime<Utc>> {
  let s = s.trim();
  if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
    return Some(dt.with_timezone(&Utc));
  }
  if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
    return Some(Utc.from_utc_datetime(&dt));
  }
  if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
    return date.and_hms_opt(0, 0, 0).map(|dt| Utc.from_utc_datetime(&dt));
  }
  s.parse::<i64>().ok().and_then(from_millis)
}

fn from_millis(ms: i64) -> Option<DateTime<Utc>> {
  Utc.timestamp_millis_opt(ms).single()
}

struct DateVisitor;

impl<'de> Visitor<'de> for DateVisitor {
  type Value = DateTime<Utc>;

  fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
    f.write_str("a valid date")
  }

  fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
    parse(v).ok_or_else(|| E::custom(format!("\"{}\" must be a valid date", v)))
  }

  fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
    from_millis(v).ok_or_else(|| E::custom("must be a valid date"))
  }

  fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
    i64::try_from(v)
      .ok()
      .and_then(from_millis)
      .ok_or_else(|| E::custom("must be a valid date"))
  }
}

pub fn serialize<S: Serializer>(dt: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
  serializer.serialize_str(&format(*dt))
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
  deserializer.deserialize_any(DateVisitor)
}

/// Same format for `Option<DateTime<Utc>>` fields; pair with `#[serde(default)]`.
pub mod option {
  use super::*;

  pub fn serialize<S: Serializer>(
    dt: &Option<DateTime<Utc>>,
    serializer: S,
  ) -> Result<S::Ok, S::Error> {
    match dt {
      Some(dt) => serializer.serialize_str(&format(*dt)),
      None => serializer.serialize_none(),
    }
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(
    deserializer: D,
  ) -> Result<Option<DateTime<Utc>>, D::Error> {
    deserializer.deserialize_any(DateVisitor).map(Some)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_format_is_fixed_width() {
    let a = parse("2024-05-01T09:30:00Z").unwrap();
    let b = parse("2024-05-01T09:30:00.5Z").unwrap();
    assert_eq!(format(a), "2024-05-01T09:30:00.000Z");
    assert_eq!(format(b), "2024-05-01T09:30:00.500Z");
    assert!(format(a) < format(b));
  }

  #[test]
  fn test_parse_accepts_common_shapes() {
    assert_eq!(
      format(parse("2024-05-01").unwrap()),
      "2024-05-01T00:00:00.000Z"
    );
    assert_eq!(
      format(parse("2024-05-01T10:00:00+02:00").unwrap()),
      "2024-05-01T08:00:00.000Z"
    );
    assert_eq!(format(parse("0").unwrap()), "1970-01-01T00:00:00.000Z");
    assert!(parse("next tuesday").is_none());
  }
}
