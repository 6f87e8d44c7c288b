//! The fixed UTC timestamp format used on the wire and in the store.

use chrono::{DateTime, NaiveDateTime, Utc};

pub const OPLOG_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

pub fn format_oplog(date: &DateTime<Utc>) -> String {
    date.format(OPLOG_FORMAT).to_string()
}

/// Parse an oplog timestamp. RFC 3339 strings with an offset are accepted too
/// and normalized to UTC.
pub fn parse_oplog(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, OPLOG_FORMAT) {
        return Some(naive.and_utc());
    }
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|date| date.with_timezone(&Utc))
}

pub fn is_oplog(value: &str) -> bool {
    NaiveDateTime::parse_from_str(value, OPLOG_FORMAT).is_ok()
}

/// `#[serde(with = "...")]` helpers for optional oplog dates.
pub mod option {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S>(date: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match date {
            Some(date) => serializer.serialize_str(&super::format_oplog(date)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<String>::deserialize(deserializer)? {
            Some(value) => super::parse_oplog(&value)
                .map(Some)
                .ok_or_else(|| D::Error::custom(format!("invalid oplog date: {value}"))),
            None => Ok(None),
        }
    }
}
