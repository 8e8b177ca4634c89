//! Serde helpers for timestamps and durations as they appear on the wire.
//!
//! Timestamps are written as ISO-8601 with millisecond precision
//! (`2025-01-15T12:00:00.000Z`). On input any RFC 3339 string or an epoch
//! millisecond number is accepted.

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serializer};
use serde_json::Value;

/// Format a timestamp the way every netwatch artifact does.
pub fn to_iso_millis(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse an RFC 3339 / ISO-8601 timestamp string.
pub fn parse_iso(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn from_value(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_iso(s),
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        _ => None,
    }
}

pub mod iso_millis {
    use super::*;
    use serde::de::Error as _;

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&to_iso_millis(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let value = Value::deserialize(deserializer)?;
        from_value(&value).ok_or_else(|| D::Error::custom(format!("invalid timestamp: {value}")))
    }
}

/// Millisecond counts sent by JS clients may be floats.
pub mod lenient_millis {
    use super::*;
    use serde::de::Error as _;

    pub fn serialize<S: Serializer>(ms: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(*ms)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        let value = Value::deserialize(deserializer)?;
        number_to_millis(&value).ok_or_else(|| D::Error::custom(format!("invalid duration: {value}")))
    }
}

pub(crate) fn number_to_millis(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().map(|f| f.max(0.0).round() as u64)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize)]
    struct Stamped {
        #[serde(with = "iso_millis")]
        at: DateTime<Utc>,
        #[serde(with = "lenient_millis")]
        took: u64,
    }

    #[test]
    fn writes_millisecond_precision_with_zulu_suffix() {
        let at = Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap();
        let json = serde_json::to_string(&Stamped { at, took: 5 }).unwrap();
        assert_eq!(json, r#"{"at":"2025-01-15T12:00:00.000Z","took":5}"#);
    }

    #[test]
    fn accepts_strings_epoch_millis_and_float_durations() {
        let parsed: Stamped =
            serde_json::from_str(r#"{"at":"2025-06-01T08:30:00Z","took":12.6}"#).unwrap();
        assert_eq!(to_iso_millis(&parsed.at), "2025-06-01T08:30:00.000Z");
        assert_eq!(parsed.took, 13);

        let parsed: Stamped = serde_json::from_str(r#"{"at":1736942400000,"took":0}"#).unwrap();
        assert_eq!(to_iso_millis(&parsed.at), "2025-01-15T12:00:00.000Z");
    }

    #[test]
    fn rejects_garbage_timestamps() {
        assert!(serde_json::from_str::<Stamped>(r#"{"at":"yesterday","took":1}"#).is_err());
    }
}
