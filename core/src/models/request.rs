//! Captured request models
//!
//! `CaptureRecord` is what a client puts on the wire for one observed
//! request/response pair. `StoredRequest` is the inspector-side
//! materialization of it, augmented with a bookmark flag.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::timestamp::{iso_millis, lenient_millis};

/// Header name/value pairs in the order they were observed.
pub type HeaderMap = IndexMap<String, String>;

/// Methods that conventionally carry a request body.
const METHODS_WITH_BODY: [&str; 3] = ["POST", "PUT", "PATCH"];

pub fn method_carries_body(method: &str) -> bool {
    METHODS_WITH_BODY
        .iter()
        .any(|m| m.eq_ignore_ascii_case(method))
}

/// Treat an explicit JSON `null` the same as a missing field.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Header map that tolerates non-string values, as sent by older reporters
/// (`"content-length": 12`). Scalars are stringified, arrays joined with
/// `", "`, nulls dropped.
pub(crate) fn lenient_headers<'de, D>(deserializer: D) -> Result<HeaderMap, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<IndexMap<String, Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(raw
        .into_iter()
        .filter_map(|(name, value)| header_value(value).map(|v| (name, v)))
        .collect())
}

fn header_value(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        Value::Array(items) => Some(
            items
                .into_iter()
                .filter_map(header_value)
                .collect::<Vec<_>>()
                .join(", "),
        ),
        other => Some(other.to_string()),
    }
}

/// UTF-8 byte length of a captured body.
///
/// Strings are measured as-is, anything else by its JSON serialization.
/// `null` and unserializable values count as zero.
pub fn compute_body_size(body: &Value) -> u64 {
    match body {
        Value::Null => 0,
        Value::String(s) => s.len() as u64,
        other => serde_json::to_string(other)
            .map(|s| s.len() as u64)
            .unwrap_or(0),
    }
}

/// Render a captured body as text (strings verbatim, other values as JSON).
pub fn body_text(body: &Value) -> Option<String> {
    match body {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => serde_json::to_string(other).ok(),
    }
}

/// Request half of a capture record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapturedRequest {
    pub method: String,
    pub url: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub headers: HeaderMap,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub size: u64,
}

/// Response half of a capture record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapturedResponse {
    pub status: u16,
    #[serde(default, deserialize_with = "null_as_default")]
    pub headers: HeaderMap,
    #[serde(default, deserialize_with = "null_as_default")]
    pub body: String,
    #[serde(default)]
    pub size: u64,
}

/// One observed request/response pair with timing, as transmitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureRecord {
    pub id: u64,
    #[serde(with = "iso_millis")]
    pub timestamp: DateTime<Utc>,
    #[serde(with = "lenient_millis")]
    pub duration: u64,
    pub request: CapturedRequest,
    pub response: CapturedResponse,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRequestData {
    #[serde(default, deserialize_with = "null_as_default")]
    pub headers: HeaderMap,
    #[serde(default)]
    pub body: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredResponseData {
    #[serde(default, deserialize_with = "null_as_default")]
    pub headers: HeaderMap,
    #[serde(default)]
    pub body: Value,
}

/// A capture as held by the request store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredRequest {
    pub id: u64,
    #[serde(with = "iso_millis")]
    pub timestamp: DateTime<Utc>,
    pub method: String,
    pub url: String,
    pub status: u16,
    #[serde(with = "lenient_millis")]
    pub duration: u64,
    #[serde(default)]
    pub request_size: u64,
    #[serde(default)]
    pub response_size: u64,
    #[serde(default)]
    pub bookmarked: bool,
    pub request: StoredRequestData,
    pub response: StoredResponseData,
}

impl StoredRequest {
    /// Materialize a native-dialect record under an inspector-assigned id.
    pub fn from_capture(id: u64, record: CaptureRecord) -> Self {
        let CaptureRecord {
            timestamp,
            duration,
            request,
            response,
            ..
        } = record;
        Self {
            id,
            timestamp,
            method: request.method,
            url: request.url,
            status: response.status,
            duration,
            request_size: request.size,
            response_size: response.size,
            bookmarked: false,
            request: StoredRequestData {
                headers: request.headers,
                body: request.body.map(Value::String).unwrap_or(Value::Null),
            },
            response: StoredResponseData {
                headers: response.headers,
                body: Value::String(response.body),
            },
        }
    }

    /// Get duration as formatted string
    pub fn duration_str(&self) -> String {
        if self.duration < 1000 {
            format!("{}ms", self.duration)
        } else {
            format!("{:.1}s", self.duration as f64 / 1000.0)
        }
    }

    /// Get response size as formatted string
    pub fn size_str(&self) -> String {
        format_bytes(self.response_size)
    }
}

pub fn format_bytes(size: u64) -> String {
    if size < 1024 {
        format!("{}B", size)
    } else if size < 1024 * 1024 {
        format!("{:.1}KB", size as f64 / 1024.0)
    } else {
        format!("{:.1}MB", size as f64 / (1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn body_size_counts_utf8_bytes_not_chars() {
        assert_eq!(compute_body_size(&json!("héllo")), 6);
        assert_eq!(compute_body_size(&json!("日本")), 6);
    }

    #[test]
    fn body_size_serializes_structured_values() {
        assert_eq!(compute_body_size(&json!({"name": "test"})), 15);
        assert_eq!(compute_body_size(&json!([1, 2, 3])), 7);
        assert_eq!(compute_body_size(&json!(42)), 2);
    }

    #[test]
    fn body_size_of_null_is_zero() {
        assert_eq!(compute_body_size(&Value::Null), 0);
    }

    #[test]
    fn capture_materializes_with_bookmark_cleared() {
        let record: CaptureRecord = serde_json::from_value(json!({
            "id": 7,
            "timestamp": "2025-01-15T12:00:00.000Z",
            "duration": 42,
            "request": {"method": "POST", "url": "https://x/y", "headers": {"a": "1"}, "body": "hi", "size": 2},
            "response": {"status": 201, "headers": {}, "body": "ok", "size": 2}
        }))
        .unwrap();

        let stored = StoredRequest::from_capture(99, record);
        assert_eq!(stored.id, 99);
        assert_eq!(stored.method, "POST");
        assert_eq!(stored.status, 201);
        assert_eq!(stored.request.body, json!("hi"));
        assert_eq!(stored.response.body, json!("ok"));
        assert!(!stored.bookmarked);
    }

    #[test]
    fn null_headers_deserialize_as_empty() {
        let data: StoredRequestData =
            serde_json::from_value(json!({"headers": null, "body": null})).unwrap();
        assert!(data.headers.is_empty());
        assert_eq!(data.body, Value::Null);
    }

    #[test]
    fn formats_sizes_and_durations() {
        assert_eq!(format_bytes(512), "512B");
        assert_eq!(format_bytes(2048), "2.0KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0MB");
    }
}
