//! Wire protocol
//!
//! Frames are JSON text, one message per frame, discriminated by `type`.
//! Two dialects share the socket: the native `netwatch.*` messages and the
//! legacy `client.intro` / `api.response` messages sent by older reporters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::request::{lenient_headers, CaptureRecord, HeaderMap};
use super::timestamp::{iso_millis, number_to_millis};

/// Identity announcement sent by a client when its channel opens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HelloMessage {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
}

/// Messages a capture client sends.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "netwatch.hello")]
    Hello(HelloMessage),
    #[serde(rename = "netwatch.request")]
    Request(CaptureRecord),
}

impl ClientMessage {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Acknowledgements the inspector sends back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerReply {
    #[serde(rename = "netwatch.welcome")]
    Welcome,
    #[serde(rename = "server.intro", rename_all = "camelCase")]
    ServerIntro {
        message_id: u64,
        #[serde(with = "iso_millis")]
        date: DateTime<Utc>,
    },
}

impl ServerReply {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Legacy `client.intro` frame. Only the identity fields of the payload
/// matter; reporter version and the rest are ignored.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LegacyIntro {
    pub payload: HelloMessage,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LegacyRequest {
    #[serde(default = "default_method")]
    pub method: String,
    pub url: String,
    #[serde(default, deserialize_with = "lenient_headers")]
    pub headers: HeaderMap,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub data: Value,
}

fn default_method() -> String {
    "GET".to_string()
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LegacyResponse {
    pub status: u16,
    #[serde(default, deserialize_with = "lenient_headers")]
    pub headers: HeaderMap,
    #[serde(default)]
    pub body: Value,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LegacyPayload {
    #[serde(default)]
    pub duration: Option<Value>,
    pub request: LegacyRequest,
    pub response: LegacyResponse,
}

/// Legacy `api.response` frame.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LegacyApiResponse {
    #[serde(with = "iso_millis")]
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub duration: Option<Value>,
    pub payload: LegacyPayload,
}

impl LegacyApiResponse {
    /// Reporters disagree on where `duration` lives; the frame level wins.
    pub fn duration_ms(&self) -> u64 {
        self.duration
            .as_ref()
            .and_then(number_to_millis)
            .or_else(|| self.payload.duration.as_ref().and_then(number_to_millis))
            .unwrap_or(0)
    }
}

/// Every frame the inspector understands, across both dialects.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum InboundMessage {
    #[serde(rename = "netwatch.hello")]
    Hello(HelloMessage),
    #[serde(rename = "netwatch.request")]
    Request(CaptureRecord),
    #[serde(rename = "client.intro")]
    ClientIntro(LegacyIntro),
    #[serde(rename = "api.response")]
    ApiResponse(LegacyApiResponse),
    /// A well-formed frame of a type nobody handles (`state.*`, `log`, ...).
    #[serde(other)]
    Unrecognized,
}

impl InboundMessage {
    /// Decode one text frame. Malformed frames yield `None`.
    pub fn parse(frame: &str) -> Option<Self> {
        match serde_json::from_str(frame) {
            Ok(message) => Some(message),
            Err(err) => {
                tracing::debug!("Discarding malformed frame: {err}");
                None
            }
        }
    }
}
