use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use crate::models::timestamp::to_iso_millis;
use crate::models::{HeaderMap, StoredRequest};

const HAR_VERSION: &str = "1.2";
const CREATOR_NAME: &str = "netwatch";
const CREATOR_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Serialize)]
struct HarLog<'a> {
    log: HarLogInner<'a>,
}

#[derive(Serialize)]
struct HarLogInner<'a> {
    version: &'static str,
    creator: HarCreator,
    entries: Vec<HarEntry<'a>>,
}

#[derive(Serialize)]
struct HarCreator {
    name: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HarEntry<'a> {
    started_date_time: String,
    time: u64,
    request: HarRequest<'a>,
    response: HarResponse<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HarRequest<'a> {
    method: &'a str,
    url: &'a str,
    headers: Vec<HarHeader<'a>>,
    body_size: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HarResponse<'a> {
    status: u16,
    headers: Vec<HarHeader<'a>>,
    content: HarContent<'a>,
    body_size: u64,
}

#[derive(Serialize)]
struct HarHeader<'a> {
    name: &'a str,
    value: &'a str,
}

#[derive(Serialize)]
struct HarContent<'a> {
    size: u64,
    text: &'a Value,
}

fn har_headers(headers: &HeaderMap) -> Vec<HarHeader<'_>> {
    headers
        .iter()
        .map(|(name, value)| HarHeader { name, value })
        .collect()
}

impl<'a> HarEntry<'a> {
    fn from(req: &'a StoredRequest) -> Self {
        Self {
            started_date_time: to_iso_millis(&req.timestamp),
            time: req.duration,
            request: HarRequest {
                method: &req.method,
                url: &req.url,
                headers: har_headers(&req.request.headers),
                body_size: req.request_size,
            },
            response: HarResponse {
                status: req.status,
                headers: har_headers(&req.response.headers),
                content: HarContent {
                    size: req.response_size,
                    text: &req.response.body,
                },
                body_size: req.response_size,
            },
        }
    }
}

/// Render requests as an HTTP Archive (HAR 1.2) document.
pub fn requests_to_har(requests: &[Arc<StoredRequest>]) -> serde_json::Result<String> {
    let entries = requests.iter().map(|r| HarEntry::from(r)).collect();
    serde_json::to_string_pretty(&HarLog {
        log: HarLogInner {
            version: HAR_VERSION,
            creator: HarCreator {
                name: CREATOR_NAME,
                version: CREATOR_VERSION,
            },
            entries,
        },
    })
}
