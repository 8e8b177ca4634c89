//! Request replay functionality
//!
//! Re-issues a previously captured request as an independent round trip.
//! Nothing is captured or stored; the outcome is returned to the caller.

use crate::models::{body_text, method_carries_body, StoredRequest};
use std::time::Instant;

/// Result of a replay operation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplayResult {
    /// Whether a response was received
    pub success: bool,
    /// HTTP status code of the response
    pub status: Option<u16>,
    /// Wall-clock time of the round trip in milliseconds
    pub duration: u64,
    /// Response body text
    pub response: Option<String>,
    /// Error message if replay failed
    pub error: Option<String>,
}

impl ReplayResult {
    fn failed(error: impl ToString, started: Instant) -> Self {
        Self {
            success: false,
            duration: started.elapsed().as_millis() as u64,
            error: Some(error.to_string()),
            ..Default::default()
        }
    }
}

/// Replay a stored request with its original method, headers and body.
///
/// Failures (invalid method, connection errors) are reported in the result
/// rather than returned as errors.
pub async fn replay_request(request: &StoredRequest) -> ReplayResult {
    match reqwest::Client::builder().build() {
        Ok(client) => replay_with_client(&client, request).await,
        Err(e) => ReplayResult::failed(format!("Failed to create HTTP client: {}", e), Instant::now()),
    }
}

pub async fn replay_with_client(client: &reqwest::Client, request: &StoredRequest) -> ReplayResult {
    let started = Instant::now();

    let method = match reqwest::Method::from_bytes(request.method.to_uppercase().as_bytes()) {
        Ok(method) => method,
        Err(_) => {
            return ReplayResult::failed(
                format!("Unsupported HTTP method: {}", request.method),
                started,
            )
        }
    };

    let mut request_builder = client.request(method, &request.url);

    for (key, value) in &request.request.headers {
        if let Ok(header_name) = reqwest::header::HeaderName::try_from(key.as_str()) {
            if let Ok(header_value) = reqwest::header::HeaderValue::from_str(value) {
                request_builder = request_builder.header(header_name, header_value);
            }
        }
    }

    if method_carries_body(&request.method) {
        if let Some(body) = body_text(&request.request.body) {
            request_builder = request_builder.body(body);
        }
    }

    let response = match request_builder.send().await {
        Ok(response) => response,
        Err(e) => {
            tracing::debug!("Replay of {} failed: {}", request.url, e);
            return ReplayResult::failed(e, started);
        }
    };

    let status = response.status().as_u16();
    match response.text().await {
        Ok(text) => ReplayResult {
            success: true,
            status: Some(status),
            duration: started.elapsed().as_millis() as u64,
            response: Some(text),
            error: None,
        },
        Err(e) => ReplayResult {
            status: Some(status),
            ..ReplayResult::failed(e, started)
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{HeaderMap, StoredRequestData, StoredResponseData};
    use chrono::Utc;
    use serde_json::{json, Value};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn stored(method: &str, url: String, body: Value) -> StoredRequest {
        let mut headers = HeaderMap::new();
        headers.insert("x-replay".into(), "yes".into());
        StoredRequest {
            id: 1,
            timestamp: Utc::now(),
            method: method.into(),
            url,
            status: 200,
            duration: 0,
            request_size: 0,
            response_size: 0,
            bookmarked: false,
            request: StoredRequestData { headers, body },
            response: StoredResponseData {
                headers: HeaderMap::new(),
                body: Value::Null,
            },
        }
    }

    /// Answers one request with a fixed body and hands back the raw request.
    async fn one_shot_server() -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 8192];
            let mut raw = String::new();
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                raw.push_str(&String::from_utf8_lossy(&buf[..n]));
                if n == 0 || request_complete(&raw) {
                    break;
                }
            }
            socket
                .write_all(b"HTTP/1.1 201 Created\r\ncontent-length: 7\r\nconnection: close\r\n\r\ncreated")
                .await
                .unwrap();
            raw
        });
        (format!("http://{addr}/items"), handle)
    }

    fn request_complete(raw: &str) -> bool {
        let Some(head_end) = raw.find("\r\n\r\n") else {
            return false;
        };
        let content_length = raw[..head_end]
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())
                    .flatten()
            })
            .unwrap_or(0);
        raw.len() >= head_end + 4 + content_length
    }

    #[tokio::test]
    async fn replays_method_headers_and_body() {
        let (url, server) = one_shot_server().await;
        let result = replay_request(&stored("POST", url, json!({"a": 1}))).await;

        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.status, Some(201));
        assert_eq!(result.response.as_deref(), Some("created"));

        let raw = server.await.unwrap();
        assert!(raw.starts_with("POST /items"));
        assert!(raw.contains("x-replay: yes"));
        assert!(raw.ends_with(r#"{"a":1}"#));
    }

    #[tokio::test]
    async fn get_requests_never_send_a_body() {
        let (url, server) = one_shot_server().await;
        let result = replay_request(&stored("GET", url, json!("ignored"))).await;
        assert!(result.success);
        let raw = server.await.unwrap();
        assert!(raw.ends_with("\r\n\r\n"));
    }

    #[tokio::test]
    async fn connection_failures_are_reported_not_raised() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = replay_request(&stored("GET", format!("http://{addr}/"), Value::Null)).await;
        assert!(!result.success);
        assert!(result.status.is_none());
        assert!(result.error.is_some());
    }
}
