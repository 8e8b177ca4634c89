//! Capture interceptor
//!
//! [`patch`] wraps a [`Transport`] so that every call through it produces a
//! [`CaptureRecord`] for the capture callback, while the caller receives the
//! untouched response. Excluded URLs, and every call after [`Unpatch::restore`],
//! go straight through.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use super::transport::Transport;
use crate::filter::ExclusionList;
use crate::models::{CaptureRecord, CapturedRequest, CapturedResponse, HeaderMap};

pub type CaptureCallback = Arc<dyn Fn(CaptureRecord) + Send + Sync>;

/// A request described as a single object, like a prepared request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestDescriptor {
    pub url: String,
    pub method: Option<String>,
    pub headers: HeaderMap,
    pub body: Option<String>,
}

/// Per-call overrides. Set fields replace the descriptor's.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestInit {
    pub method: Option<String>,
    pub headers: Option<HeaderMap>,
    pub body: Option<String>,
}

#[derive(Debug, Clone)]
pub enum RequestInput {
    Url(String),
    Parsed(reqwest::Url),
    Descriptor(RequestDescriptor),
}

impl From<&str> for RequestInput {
    fn from(url: &str) -> Self {
        RequestInput::Url(url.to_string())
    }
}

impl From<String> for RequestInput {
    fn from(url: String) -> Self {
        RequestInput::Url(url)
    }
}

impl From<reqwest::Url> for RequestInput {
    fn from(url: reqwest::Url) -> Self {
        RequestInput::Parsed(url)
    }
}

impl From<RequestDescriptor> for RequestInput {
    fn from(descriptor: RequestDescriptor) -> Self {
        RequestInput::Descriptor(descriptor)
    }
}

/// A request with every input form and override folded together.
#[derive(Debug, Clone, PartialEq)]
struct ResolvedRequest {
    method: String,
    url: String,
    headers: HeaderMap,
    body: Option<String>,
}

impl ResolvedRequest {
    fn resolve(input: RequestInput, init: RequestInit) -> Self {
        let (url, method, headers, body) = match input {
            RequestInput::Url(url) => (url, None, HeaderMap::new(), None),
            RequestInput::Parsed(url) => (url.to_string(), None, HeaderMap::new(), None),
            RequestInput::Descriptor(d) => (d.url, d.method, d.headers, d.body),
        };
        let headers = init.headers.unwrap_or(headers);
        Self {
            method: init
                .method
                .or(method)
                .unwrap_or_else(|| "GET".to_string())
                .to_uppercase(),
            url,
            headers: headers
                .into_iter()
                .map(|(k, v)| (k.to_ascii_lowercase(), v))
                .collect(),
            body: init.body.or(body),
        }
    }

    fn from_http(request: &http::Request<Bytes>) -> Self {
        let body = request.body();
        Self {
            method: request.method().as_str().to_uppercase(),
            url: request.uri().to_string(),
            headers: header_map(request.headers()),
            body: (!body.is_empty()).then(|| String::from_utf8_lossy(body).into_owned()),
        }
    }

    fn to_http(&self) -> anyhow::Result<http::Request<Bytes>> {
        let mut builder = http::Request::builder()
            .method(self.method.as_str())
            .uri(self.url.as_str());
        for (name, value) in &self.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let body = self.body.clone().map(Bytes::from).unwrap_or_default();
        Ok(builder.body(body)?)
    }
}

/// Flatten response headers, joining repeated names with `", "`.
fn header_map(headers: &http::HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        out.entry(name.as_str().to_string())
            .and_modify(|existing: &mut String| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert_with(|| value.clone());
    }
    out
}

/// Monotonic record ids for one capture client.
#[derive(Debug, Default)]
struct RecordIdGenerator(AtomicU64);

impl RecordIdGenerator {
    fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

struct CaptureState {
    active: AtomicBool,
    exclusions: ExclusionList,
    callback: CaptureCallback,
    ids: RecordIdGenerator,
}

/// A transport whose calls are observed and reported.
pub struct CaptureClient<T> {
    inner: T,
    state: Arc<CaptureState>,
}

/// Restore handle returned by [`patch`].
#[derive(Clone)]
pub struct Unpatch {
    state: Arc<CaptureState>,
}

impl Unpatch {
    /// Stop capturing. Calls made afterwards are pure pass-through.
    /// Returns false if already restored.
    pub fn restore(&self) -> bool {
        self.state.active.swap(false, Ordering::SeqCst)
    }

    pub fn is_patched(&self) -> bool {
        self.state.active.load(Ordering::SeqCst)
    }
}

/// Wrap `transport` so each non-excluded call reports a [`CaptureRecord`]
/// to `callback`.
pub fn patch<T, S>(transport: T, callback: CaptureCallback, ignored_urls: &[S]) -> (CaptureClient<T>, Unpatch)
where
    T: Transport,
    S: AsRef<str>,
{
    let state = Arc::new(CaptureState {
        active: AtomicBool::new(true),
        exclusions: ExclusionList::new(ignored_urls),
        callback,
        ids: RecordIdGenerator::default(),
    });
    let client = CaptureClient {
        inner: transport,
        state: Arc::clone(&state),
    };
    (client, Unpatch { state })
}

impl<T: Transport> CaptureClient<T> {
    pub fn inner(&self) -> &T {
        &self.inner
    }

    /// Issue a request, capturing it unless excluded or unpatched.
    pub async fn fetch(
        &self,
        input: impl Into<RequestInput>,
        init: Option<RequestInit>,
    ) -> anyhow::Result<http::Response<Bytes>> {
        let resolved = ResolvedRequest::resolve(input.into(), init.unwrap_or_default());
        let request = resolved.to_http()?;
        self.observe(resolved, request).await
    }

    async fn observe(
        &self,
        resolved: ResolvedRequest,
        request: http::Request<Bytes>,
    ) -> anyhow::Result<http::Response<Bytes>> {
        if !self.state.active.load(Ordering::SeqCst) || self.state.exclusions.matches(&resolved.url) {
            return self.inner.send(request).await;
        }

        let timestamp = Utc::now();
        let started = Instant::now();
        let response = self.inner.send(request).await?;
        let duration = started.elapsed().as_millis() as u64;

        // Bytes clones share the buffer; the caller's body is left as-is.
        let body = response.body().clone();
        let text = String::from_utf8_lossy(&body).into_owned();

        let ResolvedRequest {
            method,
            url,
            headers,
            body: request_body,
        } = resolved;
        let record = CaptureRecord {
            id: self.state.ids.next(),
            timestamp,
            duration,
            request: CapturedRequest {
                method,
                url,
                headers,
                size: request_body.as_ref().map_or(0, |b| b.len() as u64),
                body: request_body,
            },
            response: CapturedResponse {
                status: response.status().as_u16(),
                headers: header_map(response.headers()),
                size: text.len() as u64,
                body: text,
            },
        };
        (self.state.callback)(record);

        Ok(response)
    }
}

#[async_trait]
impl<T: Transport> Transport for CaptureClient<T> {
    async fn send(&self, request: http::Request<Bytes>) -> anyhow::Result<http::Response<Bytes>> {
        let resolved = ResolvedRequest::from_http(&request);
        self.observe(resolved, request).await
    }
}
