//! Frame demultiplexing for both wire dialects.
//!
//! `IngestionContext` owns everything the ingestion path mutates: the
//! message counter, the identity registry, the exclusion list and the store
//! handle. Connections share it behind an `Arc`.

use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::registry::{ClientRegistry, ConnectionId};
use crate::filter::ExclusionList;
use crate::models::{
    compute_body_size, InboundMessage, LegacyApiResponse, ServerReply, StoredRequest,
    StoredRequestData, StoredResponseData,
};
use crate::storage::RequestStore;

pub struct IngestionContext {
    store: Arc<RequestStore>,
    exclusions: ExclusionList,
    registry: ClientRegistry,
    /// Shared by materialized request ids and legacy intro message ids.
    next_id: AtomicU64,
}

impl IngestionContext {
    pub fn new(store: Arc<RequestStore>, exclusions: ExclusionList) -> Self {
        Self {
            registry: ClientRegistry::new(Arc::clone(&store)),
            store,
            exclusions,
            next_id: AtomicU64::new(0),
        }
    }

    pub fn store(&self) -> &Arc<RequestStore> {
        &self.store
    }

    pub fn registry(&self) -> &ClientRegistry {
        &self.registry
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Handle one text frame from `conn`, returning the reply to send back
    /// if the frame calls for one. Malformed frames are dropped.
    pub fn handle_frame(&self, conn: ConnectionId, frame: &str) -> Option<ServerReply> {
        let message = InboundMessage::parse(frame)?;
        self.handle_message(conn, message)
    }

    pub fn handle_message(&self, conn: ConnectionId, message: InboundMessage) -> Option<ServerReply> {
        match message {
            InboundMessage::Hello(hello) => {
                self.registry.identify(conn, hello);
                Some(ServerReply::Welcome)
            }
            InboundMessage::ClientIntro(intro) => {
                self.registry.identify(conn, intro.payload);
                Some(ServerReply::ServerIntro {
                    message_id: self.next_id(),
                    date: Utc::now(),
                })
            }
            InboundMessage::Request(record) => {
                if self.is_excluded(&record.request.url) {
                    return None;
                }
                let stored = StoredRequest::from_capture(self.next_id(), record);
                self.store.add_request(stored);
                None
            }
            InboundMessage::ApiResponse(response) => {
                if self.is_excluded(&response.payload.request.url) {
                    return None;
                }
                let stored = self.materialize_legacy(response);
                self.store.add_request(stored);
                None
            }
            InboundMessage::Unrecognized => None,
        }
    }

    /// Make sure future ids are greater than `max_id`, e.g. after a session
    /// holding ids up to `max_id` was loaded into the store.
    pub fn reserve_ids_through(&self, max_id: u64) {
        self.next_id.fetch_max(max_id.saturating_add(1), Ordering::SeqCst);
    }

    pub fn connection_closed(&self, conn: ConnectionId) {
        self.registry.remove(conn);
    }

    fn is_excluded(&self, url: &str) -> bool {
        let excluded = self.exclusions.matches(url);
        if excluded {
            tracing::debug!("Ignoring excluded URL {}", url);
        }
        excluded
    }

    fn materialize_legacy(&self, response: LegacyApiResponse) -> StoredRequest {
        let duration = response.duration_ms();
        let LegacyApiResponse { date, payload, .. } = response;
        StoredRequest {
            id: self.next_id(),
            timestamp: date,
            method: payload.request.method,
            url: payload.request.url,
            status: payload.response.status,
            duration,
            request_size: compute_body_size(&payload.request.data),
            response_size: compute_body_size(&payload.response.body),
            bookmarked: false,
            request: StoredRequestData {
                headers: payload.request.headers,
                body: payload.request.data,
            },
            response: StoredResponseData {
                headers: payload.response.headers,
                body: payload.response.body,
            },
        }
    }
}
