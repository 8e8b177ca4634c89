//! # netwatch
//!
//! HTTP traffic inspector for mobile and JS applications.
//!
//! ## Features
//!
//! - Capture client that wraps an HTTP transport and streams request records
//! - Reconnecting session channel with a bounded offline queue
//! - WebSocket ingestion server speaking the native and legacy dialects
//! - Batched, bounded request store with bookmarks and fuzzy filtering
//! - Export to HAR, JSON and cURL; resumable sessions
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────── application ────────────────┐
//! │  ┌─────────────┐        ┌────────────────┐  │
//! │  │ Interceptor │──────▶│ SessionChannel │  │
//! │  └─────────────┘        └───────┬────────┘  │
//! └─────────────────────────────────┼───────────┘
//!                                   │ ws (JSON frames)
//! ┌──────────────── inspector ──────┼───────────┐
//! │  ┌─────────────────┐    ┌───────▼────────┐  │
//! │  │  RequestStore   │◀───│ IngestionServer│  │
//! │  └────────┬────────┘    └────────────────┘  │
//! │           ▼                                  │
//! │   filter / export / session                  │
//! └──────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod client;
pub mod config;
pub mod filter;
pub mod models;
pub mod replay;
pub mod server;
pub mod storage;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
