//! Request storage, export and session persistence

mod curl;
mod export;
mod har;
mod request_store;
pub mod session;
mod stats;

pub use curl::to_curl;
pub use export::{export_to_dir, export_to_file, render, requests_to_json, ExportFormat};
pub use har::requests_to_har;
pub use request_store::{
    RequestList, RequestStore, StoreConfig, StoreEvent, DEFAULT_BATCH_INTERVAL,
    DEFAULT_MAX_REQUESTS,
};
pub use session::{has_session, load_session, load_session_from, save_session, save_session_to};
pub use stats::RequestStats;
