//! Ingestion server
//!
//! Accepts capture clients over WebSocket, decodes both wire dialects and
//! feeds materialized requests into the store.

mod ingest;
mod listener;
mod registry;

pub use ingest::IngestionContext;
pub use listener::{IngestionServer, ServerHandle};
pub use registry::{ClientRegistry, ConnectionId};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Port {port} is already in use. Set a different port in .netwatchrc or NETWATCH_PORT env var.")]
    AddressInUse { port: u16 },

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
