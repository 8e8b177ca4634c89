//! Capture client
//!
//! Runs inside the instrumented application: the interceptor observes HTTP
//! calls and the session channel streams the resulting records to the
//! inspector.

pub mod backoff;
pub mod channel;
pub mod interceptor;
pub mod transport;

pub use channel::{ChannelOptions, ChannelState, SessionChannel};
pub use interceptor::{
    patch, CaptureCallback, CaptureClient, RequestDescriptor, RequestInit, RequestInput, Unpatch,
};
pub use transport::Transport;

use std::sync::Arc;
use thiserror::Error;

use crate::models::{CaptureRecord, ClientMessage};

#[derive(Debug, Error)]
pub enum SendError {
    #[error("outbound queue is full ({capacity} messages)")]
    QueueFull { capacity: usize },

    #[error("session channel is disconnected")]
    Disconnected,

    #[error("session channel needs a tokio runtime")]
    NoRuntime,

    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default)]
pub struct ConnectOptions {
    pub channel: ChannelOptions,
    /// URL patterns never captured (substring, glob or `/regex/`)
    pub ignored_urls: Vec<String>,
}

/// A connected capture client: an instrumented transport plus the channel
/// its records travel over.
pub struct NetwatchClient<T> {
    http: CaptureClient<T>,
    unpatch: Unpatch,
    channel: Arc<SessionChannel>,
}

/// Open a session channel and instrument `transport` so that every captured
/// call is sent over it. Fails with [`SendError::NoRuntime`] outside a
/// tokio runtime.
pub fn connect<T: Transport>(options: ConnectOptions, transport: T) -> Result<NetwatchClient<T>, SendError> {
    let channel = Arc::new(SessionChannel::connect(options.channel)?);

    let sink = Arc::clone(&channel);
    let callback: CaptureCallback = Arc::new(move |record: CaptureRecord| {
        if let Err(e) = sink.send(&ClientMessage::Request(record)) {
            tracing::debug!("Capture not sent: {}", e);
        }
    });
    let (http, unpatch) = patch(transport, callback, &options.ignored_urls);

    Ok(NetwatchClient {
        http,
        unpatch,
        channel,
    })
}

impl<T: Transport> NetwatchClient<T> {
    /// The instrumented transport to issue requests through.
    pub fn http(&self) -> &CaptureClient<T> {
        &self.http
    }

    pub fn channel(&self) -> &SessionChannel {
        &self.channel
    }

    /// Stop capturing and close the channel. Safe to call repeatedly.
    pub fn disconnect(&self) {
        self.unpatch.restore();
        self.channel.disconnect();
    }
}
