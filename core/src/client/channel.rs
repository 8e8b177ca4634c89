//! Reconnecting session channel
//!
//! Owns the client's socket lifecycle as an explicit state machine:
//!
//! ```text
//!   Connecting ──ok──▶ Open ──close──▶ Reconnecting ──delay──▶ Connecting
//!       │                                   ▲
//!       └──────────────fail─────────────────┘
//!   disconnect() from any state ──▶ Disconnected (terminal)
//! ```
//!
//! Messages sent while not open wait in a bounded FIFO queue. On every
//! successful connect the hello goes out first, then the queue in order.

use futures::{SinkExt, StreamExt};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

use super::backoff::{Backoff, INITIAL_BACKOFF, MAX_BACKOFF};
use super::SendError;
use crate::models::{ClientMessage, HelloMessage};

pub const DEFAULT_QUEUE_CAPACITY: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Connecting,
    Open,
    Reconnecting,
    Disconnected,
}

#[derive(Debug, Clone)]
pub struct ChannelOptions {
    pub host: String,
    pub port: u16,
    /// Name announced in the hello
    pub name: String,
    pub platform: Option<String>,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Messages held while not connected; further sends are rejected
    pub queue_capacity: usize,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 9090,
            name: "netwatch-client".to_string(),
            platform: None,
            initial_backoff: INITIAL_BACKOFF,
            max_backoff: MAX_BACKOFF,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl ChannelOptions {
    pub fn url(&self) -> String {
        format!("ws://{}:{}", self.host, self.port)
    }

    fn hello(&self) -> ClientMessage {
        ClientMessage::Hello(HelloMessage {
            name: self.name.clone(),
            platform: self.platform.clone(),
        })
    }
}

struct Shared {
    state: watch::Sender<ChannelState>,
    queue: VecDeque<String>,
    /// Writer for the live socket while open
    live: Option<mpsc::UnboundedSender<String>>,
    closed: bool,
}

impl Shared {
    /// Disconnected is terminal; later transitions from the driver are ignored.
    fn transition(&mut self, state: ChannelState) {
        if self.closed && state != ChannelState::Disconnected {
            return;
        }
        self.state.send_replace(state);
    }
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct SessionChannel {
    shared: Arc<Mutex<Shared>>,
    capacity: usize,
    state_rx: watch::Receiver<ChannelState>,
    shutdown_tx: Mutex<Option<oneshot::Sender<()>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SessionChannel {
    /// Start connecting in the background on the current tokio runtime.
    /// Fails with [`SendError::NoRuntime`] outside one.
    pub fn connect(options: ChannelOptions) -> Result<Self, SendError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| SendError::NoRuntime)?;
        let hello = options.hello().to_json()?;
        let (state_tx, state_rx) = watch::channel(ChannelState::Connecting);
        let shared = Arc::new(Mutex::new(Shared {
            state: state_tx,
            queue: VecDeque::with_capacity(options.queue_capacity),
            live: None,
            closed: false,
        }));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let backoff = Backoff::new(options.initial_backoff, options.max_backoff);
        let task = runtime.spawn(run_connection_loop(
            options.url(),
            hello,
            Arc::clone(&shared),
            backoff,
            shutdown_rx,
        ));

        Ok(Self {
            shared,
            capacity: options.queue_capacity,
            state_rx,
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            task: Mutex::new(Some(task)),
        })
    }

    /// Transmit now if open, otherwise queue. A full queue rejects the
    /// message and keeps the older ones.
    pub fn send(&self, message: &ClientMessage) -> Result<(), SendError> {
        let data = message.to_json()?;
        let mut shared = lock(&self.shared);
        if shared.closed {
            return Err(SendError::Disconnected);
        }

        let data = match (&shared.live, *shared.state.borrow() == ChannelState::Open) {
            (Some(live), true) => match live.send(data) {
                Ok(()) => return Ok(()),
                Err(returned) => returned.0,
            },
            _ => data,
        };

        if shared.queue.len() >= self.capacity {
            tracing::warn!("Outbound queue full ({}), dropping message", self.capacity);
            return Err(SendError::QueueFull {
                capacity: self.capacity,
            });
        }
        shared.queue.push_back(data);
        Ok(())
    }

    pub fn state(&self) -> ChannelState {
        *self.state_rx.borrow()
    }

    /// Receiver that observes every state transition.
    pub fn subscribe_state(&self) -> watch::Receiver<ChannelState> {
        self.state_rx.clone()
    }

    pub fn queue_len(&self) -> usize {
        lock(&self.shared).queue.len()
    }

    /// Enter the terminal state: cancel any reconnect timer, close the live
    /// socket and drop the queue. Safe to call repeatedly.
    pub fn disconnect(&self) {
        {
            let mut shared = lock(&self.shared);
            if shared.closed {
                return;
            }
            shared.closed = true;
            shared.queue.clear();
            shared.live = None;
            shared.transition(ChannelState::Disconnected);
        }
        if let Some(tx) = self
            .shutdown_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            let _ = tx.send(());
        }
        tracing::info!("Session channel disconnected");
    }

    /// Disconnect and wait for the background task to finish.
    pub async fn shutdown(&self) {
        self.disconnect();
        let task = self.task.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

impl Drop for SessionChannel {
    fn drop(&mut self) {
        self.disconnect();
    }
}

async fn run_connection_loop(
    url: String,
    hello: String,
    shared: Arc<Mutex<Shared>>,
    mut backoff: Backoff,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    loop {
        lock(&shared).transition(ChannelState::Connecting);

        let attempt = tokio::select! {
            result = tokio_tungstenite::connect_async(url.as_str()) => result,
            _ = &mut shutdown_rx => break,
        };

        match attempt {
            Ok((ws, _)) => {
                tracing::info!("Connected to inspector at {}", url);
                backoff.reset();

                let (tx, rx) = mpsc::unbounded_channel();
                {
                    let mut guard = lock(&shared);
                    if guard.closed {
                        break;
                    }
                    // Hello first, then everything queued while offline.
                    let _ = tx.send(hello.clone());
                    for message in guard.queue.drain(..) {
                        let _ = tx.send(message);
                    }
                    guard.live = Some(tx);
                    guard.transition(ChannelState::Open);
                }

                let shutdown_requested = run_message_loop(ws, rx, &mut shutdown_rx).await;
                lock(&shared).live = None;
                if shutdown_requested {
                    break;
                }
                tracing::warn!("Lost connection to inspector at {}", url);
            }
            Err(e) => {
                tracing::warn!("Failed to connect to inspector at {}: {}", url, e);
            }
        }

        lock(&shared).transition(ChannelState::Reconnecting);
        let delay = backoff.next_delay();
        tracing::info!("Reconnecting in {:.1}s...", delay.as_secs_f32());

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = &mut shutdown_rx => break,
        }
    }
}

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Pump queued text out and drain inbound acks. Returns true when the
/// channel was shut down rather than the socket lost.
async fn run_message_loop(
    ws: WsStream,
    mut outgoing: mpsc::UnboundedReceiver<String>,
    shutdown_rx: &mut oneshot::Receiver<()>,
) -> bool {
    let (mut write, mut read) = ws.split();
    loop {
        tokio::select! {
            biased;
            _ = &mut *shutdown_rx => {
                let _ = write.send(Message::Close(None)).await;
                return true;
            }
            message = outgoing.recv() => match message {
                Some(text) => {
                    if let Err(e) = write.send(Message::Text(text)).await {
                        tracing::debug!("Send failed: {}", e);
                        return false;
                    }
                }
                // Only disconnect() drops the writer while open.
                None => {
                    let _ = write.send(Message::Close(None)).await;
                    return true;
                }
            },
            incoming = read.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return false,
                Some(Ok(_)) => {}
            },
        }
    }
}
