use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

use super::ingest::IngestionContext;
use super::registry::ConnectionId;
use super::ServerError;

/// A bound but not yet running ingestion server.
pub struct IngestionServer {
    listener: TcpListener,
    context: Arc<IngestionContext>,
}

/// Handle to a running ingestion server.
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl IngestionServer {
    /// Bind `bind_address:port`. Port 0 picks an ephemeral port.
    pub async fn bind(
        bind_address: &str,
        port: u16,
        context: Arc<IngestionContext>,
    ) -> Result<Self, ServerError> {
        let addr = format!("{}:{}", bind_address, port);
        let listener = TcpListener::bind(&addr).await.map_err(|source| {
            if source.kind() == std::io::ErrorKind::AddrInUse {
                ServerError::AddressInUse { port }
            } else {
                ServerError::Bind { addr, source }
            }
        })?;
        Ok(Self { listener, context })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Start accepting connections on a background task.
    pub fn spawn(self) -> Result<ServerHandle, ServerError> {
        let local_addr = self.local_addr()?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(run_server(self.listener, self.context, shutdown_rx));
        tracing::info!("Ingestion server listening on {}", local_addr);
        Ok(ServerHandle {
            local_addr,
            shutdown_tx: Some(shutdown_tx),
            task,
        })
    }
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting connections and wait for the accept loop to exit.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        let _ = (&mut self.task).await;
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run_server(
    listener: TcpListener,
    context: Arc<IngestionContext>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let mut connections = tokio::task::JoinSet::new();
    loop {
        tokio::select! {
            _ = &mut shutdown_rx => break,
            accepted = listener.accept() => match accepted {
                Ok((socket, peer_addr)) => {
                    tracing::debug!("Connection from {}", peer_addr);
                    let context = Arc::clone(&context);
                    connections.spawn(async move {
                        let guard = ConnectionGuard::new(context);
                        let conn = guard.conn;
                        if let Err(e) = handle_connection(socket, conn, &guard.context).await {
                            tracing::debug!("Connection {} closed with error: {}", conn, e);
                        }
                    });
                }
                Err(e) => tracing::error!("Accept error: {}", e),
            },
            // Reap finished connection tasks.
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }
    drop(listener);
    connections.shutdown().await;
    tracing::info!("Ingestion server stopped");
}

/// Unregisters its connection when dropped, including when the connection
/// task is aborted by a server shutdown.
struct ConnectionGuard {
    conn: ConnectionId,
    context: Arc<IngestionContext>,
}

impl ConnectionGuard {
    fn new(context: Arc<IngestionContext>) -> Self {
        Self {
            conn: ConnectionId::new(),
            context,
        }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.context.connection_closed(self.conn);
    }
}

/// Process one client's frames strictly in receipt order.
async fn handle_connection(
    socket: TcpStream,
    conn: ConnectionId,
    context: &IngestionContext,
) -> anyhow::Result<()> {
    let ws = tokio_tungstenite::accept_async(socket).await?;
    let (mut write, mut read) = ws.split();

    while let Some(message) = read.next().await {
        let text = match message? {
            Message::Text(text) => text,
            Message::Binary(data) => match String::from_utf8(data) {
                Ok(text) => text,
                Err(_) => {
                    tracing::debug!("Discarding non-UTF-8 binary frame");
                    continue;
                }
            },
            Message::Close(_) => break,
            _ => continue,
        };

        if let Some(reply) = context.handle_frame(conn, &text) {
            write.send(Message::Text(reply.to_json()?)).await?;
        }
    }
    Ok(())
}
