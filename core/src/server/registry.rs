use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

use crate::models::HelloMessage;
use crate::storage::RequestStore;

/// Identifies one accepted socket for the lifetime of the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Connections that have announced themselves, and the aggregate
/// `connected` flag derived from them.
pub struct ClientRegistry {
    identified: Mutex<HashMap<ConnectionId, HelloMessage>>,
    store: Arc<RequestStore>,
}

impl ClientRegistry {
    pub fn new(store: Arc<RequestStore>) -> Self {
        Self {
            identified: Mutex::new(HashMap::new()),
            store,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ConnectionId, HelloMessage>> {
        self.identified.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record (or refresh) the identity of `conn`. Other identified
    /// connections are untouched.
    pub fn identify(&self, conn: ConnectionId, hello: HelloMessage) {
        let mut identified = self.lock();
        tracing::info!(
            "Client identified: {} ({})",
            hello.name,
            hello.platform.as_deref().unwrap_or("unknown platform")
        );
        self.store.set_connected(true, Some(hello.name.clone()));
        identified.insert(conn, hello);
    }

    /// Forget `conn`. The aggregate flag only drops once nobody is left.
    pub fn remove(&self, conn: ConnectionId) {
        let mut identified = self.lock();
        if let Some(hello) = identified.remove(&conn) {
            tracing::info!("Client disconnected: {}", hello.name);
        }
        if identified.is_empty() {
            self.store.set_connected(false, None);
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.lock().values().map(|h| h.name.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hello(name: &str) -> HelloMessage {
        HelloMessage {
            name: name.into(),
            platform: None,
        }
    }

    #[test]
    fn connected_until_last_identified_client_leaves() {
        let store = Arc::new(RequestStore::default());
        let registry = ClientRegistry::new(Arc::clone(&store));
        let (a, b) = (ConnectionId::new(), ConnectionId::new());

        registry.identify(a, hello("App A"));
        registry.identify(b, hello("App B"));
        assert_eq!(registry.len(), 2);
        assert!(store.connected());

        registry.remove(a);
        assert!(store.connected(), "one client remains");

        registry.remove(b);
        assert!(!store.connected());
        assert!(registry.is_empty());
    }

    #[test]
    fn repeated_hello_does_not_duplicate() {
        let store = Arc::new(RequestStore::default());
        let registry = ClientRegistry::new(Arc::clone(&store));
        let a = ConnectionId::new();
        registry.identify(a, hello("App"));
        registry.identify(a, hello("App"));
        assert_eq!(registry.len(), 1);
        assert_eq!(store.client_name().as_deref(), Some("App"));
    }

    #[test]
    fn closing_an_unidentified_connection_keeps_others() {
        let store = Arc::new(RequestStore::default());
        let registry = ClientRegistry::new(Arc::clone(&store));
        registry.identify(ConnectionId::new(), hello("App"));
        registry.remove(ConnectionId::new());
        assert!(store.connected());
    }
}
