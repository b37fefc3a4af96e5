//! # Client Registry
//!
//! Membership of every live broker session, keyed by a per-connection id.
//!
//! Each member is reachable through a bounded channel drained by that
//! session's own writer task, so [`ClientRegistry::broadcast`] never performs
//! socket I/O. It holds the lock just long enough to snapshot the membership,
//! then hands the frame to each channel without waiting. A full channel
//! (slow peer) drops the frame for that peer only; a closed one belongs to a
//! session that is already tearing itself down and removing its own entry.

use bytes::Bytes;
use log::{debug, warn};
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::common::error::{RelayError, Result};
use crate::common::frame::UNKNOWN_CLIENT;

/// Default number of simultaneously connected clients.
pub const DEFAULT_MAX_CLIENTS: usize = 10;

/// Identity of one accepted connection.
pub type SessionId = Uuid;

/// Registry entry: how to reach one session.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    pub id: SessionId,
    pub peer: Option<SocketAddr>,
    pub client_id: String,
    outbound: mpsc::Sender<Bytes>,
}

impl ClientHandle {
    /// Create a handle and the receiver its writer task drains.
    pub fn new(peer: Option<SocketAddr>, buffer: usize) -> (Self, mpsc::Receiver<Bytes>) {
        let (outbound, rx) = mpsc::channel(buffer.max(1));
        let handle = Self {
            id: Uuid::new_v4(),
            peer,
            client_id: UNKNOWN_CLIENT.to_string(),
            outbound,
        };
        (handle, rx)
    }

    /// Queue a frame for this client, waiting for buffer space.
    ///
    /// Returns `false` if the client's writer has gone away.
    pub async fn deliver(&self, payload: Bytes) -> bool {
        self.outbound.send(payload).await.is_ok()
    }
}

/// Set of currently connected sessions.
pub struct ClientRegistry {
    clients: Mutex<HashMap<SessionId, ClientHandle>>,
    capacity: usize,
}

impl ClientRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Register a session.
    ///
    /// # Errors
    /// [`RelayError::RegistryFull`] when `capacity` sessions are already registered.
    pub async fn add(&self, handle: ClientHandle) -> Result<()> {
        let mut clients = self.clients.lock().await;
        if clients.len() >= self.capacity && !clients.contains_key(&handle.id) {
            return Err(RelayError::RegistryFull {
                capacity: self.capacity,
            });
        }
        clients.insert(handle.id, handle);
        Ok(())
    }

    /// Unregister a session. Returns whether it was present.
    pub async fn remove(&self, id: &SessionId) -> bool {
        self.clients.lock().await.remove(id).is_some()
    }

    /// Record the client id extracted from a session's credentials.
    pub async fn set_client_id(&self, id: &SessionId, client_id: &str) {
        if let Some(handle) = self.clients.lock().await.get_mut(id) {
            handle.client_id = client_id.to_string();
        }
    }

    /// Queue `payload` for every registered session except `exclude`.
    ///
    /// Returns the number of sessions the payload was queued for.
    pub async fn broadcast(&self, payload: Bytes, exclude: Option<SessionId>) -> usize {
        let targets: Vec<ClientHandle> = {
            let clients = self.clients.lock().await;
            clients
                .values()
                .filter(|handle| Some(handle.id) != exclude)
                .cloned()
                .collect()
        };

        let mut delivered = 0;
        for target in targets {
            match target.outbound.try_send(payload.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(
                        "⚠️  Client '{}' is not keeping up, dropping frame",
                        target.client_id
                    );
                }
                Err(TrySendError::Closed(_)) => {
                    debug!("🔌 Client '{}' is closing, skipped", target.client_id);
                }
            }
        }
        delivered
    }

    pub async fn len(&self) -> usize {
        self.clients.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.clients.lock().await.is_empty()
    }

    pub async fn contains(&self, id: &SessionId) -> bool {
        self.clients.lock().await.contains_key(id)
    }

    /// Client ids of all members, sorted.
    pub async fn client_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .clients
            .lock()
            .await
            .values()
            .map(|handle| handle.client_id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CLIENTS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_broadcast_excludes_sender() {
        let registry = ClientRegistry::new(4);
        let (a, mut rx_a) = ClientHandle::new(None, 8);
        let (b, mut rx_b) = ClientHandle::new(None, 8);
        let a_id = a.id;
        registry.add(a).await.unwrap();
        registry.add(b).await.unwrap();

        let delivered = registry.broadcast(Bytes::from_static(b"hello"), Some(a_id)).await;
        assert_eq!(delivered, 1);
        assert_eq!(rx_b.try_recv().unwrap(), Bytes::from_static(b"hello"));
        assert!(rx_a.try_recv().is_err());

        let delivered = registry.broadcast(Bytes::from_static(b"all"), None).await;
        assert_eq!(delivered, 2);
        assert_eq!(rx_a.try_recv().unwrap(), Bytes::from_static(b"all"));
        assert_eq!(rx_b.try_recv().unwrap(), Bytes::from_static(b"all"));
    }

    #[tokio::test]
    async fn test_capacity_is_enforced() {
        let registry = ClientRegistry::new(1);
        let (a, _rx_a) = ClientHandle::new(None, 1);
        let (b, _rx_b) = ClientHandle::new(None, 1);
        registry.add(a).await.unwrap();

        let err = registry.add(b).await.unwrap_err();
        assert!(matches!(err, RelayError::RegistryFull { capacity: 1 }));
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_slow_peer_does_not_block_others() {
        let registry = ClientRegistry::new(4);
        let (slow, _rx_slow) = ClientHandle::new(None, 1);
        let (fast, mut rx_fast) = ClientHandle::new(None, 8);
        registry.add(slow).await.unwrap();
        registry.add(fast).await.unwrap();

        registry.broadcast(Bytes::from_static(b"1"), None).await;
        let delivered = registry.broadcast(Bytes::from_static(b"2"), None).await;

        assert_eq!(delivered, 1);
        assert_eq!(rx_fast.try_recv().unwrap(), Bytes::from_static(b"1"));
        assert_eq!(rx_fast.try_recv().unwrap(), Bytes::from_static(b"2"));
        assert_eq!(registry.len().await, 2, "slow peer stays registered");
    }

    #[tokio::test]
    async fn test_closed_peer_is_skipped_not_removed() {
        let registry = ClientRegistry::new(4);
        let (gone, rx_gone) = ClientHandle::new(None, 4);
        let gone_id = gone.id;
        registry.add(gone).await.unwrap();
        drop(rx_gone);

        assert_eq!(registry.broadcast(Bytes::from_static(b"x"), None).await, 0);
        assert!(registry.contains(&gone_id).await);
        assert!(registry.remove(&gone_id).await);
        assert!(!registry.remove(&gone_id).await);
    }

    #[tokio::test]
    async fn test_concurrent_add_remove_broadcast() {
        let registry = Arc::new(ClientRegistry::new(128));
        let mut tasks = Vec::new();

        for _ in 0..64 {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                let (handle, mut rx) = ClientHandle::new(None, 256);
                let id = handle.id;
                registry.add(handle).await.unwrap();
                registry.broadcast(Bytes::from_static(b"ping"), Some(id)).await;
                while rx.try_recv().is_ok() {}
                id
            }));
        }

        let mut ids = Vec::new();
        for task in tasks {
            ids.push(task.await.unwrap());
        }
        assert_eq!(registry.len().await, 64);

        for id in &ids[..32] {
            assert!(registry.remove(id).await);
        }
        assert_eq!(registry.len().await, 32);
    }

    #[tokio::test]
    async fn test_client_ids_are_tracked() {
        let registry = ClientRegistry::default();
        let (a, _rx) = ClientHandle::new(None, 1);
        let id = a.id;
        registry.add(a).await.unwrap();
        assert_eq!(registry.client_ids().await, vec![UNKNOWN_CLIENT.to_string()]);

        registry.set_client_id(&id, "42").await;
        assert_eq!(registry.client_ids().await, vec!["42".to_string()]);
    }
}
