//! Registry mapping transport handles to client records
//!
//! One shared-exclusive lock covers both transport maps so the capacity
//! count is always taken over a consistent view.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use log::debug;
use tokio::sync::RwLock;

use crate::core::client::{Client, Outbound, TransportHandle};

#[derive(Default)]
struct Directory {
    tcp: HashMap<u64, Arc<Client>>,
    ws: HashMap<u64, Arc<Client>>,
}

impl Directory {
    fn len(&self) -> usize {
        self.tcp.len() + self.ws.len()
    }
}

/// Sole strong owner of all client records.
pub struct ClientRegistry {
    max_clients: usize,
    next_id: AtomicU32,
    directory: RwLock<Directory>,
}

impl ClientRegistry {
    pub fn new(max_clients: usize) -> Self {
        Self {
            max_clients,
            next_id: AtomicU32::new(1),
            directory: RwLock::new(Directory::default()),
        }
    }

    /// Register a new TCP connection under its transport token.
    pub async fn add_tcp(&self, token: u64, sender: Outbound) -> Arc<Client> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let client = Arc::new(Client::new(id, TransportHandle::Tcp(token), sender));
        self.directory.write().await.tcp.insert(token, client.clone());
        debug!("Client registered: {} (tcp token {})", id, token);
        client
    }

    /// Register a new WebSocket connection under its transport token.
    pub async fn add_ws(&self, token: u64, sender: Outbound) -> Arc<Client> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let client = Arc::new(Client::new(id, TransportHandle::Ws(token), sender));
        self.directory.write().await.ws.insert(token, client.clone());
        debug!("Client registered: {} (ws token {})", id, token);
        client
    }

    pub async fn find(&self, handle: TransportHandle) -> Option<Arc<Client>> {
        let directory = self.directory.read().await;
        match handle {
            TransportHandle::Tcp(token) => directory.tcp.get(&token).cloned(),
            TransportHandle::Ws(token) => directory.ws.get(&token).cloned(),
        }
    }

    /// Drop the registry's strong reference; the record is destroyed once
    /// the last outstanding use clears.
    pub async fn remove(&self, handle: TransportHandle) {
        let mut directory = self.directory.write().await;
        let removed = match handle {
            TransportHandle::Tcp(token) => directory.tcp.remove(&token),
            TransportHandle::Ws(token) => directory.ws.remove(&token),
        };
        if let Some(client) = removed {
            debug!("Client unregistered: {}", client.id);
        }
    }

    /// Whether a client with this id is currently registered on either
    /// transport. Used to validate invitation and ban targets.
    pub async fn contains_id(&self, client_id: u32) -> bool {
        let directory = self.directory.read().await;
        directory.tcp.values().any(|c| c.id == client_id)
            || directory.ws.values().any(|c| c.id == client_id)
    }

    pub async fn client_count(&self) -> usize {
        self.directory.read().await.len()
    }

    /// Capacity is counted across both transports.
    pub async fn has_capacity(&self) -> bool {
        self.directory.read().await.len() < self.max_clients
    }

    /// Snapshot of every registered client, for server-wide fan-out.
    pub async fn all_clients(&self) -> Vec<Arc<Client>> {
        let directory = self.directory.read().await;
        directory
            .tcp
            .values()
            .chain(directory.ws.values())
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn outbound() -> Outbound {
        let (tx, rx) = mpsc::unbounded_channel();
        std::mem::forget(rx);
        tx
    }

    #[tokio::test]
    async fn test_ids_are_monotonic_across_transports() {
        let registry = ClientRegistry::new(10);
        let a = registry.add_tcp(100, outbound()).await;
        let b = registry.add_ws(200, outbound()).await;
        let c = registry.add_tcp(101, outbound()).await;

        assert_eq!(a.id, 1);
        assert_eq!(b.id, 2);
        assert_eq!(c.id, 3);
    }

    #[tokio::test]
    async fn test_find_and_remove() {
        let registry = ClientRegistry::new(10);
        let client = registry.add_tcp(9, outbound()).await;

        let found = registry.find(TransportHandle::Tcp(9)).await.unwrap();
        assert_eq!(found.id, client.id);

        registry.remove(TransportHandle::Tcp(9)).await;
        assert!(registry.find(TransportHandle::Tcp(9)).await.is_none());
    }

    #[tokio::test]
    async fn test_ids_not_reused_after_remove() {
        let registry = ClientRegistry::new(10);
        let first = registry.add_tcp(1, outbound()).await;
        registry.remove(TransportHandle::Tcp(1)).await;
        let second = registry.add_tcp(2, outbound()).await;
        assert!(second.id > first.id);
    }

    #[tokio::test]
    async fn test_capacity_counts_both_transports() {
        let registry = ClientRegistry::new(2);
        registry.add_tcp(1, outbound()).await;
        assert!(registry.has_capacity().await);
        registry.add_ws(1, outbound()).await;
        assert!(!registry.has_capacity().await);
        assert_eq!(registry.client_count().await, 2);
    }

    #[tokio::test]
    async fn test_contains_id() {
        let registry = ClientRegistry::new(10);
        let client = registry.add_ws(5, outbound()).await;
        assert!(registry.contains_id(client.id).await);
        assert!(!registry.contains_id(999).await);
    }
}
