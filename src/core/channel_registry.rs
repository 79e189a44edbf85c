//! Registry owning every channel, keyed by channel id

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use log::debug;
use tokio::sync::RwLock;

use crate::core::channel::{Channel, ChannelView};
use crate::core::thread_pool::SharedThreadPool;

/// Exclusive owner of all channels. Lookups take the lock shared;
/// creation and destruction take it exclusive.
pub struct ChannelRegistry {
    max_channels: usize,
    next_id: AtomicU32,
    pool: SharedThreadPool,
    channels: RwLock<HashMap<u32, Arc<Channel>>>,
}

impl ChannelRegistry {
    pub fn new(max_channels: usize, pool: SharedThreadPool) -> Self {
        Self {
            max_channels,
            next_id: AtomicU32::new(1),
            pool,
            channels: RwLock::new(HashMap::new()),
        }
    }

    pub async fn has_capacity(&self) -> bool {
        self.channels.read().await.len() < self.max_channels
    }

    /// Create a channel and return its info bytes, or None when the
    /// registry is at capacity.
    pub async fn create(&self, name: String, secret: bool) -> Option<Vec<u8>> {
        let mut channels = self.channels.write().await;
        if channels.len() >= self.max_channels {
            return None;
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let channel = Channel::new(id, name, secret, self.pool.clone());
        let info = channel.info();
        channels.insert(id, channel);
        Some(info)
    }

    pub async fn find(&self, channel_id: u32) -> Option<Arc<Channel>> {
        self.channels.read().await.get(&channel_id).cloned()
    }

    /// Remove a channel and run its destruction sequence. Returns false
    /// when no such channel exists.
    pub async fn remove(&self, channel_id: u32) -> bool {
        let removed = self.channels.write().await.remove(&channel_id);
        match removed {
            Some(channel) => {
                debug!("channel {} flagged for deletion", channel_id);
                channel.destroy().await;
                true
            }
            None => false,
        }
    }

    /// Snapshot of every channel for the CH_LIST response, ordered by id.
    pub async fn list_views(&self) -> Vec<ChannelView> {
        let mut views: Vec<ChannelView> = self
            .channels
            .read()
            .await
            .values()
            .map(|channel| channel.view())
            .collect();
        views.sort_by_key(|view| view.id);
        views
    }

    pub async fn channel_count(&self) -> usize {
        self.channels.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::thread_pool::ThreadPool;

    fn pool() -> SharedThreadPool {
        Arc::new(ThreadPool::new(5, 100).unwrap())
    }

    #[tokio::test]
    async fn test_create_assigns_sequential_ids() {
        let registry = ChannelRegistry::new(4, pool());
        let first = registry.create("general".into(), false).await.unwrap();
        let second = registry.create("random".into(), true).await.unwrap();

        assert_eq!(&first[0..4], &1u32.to_le_bytes());
        assert_eq!(&second[0..4], &2u32.to_le_bytes());
        assert_eq!(second[4], 1);
    }

    #[tokio::test]
    async fn test_capacity_limit() {
        let registry = ChannelRegistry::new(1, pool());
        assert!(registry.has_capacity().await);
        assert!(registry.create("general".into(), false).await.is_some());
        assert!(!registry.has_capacity().await);
        assert!(registry.create("overflow".into(), false).await.is_none());
    }

    #[tokio::test]
    async fn test_remove_then_find_returns_none() {
        let registry = ChannelRegistry::new(4, pool());
        registry.create("general".into(), false).await.unwrap();

        assert!(registry.find(1).await.is_some());
        assert!(registry.remove(1).await);
        assert!(registry.find(1).await.is_none());
        assert!(!registry.remove(1).await);
    }

    #[tokio::test]
    async fn test_list_views_sorted() {
        let registry = ChannelRegistry::new(4, pool());
        registry.create("alpha".into(), false).await.unwrap();
        registry.create("beta".into(), true).await.unwrap();
        registry.create("gamma".into(), false).await.unwrap();

        let views = registry.list_views().await;
        assert_eq!(views.len(), 3);
        assert_eq!(
            views.iter().map(|v| v.id).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(views[1].name, "beta");
        assert!(views[1].secret);
    }
}
