//! Core state machine of the relay: clients, channels, registries, and the
//! shared worker pool

pub mod channel;
pub mod channel_registry;
pub mod client;
pub mod client_registry;
pub mod thread_pool;

// Re-export main components for convenience
pub use channel::{Channel, ChannelView, JoinResult, ModerationResult, UpdateKind};
pub use channel_registry::ChannelRegistry;
pub use client::{Client, TransportHandle};
pub use client_registry::ClientRegistry;
pub use thread_pool::{create_thread_pool, SharedThreadPool, ThreadPool};
