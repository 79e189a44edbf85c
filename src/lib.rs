//! Chat Relay - a multi-tenant in-memory chat relay
//!
//! Clients connect over raw TCP or WebSocket, claim a username, then
//! create, join and talk in named channels. The server owns all state;
//! delivery is best-effort to the members connected at broadcast time.

pub mod config;
pub mod constants;
pub mod core;
pub mod error;
pub mod protocol;
pub mod transport;

// Re-export main components
pub use config::ServerConfig;
pub use error::{ChatRelayError, Result};
