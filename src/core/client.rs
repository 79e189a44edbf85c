//! Client record and its transport seam
//! The registry is the sole strong owner; channels hold weak references

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use log::{debug, warn};
use tokio::sync::mpsc;

use crate::protocol::packet::Response;

/// Identifies the transport connection a client arrived on.
///
/// Exactly one transport owns a client; the token is minted by the owning
/// adapter and is meaningless outside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportHandle {
    Tcp(u64),
    Ws(u64),
}

/// Outbound byte stream towards one client; the transport adapter drains it.
pub type Outbound = mpsc::UnboundedSender<Vec<u8>>;

/// Per-connection client record.
pub struct Client {
    pub id: u32,
    pub handle: TransportHandle,
    sender: Outbound,
    admin: AtomicBool,
    connected: AtomicBool,
    username: Mutex<String>,
    channels: Mutex<Vec<u32>>,
}

impl Client {
    pub fn new(id: u32, handle: TransportHandle, sender: Outbound) -> Self {
        Self {
            id,
            handle,
            sender,
            admin: AtomicBool::new(false),
            connected: AtomicBool::new(false),
            username: Mutex::new(format!("user0{}", id)),
            channels: Mutex::new(Vec::new()),
        }
    }

    /// Queue a framed packet for delivery. Never blocks; returns false when
    /// the transport side is gone.
    pub fn send_packet(&self, packet: &Response) -> bool {
        match self.sender.send(packet.bytes().to_vec()) {
            Ok(()) => true,
            Err(_) => {
                warn!("Failed to queue packet for client {}", self.id);
                false
            }
        }
    }

    pub fn username(&self) -> String {
        self.username.lock().map(|u| u.clone()).unwrap_or_default()
    }

    /// Set the username from raw payload bytes, suffixing the client id,
    /// and return the final form.
    pub fn change_username(&self, raw: &[u8]) -> String {
        let name = String::from_utf8_lossy(raw);
        let full = format!("{}{}", name, self.id);
        if let Ok(mut username) = self.username.lock() {
            *username = full.clone();
        }
        full
    }

    pub fn is_admin(&self) -> bool {
        self.admin.load(Ordering::Relaxed)
    }

    pub fn grant_admin(&self) {
        debug!("{} registered as an admin", self.username());
        self.admin.store(true, Ordering::Relaxed);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Relaxed);
        debug!(
            "{} connection status changed: {}",
            self.username(),
            connected
        );
    }

    /// Track channel membership on the client side.
    pub fn add_channel(&self, channel_id: u32) {
        if let Ok(mut channels) = self.channels.lock() {
            if !channels.contains(&channel_id) {
                channels.push(channel_id);
            }
        }
    }

    pub fn remove_channel(&self, channel_id: u32) {
        if let Ok(mut channels) = self.channels.lock() {
            channels.retain(|id| *id != channel_id);
        }
    }

    pub fn is_member(&self, channel_id: u32) -> bool {
        self.channels
            .lock()
            .map(|channels| channels.contains(&channel_id))
            .unwrap_or(false)
    }

    /// Snapshot of the channels this client belongs to.
    pub fn channel_ids(&self) -> Vec<u32> {
        self.channels.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        debug!("client destroyed {}", self.username());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::packet::PacketType;

    fn test_client(id: u32) -> (Client, mpsc::UnboundedReceiver<Vec<u8>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Client::new(id, TransportHandle::Tcp(id as u64), tx), rx)
    }

    #[test]
    fn test_default_username() {
        let (client, _rx) = test_client(7);
        assert_eq!(client.username(), "user07");
    }

    #[test]
    fn test_change_username_appends_id() {
        let (client, _rx) = test_client(1);
        let result = client.change_username(b"alice");
        assert_eq!(result, "alice1");
        assert_eq!(client.username(), "alice1");
    }

    #[test]
    fn test_membership_tracking() {
        let (client, _rx) = test_client(2);
        client.add_channel(4);
        client.add_channel(4);
        assert!(client.is_member(4));
        assert_eq!(client.channel_ids(), vec![4]);

        client.remove_channel(4);
        client.remove_channel(4);
        assert!(!client.is_member(4));
        assert!(client.channel_ids().is_empty());
    }

    #[test]
    fn test_send_packet_delivers_frame() {
        let (client, mut rx) = test_client(3);
        let packet = Response::new(1, PacketType::Heartbeat, []);
        assert!(client.send_packet(&packet));

        let bytes = rx.try_recv().unwrap();
        assert_eq!(bytes, packet.bytes());
    }

    #[test]
    fn test_send_packet_fails_after_receiver_drop() {
        let (client, rx) = test_client(4);
        drop(rx);
        assert!(!client.send_packet(&Response::empty(1, PacketType::Heartbeat)));
    }

    #[test]
    fn test_flags_default_off() {
        let (client, _rx) = test_client(5);
        assert!(!client.is_admin());
        assert!(!client.is_connected());

        client.grant_admin();
        client.set_connected(true);
        assert!(client.is_admin());
        assert!(client.is_connected());
    }
}
