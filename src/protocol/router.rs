//! Request router: maps decoded requests onto core operations and builds
//! exactly one response per request.
//!
//! The router owns no state of its own; registries and the pool are
//! injected so it can be driven directly in tests.

use std::sync::Arc;

use log::{debug, info};

use crate::constants::{CHANNEL_NAME_MAX, CHANNEL_NAME_MIN, RENAME_MAX, RENAME_MIN};
use crate::core::channel::{Channel, JoinResult, ModerationResult, UpdateKind};
use crate::core::channel_registry::ChannelRegistry;
use crate::core::client::Client;
use crate::core::client_registry::ClientRegistry;
use crate::core::thread_pool::SharedThreadPool;
use crate::protocol::packet::{u32_le, PacketType, Request, Response};

pub struct Router {
    clients: Arc<ClientRegistry>,
    channels: Arc<ChannelRegistry>,
    pool: SharedThreadPool,
    admin_secret: Option<String>,
}

impl Router {
    pub fn new(
        clients: Arc<ClientRegistry>,
        channels: Arc<ChannelRegistry>,
        pool: SharedThreadPool,
        admin_secret: Option<String>,
    ) -> Self {
        Self {
            clients,
            channels,
            pool,
            admin_secret,
        }
    }

    /// Dispatch one request. Failure responses carry id -1; successes echo
    /// the request id.
    pub async fn handle_request(&self, client: &Arc<Client>, request: Request) -> Response {
        if !client.is_connected() {
            if request.kind != PacketType::SvrConnect as u32 {
                debug!("not a connect request from client {}", client.id);
                return Response::new(-1, PacketType::SvrConnect, "Connection needed");
            }
            return self.handle_connect(client, &request);
        }

        match PacketType::from_u32(request.kind) {
            Some(PacketType::ChList) => {
                debug!("CH_LIST request");
                self.list_channels(&request).await
            }
            Some(PacketType::ChCreate) => {
                debug!("CH_CREATE request");
                self.create_channel(client, &request).await
            }
            Some(PacketType::ChJoin) => self.join_channel(client, &request).await,
            Some(PacketType::ChLeave) => self.leave_channel(client, &request).await,
            Some(PacketType::ChMessage) => {
                debug!("CH_MESSAGE request");
                self.channel_message(client, &request).await
            }
            Some(PacketType::ChDelete) => self.delete_channel(client, &request).await,
            Some(
                kind @ (PacketType::ChInvite
                | PacketType::ChKick
                | PacketType::ChBan
                | PacketType::ChUnban
                | PacketType::ChUpdate),
            ) => self.moderate(kind, client, &request).await,
            Some(PacketType::SvrMessage) => self.server_message(client, &request).await,
            Some(PacketType::SvrDisconnect) => {
                self.disconnect(client).await;
                Response::skip()
            }
            Some(PacketType::Heartbeat) => Response::empty(request.id, PacketType::Heartbeat),
            _ => {
                debug!("Unknown request type: {}", request.kind);
                Response::new(-1, PacketType::Error, "unknown request type")
            }
        }
    }

    /// First request on every connection: claim a username, optionally
    /// present the admin password.
    fn handle_connect(&self, client: &Arc<Client>, request: &Request) -> Response {
        let mut parts = request.payload.splitn(2, |b| *b == b'\n');
        let username = client.change_username(parts.next().unwrap_or_default());

        if let (Some(password), Some(secret)) = (parts.next(), self.admin_secret.as_deref()) {
            if password == secret.as_bytes() {
                client.grant_admin();
            }
        }

        client.set_connected(true);
        Response::new(request.id, PacketType::SvrConnect, username)
    }

    /// Remove the client across the whole relay: flag it disconnected,
    /// detach it from every channel, then drop the registry's strong
    /// reference.
    pub async fn disconnect(&self, client: &Arc<Client>) {
        client.set_connected(false);
        for channel_id in client.channel_ids() {
            if let Some(channel) = self.channels.find(channel_id).await {
                channel.leave(client.id);
            }
            client.remove_channel(channel_id);
        }
        self.clients.remove(client.handle).await;
        info!("{} disconnected from the server", client.username());
    }

    async fn list_channels(&self, request: &Request) -> Response {
        let views = self.channels.list_views().await;
        let mut bytes = Vec::new();
        for view in views {
            bytes.extend_from_slice(view.id.to_string().as_bytes());
            bytes.push(b'\n');
            bytes.push(view.secret as u8);
            bytes.push(b'\n');
            bytes.extend_from_slice(view.name.as_bytes());
            bytes.push(b'\n');
            // view separator
            bytes.push(0x00);
        }
        bytes.push(0x00);
        Response::new(request.id, PacketType::ChList, bytes)
    }

    async fn create_channel(&self, client: &Arc<Client>, request: &Request) -> Response {
        if !client.is_admin() {
            return Response::empty(-1, PacketType::PermissionDenied);
        }

        let (secret, name_bytes) = match request.payload.split_first() {
            Some((secret, rest)) => (*secret == 1, rest),
            None => return malformed(),
        };
        let name = match std::str::from_utf8(name_bytes) {
            Ok(name) if (CHANNEL_NAME_MIN..=CHANNEL_NAME_MAX).contains(&name.len()) => name,
            _ => {
                return Response::new(
                    -1,
                    PacketType::RequestRejected,
                    format!(
                        "channel name must be {}-{} bytes of UTF-8",
                        CHANNEL_NAME_MIN, CHANNEL_NAME_MAX
                    ),
                )
            }
        };

        match self.channels.create(name.to_string(), secret).await {
            Some(info) => Response::new(request.id, PacketType::ChCreate, info),
            None => Response::new(
                -1,
                PacketType::RequestRejected,
                "server channel capacity reached",
            ),
        }
    }

    async fn join_channel(&self, client: &Arc<Client>, request: &Request) -> Response {
        let channel_id = match u32_le(&request.payload) {
            Some(id) => id,
            None => return malformed(),
        };
        let channel = match self.channels.find(channel_id).await {
            Some(channel) => channel,
            None => return Response::new(-1, PacketType::NotFound, "Channel not found."),
        };

        let reason = match channel.join(client) {
            JoinResult::Success => {
                client.add_channel(channel_id);
                debug!("{} joined {}", client.username(), channel.name());
                return Response::new(request.id, PacketType::ChJoin, channel.info());
            }
            JoinResult::Banned => {
                format!("You are banned from channel {}", channel.name())
            }
            JoinResult::Full => format!("Channel is full: {}", channel.name()),
            JoinResult::Secret => format!(
                "You need an invitation to join this channel: {}",
                channel.name()
            ),
        };
        Response::new(-1, PacketType::ChJoin, reason)
    }

    async fn leave_channel(&self, client: &Arc<Client>, request: &Request) -> Response {
        if let Some(channel_id) = u32_le(&request.payload) {
            if let Some(channel) = self.channels.find(channel_id).await {
                client.remove_channel(channel_id);
                channel.leave(client.id);
                debug!("{} left {}", client.username(), channel.name());
                return Response::empty(request.id, PacketType::ChLeave);
            }
        }
        Response::empty(-1, PacketType::ChLeave)
    }

    async fn channel_message(&self, client: &Arc<Client>, request: &Request) -> Response {
        let payload = &request.payload;
        if payload.len() < 8 {
            return malformed();
        }
        let channel_id = match u32_le(&payload[0..4]) {
            Some(id) => id,
            None => return malformed(),
        };
        let reply_to = match u32_le(&payload[4..8]) {
            Some(id) => id,
            None => return malformed(),
        };
        let text = &payload[8..];

        if let Some(channel) = self.channels.find(channel_id).await {
            if client.is_member(channel_id) {
                channel.queue_message(client.id, reply_to, text);
                return Response::empty(request.id, PacketType::ChMessage);
            }
        }
        Response::empty(-1, PacketType::ChMessage)
    }

    async fn delete_channel(&self, client: &Arc<Client>, request: &Request) -> Response {
        if !client.is_admin() {
            return Response::empty(-1, PacketType::PermissionDenied);
        }
        let channel_id = match u32_le(&request.payload) {
            Some(id) => id,
            None => return malformed(),
        };
        if self.channels.remove(channel_id).await {
            Response::empty(request.id, PacketType::ChDelete)
        } else {
            Response::new(-1, PacketType::NotFound, "Channel not found.")
        }
    }

    /// Shared path for the targeted moderation requests; CH_UPDATE carries
    /// its own sub-kinds.
    async fn moderate(
        &self,
        kind: PacketType,
        client: &Arc<Client>,
        request: &Request,
    ) -> Response {
        let channel_id = match u32_le(&request.payload) {
            Some(id) => id,
            None => return malformed(),
        };
        let channel = match self.channels.find(channel_id).await {
            Some(channel) => channel,
            None => return Response::new(-1, PacketType::NotFound, "Channel not found."),
        };

        if kind == PacketType::ChUpdate {
            return self.update_channel(client, &channel, request).await;
        }

        let target_id = match read_u32(&request.payload, 4) {
            Some(id) => id,
            None => return malformed(),
        };

        let result = match kind {
            PacketType::ChInvite => {
                if !self.clients.contains_id(target_id).await {
                    return Response::new(-1, PacketType::NotFound, "Client not found.");
                }
                channel.invite(client, target_id)
            }
            PacketType::ChKick => channel.kick(client, target_id),
            PacketType::ChBan => {
                if !self.clients.contains_id(target_id).await {
                    return Response::new(-1, PacketType::NotFound, "Client not found.");
                }
                channel.ban(client, target_id)
            }
            PacketType::ChUnban => channel.unban(client, target_id),
            _ => return malformed(),
        };

        moderation_response(result, request.id, kind)
    }

    async fn update_channel(
        &self,
        client: &Arc<Client>,
        channel: &Arc<Channel>,
        request: &Request,
    ) -> Response {
        let kind_byte = match request.payload.get(4) {
            Some(byte) => *byte,
            None => return malformed(),
        };
        let data = &request.payload[5..];

        let result = match UpdateKind::from_u8(kind_byte) {
            Some(UpdateKind::Rename) => {
                let name = match std::str::from_utf8(data) {
                    Ok(name) if (RENAME_MIN..=RENAME_MAX).contains(&name.len()) => name,
                    _ => {
                        return Response::new(
                            -1,
                            PacketType::RequestRejected,
                            format!(
                                "channel name must be {}-{} bytes of UTF-8",
                                RENAME_MIN, RENAME_MAX
                            ),
                        )
                    }
                };
                channel.rename(client, name)
            }
            Some(UpdateKind::Pin) => {
                let message = String::from_utf8_lossy(data);
                channel.pin(client, &message)
            }
            Some(UpdateKind::Privacy) => channel.change_privacy(client),
            Some(UpdateKind::Promote) => match u32_le(data) {
                Some(target_id) => channel.promote(client, target_id),
                None => return malformed(),
            },
            None => return Response::new(-1, PacketType::Error, "unknown update kind"),
        };

        match result {
            // echo the update the requester asked for
            ModerationResult::Success => {
                Response::new(request.id, PacketType::ChUpdate, &request.payload)
            }
            ModerationResult::NotFound => Response::empty(-1, PacketType::NotFound),
            ModerationResult::Unauthorized => Response::empty(-1, PacketType::PermissionDenied),
        }
    }

    /// Admin-only server-wide notice, fanned out through the pool.
    async fn server_message(&self, client: &Arc<Client>, request: &Request) -> Response {
        if !client.is_admin() {
            return Response::empty(-1, PacketType::PermissionDenied);
        }

        let notice = Response::new(-1, PacketType::SvrMessage, &request.payload);
        let recipients = self.clients.all_clients().await;
        self.pool.execute(async move {
            for recipient in recipients {
                if recipient.is_connected() {
                    recipient.send_packet(&notice);
                }
            }
        });

        Response::empty(request.id, PacketType::SvrMessage)
    }
}

fn moderation_response(result: ModerationResult, request_id: i32, kind: PacketType) -> Response {
    match result {
        ModerationResult::Success => Response::empty(request_id, kind),
        ModerationResult::NotFound => Response::empty(-1, PacketType::NotFound),
        ModerationResult::Unauthorized => Response::empty(-1, PacketType::PermissionDenied),
    }
}

fn malformed() -> Response {
    Response::new(-1, PacketType::Error, "malformed request")
}

fn read_u32(payload: &[u8], offset: usize) -> Option<u32> {
    u32_le(payload.get(offset..)?)
}
