//! Channel state: membership, moderation, privacy, invitations, and the
//! per-channel broadcast pipeline.
//!
//! A channel never owns its clients. The roster stores `(client_id, Weak)`
//! pairs; every dereference handles the record being gone already, and
//! stale entries are pruned when the roster is snapshotted.

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Mutex, Weak};

use log::debug;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::constants::{CHANNEL_CAPACITY, MAX_MODERATORS};
use crate::core::client::Client;
use crate::core::thread_pool::SharedThreadPool;
use crate::protocol::packet::{PacketType, Response};

/// Outcome of a join attempt, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinResult {
    Success,
    Banned,
    Full,
    Secret,
}

/// Outcome of a moderation operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModerationResult {
    Success,
    NotFound,
    Unauthorized,
}

/// Kind byte carried by CH_UPDATE payloads, both directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum UpdateKind {
    Rename = 0x01,
    Pin = 0x02,
    Privacy = 0x03,
    Promote = 0x04,
}

impl UpdateKind {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(UpdateKind::Rename),
            0x02 => Some(UpdateKind::Pin),
            0x03 => Some(UpdateKind::Privacy),
            0x04 => Some(UpdateKind::Promote),
            _ => None,
        }
    }
}

/// Snapshot of a channel used by the CH_LIST response.
#[derive(Debug, Clone)]
pub struct ChannelView {
    pub id: u32,
    pub secret: bool,
    pub name: String,
}

#[derive(Default)]
struct Roster {
    members: Vec<(u32, Weak<Client>)>,
    moderators: Vec<(u32, Weak<Client>)>,
    banned: Vec<u32>,
    invitations: Vec<u32>,
}

impl Roster {
    fn is_member(&self, client_id: u32) -> bool {
        self.members.iter().any(|(id, _)| *id == client_id)
    }

    fn is_moderator(&self, client: &Client) -> bool {
        self.moderators.iter().any(|(id, _)| *id == client.id) || client.is_admin()
    }

    /// Whether the member with this id holds elevated rights; resolves the
    /// weak handle to consult the admin flag. Dead entries count as plain.
    fn target_is_privileged(&self, client_id: u32) -> bool {
        if self.moderators.iter().any(|(id, _)| *id == client_id) {
            return true;
        }
        self.members
            .iter()
            .find(|(id, _)| *id == client_id)
            .and_then(|(_, weak)| weak.upgrade())
            .map(|client| client.is_admin())
            .unwrap_or(false)
    }

    fn drop_member(&mut self, client_id: u32) {
        self.members.retain(|(id, _)| *id != client_id);
        self.moderators.retain(|(id, _)| *id != client_id);
    }
}

/// A named room relaying packets to at most [`CHANNEL_CAPACITY`] members.
pub struct Channel {
    pub id: u32,
    max_capacity: usize,
    name: Mutex<String>,
    pinned_message: Mutex<String>,
    secret: AtomicBool,
    packet_seq: AtomicI32,
    roster: Mutex<Roster>,
    pool: SharedThreadPool,
    // Broadcast queue; taken at destruction to wake the worker.
    queue: Mutex<Option<mpsc::UnboundedSender<Response>>>,
    stop: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Channel {
    /// Create the channel and spawn its broadcast worker.
    pub fn new(id: u32, name: String, secret: bool, pool: SharedThreadPool) -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let channel = Arc::new(Self {
            id,
            max_capacity: CHANNEL_CAPACITY,
            name: Mutex::new(name),
            pinned_message: Mutex::new(String::new()),
            secret: AtomicBool::new(secret),
            packet_seq: AtomicI32::new(1),
            roster: Mutex::new(Roster::default()),
            pool,
            queue: Mutex::new(Some(tx)),
            stop: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
        });

        let worker = tokio::spawn(broadcast_worker(
            Arc::downgrade(&channel),
            rx,
            channel.stop.clone(),
            channel.pool.clone(),
        ));
        if let Ok(mut slot) = channel.worker.lock() {
            *slot = Some(worker);
        }

        debug!("channel created: {}", channel.name());
        channel
    }

    pub fn name(&self) -> String {
        self.name.lock().map(|n| n.clone()).unwrap_or_default()
    }

    pub fn is_secret(&self) -> bool {
        self.secret.load(Ordering::Relaxed)
    }

    pub fn pinned_message(&self) -> String {
        self.pinned_message
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    /// Channel info bytes returned by join and create:
    /// `id:u32le || secret:u8 || name`.
    pub fn info(&self) -> Vec<u8> {
        let name = self.name();
        let mut information = Vec::with_capacity(5 + name.len());
        information.extend_from_slice(&self.id.to_le_bytes());
        information.push(self.is_secret() as u8);
        information.extend_from_slice(name.as_bytes());
        information
    }

    pub fn view(&self) -> ChannelView {
        ChannelView {
            id: self.id,
            secret: self.is_secret(),
            name: self.name(),
        }
    }

    /// Attempt to add a member.
    ///
    /// Banned is checked first, then capacity, then secrecy; capacity comes
    /// before secrecy so a full channel does not burn an invitation. Admins
    /// join secret channels without one. Joining twice is a no-op success.
    pub fn join(&self, client: &Arc<Client>) -> JoinResult {
        let mut roster = match self.roster.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if roster.banned.contains(&client.id) {
            return JoinResult::Banned;
        }

        if roster.is_member(client.id) {
            return JoinResult::Success;
        }

        if roster.members.len() >= self.max_capacity {
            return JoinResult::Full;
        }

        if self.is_secret() && !client.is_admin() {
            let before = roster.invitations.len();
            roster.invitations.retain(|id| *id != client.id);
            // no invitation consumed means the client was never invited
            if roster.invitations.len() == before {
                return JoinResult::Secret;
            }
        }

        roster.members.push((client.id, Arc::downgrade(client)));
        JoinResult::Success
    }

    /// Remove a member from the roster. Idempotent; never fails.
    pub fn leave(&self, client_id: u32) {
        if let Ok(mut roster) = self.roster.lock() {
            roster.drop_member(client_id);
        }
    }

    pub fn is_moderator(&self, client: &Client) -> bool {
        self.roster
            .lock()
            .map(|roster| roster.is_moderator(client))
            .unwrap_or(false)
    }

    /// Kick a member. Moderator-only; a privileged target can only be
    /// kicked by an admin actor.
    pub fn kick(&self, actor: &Client, target_id: u32) -> ModerationResult {
        let mut roster = match self.roster.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if !roster.is_member(target_id) {
            return ModerationResult::NotFound;
        }

        if !roster.is_moderator(actor)
            || (roster.target_is_privileged(target_id) && !actor.is_admin())
        {
            return ModerationResult::Unauthorized;
        }

        roster.drop_member(target_id);
        debug!("client {} was kicked from {}", target_id, self.name());
        ModerationResult::Success
    }

    /// Record an invitation for `target_id`.
    ///
    /// Secret channels accept invitations from moderators only; public
    /// channels from any member (where the token is inert anyway, since
    /// joining is unrestricted). The router validates that the target is a
    /// registered client.
    pub fn invite(&self, actor: &Client, target_id: u32) -> ModerationResult {
        let mut roster = match self.roster.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let allowed = if self.is_secret() {
            roster.is_moderator(actor)
        } else {
            roster.is_member(actor.id) || actor.is_admin()
        };
        if !allowed {
            return ModerationResult::Unauthorized;
        }

        if !roster.invitations.contains(&target_id) {
            roster.invitations.push(target_id);
        }
        debug!("client {} invited to {}", target_id, self.name());
        ModerationResult::Success
    }

    /// Promote an existing member to moderator. Admin-only; fails when the
    /// member already moderates or the moderator list is at capacity.
    pub fn promote(&self, actor: &Client, target_id: u32) -> ModerationResult {
        if !actor.is_admin() {
            return ModerationResult::Unauthorized;
        }

        let mut roster = match self.roster.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let entry = match roster
            .members
            .iter()
            .find(|(id, _)| *id == target_id)
            .cloned()
        {
            Some(entry) => entry,
            None => return ModerationResult::NotFound,
        };

        if roster.moderators.len() >= MAX_MODERATORS
            || roster.moderators.iter().any(|(id, _)| *id == target_id)
        {
            return ModerationResult::Unauthorized;
        }

        roster.moderators.push(entry);
        debug!(
            "member promoted to moderator: {} -> {}",
            self.name(),
            target_id
        );
        ModerationResult::Success
    }

    /// Toggle the secret flag. Admin-only.
    pub fn change_privacy(&self, actor: &Client) -> ModerationResult {
        if !actor.is_admin() {
            return ModerationResult::Unauthorized;
        }
        self.secret.fetch_xor(true, Ordering::Relaxed);
        debug!("{} privacy has changed", self.name());
        ModerationResult::Success
    }

    /// Ban a client id. Moderator-only; banning a privileged member
    /// requires an admin actor. A banned member is removed from the roster.
    pub fn ban(&self, actor: &Client, target_id: u32) -> ModerationResult {
        let mut roster = match self.roster.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if !roster.is_moderator(actor)
            || (roster.target_is_privileged(target_id) && !actor.is_admin())
        {
            return ModerationResult::Unauthorized;
        }

        if !roster.banned.contains(&target_id) {
            roster.banned.push(target_id);
        }
        roster.drop_member(target_id);
        debug!("client {} banned from {}", target_id, self.name());
        ModerationResult::Success
    }

    /// Lift a ban. Moderator-only.
    pub fn unban(&self, actor: &Client, target_id: u32) -> ModerationResult {
        let mut roster = match self.roster.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if !roster.is_moderator(actor) {
            return ModerationResult::Unauthorized;
        }

        let before = roster.banned.len();
        roster.banned.retain(|id| *id != target_id);
        if roster.banned.len() == before {
            return ModerationResult::NotFound;
        }
        ModerationResult::Success
    }

    /// Pin a message and broadcast the update. Moderator-only.
    pub fn pin(&self, actor: &Client, message: &str) -> ModerationResult {
        if !self.is_moderator(actor) {
            return ModerationResult::Unauthorized;
        }

        if let Ok(mut pinned) = self.pinned_message.lock() {
            *pinned = message.to_string();
        }
        self.enqueue_update(UpdateKind::Pin, message.as_bytes());
        ModerationResult::Success
    }

    /// Rename the channel and broadcast the update. Admin-only; the router
    /// validates the new name's length before calling.
    pub fn rename(&self, actor: &Client, new_name: &str) -> ModerationResult {
        if !actor.is_admin() {
            return ModerationResult::Unauthorized;
        }

        if let Ok(mut name) = self.name.lock() {
            debug!("channel name changed: {} -> {}", name, new_name);
            *name = new_name.to_string();
        }
        self.enqueue_update(UpdateKind::Rename, new_name.as_bytes());
        ModerationResult::Success
    }

    /// Append a chat message to the broadcast queue. Non-blocking.
    ///
    /// Broadcast layout: `channel_id:u32le || sender_id:u32le ||
    /// reply_to:u32le || text`.
    pub fn queue_message(&self, sender_id: u32, reply_to: u32, text: &[u8]) {
        let mut payload = Vec::with_capacity(12 + text.len());
        payload.extend_from_slice(&self.id.to_le_bytes());
        payload.extend_from_slice(&sender_id.to_le_bytes());
        payload.extend_from_slice(&reply_to.to_le_bytes());
        payload.extend_from_slice(text);

        self.enqueue(PacketType::ChMessage, payload);
    }

    fn enqueue_update(&self, kind: UpdateKind, data: &[u8]) {
        let mut payload = Vec::with_capacity(5 + data.len());
        payload.extend_from_slice(&self.id.to_le_bytes());
        payload.push(kind as u8);
        payload.extend_from_slice(data);

        self.enqueue(PacketType::ChUpdate, payload);
    }

    /// Stamp the packet with the next per-channel sequence id and hand it
    /// to the broadcast worker.
    fn enqueue(&self, kind: PacketType, payload: Vec<u8>) {
        let seq = self.packet_seq.fetch_add(1, Ordering::Relaxed);
        let packet = Response::new(seq, kind, payload);

        if let Ok(queue) = self.queue.lock() {
            if let Some(tx) = queue.as_ref() {
                let _ = tx.send(packet);
            }
        }
    }

    /// Roster snapshot for fan-out; prunes entries whose client is gone.
    fn member_snapshot(&self) -> Vec<(u32, Weak<Client>)> {
        let mut roster = match self.roster.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        roster.members.retain(|(_, weak)| weak.strong_count() > 0);
        roster.moderators.retain(|(_, weak)| weak.strong_count() > 0);
        roster.members.clone()
    }

    /// Tear the channel down: stop the worker (pending queue items are
    /// dropped), detach and notify every live member, then join the worker.
    pub async fn destroy(&self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Ok(mut queue) = self.queue.lock() {
            queue.take();
        }

        let members = {
            let mut roster = match self.roster.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            roster.invitations.clear();
            roster.moderators.clear();
            std::mem::take(&mut roster.members)
        };

        let seq = self.packet_seq.fetch_add(1, Ordering::Relaxed);
        let notice = Response::new(
            seq,
            PacketType::ChDelete,
            format!("{} has been deleted", self.name()),
        );
        for (_, weak) in members {
            if let Some(client) = weak.upgrade() {
                client.remove_channel(self.id);
                if client.is_connected() {
                    let packet = notice.clone();
                    self.pool.execute(async move {
                        client.send_packet(&packet);
                    });
                }
            }
        }

        let worker = self.worker.lock().ok().and_then(|mut slot| slot.take());
        if let Some(handle) = worker {
            let _ = handle.await;
        }

        debug!("channel destroyed: {}", self.name());
    }

    pub fn member_count(&self) -> usize {
        self.roster.lock().map(|r| r.members.len()).unwrap_or(0)
    }

    pub fn moderator_count(&self) -> usize {
        self.roster.lock().map(|r| r.moderators.len()).unwrap_or(0)
    }

    pub fn has_invitation(&self, client_id: u32) -> bool {
        self.roster
            .lock()
            .map(|r| r.invitations.contains(&client_id))
            .unwrap_or(false)
    }

    pub fn is_banned(&self, client_id: u32) -> bool {
        self.roster
            .lock()
            .map(|r| r.banned.contains(&client_id))
            .unwrap_or(false)
    }
}

/// Per-channel consumer: waits for queued packets, drains them into a local
/// batch, and submits one fan-out job to the shared pool. The job is
/// awaited before the next batch so per-channel delivery order matches
/// enqueue order; failed sends are not retried and never evict a member.
async fn broadcast_worker(
    channel: Weak<Channel>,
    mut rx: mpsc::UnboundedReceiver<Response>,
    stop: Arc<AtomicBool>,
    pool: SharedThreadPool,
) {
    while let Some(first) = rx.recv().await {
        if stop.load(Ordering::Relaxed) {
            break;
        }

        let mut batch = vec![first];
        while let Ok(next) = rx.try_recv() {
            batch.push(next);
        }

        let members = match channel.upgrade() {
            Some(channel) => channel.member_snapshot(),
            None => break,
        };

        let job = pool.execute(async move {
            for packet in &batch {
                for (_, weak) in &members {
                    if let Some(client) = weak.upgrade() {
                        client.send_packet(packet);
                    }
                }
            }
        });
        if let Some(handle) = job {
            let _ = handle.await;
        }
    }
}
