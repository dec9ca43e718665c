//! Room struct definition
//!
//! A room is the set of clients sharing one room id, plus the metadata
//! cached from the persisted room record. All state sits behind a single
//! reader/writer lock: membership and mute changes take it exclusively,
//! deliveries and snapshots share it.

use std::collections::HashMap;
use std::time::Instant;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::client::{Client, Member};
use crate::error::RoomError;
use crate::message::Message;
use crate::types::{ConnId, RoomId};

/// Result of registering a client
#[derive(Debug, Clone)]
pub struct JoinSnapshot {
    /// Members present before the join, excluding the joining user id
    pub existing: Vec<Member>,
    /// Member count including the new client
    pub member_count: usize,
    /// Whether the new client was granted admin
    pub is_admin: bool,
}

#[derive(Debug)]
struct Entry {
    /// Join order, used to keep snapshots and target lookup stable
    seq: u64,
    client: Client,
}

#[derive(Debug, Default)]
struct RoomState {
    name: String,
    creator_id: String,
    clients: HashMap<ConnId, Entry>,
    next_seq: u64,
    /// Set once the hub has evicted this room
    closed: bool,
}

impl RoomState {
    fn ordered(&self) -> Vec<&Client> {
        let mut entries: Vec<&Entry> = self.clients.values().collect();
        entries.sort_by_key(|e| e.seq);
        entries.into_iter().map(|e| &e.client).collect()
    }

    fn has_admin(&self, user_id: &str) -> bool {
        self.clients
            .values()
            .any(|e| e.client.user_id == user_id && e.client.is_admin)
    }
}

/// Signaling room
#[derive(Debug)]
pub struct Room {
    /// Room identifier
    pub id: RoomId,
    /// When this room became active in the hub
    pub created_at: Instant,
    state: RwLock<RoomState>,
}

impl Room {
    /// Create an empty room with no metadata
    pub fn new(id: RoomId) -> Self {
        Self {
            id,
            created_at: Instant::now(),
            state: RwLock::new(RoomState::default()),
        }
    }

    /// Overwrite the cached name and creator id
    pub fn set_info(&self, name: &str, creator_id: &str) {
        let mut state = self.state.write();
        state.name = name.to_string();
        state.creator_id = creator_id.to_string();
    }

    /// Cached room name
    pub fn name(&self) -> String {
        self.state.read().name.clone()
    }

    /// Cached creator user id
    pub fn creator_id(&self) -> String {
        self.state.read().creator_id.clone()
    }

    /// Register a client
    ///
    /// Grants admin when the client's user id matches the creator id.
    /// The snapshot of existing members is taken under the same lock as
    /// the insertion, so it never contains the new client and never
    /// misses a concurrent joiner. Fails if the room has been evicted.
    pub fn add_client(&self, mut client: Client) -> Result<JoinSnapshot, RoomError> {
        let mut state = self.state.write();
        if state.closed {
            return Err(RoomError::Closed(self.id.clone()));
        }

        if client.user_id == state.creator_id {
            client.is_admin = true;
        }

        let existing = state
            .ordered()
            .into_iter()
            .filter(|c| c.user_id != client.user_id)
            .map(Client::member)
            .collect();

        let is_admin = client.is_admin;
        let seq = state.next_seq;
        state.next_seq += 1;
        state.clients.insert(client.conn_id, Entry { seq, client });

        Ok(JoinSnapshot {
            existing,
            member_count: state.clients.len(),
            is_admin,
        })
    }

    /// Remove a client by connection; no-op if absent
    ///
    /// Returns the removed client.
    pub fn remove_client(&self, conn_id: ConnId) -> Option<Client> {
        self.state.write().clients.remove(&conn_id).map(|e| e.client)
    }

    /// Number of registered clients
    pub fn member_count(&self) -> usize {
        self.state.read().clients.len()
    }

    /// Whether no clients are registered
    pub fn is_empty(&self) -> bool {
        self.state.read().clients.is_empty()
    }

    /// Snapshot of all members in join order
    pub fn members(&self) -> Vec<Member> {
        self.state
            .read()
            .ordered()
            .into_iter()
            .map(Client::member)
            .collect()
    }

    /// Mute `target_user_id` on behalf of `admin_user_id`
    ///
    /// Returns false, changing nothing, unless the caller is a connected
    /// admin and the target is connected.
    pub fn mute_user(&self, admin_user_id: &str, target_user_id: &str) -> bool {
        self.set_muted(admin_user_id, target_user_id, true)
    }

    /// Unmute `target_user_id`; same authorization as [`Room::mute_user`]
    pub fn unmute_user(&self, admin_user_id: &str, target_user_id: &str) -> bool {
        self.set_muted(admin_user_id, target_user_id, false)
    }

    fn set_muted(&self, admin_user_id: &str, target_user_id: &str, muted: bool) -> bool {
        let mut state = self.state.write();
        if !state.has_admin(admin_user_id) {
            return false;
        }

        let Some(seq) = state
            .clients
            .values()
            .filter(|e| e.client.user_id == target_user_id)
            .map(|e| e.seq)
            .min()
        else {
            return false;
        };

        if let Some(entry) = state.clients.values_mut().find(|e| e.seq == seq) {
            entry.client.is_muted = muted;
        }
        true
    }

    /// Deliver `msg` to every client except `exclude`
    ///
    /// Best effort: a failed send is logged and the recipient stays
    /// registered. Returns the number of successful deliveries.
    pub fn broadcast(&self, exclude: Option<ConnId>, msg: &Message) -> usize {
        let state = self.state.read();
        let mut delivered = 0;

        for (conn_id, entry) in &state.clients {
            if Some(*conn_id) == exclude {
                continue;
            }
            match entry.client.send(msg.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => warn!(
                    room_id = %self.id,
                    user_id = %entry.client.user_id,
                    "Error broadcasting {}: {}",
                    msg.kind,
                    e
                ),
            }
        }

        delivered
    }

    /// Deliver `msg` to the earliest-joined client with `target_user_id`
    ///
    /// Returns false if no such client is connected.
    pub fn send_to_target(&self, target_user_id: &str, msg: Message) -> bool {
        let state = self.state.read();
        let Some(target) = state
            .ordered()
            .into_iter()
            .find(|c| c.user_id == target_user_id)
        else {
            debug!(room_id = %self.id, "Target user {} not found", target_user_id);
            return false;
        };

        if let Err(e) = target.send(msg) {
            warn!(
                room_id = %self.id,
                "Error sending message to target {}: {}",
                target_user_id,
                e
            );
        }
        true
    }

    /// Mark the room closed if it has no clients
    ///
    /// Called by the hub while it holds its own write lock; once closed,
    /// [`Room::add_client`] refuses new clients.
    pub(crate) fn close_if_empty(&self) -> bool {
        let mut state = self.state.write();
        if state.clients.is_empty() {
            state.closed = true;
        }
        state.closed
    }
}
