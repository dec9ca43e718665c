//! Room registry
//!
//! Maps room ids to live rooms. Rooms are created on first join and
//! evicted as soon as a check finds them empty. The hub lock may be held
//! while a room lock is taken (eviction only); room operations never
//! touch the hub, so the two locks cannot deadlock.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::client::Member;
use crate::error::AppError;
use crate::message::{kind, Message, UserMuted, UserUnmuted};
use crate::room::Room;
use crate::types::RoomId;

/// Registry of active rooms
#[derive(Debug, Default)]
pub struct Hub {
    rooms: RwLock<HashMap<RoomId, Arc<Room>>>,
}

impl Hub {
    /// Create an empty hub
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the room for `room_id`, creating an empty one if needed
    ///
    /// Exactly one room instance exists per id at any time.
    pub fn get_or_create(&self, room_id: &RoomId) -> Arc<Room> {
        if let Some(room) = self.rooms.read().get(room_id) {
            return Arc::clone(room);
        }

        let mut rooms = self.rooms.write();
        let room = rooms.entry(room_id.clone()).or_insert_with(|| {
            info!(room_id = %room_id, "Room activated");
            Arc::new(Room::new(room_id.clone()))
        });
        Arc::clone(room)
    }

    /// Non-creating lookup; `None` means no active connections
    pub fn get(&self, room_id: &RoomId) -> Option<Arc<Room>> {
        self.rooms.read().get(room_id).cloned()
    }

    /// Evict the room if it currently has no clients
    ///
    /// The emptiness check and the removal happen under the hub write
    /// lock, and the room is marked closed so a client racing to join
    /// the evicted instance is refused and retries against the hub.
    pub fn remove_if_empty(&self, room_id: &RoomId) -> bool {
        let mut rooms = self.rooms.write();
        let Some(room) = rooms.get(room_id) else {
            return false;
        };

        if !room.close_if_empty() {
            return false;
        }

        rooms.remove(room_id);
        info!(room_id = %room_id, "Room removed (empty)");
        true
    }

    /// Number of active rooms
    pub fn room_count(&self) -> usize {
        self.rooms.read().len()
    }

    /// Member count for an API caller; 0 if the room is inactive
    pub fn room_member_count(&self, room_id: &RoomId) -> usize {
        self.get(room_id).map_or(0, |room| room.member_count())
    }

    /// Member list for an API caller; empty if the room is inactive
    pub fn room_members(&self, room_id: &RoomId) -> Vec<Member> {
        self.get(room_id)
            .map(|room| room.members())
            .unwrap_or_default()
    }

    /// Admin action: mute a member and tell the whole room
    pub fn mute_user(
        &self,
        room_id: &RoomId,
        admin_user_id: &str,
        target_user_id: &str,
    ) -> Result<(), AppError> {
        let room = self
            .get(room_id)
            .ok_or_else(|| AppError::RoomInactive(room_id.clone()))?;

        if !room.mute_user(admin_user_id, target_user_id) {
            debug!(room_id = %room_id, "Mute of {} by {} denied", target_user_id, admin_user_id);
            return Err(AppError::AdminActionDenied);
        }

        let msg = Message::server(
            kind::USER_MUTED,
            &UserMuted {
                user_id: target_user_id.to_string(),
                muted_by: admin_user_id.to_string(),
            },
        )?;
        room.broadcast(None, &msg);
        info!(room_id = %room_id, "User {} muted by {}", target_user_id, admin_user_id);
        Ok(())
    }

    /// Admin action: unmute a member and tell the whole room
    pub fn unmute_user(
        &self,
        room_id: &RoomId,
        admin_user_id: &str,
        target_user_id: &str,
    ) -> Result<(), AppError> {
        let room = self
            .get(room_id)
            .ok_or_else(|| AppError::RoomInactive(room_id.clone()))?;

        if !room.unmute_user(admin_user_id, target_user_id) {
            debug!(room_id = %room_id, "Unmute of {} by {} denied", target_user_id, admin_user_id);
            return Err(AppError::AdminActionDenied);
        }

        let msg = Message::server(
            kind::USER_UNMUTED,
            &UserUnmuted {
                user_id: target_user_id.to_string(),
                unmuted_by: admin_user_id.to_string(),
            },
        )?;
        room.broadcast(None, &msg);
        info!(room_id = %room_id, "User {} unmuted by {}", target_user_id, admin_user_id);
        Ok(())
    }
}
