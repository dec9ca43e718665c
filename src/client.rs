//! Client struct definition
//!
//! Represents one connection's membership in a room together with the
//! channel used to push messages to it.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::error::SendError;
use crate::message::Message;
use crate::types::{ConnId, RoomId};

/// Connected client information
///
/// Exactly one `Client` exists per live connection. `is_admin` is decided
/// when the client is added to its room and never re-evaluated.
#[derive(Debug, Clone)]
pub struct Client {
    /// Identity of the underlying connection
    pub conn_id: ConnId,
    /// Room this client belongs to
    pub room_id: RoomId,
    /// Caller-supplied user identifier
    pub user_id: String,
    /// Display name
    pub user_name: String,
    /// Muted by a room admin (advisory)
    pub is_muted: bool,
    /// Room creator
    pub is_admin: bool,
    /// Server → Client message channel
    pub sender: mpsc::Sender<Message>,
}

impl Client {
    /// Create a new, non-admin, unmuted client
    pub fn new(
        conn_id: ConnId,
        room_id: RoomId,
        user_id: String,
        user_name: String,
        sender: mpsc::Sender<Message>,
    ) -> Self {
        Self {
            conn_id,
            room_id,
            user_id,
            user_name,
            is_muted: false,
            is_admin: false,
            sender,
        }
    }

    /// Queue a message for this client
    ///
    /// Never waits: a full or closed channel is reported as an error so
    /// callers holding a room lock are not blocked by a slow peer.
    pub fn send(&self, msg: Message) -> Result<(), SendError> {
        self.sender.try_send(msg).map_err(|e| match e {
            TrySendError::Full(_) => SendError::Full,
            TrySendError::Closed(_) => SendError::ChannelClosed,
        })
    }

    /// Snapshot of the public fields
    pub fn member(&self) -> Member {
        Member {
            user_id: self.user_id.clone(),
            user_name: self.user_name.clone(),
            is_muted: self.is_muted,
            is_admin: self.is_admin,
        }
    }
}

/// Read-only view of a room member, as sent to clients and API callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub user_id: String,
    pub user_name: String,
    pub is_muted: bool,
    pub is_admin: bool,
}
