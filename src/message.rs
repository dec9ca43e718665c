//! Message protocol definitions
//!
//! Every frame is a JSON envelope `{type, payload, sender?, target?}`.
//! The `type` field is an open set: the relay only interprets the kinds
//! listed in [`kind`] and forwards everything else untouched. Payloads
//! the server produces are typed structs serialized into the envelope.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::client::Member;

/// Message type names used on the wire
pub mod kind {
    pub const ROOM_INFO: &str = "room-info";
    pub const EXISTING_USERS: &str = "existing-users";
    pub const USER_JOINED: &str = "user-joined";
    pub const USER_LEFT: &str = "user-left";
    pub const USER_MUTED: &str = "user-muted";
    pub const USER_UNMUTED: &str = "user-unmuted";
    pub const WEBRTC_OFFER: &str = "webrtc-offer";
    pub const WEBRTC_ANSWER: &str = "webrtc-answer";
    pub const WEBRTC_ICE_CANDIDATE: &str = "webrtc-ice-candidate";
    pub const CHAT_MESSAGE: &str = "chat-message";
}

/// Wire envelope, in both directions
///
/// `payload` is kept as a raw JSON value so unknown fields survive
/// a decode/encode pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

impl Message {
    /// Build a server-originated message from a typed payload
    pub fn server<P: Serialize>(kind: &str, payload: &P) -> Result<Self, serde_json::Error> {
        Ok(Self {
            kind: kind.to_string(),
            payload: serde_json::to_value(payload)?,
            sender: None,
            target: None,
        })
    }

    /// Decode a text frame
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Encode as a text frame
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Target user id, treating an empty string as absent
    pub fn target(&self) -> Option<&str> {
        self.target.as_deref().filter(|t| !t.is_empty())
    }
}

/// How the router handles an inbound message type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Session negotiation: delivered to exactly one target user
    Signal,
    /// Chat: re-stamped and echoed to everyone, sender included
    Chat,
    /// Anything else: forwarded as received to everyone but the sender
    Relay,
}

impl Route {
    /// Route for a wire `type` value; unknown types relay
    pub fn classify(message_kind: &str) -> Self {
        match message_kind {
            kind::WEBRTC_OFFER | kind::WEBRTC_ANSWER | kind::WEBRTC_ICE_CANDIDATE => Route::Signal,
            kind::CHAT_MESSAGE => Route::Chat,
            _ => Route::Relay,
        }
    }
}

/// `room-info` payload, sent only to the joining client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomInfo {
    pub room_id: String,
    pub room_name: String,
    pub member_count: usize,
    pub is_admin: bool,
}

/// `existing-users` payload: who was in the room before the join
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExistingUsers {
    pub user_ids: Vec<String>,
    pub users: Vec<Member>,
}

/// `user-joined` / `user-left` payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Presence {
    pub user_id: String,
    pub user_name: String,
    pub member_count: usize,
}

/// `user-muted` payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserMuted {
    pub user_id: String,
    pub muted_by: String,
}

/// `user-unmuted` payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserUnmuted {
    pub user_id: String,
    pub unmuted_by: String,
}

/// Inbound `chat-message` payload
///
/// A missing `message` field reads as an empty message.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
}

impl ChatRequest {
    /// Decode from a message payload; a `null` payload is an empty request
    pub fn from_payload(payload: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value::<Option<Self>>(payload).map(Option::unwrap_or_default)
    }
}

/// Outbound `chat-message` payload with server-side fields
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatBroadcast {
    pub message: String,
    pub user_name: String,
    pub user_id: String,
    /// Unix seconds
    pub timestamp: i64,
}
