//! Error types for the relay
//!
//! Defines connection-level errors, per-recipient send errors and
//! room state errors. Uses thiserror for ergonomic error definitions.

use thiserror::Error;

use crate::store::StoreError;
use crate::types::RoomId;

/// Application-level errors
///
/// Covers fatal connection errors (the socket is closed) and the
/// failures reported back to an API caller for admin actions.
#[derive(Debug, Error)]
pub enum AppError {
    /// WebSocket protocol error (fatal)
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error (fatal)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Persistence lookup failed
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Room id or user id missing from the connection request
    #[error("Missing connection parameter: {0}")]
    MissingParam(&'static str),

    /// Room has no active connections
    #[error("Room not active: {0}")]
    RoomInactive(RoomId),

    /// Mute/unmute requested by a non-admin, or target not present
    #[error("Unauthorized or user not found")]
    AdminActionDenied,
}

/// Message send errors
///
/// Occurs when a recipient's outbound channel cannot take a message.
#[derive(Debug, Error)]
pub enum SendError {
    /// The receiving end of the channel has been closed
    #[error("Channel closed")]
    ChannelClosed,

    /// The recipient is not draining its channel fast enough
    #[error("Channel full")]
    Full,
}

/// Room state errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RoomError {
    /// The room was evicted from the hub and accepts no new clients
    #[error("Room closed: {0}")]
    Closed(RoomId),
}
