//! Basic type definitions for the relay
//!
//! Provides newtype wrappers for type safety:
//! - `ConnId`: UUID-based identity of one live connection
//! - `RoomId`: external room identifier taken from the connection path

use uuid::Uuid;

/// Identity of one live connection (newtype pattern)
///
/// Wraps a UUID v4. This is the unit of membership and addressing inside
/// a room; a single user may hold several connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnId(pub Uuid);

impl ConnId {
    /// Create a new random connection ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Room identifier
///
/// Opaque to the relay; its meaning belongs to the persistence layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoomId(pub String);

impl RoomId {
    /// Borrow the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RoomId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for RoomId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for RoomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Generate an identifier for a persisted user or room record
///
/// 32 lowercase hex characters.
pub fn new_record_id() -> String {
    Uuid::new_v4().simple().to_string()
}
