//! Persistence collaborator
//!
//! Users and rooms live outside the relay. The relay only needs to look
//! a room up when a connection joins; the remaining operations back the
//! API layer. `MemoryStore` keeps everything in process and is what the
//! binary runs with, seeded from the config file.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::hub::Hub;
use crate::types::{new_record_id, RoomId};

/// Persistence errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Room not found: {0}")]
    RoomNotFound(String),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Invalid id: {0:?}")]
    InvalidId(String),
}

/// Persisted user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub name: String,
}

/// Persisted room
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomRecord {
    pub id: String,
    pub name: String,
    pub is_public: bool,
    pub creator_id: String,
    pub created_at: DateTime<Utc>,
}

/// Public room listing entry with live member count
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    #[serde(flatten)]
    pub room: RoomRecord,
    pub member_count: usize,
}

/// Storage backend for users and rooms
#[async_trait]
pub trait RoomStore: Send + Sync {
    async fn create_user(&self, name: &str) -> Result<UserRecord, StoreError>;

    async fn get_user(&self, id: &str) -> Result<UserRecord, StoreError>;

    async fn create_room(
        &self,
        name: &str,
        is_public: bool,
        creator_id: &str,
    ) -> Result<RoomRecord, StoreError>;

    /// Room metadata needed to activate a room in the hub
    async fn lookup_room(&self, id: &str) -> Result<RoomRecord, StoreError>;

    async fn public_rooms(&self) -> Result<Vec<RoomRecord>, StoreError>;
}

/// In-process store
#[derive(Debug, Default)]
pub struct MemoryStore {
    users: RwLock<HashMap<String, UserRecord>>,
    rooms: RwLock<HashMap<String, RoomRecord>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a user with a caller-chosen id, replacing any previous one
    pub fn insert_user(&self, user: UserRecord) {
        self.users.write().insert(user.id.clone(), user);
    }

    /// Insert a room with a caller-chosen id, replacing any previous one
    pub fn insert_room(&self, room: RoomRecord) {
        self.rooms.write().insert(room.id.clone(), room);
    }
}

#[async_trait]
impl RoomStore for MemoryStore {
    async fn create_user(&self, name: &str) -> Result<UserRecord, StoreError> {
        let user = UserRecord {
            id: new_record_id(),
            name: name.to_string(),
        };
        self.insert_user(user.clone());
        Ok(user)
    }

    async fn get_user(&self, id: &str) -> Result<UserRecord, StoreError> {
        self.users
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::UserNotFound(id.to_string()))
    }

    async fn create_room(
        &self,
        name: &str,
        is_public: bool,
        creator_id: &str,
    ) -> Result<RoomRecord, StoreError> {
        if creator_id.is_empty() {
            return Err(StoreError::InvalidId(creator_id.to_string()));
        }

        let room = RoomRecord {
            id: new_record_id(),
            name: name.to_string(),
            is_public,
            creator_id: creator_id.to_string(),
            created_at: Utc::now(),
        };
        self.insert_room(room.clone());
        Ok(room)
    }

    async fn lookup_room(&self, id: &str) -> Result<RoomRecord, StoreError> {
        self.rooms
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::RoomNotFound(id.to_string()))
    }

    async fn public_rooms(&self) -> Result<Vec<RoomRecord>, StoreError> {
        let mut rooms: Vec<RoomRecord> = self
            .rooms
            .read()
            .values()
            .filter(|r| r.is_public)
            .cloned()
            .collect();
        rooms.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(rooms)
    }
}

/// Public rooms with member counts taken from the hub
pub async fn public_rooms(
    store: &dyn RoomStore,
    hub: &Hub,
) -> Result<Vec<RoomSummary>, StoreError> {
    let rooms = store.public_rooms().await?;
    Ok(rooms
        .into_iter()
        .map(|room| {
            let member_count = hub.room_member_count(&RoomId::from(room.id.as_str()));
            RoomSummary { room, member_count }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Client;
    use crate::types::ConnId;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_create_and_get_user() {
        let store = MemoryStore::new();
        let user = store.create_user("Alice").await.unwrap();
        assert_eq!(user.name, "Alice");
        assert_eq!(store.get_user(&user.id).await.unwrap(), user);

        assert!(matches!(
            store.get_user("missing").await,
            Err(StoreError::UserNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_create_and_lookup_room() {
        let store = MemoryStore::new();
        let room = store.create_room("Standup", true, "alice").await.unwrap();
        let found = store.lookup_room(&room.id).await.unwrap();
        assert_eq!(found.name, "Standup");
        assert_eq!(found.creator_id, "alice");

        assert!(matches!(
            store.lookup_room("missing").await,
            Err(StoreError::RoomNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_create_room_requires_creator() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.create_room("Nobody's", true, "").await,
            Err(StoreError::InvalidId(_))
        ));
    }

    #[tokio::test]
    async fn test_public_rooms_with_member_counts() {
        let store = MemoryStore::new();
        let hub = Hub::new();
        let open = store.create_room("Open", true, "alice").await.unwrap();
        store.create_room("Hidden", false, "alice").await.unwrap();

        let summaries = public_rooms(&store, &hub).await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].room.name, "Open");
        assert_eq!(summaries[0].member_count, 0);

        let room_id = RoomId::from(open.id.as_str());
        let (tx, _rx) = mpsc::channel(8);
        hub.get_or_create(&room_id)
            .add_client(Client::new(
                ConnId::new(),
                room_id.clone(),
                "bob".to_string(),
                "Bob".to_string(),
                tx,
            ))
            .unwrap();

        let summaries = public_rooms(&store, &hub).await.unwrap();
        assert_eq!(summaries[0].member_count, 1);

        let json = serde_json::to_value(&summaries[0]).unwrap();
        assert_eq!(json["memberCount"], 1);
        assert_eq!(json["isPublic"], true);
        assert_eq!(json["creatorId"], "alice");
    }
}
