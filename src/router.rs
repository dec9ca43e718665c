//! Per-connection message routing
//!
//! A [`Session`] exists for as long as a connection is joined to a room.
//! Creating one registers the client and announces it; every inbound
//! frame goes through [`Session::dispatch`]; dropping the session
//! unregisters the client, announces the departure and lets the hub
//! evict the room. Teardown lives in `Drop` so it runs exactly once no
//! matter which path ends the connection.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::client::Client;
use crate::error::{AppError, RoomError};
use crate::hub::Hub;
use crate::message::{
    kind, ChatBroadcast, ChatRequest, ExistingUsers, Message, Presence, RoomInfo, Route,
};
use crate::room::{JoinSnapshot, Room};
use crate::store::RoomRecord;
use crate::types::{ConnId, RoomId};

/// A joined connection
#[derive(Debug)]
pub struct Session {
    hub: Arc<Hub>,
    room: Arc<Room>,
    conn_id: ConnId,
    user_id: String,
    user_name: String,
    is_admin: bool,
    /// Channel to this connection's writer
    outbound: mpsc::Sender<Message>,
}

impl Session {
    /// Join `record`'s room
    ///
    /// Activates the room in the hub, registers the client and emits, in
    /// order: `room-info` and `existing-users` to the new connection, then
    /// `user-joined` to everyone else.
    pub fn join(
        hub: Arc<Hub>,
        record: &RoomRecord,
        conn_id: ConnId,
        user_id: String,
        user_name: String,
        outbound: mpsc::Sender<Message>,
    ) -> Result<Self, AppError> {
        let room_id = RoomId::from(record.id.as_str());

        let (room, snapshot) = loop {
            let room = hub.get_or_create(&room_id);
            room.set_info(&record.name, &record.creator_id);

            let client = Client::new(
                conn_id,
                room_id.clone(),
                user_id.clone(),
                user_name.clone(),
                outbound.clone(),
            );

            match room.add_client(client) {
                Ok(snapshot) => break (room, snapshot),
                Err(RoomError::Closed(_)) => {
                    // Evicted between lookup and insert; the hub has a fresh one
                    debug!(room_id = %room_id, "Room closed during join, retrying");
                }
            }
        };

        let session = Self {
            hub,
            room,
            conn_id,
            user_id,
            user_name,
            is_admin: snapshot.is_admin,
            outbound,
        };

        info!(
            room_id = %room_id,
            conn_id = %conn_id,
            "Client {} ({}) connected",
            session.user_name,
            session.user_id
        );

        session.announce(&record.name, snapshot)?;
        Ok(session)
    }

    fn announce(&self, room_name: &str, snapshot: JoinSnapshot) -> Result<(), AppError> {
        self.deliver(Message::server(
            kind::ROOM_INFO,
            &RoomInfo {
                room_id: self.room.id.to_string(),
                room_name: room_name.to_string(),
                member_count: snapshot.member_count,
                is_admin: snapshot.is_admin,
            },
        )?);

        let user_ids = snapshot.existing.iter().map(|m| m.user_id.clone()).collect();
        self.deliver(Message::server(
            kind::EXISTING_USERS,
            &ExistingUsers {
                user_ids,
                users: snapshot.existing,
            },
        )?);

        let joined = Message::server(
            kind::USER_JOINED,
            &Presence {
                user_id: self.user_id.clone(),
                user_name: self.user_name.clone(),
                member_count: snapshot.member_count,
            },
        )?;
        self.room.broadcast(Some(self.conn_id), &joined);
        Ok(())
    }

    /// Send directly to this session's own connection
    fn deliver(&self, msg: Message) {
        if let Err(e) = self.outbound.try_send(msg) {
            warn!(conn_id = %self.conn_id, "Error sending to own connection: {}", e);
        }
    }

    /// Identity of this session's connection
    pub fn conn_id(&self) -> ConnId {
        self.conn_id
    }

    /// Room this session is joined to
    pub fn room(&self) -> &Arc<Room> {
        &self.room
    }

    /// User id supplied at connect time
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Admin status granted at join time
    pub fn is_admin(&self) -> bool {
        self.is_admin
    }

    /// Handle one inbound text frame
    ///
    /// A frame that does not decode is logged and skipped.
    pub fn dispatch(&self, text: &str) {
        match Message::decode(text) {
            Ok(msg) => self.route(msg),
            Err(e) => warn!(conn_id = %self.conn_id, "Invalid JSON from {}: {}", self.user_id, e),
        }
    }

    /// Route a decoded message
    ///
    /// The sender field is always overwritten with this session's user id.
    pub fn route(&self, mut msg: Message) {
        msg.sender = Some(self.user_id.clone());

        match Route::classify(&msg.kind) {
            Route::Signal => {
                let Some(target) = msg.target().map(str::to_string) else {
                    debug!(conn_id = %self.conn_id, "Dropping {} without target", msg.kind);
                    return;
                };
                self.room.send_to_target(&target, msg);
            }
            Route::Chat => {
                let request = match ChatRequest::from_payload(msg.payload) {
                    Ok(request) => request,
                    Err(e) => {
                        debug!(conn_id = %self.conn_id, "Dropping malformed chat message: {}", e);
                        return;
                    }
                };

                let chat = ChatBroadcast {
                    message: request.message,
                    user_name: self.user_name.clone(),
                    user_id: self.user_id.clone(),
                    timestamp: Utc::now().timestamp(),
                };
                match Message::server(kind::CHAT_MESSAGE, &chat) {
                    Ok(mut out) => {
                        out.sender = Some(self.user_id.clone());
                        self.room.broadcast(None, &out);
                    }
                    Err(e) => error!("Failed to serialize chat message: {}", e),
                }
            }
            Route::Relay => {
                self.room.broadcast(Some(self.conn_id), &msg);
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.room.remove_client(self.conn_id);
        let member_count = self.room.member_count();

        match Message::server(
            kind::USER_LEFT,
            &Presence {
                user_id: self.user_id.clone(),
                user_name: self.user_name.clone(),
                member_count,
            },
        ) {
            Ok(left) => {
                self.room.broadcast(None, &left);
            }
            Err(e) => error!("Failed to serialize user-left: {}", e),
        }

        self.hub.remove_if_empty(&self.room.id);

        info!(
            room_id = %self.room.id,
            conn_id = %self.conn_id,
            "Client {} ({}) disconnected",
            self.user_name,
            self.user_id
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::new_record_id;

    struct Peer {
        session: Session,
        rx: mpsc::Receiver<Message>,
    }

    impl Peer {
        fn join(hub: &Arc<Hub>, record: &RoomRecord, user_id: &str) -> Self {
            let (tx, rx) = mpsc::channel(32);
            let session = Session::join(
                Arc::clone(hub),
                record,
                ConnId::new(),
                user_id.to_string(),
                format!("{user_id}-name"),
                tx,
            )
            .unwrap();
            Self { session, rx }
        }

        fn drain(&mut self) -> Vec<Message> {
            let mut out = Vec::new();
            while let Ok(msg) = self.rx.try_recv() {
                out.push(msg);
            }
            out
        }
    }

    fn record(creator: &str) -> RoomRecord {
        RoomRecord {
            id: new_record_id(),
            name: "Standup".to_string(),
            is_public: true,
            creator_id: creator.to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_join_sequence() {
        let hub = Arc::new(Hub::new());
        let record = record("alice");

        let mut alice = Peer::join(&hub, &record, "alice");
        let msgs = alice.drain();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].kind, "room-info");
        assert_eq!(msgs[0].payload["roomName"], "Standup");
        assert_eq!(msgs[0].payload["memberCount"], 1);
        assert_eq!(msgs[0].payload["isAdmin"], true);
        assert_eq!(msgs[1].kind, "existing-users");
        assert_eq!(msgs[1].payload["userIds"], serde_json::json!([]));
        assert!(alice.session.is_admin());

        let mut bob = Peer::join(&hub, &record, "bob");
        let msgs = bob.drain();
        assert_eq!(msgs[0].kind, "room-info");
        assert_eq!(msgs[0].payload["memberCount"], 2);
        assert_eq!(msgs[0].payload["isAdmin"], false);
        assert_eq!(msgs[1].payload["userIds"], serde_json::json!(["alice"]));
        assert_eq!(msgs[1].payload["users"][0]["userName"], "alice-name");
        assert_eq!(msgs[1].payload["users"][0]["isAdmin"], true);
        // Bob does not hear his own join
        assert_eq!(msgs.len(), 2);

        let msgs = alice.drain();
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].kind, "user-joined");
        assert_eq!(msgs[0].payload["userId"], "bob");
        assert_eq!(msgs[0].payload["memberCount"], 2);
    }

    #[test]
    fn test_chat_echoes_to_sender_with_timestamp() {
        let hub = Arc::new(Hub::new());
        let record = record("alice");
        let mut alice = Peer::join(&hub, &record, "alice");
        let mut bob = Peer::join(&hub, &record, "bob");
        alice.drain();
        bob.drain();

        alice
            .session
            .dispatch(r#"{"type":"chat-message","payload":{"message":"hi"},"sender":"mallory"}"#);

        for peer in [&mut alice, &mut bob] {
            let msgs = peer.drain();
            assert_eq!(msgs.len(), 1);
            let msg = &msgs[0];
            assert_eq!(msg.kind, "chat-message");
            assert_eq!(msg.sender.as_deref(), Some("alice"));
            assert_eq!(msg.payload["message"], "hi");
            assert_eq!(msg.payload["userId"], "alice");
            assert_eq!(msg.payload["userName"], "alice-name");
            assert!(msg.payload["timestamp"].is_i64());
        }
    }

    #[test]
    fn test_chat_without_message_echoes_empty() {
        let hub = Arc::new(Hub::new());
        let record = record("alice");
        let mut alice = Peer::join(&hub, &record, "alice");
        let mut bob = Peer::join(&hub, &record, "bob");
        alice.drain();
        bob.drain();

        alice.session.dispatch(r#"{"type":"chat-message","payload":{"text":42}}"#);
        alice.session.dispatch(r#"{"type":"chat-message","payload":{}}"#);
        alice.session.dispatch(r#"{"type":"chat-message"}"#);

        for peer in [&mut alice, &mut bob] {
            let msgs = peer.drain();
            assert_eq!(msgs.len(), 3);
            for msg in msgs {
                assert_eq!(msg.kind, "chat-message");
                assert_eq!(msg.payload["message"], "");
                assert_eq!(msg.payload["userId"], "alice");
                assert!(msg.payload["timestamp"].is_i64());
            }
        }
    }

    #[test]
    fn test_mistyped_chat_dropped() {
        let hub = Arc::new(Hub::new());
        let record = record("alice");
        let mut alice = Peer::join(&hub, &record, "alice");
        let mut bob = Peer::join(&hub, &record, "bob");
        alice.drain();
        bob.drain();

        alice.session.dispatch(r#"{"type":"chat-message","payload":{"message":5}}"#);
        alice.session.dispatch(r#"{"type":"chat-message","payload":"hi"}"#);
        assert!(alice.drain().is_empty());
        assert!(bob.drain().is_empty());
    }

    #[test]
    fn test_signal_goes_to_target_only() {
        let hub = Arc::new(Hub::new());
        let record = record("alice");
        let mut alice = Peer::join(&hub, &record, "alice");
        let mut bob = Peer::join(&hub, &record, "bob");
        let mut carol = Peer::join(&hub, &record, "carol");
        alice.drain();
        bob.drain();
        carol.drain();

        alice.session.dispatch(
            r#"{"type":"webrtc-offer","payload":{"sdp":"v=0","type":"offer"},"target":"bob"}"#,
        );

        assert!(alice.drain().is_empty());
        assert!(carol.drain().is_empty());
        let msgs = bob.drain();
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].kind, "webrtc-offer");
        assert_eq!(msgs[0].sender.as_deref(), Some("alice"));
        assert_eq!(msgs[0].target.as_deref(), Some("bob"));
        assert_eq!(msgs[0].payload["sdp"], "v=0");
    }

    #[test]
    fn test_signal_without_target_dropped() {
        let hub = Arc::new(Hub::new());
        let record = record("alice");
        let mut alice = Peer::join(&hub, &record, "alice");
        let mut bob = Peer::join(&hub, &record, "bob");
        alice.drain();
        bob.drain();

        alice
            .session
            .dispatch(r#"{"type":"webrtc-ice-candidate","payload":{"candidate":"c"}}"#);
        alice
            .session
            .dispatch(r#"{"type":"webrtc-answer","payload":{},"target":"ghost"}"#);

        assert!(alice.drain().is_empty());
        assert!(bob.drain().is_empty());
    }

    #[test]
    fn test_unknown_type_relayed_to_others() {
        let hub = Arc::new(Hub::new());
        let record = record("alice");
        let mut alice = Peer::join(&hub, &record, "alice");
        let mut bob = Peer::join(&hub, &record, "bob");
        alice.drain();
        bob.drain();

        alice
            .session
            .dispatch(r#"{"type":"voice-activity","payload":{"speaking":true,"level":3}}"#);

        assert!(alice.drain().is_empty());
        let msgs = bob.drain();
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].kind, "voice-activity");
        assert_eq!(msgs[0].sender.as_deref(), Some("alice"));
        assert_eq!(msgs[0].payload["level"], 3);
    }

    #[test]
    fn test_bad_frame_is_skipped() {
        let hub = Arc::new(Hub::new());
        let record = record("alice");
        let mut alice = Peer::join(&hub, &record, "alice");
        let mut bob = Peer::join(&hub, &record, "bob");
        alice.drain();
        bob.drain();

        alice.session.dispatch("not json");
        assert!(bob.drain().is_empty());

        // Session still routes afterwards
        alice.session.dispatch(r#"{"type":"hand-raise","payload":{}}"#);
        assert_eq!(bob.drain().len(), 1);
    }

    #[test]
    fn test_muted_client_still_relays() {
        let hub = Arc::new(Hub::new());
        let record = record("alice");
        let mut alice = Peer::join(&hub, &record, "alice");
        let mut bob = Peer::join(&hub, &record, "bob");
        let room_id = RoomId::from(record.id.as_str());

        hub.mute_user(&room_id, "alice", "bob").unwrap();
        alice.drain();
        bob.drain();

        bob.session.dispatch(r#"{"type":"voice-activity","payload":{}}"#);
        assert_eq!(alice.drain().len(), 1);
    }

    #[test]
    fn test_drop_announces_and_evicts() {
        let hub = Arc::new(Hub::new());
        let record = record("alice");
        let room_id = RoomId::from(record.id.as_str());
        let mut alice = Peer::join(&hub, &record, "alice");
        let bob = Peer::join(&hub, &record, "bob");
        alice.drain();

        drop(bob);
        let msgs = alice.drain();
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].kind, "user-left");
        assert_eq!(msgs[0].payload["userId"], "bob");
        assert_eq!(msgs[0].payload["userName"], "bob-name");
        assert_eq!(msgs[0].payload["memberCount"], 1);
        assert_eq!(hub.room_member_count(&room_id), 1);

        drop(alice);
        assert!(hub.get(&room_id).is_none());
    }

    #[test]
    fn test_rejoin_after_eviction() {
        let hub = Arc::new(Hub::new());
        let record = record("alice");
        let room_id = RoomId::from(record.id.as_str());

        let first = Peer::join(&hub, &record, "alice");
        let old_room = Arc::clone(first.session.room());
        drop(first);
        assert!(hub.get(&room_id).is_none());

        let second = Peer::join(&hub, &record, "alice");
        assert!(!Arc::ptr_eq(&old_room, second.session.room()));
        assert_eq!(hub.room_member_count(&room_id), 1);
    }
}
