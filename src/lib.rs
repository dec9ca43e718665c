//! WebSocket Signaling Relay Library
//!
//! Relays session-negotiation messages (offer/answer/ICE candidates),
//! chat and voice-activity events between browser peers sharing a room.
//! Payloads are opaque: the relay only routes them.
//!
//! # Architecture
//! - `Hub` maps room ids to live `Room`s, creating on first join and
//!   evicting when empty
//! - `Room` holds the connected `Client`s behind a reader/writer lock
//! - Each connection runs its own task; a `Session` joins the room,
//!   routes every inbound frame and tears the membership down on drop
//! - Room metadata comes from a `RoomStore`
//!
//! # Example
//! ```ignore
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//! use signal_relay::{Config, RelayServer};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::default();
//!     let store = Arc::new(config.seed_store());
//!     let listener = TcpListener::bind(&config.bind_addr).await.unwrap();
//!     RelayServer::new(store, &config).run(listener).await;
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod handler;
pub mod hub;
pub mod message;
pub mod room;
pub mod router;
pub mod server;
pub mod store;
pub mod types;

// Re-export main types for convenience
pub use client::{Client, Member};
pub use config::{Config, ConfigError};
pub use error::{AppError, RoomError, SendError};
pub use handler::{handle_connection, ConnectParams};
pub use hub::Hub;
pub use message::{Message, Route};
pub use room::Room;
pub use router::Session;
pub use server::{RelayServer, RelayState};
pub use store::{MemoryStore, RoomRecord, RoomStore, StoreError, UserRecord};
pub use types::{ConnId, RoomId};
