//! Relay server
//!
//! Owns the shared state every connection task works against and runs
//! the accept loop, one spawned task per connection.

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info};

use crate::config::Config;
use crate::handler::handle_connection;
use crate::hub::Hub;
use crate::store::RoomStore;

/// State shared by all connection tasks
pub struct RelayState {
    pub hub: Arc<Hub>,
    pub store: Arc<dyn RoomStore>,
    /// Capacity of each connection's outbound queue
    pub outbound_buffer: usize,
}

/// The relay server
pub struct RelayServer {
    state: Arc<RelayState>,
}

impl RelayServer {
    /// Create a server with an empty hub over `store`
    pub fn new(store: Arc<dyn RoomStore>, config: &Config) -> Self {
        Self {
            state: Arc::new(RelayState {
                hub: Arc::new(Hub::new()),
                store,
                outbound_buffer: config.outbound_buffer,
            }),
        }
    }

    /// Room registry, for API-layer queries and admin actions
    pub fn hub(&self) -> Arc<Hub> {
        Arc::clone(&self.state.hub)
    }

    /// Persistence backend shared with connection tasks
    pub fn store(&self) -> Arc<dyn RoomStore> {
        Arc::clone(&self.state.store)
    }

    /// Accept connections forever
    pub async fn run(self, listener: TcpListener) {
        if let Ok(addr) = listener.local_addr() {
            info!("Signal relay listening on {}", addr);
        }

        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    info!("New connection from {}", addr);
                    let state = Arc::clone(&self.state);

                    // Spawn handler task for each connection
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, state).await {
                            error!("Connection handler error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    }
}
