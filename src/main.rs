//! WebSocket Signaling Relay - Entry Point
//!
//! Loads configuration, seeds the store and runs the accept loop.

use std::env;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use signal_relay::{Config, RelayServer};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Bind address from command line overrides the config file
    let config = Config::load(env::args().nth(1))?;

    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=signal_relay=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("signal_relay={}", config.log_level))),
        )
        .init();

    let store = Arc::new(config.seed_store());
    info!(
        "Store seeded with {} users, {} rooms",
        config.users.len(),
        config.rooms.len()
    );

    let listener = TcpListener::bind(&config.bind_addr).await?;
    RelayServer::new(store, &config).run(listener).await;

    Ok(())
}
