//! Configuration
//!
//! Server settings plus the users and rooms the in-memory store starts
//! with. Loaded from a TOML file named by `SIGNAL_RELAY_CONFIG`; every
//! field has a default so the file is optional.

use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::store::{MemoryStore, RoomRecord, UserRecord};

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "SIGNAL_RELAY_CONFIG";

/// Relay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Capacity of each connection's outbound queue
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub users: Vec<UserRecord>,
    #[serde(default)]
    pub rooms: Vec<SeedRoom>,
}

/// Room record to preload into the store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedRoom {
    pub id: String,
    pub name: String,
    pub creator_id: String,
    #[serde(default = "default_is_public")]
    pub is_public: bool,
}

fn default_bind_addr() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_outbound_buffer() -> usize {
    64
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_is_public() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            outbound_buffer: default_outbound_buffer(),
            log_level: default_log_level(),
            users: Vec::new(),
            rooms: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        if config.outbound_buffer == 0 {
            return Err(ConfigError::Invalid("outbound_buffer must be > 0".to_string()));
        }
        Ok(config)
    }

    /// File from `SIGNAL_RELAY_CONFIG` if set, defaults otherwise;
    /// `bind_override` (the first CLI argument) wins over the file.
    pub fn load(bind_override: Option<String>) -> Result<Self, ConfigError> {
        let mut config = match std::env::var(CONFIG_ENV) {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::default(),
        };
        if let Some(addr) = bind_override {
            config.bind_addr = addr;
        }
        Ok(config)
    }

    /// Build a store holding the configured users and rooms
    pub fn seed_store(&self) -> MemoryStore {
        let store = MemoryStore::new();
        for user in &self.users {
            store.insert_user(user.clone());
        }
        let now = Utc::now();
        for room in &self.rooms {
            store.insert_room(RoomRecord {
                id: room.id.clone(),
                name: room.name.clone(),
                is_public: room.is_public,
                creator_id: room.creator_id.clone(),
                created_at: now,
            });
        }
        store
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}
