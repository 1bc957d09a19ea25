use crate::db::Store;
use crate::services::{
    ChannelService, ConversationService, FanoutService, ReadStateService, ServerService,
    UnreadService,
};
use crate::ws::RoomHub;
use config::{Config as ConfigSource, Environment};
use serde::Deserialize;
use std::sync::Arc;

const DEFAULT_JWT_SECRET: &str = "dev-secret-change-in-production";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Postgres,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub bind_address: String,
    pub database_url: String,
    pub max_connections: u32,
    pub jwt_secret: String,
    pub storage: StorageKind,
    /// Comma separated; empty allows any origin
    pub cors_origins: String,
    pub history_page_size: usize,
    pub log_json: bool,
}

impl Config {
    /// Defaults, overridden by `HUDDLE_*` environment variables (a `.env`
    /// file is read first if present).
    pub fn load() -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();

        let config = ConfigSource::builder()
            .set_default("bind_address", "0.0.0.0:8080")?
            .set_default("database_url", "postgres://localhost/huddle")?
            .set_default("max_connections", 10)?
            .set_default("jwt_secret", DEFAULT_JWT_SECRET)?
            .set_default("storage", "postgres")?
            .set_default("cors_origins", "")?
            .set_default("history_page_size", 20)?
            .set_default("log_json", false)?
            .add_source(Environment::with_prefix("HUDDLE").try_parsing(true))
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    pub fn uses_default_jwt_secret(&self) -> bool {
        self.jwt_secret == DEFAULT_JWT_SECRET
    }

    /// In-memory configuration for tests and local experiments.
    pub fn in_memory(jwt_secret: &str) -> Self {
        Self {
            bind_address: "127.0.0.1:0".to_string(),
            database_url: String::new(),
            max_connections: 1,
            jwt_secret: jwt_secret.to_string(),
            storage: StorageKind::Memory,
            cors_origins: String::new(),
            history_page_size: 20,
            log_json: false,
        }
    }

    pub fn cors_origin_list(&self) -> Vec<String> {
        self.cors_origins
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(String::from)
            .collect()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn Store>,
    pub hub: Arc<dyn RoomHub>,
    pub server_service: ServerService,
    pub channel_service: ChannelService,
    pub conversation_service: ConversationService,
    pub fanout_service: FanoutService,
    pub read_state_service: ReadStateService,
    pub unread_service: UnreadService,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn Store>, hub: Arc<dyn RoomHub>) -> Self {
        let server_service = ServerService::new(store.clone());
        let channel_service = ChannelService::new(store.clone());
        let conversation_service = ConversationService::new(store.clone());
        let fanout_service = FanoutService::new(store.clone(), hub.clone());
        let read_state_service = ReadStateService::new(store.clone(), hub.clone());
        let unread_service = UnreadService::new(store.clone());

        Self {
            config,
            store,
            hub,
            server_service,
            channel_service,
            conversation_service,
            fanout_service,
            read_state_service,
            unread_service,
        }
    }
}
