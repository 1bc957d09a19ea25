//! Huddle Server Library
//!
//! Real-time chat backend: room membership, message fan-out, read-state
//! tracking and unread aggregation. Exposed for testing and embedding.

pub mod api;
pub mod auth;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod state;
pub mod ws;

use anyhow::Result;
use db::{MemoryStore, PgStore, Store};
use state::{AppState, Config, StorageKind};
use std::sync::Arc;
use ws::{LocalHub, RoomHub};

/// Open the configured store, running migrations for Postgres.
pub async fn open_store(config: &Config) -> Result<Arc<dyn Store>> {
    match config.storage {
        StorageKind::Postgres => {
            let pool = db::init_pool(&config.database_url, config.max_connections).await?;
            db::run_migrations(&pool).await?;
            Ok(Arc::new(PgStore::new(pool)))
        }
        StorageKind::Memory => {
            tracing::warn!("Using in-memory storage; data is lost on restart");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

/// Build the router around an existing store and hub. Instances that share
/// a [`ws::RelayBus`] through their hubs reach each other's connections.
pub fn create_app_with(config: Config, store: Arc<dyn Store>, hub: Arc<dyn RoomHub>) -> axum::Router {
    let app_state = AppState::new(config, store, hub);
    api::create_router(app_state)
}

/// Create and configure the server application. The binary serves one
/// process, so it gets a [`LocalHub`]; several routers sharing a
/// [`ws::RelayBus`] are built with [`create_app_with`].
pub async fn create_app(config: Config) -> Result<axum::Router> {
    let store = open_store(&config).await?;
    Ok(create_app_with(config, store, Arc::new(LocalHub::new())))
}
