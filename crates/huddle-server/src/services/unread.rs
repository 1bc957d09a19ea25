use crate::db::Store;
use crate::error::Result;
use crate::services::{require_member, require_server};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// On-demand unread counts. Each call is one aggregate query in the store;
/// the fan-out engine pushes increments between calls.
#[derive(Clone)]
pub struct UnreadService {
    store: Arc<dyn Store>,
}

impl UnreadService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Channel id to unread count, for every channel of the server.
    pub async fn unread_for_server(&self, server_id: Uuid, profile_id: Uuid) -> Result<HashMap<Uuid, i64>> {
        require_server(self.store.as_ref(), server_id).await?;
        let member = require_member(self.store.as_ref(), server_id, profile_id).await?;
        self.store.unread_by_channel(server_id, member.id).await
    }

    pub async fn total_unread_for_server(&self, server_id: Uuid, profile_id: Uuid) -> Result<i64> {
        require_server(self.store.as_ref(), server_id).await?;
        let member = require_member(self.store.as_ref(), server_id, profile_id).await?;
        self.store.total_unread(server_id, member.id).await
    }

    /// Server id to unread total, for every server the profile belongs to.
    pub async fn unread_by_server(&self, profile_id: Uuid) -> Result<HashMap<Uuid, i64>> {
        self.store.unread_by_server(profile_id).await
    }

    /// Conversation id to unread direct messages, for every conversation of the profile.
    pub async fn unread_for_conversations(&self, profile_id: Uuid) -> Result<HashMap<Uuid, i64>> {
        self.store.unread_by_conversation(profile_id).await
    }
}
