use crate::db::Store;
use crate::error::{AppError, Result};
use crate::models::{Channel, CreateChannel, MessagePage, UpdateChannel, GENERAL_CHANNEL};
use crate::services::{hydrate, require_channel, require_manager, require_member, require_server};
use huddle_protocol::MessageData;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone)]
pub struct ChannelService {
    store: Arc<dyn Store>,
}

impl ChannelService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn list(&self, server_id: Uuid, profile_id: Uuid) -> Result<Vec<Channel>> {
        require_server(self.store.as_ref(), server_id).await?;
        require_member(self.store.as_ref(), server_id, profile_id).await?;
        self.store.channels_of_server(server_id).await
    }

    pub async fn create(&self, server_id: Uuid, profile_id: Uuid, input: CreateChannel) -> Result<Channel> {
        require_server(self.store.as_ref(), server_id).await?;
        require_manager(self.store.as_ref(), server_id, profile_id).await?;
        let name = checked_name(&input.name)?;

        let channel = self
            .store
            .insert_channel(server_id, name, input.channel_type)
            .await?;
        tracing::info!(%server_id, channel_id = %channel.id, "Channel created");
        Ok(channel)
    }

    /// Rename or retype. `general` cannot be changed by anyone, and nothing can be renamed to it.
    pub async fn update(
        &self,
        server_id: Uuid,
        channel_id: Uuid,
        profile_id: Uuid,
        input: UpdateChannel,
    ) -> Result<Channel> {
        let channel = self.channel_in_server(server_id, channel_id).await?;
        if channel.is_general() {
            return Err(AppError::forbidden("The general channel cannot be changed"));
        }
        require_manager(self.store.as_ref(), server_id, profile_id).await?;

        let name = input.name.as_deref().map(checked_name).transpose()?;
        if name.is_none() && input.channel_type.is_none() {
            return Err(AppError::Validation("Nothing to update".to_string()));
        }

        self.store
            .update_channel(channel.id, name, input.channel_type)
            .await
    }

    pub async fn delete(&self, server_id: Uuid, channel_id: Uuid, profile_id: Uuid) -> Result<()> {
        let channel = self.channel_in_server(server_id, channel_id).await?;
        if channel.is_general() {
            return Err(AppError::forbidden("The general channel cannot be deleted"));
        }
        require_manager(self.store.as_ref(), server_id, profile_id).await?;

        self.store.delete_channel(channel.id).await?;
        tracing::info!(%server_id, %channel_id, "Channel deleted");
        Ok(())
    }

    /// Newest first. Tombstoned messages are included with `deleted = true`.
    pub async fn history(
        &self,
        channel_id: Uuid,
        profile_id: Uuid,
        cursor: Option<Uuid>,
        limit: usize,
    ) -> Result<MessagePage<MessageData>> {
        let channel = require_channel(self.store.as_ref(), channel_id).await?;
        require_member(self.store.as_ref(), channel.server_id, profile_id).await?;

        let rows = self
            .store
            .channel_messages(channel.id, cursor, limit as i64)
            .await?;
        let items = hydrate::message_page(self.store.as_ref(), rows).await?;
        Ok(MessagePage::from_items(items, limit, |m| m.id))
    }

    async fn channel_in_server(&self, server_id: Uuid, channel_id: Uuid) -> Result<Channel> {
        self.store
            .channel_by_id(channel_id)
            .await?
            .filter(|c| c.server_id == server_id)
            .ok_or_else(|| AppError::not_found("Channel not found"))
    }
}

fn checked_name(name: &str) -> Result<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("Channel name is required".to_string()));
    }
    if name == GENERAL_CHANNEL {
        return Err(AppError::forbidden("Channel name \"general\" is reserved"));
    }
    Ok(name)
}
