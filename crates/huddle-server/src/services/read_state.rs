use crate::db::Store;
use crate::error::{AppError, Result};
use crate::models::{ChannelRead, ConversationRead};
use crate::services::{require_channel, require_conversation, require_endpoint, require_member};
use crate::ws::RoomHub;
use huddle_protocol::{Room, ServerEvent};
use std::sync::Arc;
use uuid::Uuid;

/// Records how far members have read. Every write moves `last_read_at`
/// forward to now and never backward, so repeating a mark-read is harmless.
#[derive(Clone)]
pub struct ReadStateService {
    store: Arc<dyn Store>,
    hub: Arc<dyn RoomHub>,
}

impl ReadStateService {
    pub fn new(store: Arc<dyn Store>, hub: Arc<dyn RoomHub>) -> Self {
        Self { store, hub }
    }

    pub async fn mark_channel_read(
        &self,
        channel_id: Uuid,
        server_id: Uuid,
        profile_id: Uuid,
    ) -> Result<ChannelRead> {
        let channel = require_channel(self.store.as_ref(), channel_id).await?;
        if channel.server_id != server_id {
            return Err(AppError::not_found("Channel not found in this server"));
        }
        let member = require_member(self.store.as_ref(), server_id, profile_id).await?;

        let read = self.store.upsert_channel_read(member.id, channel.id).await?;
        tracing::debug!(%channel_id, member_id = %member.id, "Channel marked read");
        Ok(read)
    }

    /// Mark read, then tell the profile's other connections about the new
    /// read position and the server's remaining unread total.
    pub async fn mark_channel_read_and_notify(
        &self,
        channel_id: Uuid,
        server_id: Uuid,
        profile_id: Uuid,
    ) -> Result<(ChannelRead, i64)> {
        let read = self
            .mark_channel_read(channel_id, server_id, profile_id)
            .await?;
        let total_unread = self.store.total_unread(server_id, read.member_id).await?;

        let inbox = Room::Profile(profile_id);
        self.hub
            .emit(
                inbox,
                &ServerEvent::ChannelMarkRead {
                    channel_id,
                    server_id,
                    last_read_at: read.last_read_at,
                },
            )
            .await;
        self.hub
            .emit(
                inbox,
                &ServerEvent::ServerUnreadUpdate {
                    server_id,
                    total_unread,
                },
            )
            .await;

        Ok((read, total_unread))
    }

    /// Fire-and-forget mark-read used when a connection leaves a channel room.
    /// Failures are logged and dropped.
    pub fn spawn_mark_channel_read(&self, channel_id: Uuid, profile_id: Uuid) {
        let service = self.clone();
        tokio::spawn(async move {
            let result = async {
                let channel = require_channel(service.store.as_ref(), channel_id).await?;
                service
                    .mark_channel_read_and_notify(channel.id, channel.server_id, profile_id)
                    .await
            }
            .await;

            if let Err(e) = result {
                tracing::warn!(%channel_id, %profile_id, "Mark-read on leave failed: {}", e);
            }
        });
    }

    pub async fn mark_conversation_read(
        &self,
        conversation_id: Uuid,
        profile_id: Uuid,
    ) -> Result<ConversationRead> {
        let conversation = require_conversation(self.store.as_ref(), conversation_id).await?;
        require_endpoint(&conversation, profile_id)?;

        let read = self
            .store
            .upsert_conversation_read(profile_id, conversation.id)
            .await?;
        tracing::debug!(%conversation_id, %profile_id, "Conversation marked read");
        Ok(read)
    }
}
