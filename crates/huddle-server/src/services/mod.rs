pub mod channel;
pub mod conversation;
pub mod fanout;
pub mod hydrate;
pub mod read_state;
pub mod server;
pub mod unread;

pub use channel::ChannelService;
pub use conversation::ConversationService;
pub use fanout::FanoutService;
pub use read_state::ReadStateService;
pub use server::ServerService;
pub use unread::UnreadService;

use crate::db::Store;
use crate::error::{AppError, Result};
use crate::models::{Channel, Conversation, Member, Server};
use uuid::Uuid;

pub(crate) async fn require_server(store: &dyn Store, server_id: Uuid) -> Result<Server> {
    store
        .server_by_id(server_id)
        .await?
        .ok_or_else(|| AppError::not_found("Server not found"))
}

pub(crate) async fn require_channel(store: &dyn Store, channel_id: Uuid) -> Result<Channel> {
    store
        .channel_by_id(channel_id)
        .await?
        .ok_or_else(|| AppError::not_found("Channel not found"))
}

pub(crate) async fn require_conversation(store: &dyn Store, conversation_id: Uuid) -> Result<Conversation> {
    store
        .conversation_by_id(conversation_id)
        .await?
        .ok_or_else(|| AppError::not_found("Conversation not found"))
}

/// The profile's membership in the server, or `Forbidden`.
pub(crate) async fn require_member(store: &dyn Store, server_id: Uuid, profile_id: Uuid) -> Result<Member> {
    store
        .member_in_server(server_id, profile_id)
        .await?
        .ok_or_else(|| AppError::forbidden("Not a member of this server"))
}

/// Like [`require_member`], but the member must be OWNER or VICE_OWNER.
pub(crate) async fn require_manager(store: &dyn Store, server_id: Uuid, profile_id: Uuid) -> Result<Member> {
    let member = require_member(store, server_id, profile_id).await?;
    if !member.role.can_manage() {
        return Err(AppError::forbidden(
            "Only the owner or a vice-owner can do that",
        ));
    }
    Ok(member)
}

/// The profile must be one of the conversation's two endpoints.
pub(crate) fn require_endpoint(conversation: &Conversation, profile_id: Uuid) -> Result<()> {
    if conversation.includes(profile_id) {
        Ok(())
    } else {
        Err(AppError::forbidden("Not part of this conversation"))
    }
}
