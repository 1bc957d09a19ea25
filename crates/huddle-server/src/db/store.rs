//! Data-access interface the real-time core depends on.
//!
//! Uniqueness guarantees live here, not in the callers: one member per
//! (server, profile), one channel name per server, one read row per
//! (member, channel) and (profile, conversation), one conversation per
//! canonical profile pair. Read rows never move backward.

use crate::error::Result;
use crate::models::{
    Channel, ChannelRead, ChannelType, Conversation, ConversationRead, CreateMessage,
    DirectMessage, Member, MemberRole, Message, NewProfile, Profile, Server, UpdateMessage,
};
use async_trait::async_trait;
use std::collections::HashMap;
use uuid::Uuid;

#[async_trait]
pub trait Store: Send + Sync {
    // Profiles

    /// Returns the profile for an external identity, creating it on first contact.
    async fn get_or_create_profile(&self, input: NewProfile) -> Result<Profile>;
    async fn profile_by_id(&self, id: Uuid) -> Result<Option<Profile>>;

    // Servers and members

    /// Creates the server together with its `general` channel and the owner's membership.
    async fn create_server(
        &self,
        owner_profile_id: Uuid,
        name: &str,
        image_url: Option<&str>,
        invite_code: &str,
    ) -> Result<(Server, Member, Channel)>;
    async fn server_by_id(&self, id: Uuid) -> Result<Option<Server>>;
    async fn server_by_invite_code(&self, code: &str) -> Result<Option<Server>>;
    async fn set_invite_code(&self, server_id: Uuid, code: &str) -> Result<Server>;
    async fn update_server(&self, id: Uuid, name: Option<&str>, image_url: Option<&str>) -> Result<Server>;
    /// Removes the server with its channels, members, messages and read rows.
    async fn delete_server(&self, id: Uuid) -> Result<()>;
    /// Servers the profile belongs to, newest first, with its membership in each
    async fn servers_for_profile(&self, profile_id: Uuid, skip: i64, limit: i64) -> Result<Vec<(Server, Member)>>;
    async fn count_servers_for_profile(&self, profile_id: Uuid) -> Result<i64>;

    async fn member_by_id(&self, id: Uuid) -> Result<Option<Member>>;
    async fn member_in_server(&self, server_id: Uuid, profile_id: Uuid) -> Result<Option<Member>>;
    /// Fails with `Conflict` if the profile is already a member.
    async fn add_member(&self, server_id: Uuid, profile_id: Uuid, role: MemberRole) -> Result<Member>;
    async fn members_of_server(&self, server_id: Uuid) -> Result<Vec<Member>>;
    async fn set_member_role(&self, member_id: Uuid, role: MemberRole) -> Result<Member>;
    /// Removes the membership along with its messages and read rows.
    async fn remove_member(&self, member_id: Uuid) -> Result<()>;

    // Channels

    async fn channel_by_id(&self, id: Uuid) -> Result<Option<Channel>>;
    async fn channels_of_server(&self, server_id: Uuid) -> Result<Vec<Channel>>;
    /// Fails with `Conflict` on a duplicate name within the server.
    async fn insert_channel(&self, server_id: Uuid, name: &str, channel_type: ChannelType) -> Result<Channel>;
    async fn update_channel(
        &self,
        id: Uuid,
        name: Option<&str>,
        channel_type: Option<ChannelType>,
    ) -> Result<Channel>;
    async fn delete_channel(&self, id: Uuid) -> Result<()>;

    // Channel messages

    async fn insert_message(&self, channel_id: Uuid, member_id: Uuid, input: &CreateMessage) -> Result<Message>;
    async fn message_by_id(&self, id: Uuid) -> Result<Option<Message>>;
    async fn update_message(&self, id: Uuid, input: &UpdateMessage) -> Result<Message>;
    /// Soft delete: clears the file, replaces content with the tombstone, keeps the row.
    async fn tombstone_message(&self, id: Uuid) -> Result<Message>;
    /// Newest first, strictly older than `cursor` when given.
    async fn channel_messages(&self, channel_id: Uuid, cursor: Option<Uuid>, limit: i64) -> Result<Vec<Message>>;

    // Conversations and direct messages

    async fn get_or_create_conversation(&self, a: Uuid, b: Uuid) -> Result<Conversation>;
    async fn conversation_by_id(&self, id: Uuid) -> Result<Option<Conversation>>;
    async fn conversations_for_profile(&self, profile_id: Uuid) -> Result<Vec<Conversation>>;

    async fn insert_direct_message(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        input: &CreateMessage,
    ) -> Result<DirectMessage>;
    async fn direct_message_by_id(&self, id: Uuid) -> Result<Option<DirectMessage>>;
    async fn update_direct_message(&self, id: Uuid, input: &UpdateMessage) -> Result<DirectMessage>;
    async fn tombstone_direct_message(&self, id: Uuid) -> Result<DirectMessage>;
    async fn direct_messages(
        &self,
        conversation_id: Uuid,
        cursor: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<DirectMessage>>;

    // Read state

    /// Sets `last_read_at` to now, never moving it backward.
    async fn upsert_channel_read(&self, member_id: Uuid, channel_id: Uuid) -> Result<ChannelRead>;
    async fn upsert_conversation_read(&self, profile_id: Uuid, conversation_id: Uuid) -> Result<ConversationRead>;

    // Unread aggregates, each a single pass over messages and read rows

    /// Every channel of the server mapped to the member's unread count (zero included).
    async fn unread_by_channel(&self, server_id: Uuid, member_id: Uuid) -> Result<HashMap<Uuid, i64>>;
    async fn total_unread(&self, server_id: Uuid, member_id: Uuid) -> Result<i64>;
    /// Unread totals for every server the profile is a member of.
    async fn unread_by_server(&self, profile_id: Uuid) -> Result<HashMap<Uuid, i64>>;
    /// Unread direct messages for every conversation the profile takes part in.
    async fn unread_by_conversation(&self, profile_id: Uuid) -> Result<HashMap<Uuid, i64>>;
    async fn unread_in_conversation(&self, conversation_id: Uuid, profile_id: Uuid) -> Result<i64>;
}
