use crate::db::store::Store;
use crate::error::{AppError, Result};
use crate::models::{
    canonical_pair, Channel, ChannelRead, ChannelType, Conversation, ConversationRead,
    CreateMessage, DirectMessage, Member, MemberRole, Message, NewProfile, Profile, Server,
    UpdateMessage, GENERAL_CHANNEL, TOMBSTONE,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// In-process storage gateway with the same uniqueness rules as the Postgres schema.
///
/// Every timestamp it hands out is strictly greater than the previous one, so
/// "created after the last read" comparisons never tie.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    last_stamp: Option<DateTime<Utc>>,
    profiles: HashMap<Uuid, Profile>,
    servers: HashMap<Uuid, Server>,
    members: HashMap<Uuid, Member>,
    channels: HashMap<Uuid, Channel>,
    messages: HashMap<Uuid, Message>,
    conversations: HashMap<Uuid, Conversation>,
    direct_messages: HashMap<Uuid, DirectMessage>,
    channel_reads: HashMap<(Uuid, Uuid), ChannelRead>,
    conversation_reads: HashMap<(Uuid, Uuid), ConversationRead>,
}

impl Inner {
    fn now(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let stamp = match self.last_stamp {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_stamp = Some(stamp);
        stamp
    }

    fn channel_name_taken(&self, server_id: Uuid, name: &str, except: Option<Uuid>) -> bool {
        self.channels
            .values()
            .any(|c| c.server_id == server_id && c.name == name && Some(c.id) != except)
    }

    fn channel_read_at(&self, member_id: Uuid, channel_id: Uuid) -> DateTime<Utc> {
        self.channel_reads
            .get(&(member_id, channel_id))
            .map(|r| r.last_read_at)
            .unwrap_or(DateTime::UNIX_EPOCH)
    }

    fn unread_in_channel(&self, channel_id: Uuid, member_id: Uuid) -> i64 {
        let last_read = self.channel_read_at(member_id, channel_id);
        self.messages
            .values()
            .filter(|m| {
                m.channel_id == channel_id
                    && !m.deleted
                    && m.member_id != member_id
                    && m.created_at > last_read
            })
            .count() as i64
    }

    fn unread_in_conversation(&self, conversation_id: Uuid, profile_id: Uuid) -> i64 {
        let last_read = self
            .conversation_reads
            .get(&(profile_id, conversation_id))
            .map(|r| r.last_read_at)
            .unwrap_or(DateTime::UNIX_EPOCH);
        self.direct_messages
            .values()
            .filter(|m| {
                m.conversation_id == conversation_id
                    && !m.deleted
                    && m.sender_id != profile_id
                    && m.created_at > last_read
            })
            .count() as i64
    }

    /// Drop a member's messages and read rows, then the member.
    fn remove_member(&mut self, member_id: Uuid) {
        self.members.remove(&member_id);
        self.messages.retain(|_, m| m.member_id != member_id);
        self.channel_reads.retain(|(id, _), _| *id != member_id);
    }

    fn insert_channel(&mut self, server_id: Uuid, name: &str, channel_type: ChannelType) -> Result<Channel> {
        if self.channel_name_taken(server_id, name, None) {
            return Err(AppError::Conflict(
                "Channel name already exists in this server".to_string(),
            ));
        }
        let now = self.now();
        let channel = Channel {
            id: Uuid::new_v4(),
            server_id,
            name: name.to_string(),
            channel_type,
            created_at: now,
            updated_at: now,
        };
        self.channels.insert(channel.id, channel.clone());
        Ok(channel)
    }

    fn insert_member(&mut self, server_id: Uuid, profile_id: Uuid, role: MemberRole) -> Result<Member> {
        if self
            .members
            .values()
            .any(|m| m.server_id == server_id && m.profile_id == profile_id)
        {
            return Err(AppError::Conflict(
                "Already a member of this server".to_string(),
            ));
        }
        let member = Member {
            id: Uuid::new_v4(),
            server_id,
            profile_id,
            role,
            created_at: self.now(),
        };
        self.members.insert(member.id, member.clone());
        Ok(member)
    }
}

/// Newest first, then strictly older than the cursor row.
fn page<T: Clone>(
    mut rows: Vec<T>,
    key: impl Fn(&T) -> (DateTime<Utc>, Uuid),
    cursor: Option<(DateTime<Utc>, Uuid)>,
    limit: i64,
) -> Vec<T> {
    rows.sort_by_key(|r| std::cmp::Reverse(key(r)));
    rows.into_iter()
        .filter(|r| cursor.is_none_or(|c| key(r) < c))
        .take(limit.max(0) as usize)
        .collect()
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_or_create_profile(&self, input: NewProfile) -> Result<Profile> {
        let mut inner = self.inner.write().await;
        if let Some(existing) = inner
            .profiles
            .values()
            .find(|p| p.external_user_id == input.external_user_id)
        {
            return Ok(existing.clone());
        }

        let now = inner.now();
        let profile = Profile {
            id: Uuid::new_v4(),
            external_user_id: input.external_user_id,
            name: input.name,
            email: input.email,
            image_url: input.image_url,
            created_at: now,
            updated_at: now,
        };
        inner.profiles.insert(profile.id, profile.clone());
        Ok(profile)
    }

    async fn profile_by_id(&self, id: Uuid) -> Result<Option<Profile>> {
        Ok(self.inner.read().await.profiles.get(&id).cloned())
    }

    async fn create_server(
        &self,
        owner_profile_id: Uuid,
        name: &str,
        image_url: Option<&str>,
        invite_code: &str,
    ) -> Result<(Server, Member, Channel)> {
        let mut inner = self.inner.write().await;
        if inner.servers.values().any(|s| s.invite_code == invite_code) {
            return Err(AppError::Conflict("Invite code already in use".to_string()));
        }

        let now = inner.now();
        let server = Server {
            id: Uuid::new_v4(),
            owner_profile_id,
            name: name.to_string(),
            image_url: image_url.map(String::from),
            invite_code: invite_code.to_string(),
            created_at: now,
            updated_at: now,
        };
        inner.servers.insert(server.id, server.clone());
        let member = inner.insert_member(server.id, owner_profile_id, MemberRole::Owner)?;
        let channel = inner.insert_channel(server.id, GENERAL_CHANNEL, ChannelType::Text)?;

        Ok((server, member, channel))
    }

    async fn server_by_id(&self, id: Uuid) -> Result<Option<Server>> {
        Ok(self.inner.read().await.servers.get(&id).cloned())
    }

    async fn server_by_invite_code(&self, code: &str) -> Result<Option<Server>> {
        Ok(self
            .inner
            .read()
            .await
            .servers
            .values()
            .find(|s| s.invite_code == code)
            .cloned())
    }

    async fn set_invite_code(&self, server_id: Uuid, code: &str) -> Result<Server> {
        let mut inner = self.inner.write().await;
        if inner
            .servers
            .values()
            .any(|s| s.invite_code == code && s.id != server_id)
        {
            return Err(AppError::Conflict("Invite code already in use".to_string()));
        }
        let now = inner.now();
        let server = inner
            .servers
            .get_mut(&server_id)
            .ok_or_else(|| AppError::not_found("Server not found"))?;
        server.invite_code = code.to_string();
        server.updated_at = now;
        Ok(server.clone())
    }

    async fn update_server(&self, id: Uuid, name: Option<&str>, image_url: Option<&str>) -> Result<Server> {
        let mut inner = self.inner.write().await;
        let now = inner.now();
        let server = inner
            .servers
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found("Server not found"))?;
        if let Some(name) = name {
            server.name = name.to_string();
        }
        if let Some(image_url) = image_url {
            server.image_url = Some(image_url.to_string());
        }
        server.updated_at = now;
        Ok(server.clone())
    }

    async fn delete_server(&self, id: Uuid) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner
            .servers
            .remove(&id)
            .ok_or_else(|| AppError::not_found("Server not found"))?;

        let members: Vec<Uuid> = inner
            .members
            .values()
            .filter(|m| m.server_id == id)
            .map(|m| m.id)
            .collect();
        for member_id in members {
            inner.remove_member(member_id);
        }
        let channels: Vec<Uuid> = inner
            .channels
            .values()
            .filter(|c| c.server_id == id)
            .map(|c| c.id)
            .collect();
        inner.channels.retain(|_, c| c.server_id != id);
        inner.messages.retain(|_, m| !channels.contains(&m.channel_id));
        inner.channel_reads.retain(|(_, channel_id), _| !channels.contains(channel_id));
        Ok(())
    }

    async fn servers_for_profile(&self, profile_id: Uuid, skip: i64, limit: i64) -> Result<Vec<(Server, Member)>> {
        let inner = self.inner.read().await;
        let mut rows: Vec<(Server, Member)> = inner
            .members
            .values()
            .filter(|m| m.profile_id == profile_id)
            .filter_map(|m| inner.servers.get(&m.server_id).map(|s| (s.clone(), m.clone())))
            .collect();
        rows.sort_by_key(|(s, _)| std::cmp::Reverse((s.created_at, s.id)));
        Ok(rows
            .into_iter()
            .skip(skip.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn count_servers_for_profile(&self, profile_id: Uuid) -> Result<i64> {
        let inner = self.inner.read().await;
        Ok(inner
            .members
            .values()
            .filter(|m| m.profile_id == profile_id && inner.servers.contains_key(&m.server_id))
            .count() as i64)
    }

    async fn member_by_id(&self, id: Uuid) -> Result<Option<Member>> {
        Ok(self.inner.read().await.members.get(&id).cloned())
    }

    async fn member_in_server(&self, server_id: Uuid, profile_id: Uuid) -> Result<Option<Member>> {
        Ok(self
            .inner
            .read()
            .await
            .members
            .values()
            .find(|m| m.server_id == server_id && m.profile_id == profile_id)
            .cloned())
    }

    async fn add_member(&self, server_id: Uuid, profile_id: Uuid, role: MemberRole) -> Result<Member> {
        let mut inner = self.inner.write().await;
        if !inner.servers.contains_key(&server_id) {
            return Err(AppError::not_found("Server not found"));
        }
        inner.insert_member(server_id, profile_id, role)
    }

    async fn members_of_server(&self, server_id: Uuid) -> Result<Vec<Member>> {
        let inner = self.inner.read().await;
        let mut members: Vec<Member> = inner
            .members
            .values()
            .filter(|m| m.server_id == server_id)
            .cloned()
            .collect();
        members.sort_by_key(|m| m.created_at);
        Ok(members)
    }

    async fn set_member_role(&self, member_id: Uuid, role: MemberRole) -> Result<Member> {
        let mut inner = self.inner.write().await;
        let member = inner
            .members
            .get_mut(&member_id)
            .ok_or_else(|| AppError::not_found("Member not found"))?;
        member.role = role;
        Ok(member.clone())
    }

    async fn remove_member(&self, member_id: Uuid) -> Result<()> {
        let mut inner = self.inner.write().await;
        if !inner.members.contains_key(&member_id) {
            return Err(AppError::not_found("Member not found"));
        }
        inner.remove_member(member_id);
        Ok(())
    }

    async fn channel_by_id(&self, id: Uuid) -> Result<Option<Channel>> {
        Ok(self.inner.read().await.channels.get(&id).cloned())
    }

    async fn channels_of_server(&self, server_id: Uuid) -> Result<Vec<Channel>> {
        let inner = self.inner.read().await;
        let mut channels: Vec<Channel> = inner
            .channels
            .values()
            .filter(|c| c.server_id == server_id)
            .cloned()
            .collect();
        channels.sort_by_key(|c| c.created_at);
        Ok(channels)
    }

    async fn insert_channel(&self, server_id: Uuid, name: &str, channel_type: ChannelType) -> Result<Channel> {
        let mut inner = self.inner.write().await;
        if !inner.servers.contains_key(&server_id) {
            return Err(AppError::not_found("Server not found"));
        }
        inner.insert_channel(server_id, name, channel_type)
    }

    async fn update_channel(
        &self,
        id: Uuid,
        name: Option<&str>,
        channel_type: Option<ChannelType>,
    ) -> Result<Channel> {
        let mut inner = self.inner.write().await;
        let server_id = inner
            .channels
            .get(&id)
            .map(|c| c.server_id)
            .ok_or_else(|| AppError::not_found("Channel not found"))?;
        if let Some(name) = name {
            if inner.channel_name_taken(server_id, name, Some(id)) {
                return Err(AppError::Conflict(
                    "Channel name already exists in this server".to_string(),
                ));
            }
        }

        let now = inner.now();
        let channel = inner
            .channels
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found("Channel not found"))?;
        if let Some(name) = name {
            channel.name = name.to_string();
        }
        if let Some(channel_type) = channel_type {
            channel.channel_type = channel_type;
        }
        channel.updated_at = now;
        Ok(channel.clone())
    }

    async fn delete_channel(&self, id: Uuid) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner
            .channels
            .remove(&id)
            .ok_or_else(|| AppError::not_found("Channel not found"))?;
        inner.messages.retain(|_, m| m.channel_id != id);
        inner.channel_reads.retain(|(_, channel_id), _| *channel_id != id);
        Ok(())
    }

    async fn insert_message(&self, channel_id: Uuid, member_id: Uuid, input: &CreateMessage) -> Result<Message> {
        let mut inner = self.inner.write().await;
        if !inner.channels.contains_key(&channel_id) {
            return Err(AppError::not_found("Channel not found"));
        }
        let now = inner.now();
        let message = Message {
            id: Uuid::new_v4(),
            channel_id,
            member_id,
            content: input.content_or_empty(),
            file_url: input.file_url.clone(),
            file_type: input.file_type.unwrap_or_default(),
            deleted: false,
            created_at: now,
            updated_at: now,
        };
        inner.messages.insert(message.id, message.clone());
        Ok(message)
    }

    async fn message_by_id(&self, id: Uuid) -> Result<Option<Message>> {
        Ok(self.inner.read().await.messages.get(&id).cloned())
    }

    async fn update_message(&self, id: Uuid, input: &UpdateMessage) -> Result<Message> {
        let mut inner = self.inner.write().await;
        let now = inner.now();
        let message = inner
            .messages
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found("Message not found"))?;
        if let Some(content) = &input.content {
            message.content = content.clone();
        }
        if let Some(file_url) = &input.file_url {
            message.file_url = Some(file_url.clone());
        }
        message.updated_at = now;
        Ok(message.clone())
    }

    async fn tombstone_message(&self, id: Uuid) -> Result<Message> {
        let mut inner = self.inner.write().await;
        let now = inner.now();
        let message = inner
            .messages
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found("Message not found"))?;
        message.file_url = None;
        message.content = TOMBSTONE.to_string();
        message.deleted = true;
        message.updated_at = now;
        Ok(message.clone())
    }

    async fn channel_messages(&self, channel_id: Uuid, cursor: Option<Uuid>, limit: i64) -> Result<Vec<Message>> {
        let inner = self.inner.read().await;
        let anchor = match cursor {
            Some(cursor) => Some(
                inner
                    .messages
                    .get(&cursor)
                    .filter(|m| m.channel_id == channel_id)
                    .map(|m| (m.created_at, m.id))
                    .ok_or_else(|| AppError::not_found("Cursor message not found"))?,
            ),
            None => None,
        };
        let rows = inner
            .messages
            .values()
            .filter(|m| m.channel_id == channel_id)
            .cloned()
            .collect();
        Ok(page(rows, |m| (m.created_at, m.id), anchor, limit))
    }

    async fn get_or_create_conversation(&self, a: Uuid, b: Uuid) -> Result<Conversation> {
        let (one, two) = canonical_pair(a, b);
        let mut inner = self.inner.write().await;
        if let Some(existing) = inner
            .conversations
            .values()
            .find(|c| c.profile_one_id == one && c.profile_two_id == two)
        {
            return Ok(existing.clone());
        }

        let conversation = Conversation {
            id: Uuid::new_v4(),
            profile_one_id: one,
            profile_two_id: two,
            created_at: inner.now(),
        };
        inner
            .conversations
            .insert(conversation.id, conversation.clone());
        Ok(conversation)
    }

    async fn conversation_by_id(&self, id: Uuid) -> Result<Option<Conversation>> {
        Ok(self.inner.read().await.conversations.get(&id).cloned())
    }

    async fn conversations_for_profile(&self, profile_id: Uuid) -> Result<Vec<Conversation>> {
        let inner = self.inner.read().await;
        let mut conversations: Vec<Conversation> = inner
            .conversations
            .values()
            .filter(|c| c.includes(profile_id))
            .cloned()
            .collect();
        conversations.sort_by_key(|c| std::cmp::Reverse(c.created_at));
        Ok(conversations)
    }

    async fn insert_direct_message(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        input: &CreateMessage,
    ) -> Result<DirectMessage> {
        let mut inner = self.inner.write().await;
        if !inner.conversations.contains_key(&conversation_id) {
            return Err(AppError::not_found("Conversation not found"));
        }
        let now = inner.now();
        let message = DirectMessage {
            id: Uuid::new_v4(),
            conversation_id,
            sender_id,
            content: input.content_or_empty(),
            file_url: input.file_url.clone(),
            file_type: input.file_type.unwrap_or_default(),
            deleted: false,
            created_at: now,
            updated_at: now,
        };
        inner.direct_messages.insert(message.id, message.clone());
        Ok(message)
    }

    async fn direct_message_by_id(&self, id: Uuid) -> Result<Option<DirectMessage>> {
        Ok(self.inner.read().await.direct_messages.get(&id).cloned())
    }

    async fn update_direct_message(&self, id: Uuid, input: &UpdateMessage) -> Result<DirectMessage> {
        let mut inner = self.inner.write().await;
        let now = inner.now();
        let message = inner
            .direct_messages
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found("Direct message not found"))?;
        if let Some(content) = &input.content {
            message.content = content.clone();
        }
        if let Some(file_url) = &input.file_url {
            message.file_url = Some(file_url.clone());
        }
        message.updated_at = now;
        Ok(message.clone())
    }

    async fn tombstone_direct_message(&self, id: Uuid) -> Result<DirectMessage> {
        let mut inner = self.inner.write().await;
        let now = inner.now();
        let message = inner
            .direct_messages
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found("Direct message not found"))?;
        message.file_url = None;
        message.content = TOMBSTONE.to_string();
        message.deleted = true;
        message.updated_at = now;
        Ok(message.clone())
    }

    async fn direct_messages(
        &self,
        conversation_id: Uuid,
        cursor: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<DirectMessage>> {
        let inner = self.inner.read().await;
        let anchor = match cursor {
            Some(cursor) => Some(
                inner
                    .direct_messages
                    .get(&cursor)
                    .filter(|m| m.conversation_id == conversation_id)
                    .map(|m| (m.created_at, m.id))
                    .ok_or_else(|| AppError::not_found("Cursor message not found"))?,
            ),
            None => None,
        };
        let rows = inner
            .direct_messages
            .values()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect();
        Ok(page(rows, |m| (m.created_at, m.id), anchor, limit))
    }

    async fn upsert_channel_read(&self, member_id: Uuid, channel_id: Uuid) -> Result<ChannelRead> {
        let mut inner = self.inner.write().await;
        let now = inner.now();
        let read = inner
            .channel_reads
            .entry((member_id, channel_id))
            .and_modify(|r| r.last_read_at = r.last_read_at.max(now))
            .or_insert(ChannelRead {
                member_id,
                channel_id,
                last_read_at: now,
            });
        Ok(read.clone())
    }

    async fn upsert_conversation_read(&self, profile_id: Uuid, conversation_id: Uuid) -> Result<ConversationRead> {
        let mut inner = self.inner.write().await;
        let now = inner.now();
        let read = inner
            .conversation_reads
            .entry((profile_id, conversation_id))
            .and_modify(|r| r.last_read_at = r.last_read_at.max(now))
            .or_insert(ConversationRead {
                profile_id,
                conversation_id,
                last_read_at: now,
            });
        Ok(read.clone())
    }

    async fn unread_by_channel(&self, server_id: Uuid, member_id: Uuid) -> Result<HashMap<Uuid, i64>> {
        let inner = self.inner.read().await;
        Ok(inner
            .channels
            .values()
            .filter(|c| c.server_id == server_id)
            .map(|c| (c.id, inner.unread_in_channel(c.id, member_id)))
            .collect())
    }

    async fn total_unread(&self, server_id: Uuid, member_id: Uuid) -> Result<i64> {
        let inner = self.inner.read().await;
        Ok(inner
            .channels
            .values()
            .filter(|c| c.server_id == server_id)
            .map(|c| inner.unread_in_channel(c.id, member_id))
            .sum())
    }

    async fn unread_by_server(&self, profile_id: Uuid) -> Result<HashMap<Uuid, i64>> {
        let inner = self.inner.read().await;
        Ok(inner
            .members
            .values()
            .filter(|m| m.profile_id == profile_id)
            .map(|m| {
                let total = inner
                    .channels
                    .values()
                    .filter(|c| c.server_id == m.server_id)
                    .map(|c| inner.unread_in_channel(c.id, m.id))
                    .sum::<i64>();
                (m.server_id, total)
            })
            .collect())
    }

    async fn unread_by_conversation(&self, profile_id: Uuid) -> Result<HashMap<Uuid, i64>> {
        let inner = self.inner.read().await;
        Ok(inner
            .conversations
            .values()
            .filter(|c| c.includes(profile_id))
            .map(|c| (c.id, inner.unread_in_conversation(c.id, profile_id)))
            .collect())
    }

    async fn unread_in_conversation(&self, conversation_id: Uuid, profile_id: Uuid) -> Result<i64> {
        Ok(self
            .inner
            .read()
            .await
            .unread_in_conversation(conversation_id, profile_id))
    }
}
