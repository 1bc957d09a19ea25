use crate::db::store::Store;
use crate::error::{AppError, Result};
use crate::models::{
    canonical_pair, Channel, ChannelRead, ChannelType, Conversation, ConversationRead,
    CreateMessage, DirectMessage, Member, MemberRole, Message, NewProfile, Profile, Server,
    UpdateMessage, GENERAL_CHANNEL, TOMBSTONE,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use std::collections::HashMap;
use uuid::Uuid;

const PROFILE_COLUMNS: &str = "id, external_user_id, name, email, image_url, created_at, updated_at";
const SERVER_COLUMNS: &str = "id, owner_profile_id, name, image_url, invite_code, created_at, updated_at";
const MEMBER_COLUMNS: &str = "id, server_id, profile_id, role, created_at";
const CHANNEL_COLUMNS: &str = "id, server_id, name, channel_type, created_at, updated_at";
const MESSAGE_COLUMNS: &str =
    "id, channel_id, member_id, content, file_url, file_type, deleted, created_at, updated_at";
const DIRECT_MESSAGE_COLUMNS: &str =
    "id, conversation_id, sender_id, content, file_url, file_type, deleted, created_at, updated_at";
const CONVERSATION_COLUMNS: &str = "id, profile_one_id, profile_two_id, created_at";

/// Postgres-backed storage gateway
#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .map(|db| db.is_unique_violation())
        .unwrap_or(false)
}

fn conflict_or(e: sqlx::Error, message: &str) -> AppError {
    if is_unique_violation(&e) {
        AppError::Conflict(message.to_string())
    } else {
        AppError::Database(e)
    }
}

#[derive(FromRow)]
struct MembershipRow {
    id: Uuid,
    owner_profile_id: Uuid,
    name: String,
    image_url: Option<String>,
    invite_code: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    member_id: Uuid,
    member_role: MemberRole,
    member_profile_id: Uuid,
    member_created_at: DateTime<Utc>,
}

impl MembershipRow {
    fn split(row: Self) -> (Server, Member) {
        let member = Member {
            id: row.member_id,
            server_id: row.id,
            profile_id: row.member_profile_id,
            role: row.member_role,
            created_at: row.member_created_at,
        };
        let server = Server {
            id: row.id,
            owner_profile_id: row.owner_profile_id,
            name: row.name,
            image_url: row.image_url,
            invite_code: row.invite_code,
            created_at: row.created_at,
            updated_at: row.updated_at,
        };
        (server, member)
    }
}

#[async_trait]
impl Store for PgStore {
    async fn get_or_create_profile(&self, input: NewProfile) -> Result<Profile> {
        // The no-op update makes RETURNING yield the existing row on conflict.
        let profile = sqlx::query_as::<_, Profile>(&format!(
            r#"
            INSERT INTO profiles (id, external_user_id, name, email, image_url, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, NOW(), NOW())
            ON CONFLICT (external_user_id)
            DO UPDATE SET external_user_id = EXCLUDED.external_user_id
            RETURNING {PROFILE_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&input.external_user_id)
        .bind(&input.name)
        .bind(&input.email)
        .bind(&input.image_url)
        .fetch_one(&self.db)
        .await?;

        Ok(profile)
    }

    async fn profile_by_id(&self, id: Uuid) -> Result<Option<Profile>> {
        let profile = sqlx::query_as::<_, Profile>(&format!(
            "SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        Ok(profile)
    }

    async fn create_server(
        &self,
        owner_profile_id: Uuid,
        name: &str,
        image_url: Option<&str>,
        invite_code: &str,
    ) -> Result<(Server, Member, Channel)> {
        let mut tx = self.db.begin().await?;

        let server = sqlx::query_as::<_, Server>(&format!(
            r#"
            INSERT INTO servers (id, owner_profile_id, name, image_url, invite_code, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, NOW(), NOW())
            RETURNING {SERVER_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(owner_profile_id)
        .bind(name)
        .bind(image_url)
        .bind(invite_code)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| conflict_or(e, "Invite code already in use"))?;

        let member = sqlx::query_as::<_, Member>(&format!(
            r#"
            INSERT INTO members (id, server_id, profile_id, role, created_at)
            VALUES ($1, $2, $3, $4, NOW())
            RETURNING {MEMBER_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(server.id)
        .bind(owner_profile_id)
        .bind(MemberRole::Owner)
        .fetch_one(&mut *tx)
        .await?;

        let channel = sqlx::query_as::<_, Channel>(&format!(
            r#"
            INSERT INTO channels (id, server_id, name, channel_type, created_at, updated_at)
            VALUES ($1, $2, $3, $4, NOW(), NOW())
            RETURNING {CHANNEL_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(server.id)
        .bind(GENERAL_CHANNEL)
        .bind(ChannelType::Text)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok((server, member, channel))
    }

    async fn server_by_id(&self, id: Uuid) -> Result<Option<Server>> {
        let server = sqlx::query_as::<_, Server>(&format!(
            "SELECT {SERVER_COLUMNS} FROM servers WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        Ok(server)
    }

    async fn server_by_invite_code(&self, code: &str) -> Result<Option<Server>> {
        let server = sqlx::query_as::<_, Server>(&format!(
            "SELECT {SERVER_COLUMNS} FROM servers WHERE invite_code = $1"
        ))
        .bind(code)
        .fetch_optional(&self.db)
        .await?;

        Ok(server)
    }

    async fn set_invite_code(&self, server_id: Uuid, code: &str) -> Result<Server> {
        let server = sqlx::query_as::<_, Server>(&format!(
            r#"
            UPDATE servers SET invite_code = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {SERVER_COLUMNS}
            "#
        ))
        .bind(server_id)
        .bind(code)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| conflict_or(e, "Invite code already in use"))?
        .ok_or_else(|| AppError::not_found("Server not found"))?;

        Ok(server)
    }

    async fn update_server(&self, id: Uuid, name: Option<&str>, image_url: Option<&str>) -> Result<Server> {
        let server = sqlx::query_as::<_, Server>(&format!(
            r#"
            UPDATE servers
            SET name = COALESCE($2, name),
                image_url = COALESCE($3, image_url),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {SERVER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(name)
        .bind(image_url)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::not_found("Server not found"))?;

        Ok(server)
    }

    async fn delete_server(&self, id: Uuid) -> Result<()> {
        // Channels, members, messages and read rows go with it by cascade
        let result = sqlx::query("DELETE FROM servers WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found("Server not found"));
        }

        Ok(())
    }

    async fn servers_for_profile(&self, profile_id: Uuid, skip: i64, limit: i64) -> Result<Vec<(Server, Member)>> {
        let rows = sqlx::query_as::<_, MembershipRow>(
            r#"
            SELECT s.id, s.owner_profile_id, s.name, s.image_url, s.invite_code,
                   s.created_at, s.updated_at,
                   m.id AS member_id, m.role AS member_role,
                   m.profile_id AS member_profile_id, m.created_at AS member_created_at
            FROM servers s
            INNER JOIN members m ON m.server_id = s.id
            WHERE m.profile_id = $1
            ORDER BY s.created_at DESC, s.id DESC
            OFFSET $2
            LIMIT $3
            "#,
        )
        .bind(profile_id)
        .bind(skip.max(0))
        .bind(limit.max(0))
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(MembershipRow::split).collect())
    }

    async fn count_servers_for_profile(&self, profile_id: Uuid) -> Result<i64> {
        let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM members WHERE profile_id = $1")
            .bind(profile_id)
            .fetch_one(&self.db)
            .await?;

        Ok(total)
    }

    async fn member_by_id(&self, id: Uuid) -> Result<Option<Member>> {
        let member = sqlx::query_as::<_, Member>(&format!(
            "SELECT {MEMBER_COLUMNS} FROM members WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        Ok(member)
    }

    async fn member_in_server(&self, server_id: Uuid, profile_id: Uuid) -> Result<Option<Member>> {
        let member = sqlx::query_as::<_, Member>(&format!(
            "SELECT {MEMBER_COLUMNS} FROM members WHERE server_id = $1 AND profile_id = $2"
        ))
        .bind(server_id)
        .bind(profile_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(member)
    }

    async fn add_member(&self, server_id: Uuid, profile_id: Uuid, role: MemberRole) -> Result<Member> {
        let member = sqlx::query_as::<_, Member>(&format!(
            r#"
            INSERT INTO members (id, server_id, profile_id, role, created_at)
            VALUES ($1, $2, $3, $4, NOW())
            RETURNING {MEMBER_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(server_id)
        .bind(profile_id)
        .bind(role)
        .fetch_one(&self.db)
        .await
        .map_err(|e| conflict_or(e, "Already a member of this server"))?;

        Ok(member)
    }

    async fn members_of_server(&self, server_id: Uuid) -> Result<Vec<Member>> {
        let members = sqlx::query_as::<_, Member>(&format!(
            "SELECT {MEMBER_COLUMNS} FROM members WHERE server_id = $1 ORDER BY created_at"
        ))
        .bind(server_id)
        .fetch_all(&self.db)
        .await?;

        Ok(members)
    }

    async fn set_member_role(&self, member_id: Uuid, role: MemberRole) -> Result<Member> {
        let member = sqlx::query_as::<_, Member>(&format!(
            "UPDATE members SET role = $2 WHERE id = $1 RETURNING {MEMBER_COLUMNS}"
        ))
        .bind(member_id)
        .bind(role)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::not_found("Member not found"))?;

        Ok(member)
    }

    async fn remove_member(&self, member_id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM members WHERE id = $1")
            .bind(member_id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found("Member not found"));
        }

        Ok(())
    }

    async fn channel_by_id(&self, id: Uuid) -> Result<Option<Channel>> {
        let channel = sqlx::query_as::<_, Channel>(&format!(
            "SELECT {CHANNEL_COLUMNS} FROM channels WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        Ok(channel)
    }

    async fn channels_of_server(&self, server_id: Uuid) -> Result<Vec<Channel>> {
        let channels = sqlx::query_as::<_, Channel>(&format!(
            "SELECT {CHANNEL_COLUMNS} FROM channels WHERE server_id = $1 ORDER BY created_at"
        ))
        .bind(server_id)
        .fetch_all(&self.db)
        .await?;

        Ok(channels)
    }

    async fn insert_channel(&self, server_id: Uuid, name: &str, channel_type: ChannelType) -> Result<Channel> {
        let channel = sqlx::query_as::<_, Channel>(&format!(
            r#"
            INSERT INTO channels (id, server_id, name, channel_type, created_at, updated_at)
            VALUES ($1, $2, $3, $4, NOW(), NOW())
            RETURNING {CHANNEL_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(server_id)
        .bind(name)
        .bind(channel_type)
        .fetch_one(&self.db)
        .await
        .map_err(|e| conflict_or(e, "Channel name already exists in this server"))?;

        Ok(channel)
    }

    async fn update_channel(
        &self,
        id: Uuid,
        name: Option<&str>,
        channel_type: Option<ChannelType>,
    ) -> Result<Channel> {
        let channel = sqlx::query_as::<_, Channel>(&format!(
            r#"
            UPDATE channels
            SET name = COALESCE($2, name),
                channel_type = COALESCE($3, channel_type),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {CHANNEL_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(name)
        .bind(channel_type)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| conflict_or(e, "Channel name already exists in this server"))?
        .ok_or_else(|| AppError::not_found("Channel not found"))?;

        Ok(channel)
    }

    async fn delete_channel(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM channels WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found("Channel not found"));
        }

        Ok(())
    }

    async fn insert_message(&self, channel_id: Uuid, member_id: Uuid, input: &CreateMessage) -> Result<Message> {
        let message = sqlx::query_as::<_, Message>(&format!(
            r#"
            INSERT INTO messages (id, channel_id, member_id, content, file_url, file_type, deleted, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, FALSE, NOW(), NOW())
            RETURNING {MESSAGE_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(channel_id)
        .bind(member_id)
        .bind(input.content_or_empty())
        .bind(&input.file_url)
        .bind(input.file_type.unwrap_or_default())
        .fetch_one(&self.db)
        .await?;

        Ok(message)
    }

    async fn message_by_id(&self, id: Uuid) -> Result<Option<Message>> {
        let message = sqlx::query_as::<_, Message>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        Ok(message)
    }

    async fn update_message(&self, id: Uuid, input: &UpdateMessage) -> Result<Message> {
        let message = sqlx::query_as::<_, Message>(&format!(
            r#"
            UPDATE messages
            SET content = COALESCE($2, content),
                file_url = COALESCE($3, file_url),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {MESSAGE_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&input.content)
        .bind(&input.file_url)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::not_found("Message not found"))?;

        Ok(message)
    }

    async fn tombstone_message(&self, id: Uuid) -> Result<Message> {
        let message = sqlx::query_as::<_, Message>(&format!(
            r#"
            UPDATE messages
            SET file_url = NULL, content = $2, deleted = TRUE, updated_at = NOW()
            WHERE id = $1
            RETURNING {MESSAGE_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(TOMBSTONE)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::not_found("Message not found"))?;

        Ok(message)
    }

    async fn channel_messages(&self, channel_id: Uuid, cursor: Option<Uuid>, limit: i64) -> Result<Vec<Message>> {
        let messages = match cursor {
            Some(cursor) => {
                let anchor = self
                    .message_by_id(cursor)
                    .await?
                    .filter(|m| m.channel_id == channel_id)
                    .ok_or_else(|| AppError::not_found("Cursor message not found"))?;

                sqlx::query_as::<_, Message>(&format!(
                    r#"
                    SELECT {MESSAGE_COLUMNS} FROM messages
                    WHERE channel_id = $1 AND (created_at, id) < ($2, $3)
                    ORDER BY created_at DESC, id DESC
                    LIMIT $4
                    "#
                ))
                .bind(channel_id)
                .bind(anchor.created_at)
                .bind(anchor.id)
                .bind(limit)
                .fetch_all(&self.db)
                .await?
            }
            None => {
                sqlx::query_as::<_, Message>(&format!(
                    r#"
                    SELECT {MESSAGE_COLUMNS} FROM messages
                    WHERE channel_id = $1
                    ORDER BY created_at DESC, id DESC
                    LIMIT $2
                    "#
                ))
                .bind(channel_id)
                .bind(limit)
                .fetch_all(&self.db)
                .await?
            }
        };

        Ok(messages)
    }

    async fn get_or_create_conversation(&self, a: Uuid, b: Uuid) -> Result<Conversation> {
        let (one, two) = canonical_pair(a, b);

        sqlx::query(
            r#"
            INSERT INTO conversations (id, profile_one_id, profile_two_id, created_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (profile_one_id, profile_two_id) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(one)
        .bind(two)
        .execute(&self.db)
        .await?;

        let conversation = sqlx::query_as::<_, Conversation>(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE profile_one_id = $1 AND profile_two_id = $2"
        ))
        .bind(one)
        .bind(two)
        .fetch_one(&self.db)
        .await?;

        Ok(conversation)
    }

    async fn conversation_by_id(&self, id: Uuid) -> Result<Option<Conversation>> {
        let conversation = sqlx::query_as::<_, Conversation>(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        Ok(conversation)
    }

    async fn conversations_for_profile(&self, profile_id: Uuid) -> Result<Vec<Conversation>> {
        let conversations = sqlx::query_as::<_, Conversation>(&format!(
            r#"
            SELECT {CONVERSATION_COLUMNS} FROM conversations
            WHERE profile_one_id = $1 OR profile_two_id = $1
            ORDER BY created_at DESC
            "#
        ))
        .bind(profile_id)
        .fetch_all(&self.db)
        .await?;

        Ok(conversations)
    }

    async fn insert_direct_message(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        input: &CreateMessage,
    ) -> Result<DirectMessage> {
        let message = sqlx::query_as::<_, DirectMessage>(&format!(
            r#"
            INSERT INTO direct_messages (id, conversation_id, sender_id, content, file_url, file_type, deleted, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, FALSE, NOW(), NOW())
            RETURNING {DIRECT_MESSAGE_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(conversation_id)
        .bind(sender_id)
        .bind(input.content_or_empty())
        .bind(&input.file_url)
        .bind(input.file_type.unwrap_or_default())
        .fetch_one(&self.db)
        .await?;

        Ok(message)
    }

    async fn direct_message_by_id(&self, id: Uuid) -> Result<Option<DirectMessage>> {
        let message = sqlx::query_as::<_, DirectMessage>(&format!(
            "SELECT {DIRECT_MESSAGE_COLUMNS} FROM direct_messages WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        Ok(message)
    }

    async fn update_direct_message(&self, id: Uuid, input: &UpdateMessage) -> Result<DirectMessage> {
        let message = sqlx::query_as::<_, DirectMessage>(&format!(
            r#"
            UPDATE direct_messages
            SET content = COALESCE($2, content),
                file_url = COALESCE($3, file_url),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {DIRECT_MESSAGE_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&input.content)
        .bind(&input.file_url)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::not_found("Direct message not found"))?;

        Ok(message)
    }

    async fn tombstone_direct_message(&self, id: Uuid) -> Result<DirectMessage> {
        let message = sqlx::query_as::<_, DirectMessage>(&format!(
            r#"
            UPDATE direct_messages
            SET file_url = NULL, content = $2, deleted = TRUE, updated_at = NOW()
            WHERE id = $1
            RETURNING {DIRECT_MESSAGE_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(TOMBSTONE)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::not_found("Direct message not found"))?;

        Ok(message)
    }

    async fn direct_messages(
        &self,
        conversation_id: Uuid,
        cursor: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<DirectMessage>> {
        let messages = match cursor {
            Some(cursor) => {
                let anchor = self
                    .direct_message_by_id(cursor)
                    .await?
                    .filter(|m| m.conversation_id == conversation_id)
                    .ok_or_else(|| AppError::not_found("Cursor message not found"))?;

                sqlx::query_as::<_, DirectMessage>(&format!(
                    r#"
                    SELECT {DIRECT_MESSAGE_COLUMNS} FROM direct_messages
                    WHERE conversation_id = $1 AND (created_at, id) < ($2, $3)
                    ORDER BY created_at DESC, id DESC
                    LIMIT $4
                    "#
                ))
                .bind(conversation_id)
                .bind(anchor.created_at)
                .bind(anchor.id)
                .bind(limit)
                .fetch_all(&self.db)
                .await?
            }
            None => {
                sqlx::query_as::<_, DirectMessage>(&format!(
                    r#"
                    SELECT {DIRECT_MESSAGE_COLUMNS} FROM direct_messages
                    WHERE conversation_id = $1
                    ORDER BY created_at DESC, id DESC
                    LIMIT $2
                    "#
                ))
                .bind(conversation_id)
                .bind(limit)
                .fetch_all(&self.db)
                .await?
            }
        };

        Ok(messages)
    }

    async fn upsert_channel_read(&self, member_id: Uuid, channel_id: Uuid) -> Result<ChannelRead> {
        let read = sqlx::query_as::<_, ChannelRead>(
            r#"
            INSERT INTO channel_reads (member_id, channel_id, last_read_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (member_id, channel_id)
            DO UPDATE SET last_read_at = GREATEST(channel_reads.last_read_at, EXCLUDED.last_read_at)
            RETURNING member_id, channel_id, last_read_at
            "#,
        )
        .bind(member_id)
        .bind(channel_id)
        .fetch_one(&self.db)
        .await?;

        Ok(read)
    }

    async fn upsert_conversation_read(&self, profile_id: Uuid, conversation_id: Uuid) -> Result<ConversationRead> {
        let read = sqlx::query_as::<_, ConversationRead>(
            r#"
            INSERT INTO conversation_reads (profile_id, conversation_id, last_read_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (profile_id, conversation_id)
            DO UPDATE SET last_read_at = GREATEST(conversation_reads.last_read_at, EXCLUDED.last_read_at)
            RETURNING profile_id, conversation_id, last_read_at
            "#,
        )
        .bind(profile_id)
        .bind(conversation_id)
        .fetch_one(&self.db)
        .await?;

        Ok(read)
    }

    async fn unread_by_channel(&self, server_id: Uuid, member_id: Uuid) -> Result<HashMap<Uuid, i64>> {
        let rows: Vec<(Uuid, i64)> = sqlx::query_as(
            r#"
            SELECT c.id, COUNT(m.id)
            FROM channels c
            LEFT JOIN channel_reads r
                ON r.channel_id = c.id AND r.member_id = $2
            LEFT JOIN messages m
                ON m.channel_id = c.id
               AND m.deleted = FALSE
               AND m.member_id <> $2
               AND m.created_at > COALESCE(r.last_read_at, 'epoch'::timestamptz)
            WHERE c.server_id = $1
            GROUP BY c.id
            "#,
        )
        .bind(server_id)
        .bind(member_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().collect())
    }

    async fn total_unread(&self, server_id: Uuid, member_id: Uuid) -> Result<i64> {
        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(m.id)
            FROM messages m
            INNER JOIN channels c ON c.id = m.channel_id
            LEFT JOIN channel_reads r
                ON r.channel_id = m.channel_id AND r.member_id = $2
            WHERE c.server_id = $1
              AND m.deleted = FALSE
              AND m.member_id <> $2
              AND m.created_at > COALESCE(r.last_read_at, 'epoch'::timestamptz)
            "#,
        )
        .bind(server_id)
        .bind(member_id)
        .fetch_one(&self.db)
        .await?;

        Ok(total)
    }

    async fn unread_by_server(&self, profile_id: Uuid) -> Result<HashMap<Uuid, i64>> {
        let rows: Vec<(Uuid, i64)> = sqlx::query_as(
            r#"
            SELECT mb.server_id, COUNT(m.id)
            FROM members mb
            LEFT JOIN channels c ON c.server_id = mb.server_id
            LEFT JOIN channel_reads r
                ON r.channel_id = c.id AND r.member_id = mb.id
            LEFT JOIN messages m
                ON m.channel_id = c.id
               AND m.deleted = FALSE
               AND m.member_id <> mb.id
               AND m.created_at > COALESCE(r.last_read_at, 'epoch'::timestamptz)
            WHERE mb.profile_id = $1
            GROUP BY mb.server_id
            "#,
        )
        .bind(profile_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().collect())
    }

    async fn unread_by_conversation(&self, profile_id: Uuid) -> Result<HashMap<Uuid, i64>> {
        let rows: Vec<(Uuid, i64)> = sqlx::query_as(
            r#"
            SELECT cv.id, COUNT(dm.id)
            FROM conversations cv
            LEFT JOIN conversation_reads r
                ON r.conversation_id = cv.id AND r.profile_id = $1
            LEFT JOIN direct_messages dm
                ON dm.conversation_id = cv.id
               AND dm.deleted = FALSE
               AND dm.sender_id <> $1
               AND dm.created_at > COALESCE(r.last_read_at, 'epoch'::timestamptz)
            WHERE cv.profile_one_id = $1 OR cv.profile_two_id = $1
            GROUP BY cv.id
            "#,
        )
        .bind(profile_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().collect())
    }

    async fn unread_in_conversation(&self, conversation_id: Uuid, profile_id: Uuid) -> Result<i64> {
        let (unread,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(dm.id)
            FROM direct_messages dm
            LEFT JOIN conversation_reads r
                ON r.conversation_id = dm.conversation_id AND r.profile_id = $2
            WHERE dm.conversation_id = $1
              AND dm.deleted = FALSE
              AND dm.sender_id <> $2
              AND dm.created_at > COALESCE(r.last_read_at, 'epoch'::timestamptz)
            "#,
        )
        .bind(conversation_id)
        .bind(profile_id)
        .fetch_one(&self.db)
        .await?;

        Ok(unread)
    }
}
