//! Message fan-out: persist first, then broadcast the stored result.
//!
//! A failed lookup or write returns before anything is emitted. Once the
//! write has landed, delivery is best effort; the hub logs and drops frames
//! it cannot hand to a connection.

use crate::db::Store;
use crate::error::{AppError, Result};
use crate::models::{CreateMessage, DirectMessage, Member, Message, UpdateMessage};
use crate::services::hydrate;
use crate::services::{
    require_channel, require_conversation, require_endpoint, require_manager, require_member,
};
use crate::ws::RoomHub;
use huddle_protocol::messages::{validate_body, validate_update};
use huddle_protocol::{DirectMessageData, MessageData, Room, ServerEvent};
use std::sync::Arc;
use uuid::Uuid;

/// An edit may blank the text only if the message keeps a file.
fn check_edit_keeps_body(content: &str, file_url: Option<&str>, input: &UpdateMessage) -> Result<()> {
    let content = input.content.as_deref().unwrap_or(content);
    let file_url = input.file_url.as_deref().or(file_url);
    validate_body(Some(content), file_url)?;
    Ok(())
}

#[derive(Clone)]
pub struct FanoutService {
    store: Arc<dyn Store>,
    hub: Arc<dyn RoomHub>,
}

impl FanoutService {
    pub fn new(store: Arc<dyn Store>, hub: Arc<dyn RoomHub>) -> Self {
        Self { store, hub }
    }

    /// Post as `member_id`, which must belong to the acting profile.
    pub async fn create_channel_message(
        &self,
        channel_id: Uuid,
        member_id: Uuid,
        actor: Uuid,
        input: &CreateMessage,
        temp_id: Option<String>,
    ) -> Result<MessageData> {
        validate_body(input.content.as_deref(), input.file_url.as_deref())?;

        let channel = require_channel(self.store.as_ref(), channel_id).await?;
        let member = self
            .store
            .member_by_id(member_id)
            .await?
            .ok_or_else(|| AppError::not_found("Member not found"))?;
        if member.server_id != channel.server_id {
            return Err(AppError::forbidden("Member does not belong to this server"));
        }
        if actor != member.profile_id {
            return Err(AppError::forbidden("Cannot post as another member"));
        }

        let author = hydrate::member_data(self.store.as_ref(), &member).await?;
        let message = self.store.insert_message(channel.id, member.id, input).await?;
        let data = hydrate::message_data(message, author);

        self.hub
            .emit(
                Room::Channel(channel.id),
                &ServerEvent::ChannelMessage {
                    message: data.clone(),
                    temp_id,
                },
            )
            .await;

        if let Err(e) = self.notify_absent_members(channel.server_id, channel.id, member.id).await {
            tracing::error!(channel_id = %channel.id, "Failed to send unread notifications: {}", e);
        }

        tracing::debug!(
            channel_id = %channel.id,
            message_id = %data.id,
            "Channel message fanned out"
        );
        Ok(data)
    }

    /// Post into a channel as the profile's membership in the channel's server.
    pub async fn create_channel_message_as(
        &self,
        channel_id: Uuid,
        profile_id: Uuid,
        input: &CreateMessage,
    ) -> Result<MessageData> {
        let channel = require_channel(self.store.as_ref(), channel_id).await?;
        let member = require_member(self.store.as_ref(), channel.server_id, profile_id).await?;
        self.create_channel_message(channel.id, member.id, profile_id, input, None)
            .await
    }

    pub async fn update_channel_message(
        &self,
        message_id: Uuid,
        channel_id: Uuid,
        actor: Uuid,
        input: &UpdateMessage,
    ) -> Result<MessageData> {
        validate_update(input.content.as_deref(), input.file_url.as_deref())?;

        let (message, author) = self.load_channel_message(message_id, channel_id).await?;
        if message.deleted {
            return Err(AppError::Validation(
                "Deleted messages cannot be edited".to_string(),
            ));
        }
        if actor != author.profile_id {
            return Err(AppError::forbidden("Only the author can edit a message"));
        }
        check_edit_keeps_body(&message.content, message.file_url.as_deref(), input)?;

        let author = hydrate::member_data(self.store.as_ref(), &author).await?;
        let updated = self.store.update_message(message.id, input).await?;
        let data = hydrate::message_data(updated, author);

        self.hub
            .emit(
                Room::Channel(channel_id),
                &ServerEvent::ChannelMessageUpdate {
                    message: data.clone(),
                },
            )
            .await;
        Ok(data)
    }

    /// Tombstones the message. The author, an owner or a vice-owner may delete.
    pub async fn delete_channel_message(
        &self,
        message_id: Uuid,
        channel_id: Uuid,
        actor: Uuid,
    ) -> Result<MessageData> {
        let (message, author) = self.load_channel_message(message_id, channel_id).await?;
        if actor != author.profile_id {
            require_manager(self.store.as_ref(), author.server_id, actor).await?;
        }

        let author = hydrate::member_data(self.store.as_ref(), &author).await?;
        let tombstoned = self.store.tombstone_message(message.id).await?;
        let data = hydrate::message_data(tombstoned, author);

        self.hub
            .emit(
                Room::Channel(channel_id),
                &ServerEvent::ChannelMessageDelete {
                    id: data.id,
                    channel_id,
                },
            )
            .await;
        Ok(data)
    }

    /// `actor` must equal `sender_id`.
    pub async fn create_direct_message(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        actor: Uuid,
        input: &CreateMessage,
        temp_id: Option<String>,
    ) -> Result<DirectMessageData> {
        validate_body(input.content.as_deref(), input.file_url.as_deref())?;

        let conversation = require_conversation(self.store.as_ref(), conversation_id).await?;
        require_endpoint(&conversation, sender_id)?;
        if actor != sender_id {
            return Err(AppError::forbidden("Cannot send as another profile"));
        }

        let sender = hydrate::profile_data(self.store.as_ref(), sender_id).await?;
        let message = self
            .store
            .insert_direct_message(conversation.id, sender_id, input)
            .await?;
        let data = hydrate::direct_message_data(message, sender);

        self.hub
            .emit(
                Room::Conversation(conversation.id),
                &ServerEvent::DmCreate {
                    message: data.clone(),
                    temp_id,
                },
            )
            .await;

        if let Some(recipient) = conversation.other(sender_id).filter(|r| *r != sender_id) {
            if let Err(e) = self.notify_recipient(conversation.id, sender_id, recipient).await {
                tracing::error!(conversation_id = %conversation.id, "Failed to send DM notification: {}", e);
            }
        }

        tracing::debug!(
            conversation_id = %conversation.id,
            message_id = %data.id,
            "Direct message fanned out"
        );
        Ok(data)
    }

    pub async fn update_direct_message(
        &self,
        message_id: Uuid,
        conversation_id: Uuid,
        actor: Uuid,
        input: &UpdateMessage,
    ) -> Result<DirectMessageData> {
        validate_update(input.content.as_deref(), input.file_url.as_deref())?;

        let message = self.load_direct_message(message_id, conversation_id).await?;
        if message.deleted {
            return Err(AppError::Validation(
                "Deleted messages cannot be edited".to_string(),
            ));
        }
        if actor != message.sender_id {
            return Err(AppError::forbidden("Only the sender can edit a message"));
        }
        check_edit_keeps_body(&message.content, message.file_url.as_deref(), input)?;

        let sender = hydrate::profile_data(self.store.as_ref(), message.sender_id).await?;
        let updated = self.store.update_direct_message(message.id, input).await?;
        let data = hydrate::direct_message_data(updated, sender);

        self.hub
            .emit(
                Room::Conversation(conversation_id),
                &ServerEvent::DmUpdate {
                    message: data.clone(),
                },
            )
            .await;
        Ok(data)
    }

    pub async fn delete_direct_message(
        &self,
        message_id: Uuid,
        conversation_id: Uuid,
        actor: Uuid,
    ) -> Result<DirectMessageData> {
        let message = self.load_direct_message(message_id, conversation_id).await?;
        if actor != message.sender_id {
            return Err(AppError::forbidden("Only the sender can delete a message"));
        }

        let sender = hydrate::profile_data(self.store.as_ref(), message.sender_id).await?;
        let tombstoned = self.store.tombstone_direct_message(message.id).await?;
        let data = hydrate::direct_message_data(tombstoned, sender);

        self.hub
            .emit(
                Room::Conversation(conversation_id),
                &ServerEvent::DmDelete {
                    id: data.id,
                    conversation_id,
                },
            )
            .await;
        Ok(data)
    }

    /// Unread bump for every other member without a connection in the channel room.
    async fn notify_absent_members(&self, server_id: Uuid, channel_id: Uuid, author_id: Uuid) -> Result<()> {
        // Members already looking at the channel got the message itself
        let viewers = self.hub.profiles_in(Room::Channel(channel_id)).await;
        let notification = ServerEvent::ChannelNotification {
            server_id,
            channel_id,
            inc: 1,
        };
        for other in self.store.members_of_server(server_id).await? {
            if other.id == author_id || viewers.contains(&other.profile_id) {
                continue;
            }
            self.hub
                .emit(Room::Profile(other.profile_id), &notification)
                .await;
        }
        Ok(())
    }

    async fn notify_recipient(&self, conversation_id: Uuid, sender_id: Uuid, recipient: Uuid) -> Result<()> {
        let unread = self
            .store
            .unread_in_conversation(conversation_id, recipient)
            .await?;
        self.hub
            .emit(
                Room::Profile(recipient),
                &ServerEvent::DmNotification {
                    conversation_id,
                    sender_id,
                    unread,
                },
            )
            .await;
        Ok(())
    }

    async fn load_channel_message(
        &self,
        message_id: Uuid,
        channel_id: Uuid,
    ) -> Result<(Message, Member)> {
        let message = self
            .store
            .message_by_id(message_id)
            .await?
            .filter(|m| m.channel_id == channel_id)
            .ok_or_else(|| AppError::not_found("Message not found"))?;
        let author = self
            .store
            .member_by_id(message.member_id)
            .await?
            .ok_or_else(|| AppError::not_found("Member not found"))?;
        Ok((message, author))
    }

    async fn load_direct_message(&self, message_id: Uuid, conversation_id: Uuid) -> Result<DirectMessage> {
        self.store
            .direct_message_by_id(message_id)
            .await?
            .filter(|m| m.conversation_id == conversation_id)
            .ok_or_else(|| AppError::not_found("Direct message not found"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::models::{MemberRole, NewProfile, TOMBSTONE};
    use crate::ws::LocalHub;
    use tokio::sync::mpsc;

    struct Fixture {
        store: Arc<MemoryStore>,
        hub: Arc<LocalHub>,
        fanout: FanoutService,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let hub = Arc::new(LocalHub::new());
        let fanout = FanoutService::new(store.clone(), hub.clone());
        Fixture { store, hub, fanout }
    }

    async fn profile(store: &MemoryStore, name: &str) -> Uuid {
        store
            .get_or_create_profile(NewProfile {
                external_user_id: format!("ext-{name}"),
                name: name.to_string(),
                email: format!("{name}@example.com"),
                image_url: None,
            })
            .await
            .unwrap()
            .id
    }

    async fn listen(hub: &LocalHub, profile_id: Uuid, rooms: &[Room]) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = Uuid::new_v4();
        hub.connect(conn, tx).await;
        hub.identify(conn, profile_id).await;
        for room in rooms {
            hub.join(conn, *room).await;
        }
        rx
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<String>) -> Vec<serde_json::Value> {
        let mut out = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            out.push(serde_json::from_str(&frame).unwrap());
        }
        out
    }

    fn text(content: &str) -> CreateMessage {
        CreateMessage {
            content: Some(content.to_string()),
            file_url: None,
            file_type: None,
        }
    }

    #[tokio::test]
    async fn viewers_get_content_and_others_get_notified() {
        let f = fixture();
        let alice = profile(&f.store, "alice").await;
        let bob = profile(&f.store, "bob").await;
        let carol = profile(&f.store, "carol").await;
        let (server, owner, general) = f.store.create_server(alice, "S", None, "c").await.unwrap();
        f.store.add_member(server.id, bob, MemberRole::Guest).await.unwrap();
        f.store.add_member(server.id, carol, MemberRole::Guest).await.unwrap();

        let room = Room::Channel(general.id);
        let mut bob_rx = listen(&f.hub, bob, &[Room::Profile(bob), room]).await;
        let mut carol_rx = listen(&f.hub, carol, &[Room::Profile(carol)]).await;

        f.fanout
            .create_channel_message(general.id, owner.id, alice, &text("hi"), Some("t1".into()))
            .await
            .unwrap();

        let bob_frames = drain(&mut bob_rx);
        assert_eq!(bob_frames.len(), 1);
        assert_eq!(bob_frames[0]["event"], "channel:message");
        assert_eq!(bob_frames[0]["data"]["tempId"], "t1");

        let carol_frames = drain(&mut carol_rx);
        assert_eq!(carol_frames.len(), 1);
        assert_eq!(carol_frames[0]["event"], "channel:notification");
        assert_eq!(carol_frames[0]["data"]["inc"], 1);
    }

    #[tokio::test]
    async fn member_from_another_server_is_forbidden() {
        let f = fixture();
        let alice = profile(&f.store, "alice").await;
        let (_, _, general) = f.store.create_server(alice, "S", None, "c1").await.unwrap();
        let (_, stranger, _) = f.store.create_server(alice, "T", None, "c2").await.unwrap();

        let err = f
            .fanout
            .create_channel_message(general.id, stranger.id, alice, &text("hi"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        assert!(f.store.channel_messages(general.id, None, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn only_author_edits_and_tombstones_are_final() {
        let f = fixture();
        let alice = profile(&f.store, "alice").await;
        let bob = profile(&f.store, "bob").await;
        let (server, owner, general) = f.store.create_server(alice, "S", None, "c").await.unwrap();
        f.store.add_member(server.id, bob, MemberRole::Guest).await.unwrap();

        let msg = f
            .fanout
            .create_channel_message(general.id, owner.id, alice, &text("hi"), None)
            .await
            .unwrap();
        let edit = UpdateMessage {
            content: Some("edited".to_string()),
            file_url: None,
        };

        let err = f
            .fanout
            .update_channel_message(msg.id, general.id, bob, &edit)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let err = f
            .fanout
            .delete_channel_message(msg.id, general.id, bob)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let gone = f
            .fanout
            .delete_channel_message(msg.id, general.id, alice)
            .await
            .unwrap();
        assert_eq!(gone.content, TOMBSTONE);

        let err = f
            .fanout
            .update_channel_message(msg.id, general.id, alice, &edit)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn direct_message_requires_endpoint_and_notifies_recipient() {
        let f = fixture();
        let alice = profile(&f.store, "alice").await;
        let bob = profile(&f.store, "bob").await;
        let mallory = profile(&f.store, "mallory").await;
        let conv = f.store.get_or_create_conversation(alice, bob).await.unwrap();

        let err = f
            .fanout
            .create_direct_message(conv.id, mallory, mallory, &text("psst"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let mut bob_rx = listen(&f.hub, bob, &[Room::Profile(bob)]).await;
        f.fanout
            .create_direct_message(conv.id, alice, alice, &text("hey"), None)
            .await
            .unwrap();
        f.fanout
            .create_direct_message(conv.id, alice, alice, &text("you there?"), None)
            .await
            .unwrap();

        let frames = drain(&mut bob_rx);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1]["event"], "dm:notification");
        assert_eq!(frames[1]["data"]["unread"], 2);
        assert_eq!(frames[1]["data"]["senderId"], serde_json::json!(alice));
    }

    #[tokio::test]
    async fn cannot_post_as_another_member() {
        let f = fixture();
        let alice = profile(&f.store, "alice").await;
        let bob = profile(&f.store, "bob").await;
        let (server, owner, general) = f.store.create_server(alice, "S", None, "c").await.unwrap();
        f.store.add_member(server.id, bob, MemberRole::Guest).await.unwrap();

        let err = f
            .fanout
            .create_channel_message(general.id, owner.id, bob, &text("I am alice"), Some("t".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        assert!(f.store.channel_messages(general.id, None, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn clearing_text_is_allowed_only_when_a_file_remains() {
        let f = fixture();
        let alice = profile(&f.store, "alice").await;
        let (_, owner, general) = f.store.create_server(alice, "S", None, "c").await.unwrap();

        let with_file = CreateMessage {
            content: Some("look".to_string()),
            file_url: Some("https://cdn.example/a.png".to_string()),
            file_type: None,
        };
        let photo = f
            .fanout
            .create_channel_message(general.id, owner.id, alice, &with_file, None)
            .await
            .unwrap();
        let plain = f
            .fanout
            .create_channel_message(general.id, owner.id, alice, &text("words"), None)
            .await
            .unwrap();
        let blank = UpdateMessage {
            content: Some("  ".to_string()),
            file_url: None,
        };

        let edited = f
            .fanout
            .update_channel_message(photo.id, general.id, alice, &blank)
            .await
            .unwrap();
        assert_eq!(edited.file_url.as_deref(), Some("https://cdn.example/a.png"));

        let err = f
            .fanout
            .update_channel_message(plain.id, general.id, alice, &blank)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
