use crate::db::Store;
use crate::error::{AppError, Result};
use crate::models::{Conversation, ConversationView, MessagePage};
use crate::services::{hydrate, require_conversation, require_endpoint};
use huddle_protocol::DirectMessageData;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone)]
pub struct ConversationService {
    store: Arc<dyn Store>,
}

impl ConversationService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// The one conversation between the two profiles, whichever side asks first.
    pub async fn open(&self, profile_id: Uuid, other_profile_id: Uuid) -> Result<ConversationView> {
        let other = self
            .store
            .profile_by_id(other_profile_id)
            .await?
            .ok_or_else(|| AppError::not_found("Profile not found"))?;

        let conversation = self
            .store
            .get_or_create_conversation(profile_id, other.id)
            .await?;
        Ok(ConversationView {
            conversation,
            other_profile: (&other).into(),
        })
    }

    pub async fn list(&self, profile_id: Uuid) -> Result<Vec<ConversationView>> {
        let conversations = self.store.conversations_for_profile(profile_id).await?;
        let mut views = Vec::with_capacity(conversations.len());
        for conversation in conversations {
            views.push(self.view(conversation, profile_id).await?);
        }
        Ok(views)
    }

    pub async fn history(
        &self,
        conversation_id: Uuid,
        profile_id: Uuid,
        cursor: Option<Uuid>,
        limit: usize,
    ) -> Result<MessagePage<DirectMessageData>> {
        let conversation = require_conversation(self.store.as_ref(), conversation_id).await?;
        require_endpoint(&conversation, profile_id)?;

        let rows = self
            .store
            .direct_messages(conversation.id, cursor, limit as i64)
            .await?;
        let items = hydrate::direct_message_page(self.store.as_ref(), rows).await?;
        Ok(MessagePage::from_items(items, limit, |m| m.id))
    }

    async fn view(&self, conversation: Conversation, profile_id: Uuid) -> Result<ConversationView> {
        let other_id = conversation
            .other(profile_id)
            .ok_or_else(|| AppError::forbidden("Not part of this conversation"))?;
        let other_profile = hydrate::profile_data(self.store.as_ref(), other_id).await?;
        Ok(ConversationView {
            conversation,
            other_profile,
        })
    }
}
