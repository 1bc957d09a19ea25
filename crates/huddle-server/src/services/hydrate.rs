//! Turns stored rows into the wire shapes clients render, attaching the
//! author's member and profile data.

use crate::db::Store;
use crate::error::{AppError, Result};
use crate::models::{DirectMessage, Member, Message};
use huddle_protocol::{DirectMessageData, MemberData, ProfileData};
use std::collections::HashMap;
use uuid::Uuid;

pub async fn profile_data(store: &dyn Store, profile_id: Uuid) -> Result<ProfileData> {
    store
        .profile_by_id(profile_id)
        .await?
        .map(|p| ProfileData::from(&p))
        .ok_or_else(|| AppError::not_found("Profile not found"))
}

pub async fn member_data(store: &dyn Store, member: &Member) -> Result<MemberData> {
    Ok(MemberData {
        id: member.id,
        server_id: member.server_id,
        role: member.role.into(),
        profile: profile_data(store, member.profile_id).await?,
    })
}

pub fn message_data(message: Message, member: MemberData) -> huddle_protocol::MessageData {
    huddle_protocol::MessageData {
        id: message.id,
        channel_id: message.channel_id,
        member_id: message.member_id,
        content: message.content,
        file_url: message.file_url,
        file_type: message.file_type.into(),
        deleted: message.deleted,
        created_at: message.created_at,
        updated_at: message.updated_at,
        member,
    }
}

pub fn direct_message_data(message: DirectMessage, sender: ProfileData) -> DirectMessageData {
    DirectMessageData {
        id: message.id,
        conversation_id: message.conversation_id,
        sender_id: message.sender_id,
        content: message.content,
        file_url: message.file_url,
        file_type: message.file_type.into(),
        deleted: message.deleted,
        created_at: message.created_at,
        updated_at: message.updated_at,
        sender,
    }
}

/// Hydrate a page of channel messages, looking each author up once.
pub async fn message_page(
    store: &dyn Store,
    messages: Vec<Message>,
) -> Result<Vec<huddle_protocol::MessageData>> {
    let mut members: HashMap<Uuid, MemberData> = HashMap::new();
    let mut out = Vec::with_capacity(messages.len());

    for message in messages {
        let member = match members.get(&message.member_id) {
            Some(m) => m.clone(),
            None => {
                let row = store
                    .member_by_id(message.member_id)
                    .await?
                    .ok_or_else(|| AppError::not_found("Member not found"))?;
                let data = member_data(store, &row).await?;
                members.insert(message.member_id, data.clone());
                data
            }
        };
        out.push(message_data(message, member));
    }

    Ok(out)
}

/// Hydrate a page of direct messages, looking each sender up once.
pub async fn direct_message_page(
    store: &dyn Store,
    messages: Vec<DirectMessage>,
) -> Result<Vec<DirectMessageData>> {
    let mut senders: HashMap<Uuid, ProfileData> = HashMap::new();
    let mut out = Vec::with_capacity(messages.len());

    for message in messages {
        let sender = match senders.get(&message.sender_id) {
            Some(p) => p.clone(),
            None => {
                let data = profile_data(store, message.sender_id).await?;
                senders.insert(message.sender_id, data.clone());
                data
            }
        };
        out.push(direct_message_data(message, sender));
    }

    Ok(out)
}
