use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::types::{DirectMessageData, FileType, MessageData, Room};
use crate::ProtocolError;

/// Events sent from client to server via WebSocket.
///
/// Frames look like `{"event": "channel:join", "data": {"channelId": "..."}}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    /// Bind this connection to a profile and join its personal room
    #[serde(rename = "profile:join")]
    ProfileJoin { profile_id: Uuid },

    #[serde(rename = "conversation:join")]
    ConversationJoin { conversation_id: Uuid },

    #[serde(rename = "conversation:leave")]
    ConversationLeave { conversation_id: Uuid },

    #[serde(rename = "channel:join")]
    ChannelJoin { channel_id: Uuid },

    /// Leaving a channel room marks it read for the bound profile
    #[serde(rename = "channel:leave")]
    ChannelLeave { channel_id: Uuid },

    #[serde(rename = "channel:message:create")]
    ChannelMessageCreate {
        temp_id: String,
        content: Option<String>,
        file_url: Option<String>,
        file_type: Option<FileType>,
        channel_id: Uuid,
        member_id: Uuid,
    },

    #[serde(rename = "channel:message:update")]
    ChannelMessageUpdate {
        id: Uuid,
        content: Option<String>,
        file_url: Option<String>,
        channel_id: Uuid,
    },

    #[serde(rename = "channel:message:delete")]
    ChannelMessageDelete { id: Uuid, channel_id: Uuid },

    #[serde(rename = "dm:create")]
    DmCreate {
        temp_id: String,
        content: Option<String>,
        file_url: Option<String>,
        file_type: Option<FileType>,
        conversation_id: Uuid,
        sender_id: Uuid,
    },

    #[serde(rename = "dm:update")]
    DmUpdate {
        id: Uuid,
        content: Option<String>,
        file_url: Option<String>,
        conversation_id: Uuid,
    },

    #[serde(rename = "dm:delete")]
    DmDelete { id: Uuid, conversation_id: Uuid },

    /// Keepalive
    #[serde(rename = "ping")]
    Ping,
}

/// A frame that did not decode into a [`ClientEvent`], with whatever could
/// still be read from it so the error reaches the right place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameError {
    pub event: Option<String>,
    pub temp_id: Option<String>,
    pub reason: String,
}

#[derive(Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    data: Value,
}

impl ClientEvent {
    /// Decode a text frame. The envelope is read first, so a payload that
    /// fails typed decoding still reports its event name and `tempId`.
    pub fn decode(text: &str) -> Result<Self, FrameError> {
        let envelope: Envelope = serde_json::from_str(text).map_err(|e| FrameError {
            event: None,
            temp_id: None,
            reason: e.to_string(),
        })?;
        let temp_id = envelope
            .data
            .get("tempId")
            .and_then(Value::as_str)
            .map(String::from);

        let mut frame = Map::new();
        frame.insert("event".to_string(), Value::String(envelope.event.clone()));
        if !envelope.data.is_null() {
            frame.insert("data".to_string(), envelope.data);
        }

        serde_json::from_value(Value::Object(frame)).map_err(|e| FrameError {
            event: Some(envelope.event),
            temp_id,
            reason: e.to_string(),
        })
    }

    /// Boundary checks that do not need storage access.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        match self {
            ClientEvent::ChannelMessageCreate {
                content, file_url, ..
            }
            | ClientEvent::DmCreate {
                content, file_url, ..
            } => validate_body(content.as_deref(), file_url.as_deref()),
            ClientEvent::ChannelMessageUpdate {
                content, file_url, ..
            }
            | ClientEvent::DmUpdate {
                content, file_url, ..
            } => validate_update(content.as_deref(), file_url.as_deref()),
            _ => Ok(()),
        }
    }

    /// Correlation token of a create request, if any.
    pub fn temp_id(&self) -> Option<&str> {
        match self {
            ClientEvent::ChannelMessageCreate { temp_id, .. }
            | ClientEvent::DmCreate { temp_id, .. } => Some(temp_id),
            _ => None,
        }
    }
}

/// A new message needs non-blank content or a file.
pub fn validate_body(content: Option<&str>, file_url: Option<&str>) -> Result<(), ProtocolError> {
    let has_text = content.is_some_and(|c| !c.trim().is_empty());
    let has_file = file_url.is_some_and(|f| !f.trim().is_empty());
    if has_text || has_file {
        Ok(())
    } else {
        Err(ProtocolError::EmptyMessage)
    }
}

/// An edit must change something. Whether the edited message still has a
/// body depends on the stored row, so that is checked where the row is known.
pub fn validate_update(content: Option<&str>, file_url: Option<&str>) -> Result<(), ProtocolError> {
    if content.is_none() && file_url.is_none() {
        return Err(ProtocolError::EmptyUpdate);
    }
    Ok(())
}

/// Events sent from server to client via WebSocket
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    #[serde(rename = "room:joined")]
    RoomJoined { room: Room },

    #[serde(rename = "room:left")]
    RoomLeft { room: Room },

    #[serde(rename = "pong")]
    Pong,

    /// Malformed frame or a request that is not tied to a message
    #[serde(rename = "error")]
    Error { kind: String, message: String },

    /// New channel message, echoed with the sender's correlation token
    #[serde(rename = "channel:message")]
    ChannelMessage {
        message: MessageData,
        temp_id: Option<String>,
    },

    #[serde(rename = "channel:message:update")]
    ChannelMessageUpdate { message: MessageData },

    #[serde(rename = "channel:message:delete")]
    ChannelMessageDelete { id: Uuid, channel_id: Uuid },

    /// Unread bump for a member not currently viewing the channel
    #[serde(rename = "channel:notification")]
    ChannelNotification {
        server_id: Uuid,
        channel_id: Uuid,
        inc: i64,
    },

    #[serde(rename = "channel:error")]
    ChannelError {
        temp_id: Option<String>,
        kind: String,
        error: String,
    },

    #[serde(rename = "channel:mark-read")]
    ChannelMarkRead {
        channel_id: Uuid,
        server_id: Uuid,
        last_read_at: DateTime<Utc>,
    },

    #[serde(rename = "server:unread-update")]
    ServerUnreadUpdate { server_id: Uuid, total_unread: i64 },

    #[serde(rename = "dm:create")]
    DmCreate {
        message: DirectMessageData,
        temp_id: Option<String>,
    },

    #[serde(rename = "dm:update")]
    DmUpdate { message: DirectMessageData },

    #[serde(rename = "dm:delete")]
    DmDelete { id: Uuid, conversation_id: Uuid },

    #[serde(rename = "dm:notification")]
    DmNotification {
        conversation_id: Uuid,
        sender_id: Uuid,
        unread: i64,
    },

    /// Delivered to the sender only
    #[serde(rename = "dm:error")]
    DmError {
        temp_id: Option<String>,
        kind: String,
        error: String,
    },
}
