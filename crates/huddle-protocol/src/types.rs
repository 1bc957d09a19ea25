use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::ProtocolError;

/// Profile data shared between client and server
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProfileData {
    pub id: Uuid,
    pub name: String,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemberRole {
    Owner,
    ViceOwner,
    Guest,
}

impl MemberRole {
    /// Owners and vice-owners may mutate server-scoped resources.
    pub fn can_manage(self) -> bool {
        matches!(self, MemberRole::Owner | MemberRole::ViceOwner)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChannelType {
    Text,
    Audio,
    Video,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    #[default]
    Text,
    Img,
    Pdf,
}

/// Member as shown next to a channel message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MemberData {
    pub id: Uuid,
    pub server_id: Uuid,
    pub role: MemberRole,
    pub profile: ProfileData,
}

/// Channel message data
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MessageData {
    pub id: Uuid,
    pub channel_id: Uuid,
    pub member_id: Uuid,
    pub content: String,
    pub file_url: Option<String>,
    pub file_type: FileType,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub member: MemberData,
}

/// Direct message data
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DirectMessageData {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub file_url: Option<String>,
    pub file_type: FileType,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub sender: ProfileData,
}

/// A logical broadcast group. Serialized as `profile:<id>`, `channel:<id>`
/// or `conversation:<id>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Room {
    Profile(Uuid),
    Channel(Uuid),
    Conversation(Uuid),
}

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Room::Profile(id) => write!(f, "profile:{id}"),
            Room::Channel(id) => write!(f, "channel:{id}"),
            Room::Conversation(id) => write!(f, "conversation:{id}"),
        }
    }
}

impl FromStr for Room {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, id) = s
            .split_once(':')
            .ok_or_else(|| ProtocolError::InvalidRoom(s.to_string()))?;
        let id = Uuid::parse_str(id).map_err(|_| ProtocolError::InvalidRoom(s.to_string()))?;

        match kind {
            "profile" => Ok(Room::Profile(id)),
            "channel" => Ok(Room::Channel(id)),
            "conversation" => Ok(Room::Conversation(id)),
            _ => Err(ProtocolError::InvalidRoom(s.to_string())),
        }
    }
}

impl From<Room> for String {
    fn from(room: Room) -> Self {
        room.to_string()
    }
}

impl TryFrom<String> for Room {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
