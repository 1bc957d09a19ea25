use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Content that replaces a message body when it is deleted
pub const TOMBSTONE: &str = "This message has been deleted";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub channel_id: Uuid,
    pub member_id: Uuid,
    pub content: String,
    pub file_url: Option<String>,
    pub file_type: FileType,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash, Default)]
#[sqlx(type_name = "file_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    #[default]
    Text,
    Img,
    Pdf,
}

impl From<huddle_protocol::FileType> for FileType {
    fn from(ft: huddle_protocol::FileType) -> Self {
        match ft {
            huddle_protocol::FileType::Text => FileType::Text,
            huddle_protocol::FileType::Img => FileType::Img,
            huddle_protocol::FileType::Pdf => FileType::Pdf,
        }
    }
}

impl From<FileType> for huddle_protocol::FileType {
    fn from(ft: FileType) -> Self {
        match ft {
            FileType::Text => huddle_protocol::FileType::Text,
            FileType::Img => huddle_protocol::FileType::Img,
            FileType::Pdf => huddle_protocol::FileType::Pdf,
        }
    }
}

/// Body of a new channel message or direct message
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMessage {
    pub content: Option<String>,
    pub file_url: Option<String>,
    pub file_type: Option<FileType>,
}

impl CreateMessage {
    pub fn content_or_empty(&self) -> String {
        self.content.clone().unwrap_or_default()
    }
}

/// Partial edit; `None` leaves a field untouched
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMessage {
    pub content: Option<String>,
    pub file_url: Option<String>,
}

/// One page of history, newest first
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePage<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<Uuid>,
}

impl<T> MessagePage<T> {
    /// `next_cursor` is set only when the page came back full.
    pub fn from_items(items: Vec<T>, limit: usize, id_of: impl Fn(&T) -> Uuid) -> Self {
        let next_cursor = if items.len() == limit {
            items.last().map(&id_of)
        } else {
            None
        };
        Self { items, next_cursor }
    }
}
