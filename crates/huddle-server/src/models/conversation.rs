use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use huddle_protocol::ProfileData;

use super::FileType;

/// Two-party conversation stored on the canonical pair (profile_one_id <= profile_two_id)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: Uuid,
    pub profile_one_id: Uuid,
    pub profile_two_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    pub fn includes(&self, profile_id: Uuid) -> bool {
        self.profile_one_id == profile_id || self.profile_two_id == profile_id
    }

    /// The other endpoint. A self-conversation returns the profile itself.
    pub fn other(&self, profile_id: Uuid) -> Option<Uuid> {
        if self.profile_one_id == profile_id {
            Some(self.profile_two_id)
        } else if self.profile_two_id == profile_id {
            Some(self.profile_one_id)
        } else {
            None
        }
    }
}

/// Order two profile ids so a pair has one lookup key regardless of who initiated.
pub fn canonical_pair(a: Uuid, b: Uuid) -> (Uuid, Uuid) {
    if a <= b { (a, b) } else { (b, a) }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DirectMessage {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub file_url: Option<String>,
    pub file_type: FileType,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationRead {
    pub profile_id: Uuid,
    pub conversation_id: Uuid,
    pub last_read_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenConversation {
    pub other_profile_id: Uuid,
}

/// A conversation as seen by one of its endpoints
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationView {
    pub conversation: Conversation,
    pub other_profile: ProfileData,
}
