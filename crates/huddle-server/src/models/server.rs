use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A server owns a set of channels and members
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Server {
    pub id: Uuid,
    pub owner_profile_id: Uuid,
    pub name: String,
    pub image_url: Option<String>,
    pub invite_code: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Join entity between a server and a profile, unique on (server_id, profile_id)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub id: Uuid,
    pub server_id: Uuid,
    pub profile_id: Uuid,
    pub role: MemberRole,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "member_role", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemberRole {
    Owner,
    ViceOwner,
    Guest,
}

impl From<MemberRole> for huddle_protocol::MemberRole {
    fn from(role: MemberRole) -> Self {
        match role {
            MemberRole::Owner => huddle_protocol::MemberRole::Owner,
            MemberRole::ViceOwner => huddle_protocol::MemberRole::ViceOwner,
            MemberRole::Guest => huddle_protocol::MemberRole::Guest,
        }
    }
}

impl MemberRole {
    pub fn can_manage(self) -> bool {
        huddle_protocol::MemberRole::from(self).can_manage()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateServer {
    pub name: String,
    pub image_url: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateServer {
    pub name: Option<String>,
    pub image_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMember {
    pub role: MemberRole,
}

/// One page of a listing plus the totals a client needs to page through it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub data: Vec<T>,
    pub total: i64,
    pub skip: i64,
    pub limit: i64,
    pub total_pages: i64,
}

impl<T> Page<T> {
    pub fn new(data: Vec<T>, total: i64, skip: i64, limit: i64) -> Self {
        let total_pages = if limit > 0 { (total + limit - 1) / limit } else { 0 };
        Self {
            data,
            total,
            skip,
            limit,
            total_pages,
        }
    }
}

/// A server as listed for one profile, with its unread badge
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ServerSummary {
    pub id: Uuid,
    pub name: String,
    pub image_url: Option<String>,
    pub member_id: Uuid,
    pub unread_count: i64,
}

/// A server together with the caller's membership and its channels
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ServerDetails {
    pub server: Server,
    pub member: Member,
    pub channels: Vec<super::Channel>,
}
