use chrono::{DateTime, Utc};
use huddle_protocol::ProfileData;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Identity record, one per external identity
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: Uuid,
    pub external_user_id: String,
    pub name: String,
    pub email: String,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields taken from the identity provider on first contact
#[derive(Debug, Clone)]
pub struct NewProfile {
    pub external_user_id: String,
    pub name: String,
    pub email: String,
    pub image_url: Option<String>,
}

impl From<&Profile> for ProfileData {
    fn from(profile: &Profile) -> Self {
        ProfileData {
            id: profile.id,
            name: profile.name.clone(),
            image_url: profile.image_url.clone(),
        }
    }
}
