//! Batch unread summaries for the initial page load.

use crate::auth::CurrentProfile;
use crate::error::{AppError, Result};
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerUnread {
    pub server_id: Uuid,
    pub unread_count: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationUnread {
    pub conversation_id: Uuid,
    pub unread: i64,
}

fn ensure_self(caller: Uuid, requested: Uuid) -> Result<()> {
    if caller == requested {
        Ok(())
    } else {
        Err(AppError::forbidden("Cannot read another profile's notifications"))
    }
}

pub async fn server_unread(
    State(state): State<AppState>,
    CurrentProfile(profile): CurrentProfile,
    Path(profile_id): Path<Uuid>,
) -> Result<Json<Vec<ServerUnread>>> {
    ensure_self(profile.id, profile_id)?;

    let mut rows: Vec<ServerUnread> = state
        .unread_service
        .unread_by_server(profile_id)
        .await?
        .into_iter()
        .map(|(server_id, unread_count)| ServerUnread {
            server_id,
            unread_count,
        })
        .collect();
    rows.sort_by_key(|r| r.server_id);
    Ok(Json(rows))
}

pub async fn conversation_unread(
    State(state): State<AppState>,
    CurrentProfile(profile): CurrentProfile,
    Path(profile_id): Path<Uuid>,
) -> Result<Json<Vec<ConversationUnread>>> {
    ensure_self(profile.id, profile_id)?;

    let mut rows: Vec<ConversationUnread> = state
        .unread_service
        .unread_for_conversations(profile_id)
        .await?
        .into_iter()
        .map(|(conversation_id, unread)| ConversationUnread {
            conversation_id,
            unread,
        })
        .collect();
    rows.sort_by_key(|r| r.conversation_id);
    Ok(Json(rows))
}
