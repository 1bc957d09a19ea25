use crate::auth::CurrentProfile;
use crate::error::Result;
use crate::models::ChannelRead;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkReadRequest {
    pub server_id: Uuid,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkReadResponse {
    pub read: ChannelRead,
    pub total_unread: i64,
}

pub async fn mark_read(
    State(state): State<AppState>,
    CurrentProfile(profile): CurrentProfile,
    Path(channel_id): Path<Uuid>,
    Json(input): Json<MarkReadRequest>,
) -> Result<Json<MarkReadResponse>> {
    let (read, total_unread) = state
        .read_state_service
        .mark_channel_read_and_notify(channel_id, input.server_id, profile.id)
        .await?;

    Ok(Json(MarkReadResponse { read, total_unread }))
}
