use crate::api::HistoryParams;
use crate::auth::CurrentProfile;
use crate::error::Result;
use crate::models::{CreateMessage, MessagePage};
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use huddle_protocol::{DirectMessageData, MessageData};
use uuid::Uuid;

pub async fn list_channel_messages(
    State(state): State<AppState>,
    CurrentProfile(profile): CurrentProfile,
    Path(channel_id): Path<Uuid>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<MessagePage<MessageData>>> {
    let limit = params.page_size(state.config.history_page_size);
    let page = state
        .channel_service
        .history(channel_id, profile.id, params.cursor, limit)
        .await?;
    Ok(Json(page))
}

/// Same fan-out as a socket `channel:message:create`, minus the correlation token.
pub async fn create_channel_message(
    State(state): State<AppState>,
    CurrentProfile(profile): CurrentProfile,
    Path(channel_id): Path<Uuid>,
    Json(input): Json<CreateMessage>,
) -> Result<(StatusCode, Json<MessageData>)> {
    let message = state
        .fanout_service
        .create_channel_message_as(channel_id, profile.id, &input)
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn list_direct_messages(
    State(state): State<AppState>,
    CurrentProfile(profile): CurrentProfile,
    Path(conversation_id): Path<Uuid>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<MessagePage<DirectMessageData>>> {
    let limit = params.page_size(state.config.history_page_size);
    let page = state
        .conversation_service
        .history(conversation_id, profile.id, params.cursor, limit)
        .await?;
    Ok(Json(page))
}

pub async fn create_direct_message(
    State(state): State<AppState>,
    CurrentProfile(profile): CurrentProfile,
    Path(conversation_id): Path<Uuid>,
    Json(input): Json<CreateMessage>,
) -> Result<(StatusCode, Json<DirectMessageData>)> {
    let message = state
        .fanout_service
        .create_direct_message(conversation_id, profile.id, profile.id, &input, None)
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}
