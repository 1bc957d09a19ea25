use crate::api::PageParams;
use crate::auth::CurrentProfile;
use crate::error::Result;
use crate::models::{
    Channel, CreateChannel, CreateServer, Member, Page, Server, ServerDetails, ServerSummary,
    UpdateChannel, UpdateMember, UpdateServer,
};
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

pub async fn create_server(
    State(state): State<AppState>,
    CurrentProfile(profile): CurrentProfile,
    Json(input): Json<CreateServer>,
) -> Result<(StatusCode, Json<ServerDetails>)> {
    let details = state.server_service.create(profile.id, input).await?;
    Ok((StatusCode::CREATED, Json(details)))
}

const DEFAULT_SERVER_PAGE: i64 = 20;

pub async fn list_servers(
    State(state): State<AppState>,
    CurrentProfile(profile): CurrentProfile,
    Query(params): Query<PageParams>,
) -> Result<Json<Page<ServerSummary>>> {
    let page = state
        .server_service
        .list_for_profile(profile.id, params.skip(), params.limit(DEFAULT_SERVER_PAGE))
        .await?;
    Ok(Json(page))
}

pub async fn update_server(
    State(state): State<AppState>,
    CurrentProfile(profile): CurrentProfile,
    Path(server_id): Path<Uuid>,
    Json(input): Json<UpdateServer>,
) -> Result<Json<Server>> {
    let server = state.server_service.update(server_id, profile.id, input).await?;
    Ok(Json(server))
}

pub async fn delete_server(
    State(state): State<AppState>,
    CurrentProfile(profile): CurrentProfile,
    Path(server_id): Path<Uuid>,
) -> Result<StatusCode> {
    state.server_service.delete(server_id, profile.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn leave_server(
    State(state): State<AppState>,
    CurrentProfile(profile): CurrentProfile,
    Path(server_id): Path<Uuid>,
) -> Result<StatusCode> {
    state.server_service.leave(server_id, profile.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn update_member(
    State(state): State<AppState>,
    CurrentProfile(profile): CurrentProfile,
    Path((server_id, member_id)): Path<(Uuid, Uuid)>,
    Json(input): Json<UpdateMember>,
) -> Result<Json<Member>> {
    let member = state
        .server_service
        .update_member_role(server_id, member_id, profile.id, input.role)
        .await?;
    Ok(Json(member))
}

pub async fn remove_member(
    State(state): State<AppState>,
    CurrentProfile(profile): CurrentProfile,
    Path((server_id, member_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode> {
    state
        .server_service
        .remove_member(server_id, member_id, profile.id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn regenerate_invite_code(
    State(state): State<AppState>,
    CurrentProfile(profile): CurrentProfile,
    Path(server_id): Path<Uuid>,
) -> Result<Json<Server>> {
    let server = state
        .server_service
        .regenerate_invite_code(server_id, profile.id)
        .await?;
    Ok(Json(server))
}

pub async fn join_server(
    State(state): State<AppState>,
    CurrentProfile(profile): CurrentProfile,
    Path(code): Path<String>,
) -> Result<Json<ServerDetails>> {
    let details = state.server_service.join_by_invite(profile.id, &code).await?;
    Ok(Json(details))
}

pub async fn list_channels(
    State(state): State<AppState>,
    CurrentProfile(profile): CurrentProfile,
    Path(server_id): Path<Uuid>,
) -> Result<Json<Vec<Channel>>> {
    let channels = state.channel_service.list(server_id, profile.id).await?;
    Ok(Json(channels))
}

pub async fn create_channel(
    State(state): State<AppState>,
    CurrentProfile(profile): CurrentProfile,
    Path(server_id): Path<Uuid>,
    Json(input): Json<CreateChannel>,
) -> Result<(StatusCode, Json<Channel>)> {
    let channel = state
        .channel_service
        .create(server_id, profile.id, input)
        .await?;
    Ok((StatusCode::CREATED, Json(channel)))
}

pub async fn update_channel(
    State(state): State<AppState>,
    CurrentProfile(profile): CurrentProfile,
    Path((server_id, channel_id)): Path<(Uuid, Uuid)>,
    Json(input): Json<UpdateChannel>,
) -> Result<Json<Channel>> {
    let channel = state
        .channel_service
        .update(server_id, channel_id, profile.id, input)
        .await?;
    Ok(Json(channel))
}

pub async fn delete_channel(
    State(state): State<AppState>,
    CurrentProfile(profile): CurrentProfile,
    Path((server_id, channel_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode> {
    state
        .channel_service
        .delete(server_id, channel_id, profile.id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Channel id to unread count
pub async fn unread(
    State(state): State<AppState>,
    CurrentProfile(profile): CurrentProfile,
    Path(server_id): Path<Uuid>,
) -> Result<Json<HashMap<Uuid, i64>>> {
    let counts = state
        .unread_service
        .unread_for_server(server_id, profile.id)
        .await?;
    Ok(Json(counts))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TotalUnread {
    pub server_id: Uuid,
    pub total_unread: i64,
}

pub async fn total_unread(
    State(state): State<AppState>,
    CurrentProfile(profile): CurrentProfile,
    Path(server_id): Path<Uuid>,
) -> Result<Json<TotalUnread>> {
    let total_unread = state
        .unread_service
        .total_unread_for_server(server_id, profile.id)
        .await?;
    Ok(Json(TotalUnread {
        server_id,
        total_unread,
    }))
}
