use crate::auth::CurrentProfile;
use crate::error::Result;
use crate::models::{ConversationRead, ConversationView, OpenConversation};
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

pub async fn list_conversations(
    State(state): State<AppState>,
    CurrentProfile(profile): CurrentProfile,
) -> Result<Json<Vec<ConversationView>>> {
    let conversations = state.conversation_service.list(profile.id).await?;
    Ok(Json(conversations))
}

pub async fn open_conversation(
    State(state): State<AppState>,
    CurrentProfile(profile): CurrentProfile,
    Json(input): Json<OpenConversation>,
) -> Result<Json<ConversationView>> {
    let view = state
        .conversation_service
        .open(profile.id, input.other_profile_id)
        .await?;
    Ok(Json(view))
}

pub async fn mark_read(
    State(state): State<AppState>,
    CurrentProfile(profile): CurrentProfile,
    Path(conversation_id): Path<Uuid>,
) -> Result<Json<ConversationRead>> {
    let read = state
        .read_state_service
        .mark_conversation_read(conversation_id, profile.id)
        .await?;
    Ok(Json(read))
}
