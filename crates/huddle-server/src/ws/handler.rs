use crate::auth::profile_from_token;
use crate::error::{AppError, Result};
use crate::models::{CreateMessage, UpdateMessage};
use crate::services::{require_channel, require_conversation, require_endpoint, require_member};
use crate::state::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use huddle_protocol::{ClientEvent, Room, ServerEvent};
use serde::Deserialize;
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    /// Bearer token. The connection is bound to its profile before the first frame.
    pub token: Option<String>,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
) -> Result<Response> {
    let token = params.token.ok_or(AppError::Unauthorized)?;
    let profile_id = profile_from_token(&state, &token).await?.id;

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, profile_id)))
}

async fn handle_socket(socket: WebSocket, state: AppState, profile_id: Uuid) {
    let (mut sender, mut receiver) = socket.split();
    let connection_id = Uuid::new_v4();

    // Create channel for outbound messages
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    state.hub.connect(connection_id, tx).await;
    state.hub.identify(connection_id, profile_id).await;
    state.hub.join(connection_id, Room::Profile(profile_id)).await;

    tracing::info!(%connection_id, %profile_id, "WebSocket connected");

    // Spawn task to forward messages from channel to WebSocket
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(Message::Text(msg.into())).await.is_err() {
                break;
            }
        }
    });

    // One frame at a time, so a connection's own events keep their order
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => match ClientEvent::decode(&text) {
                Ok(event) => handle_client_event(&state, connection_id, profile_id, event).await,
                Err(e) => {
                    tracing::warn!(%connection_id, event = ?e.event, "Invalid frame: {}", e.reason);
                    let route = ErrorRoute::of_frame(e.event.as_deref(), e.temp_id);
                    let error = AppError::Validation(format!("Invalid message format: {}", e.reason));
                    report_error(&state, connection_id, profile_id, route, error).await;
                }
            },
            Ok(Message::Close(_)) => break,
            Err(e) => {
                tracing::error!(%connection_id, "WebSocket error: {}", e);
                break;
            }
            _ => {}
        }
    }

    // Leaving by disconnect is not a read confirmation
    let rooms = state.hub.disconnect(connection_id).await;
    send_task.abort();

    tracing::info!(%connection_id, rooms = rooms.len(), "WebSocket disconnected");
}

/// Where a failure is reported back to the client.
enum ErrorRoute {
    Channel(Option<String>),
    Direct(Option<String>),
    Connection,
}

impl ErrorRoute {
    /// Route for a frame that never decoded, by its event name.
    fn of_frame(event: Option<&str>, temp_id: Option<String>) -> Self {
        match event {
            Some("channel:message:create" | "channel:message:update" | "channel:message:delete") => {
                ErrorRoute::Channel(temp_id)
            }
            Some("dm:create" | "dm:update" | "dm:delete") => ErrorRoute::Direct(temp_id),
            _ => ErrorRoute::Connection,
        }
    }

    fn of(event: &ClientEvent) -> Self {
        let temp_id = event.temp_id().map(String::from);
        match event {
            ClientEvent::ChannelMessageCreate { .. }
            | ClientEvent::ChannelMessageUpdate { .. }
            | ClientEvent::ChannelMessageDelete { .. } => ErrorRoute::Channel(temp_id),
            ClientEvent::DmCreate { .. } | ClientEvent::DmUpdate { .. } | ClientEvent::DmDelete { .. } => {
                ErrorRoute::Direct(temp_id)
            }
            _ => ErrorRoute::Connection,
        }
    }
}

/// Process one client event from a connection bound to `actor`.
pub async fn handle_client_event(state: &AppState, connection_id: Uuid, actor: Uuid, event: ClientEvent) {
    let route = ErrorRoute::of(&event);
    let result = match event.validate() {
        Ok(()) => dispatch(state, connection_id, actor, event).await,
        Err(e) => Err(e.into()),
    };

    if let Err(e) = result {
        tracing::warn!(%connection_id, kind = e.kind(), "Client event rejected: {}", e);
        report_error(state, connection_id, actor, route, e).await;
    }
}

async fn dispatch(state: &AppState, connection_id: Uuid, actor: Uuid, event: ClientEvent) -> Result<()> {
    match event {
        ClientEvent::ProfileJoin { profile_id } => {
            // The token decided the profile; this only confirms it
            if profile_id != actor {
                return Err(AppError::forbidden(
                    "Connection is bound to another profile",
                ));
            }
            join(state, connection_id, Room::Profile(profile_id)).await;
        }
        ClientEvent::ChannelJoin { channel_id } => {
            let channel = require_channel(state.store.as_ref(), channel_id).await?;
            require_member(state.store.as_ref(), channel.server_id, actor).await?;
            join(state, connection_id, Room::Channel(channel_id)).await;
        }
        ClientEvent::ChannelLeave { channel_id } => {
            if state.hub.leave(connection_id, Room::Channel(channel_id)).await {
                state
                    .read_state_service
                    .spawn_mark_channel_read(channel_id, actor);
            }
            left(state, connection_id, Room::Channel(channel_id)).await;
        }
        ClientEvent::ConversationJoin { conversation_id } => {
            let conversation = require_conversation(state.store.as_ref(), conversation_id).await?;
            require_endpoint(&conversation, actor)?;
            join(state, connection_id, Room::Conversation(conversation_id)).await;
        }
        ClientEvent::ConversationLeave { conversation_id } => {
            let room = Room::Conversation(conversation_id);
            state.hub.leave(connection_id, room).await;
            left(state, connection_id, room).await;
        }
        ClientEvent::ChannelMessageCreate {
            temp_id,
            content,
            file_url,
            file_type,
            channel_id,
            member_id,
        } => {
            let input = CreateMessage {
                content,
                file_url,
                file_type: file_type.map(Into::into),
            };
            state
                .fanout_service
                .create_channel_message(channel_id, member_id, actor, &input, Some(temp_id))
                .await?;
        }
        ClientEvent::ChannelMessageUpdate {
            id,
            content,
            file_url,
            channel_id,
        } => {
            let input = UpdateMessage { content, file_url };
            state
                .fanout_service
                .update_channel_message(id, channel_id, actor, &input)
                .await?;
        }
        ClientEvent::ChannelMessageDelete { id, channel_id } => {
            state
                .fanout_service
                .delete_channel_message(id, channel_id, actor)
                .await?;
        }
        ClientEvent::DmCreate {
            temp_id,
            content,
            file_url,
            file_type,
            conversation_id,
            sender_id,
        } => {
            let input = CreateMessage {
                content,
                file_url,
                file_type: file_type.map(Into::into),
            };
            state
                .fanout_service
                .create_direct_message(conversation_id, sender_id, actor, &input, Some(temp_id))
                .await?;
        }
        ClientEvent::DmUpdate {
            id,
            content,
            file_url,
            conversation_id,
        } => {
            let input = UpdateMessage { content, file_url };
            state
                .fanout_service
                .update_direct_message(id, conversation_id, actor, &input)
                .await?;
        }
        ClientEvent::DmDelete { id, conversation_id } => {
            state
                .fanout_service
                .delete_direct_message(id, conversation_id, actor)
                .await?;
        }
        ClientEvent::Ping => {
            state
                .hub
                .send_to_connection(connection_id, &ServerEvent::Pong)
                .await;
        }
    }

    Ok(())
}

async fn join(state: &AppState, connection_id: Uuid, room: Room) {
    state.hub.join(connection_id, room).await;
    state
        .hub
        .send_to_connection(connection_id, &ServerEvent::RoomJoined { room })
        .await;
}

async fn left(state: &AppState, connection_id: Uuid, room: Room) {
    state
        .hub
        .send_to_connection(connection_id, &ServerEvent::RoomLeft { room })
        .await;
}

/// Message errors go to the sender's personal room so every device of the
/// sender sees them. Other errors answer the connection alone.
async fn report_error(
    state: &AppState,
    connection_id: Uuid,
    profile_id: Uuid,
    route: ErrorRoute,
    error: AppError,
) {
    let kind = error.kind().to_string();
    let message = error.client_message();

    let event = match route {
        ErrorRoute::Channel(temp_id) => ServerEvent::ChannelError {
            temp_id,
            kind,
            error: message,
        },
        ErrorRoute::Direct(temp_id) => ServerEvent::DmError {
            temp_id,
            kind,
            error: message,
        },
        ErrorRoute::Connection => {
            state
                .hub
                .send_to_connection(connection_id, &ServerEvent::Error { kind, message })
                .await;
            return;
        }
    };

    state.hub.emit(Room::Profile(profile_id), &event).await;
}
