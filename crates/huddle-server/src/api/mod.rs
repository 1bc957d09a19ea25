mod channels;
mod conversations;
mod messages;
mod notifications;
mod profiles;
mod servers;

use crate::state::AppState;
use crate::ws;
use axum::{
    http::HeaderValue,
    routing::{get, patch, post},
    Router,
};
use serde::Deserialize;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

const MAX_PAGE_SIZE: usize = 100;

/// `?cursor=<message id>&limit=<n>` for history endpoints
#[derive(Debug, Default, Deserialize)]
pub struct HistoryParams {
    pub cursor: Option<Uuid>,
    pub limit: Option<usize>,
}

impl HistoryParams {
    pub fn page_size(&self, default: usize) -> usize {
        self.limit.unwrap_or(default).clamp(1, MAX_PAGE_SIZE)
    }
}

/// `?skip=<n>&limit=<n>` for offset listings
#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

impl PageParams {
    pub fn skip(&self) -> i64 {
        self.skip.unwrap_or(0).max(0)
    }

    pub fn limit(&self, default: i64) -> i64 {
        self.limit.unwrap_or(default).clamp(1, MAX_PAGE_SIZE as i64)
    }
}

fn cors_layer(origins: Vec<String>) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(origin = %o, "Ignoring invalid CORS origin: {}", e);
                None
            }
        })
        .collect();

    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if allowed.is_empty() {
        cors.allow_origin(Any)
    } else {
        cors.allow_origin(AllowOrigin::list(allowed))
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(state.config.cors_origin_list());

    Router::new()
        // Health check
        .route("/health", get(|| async { "OK" }))
        // Profile routes
        .route("/api/profiles/me", get(profiles::get_me))
        // Server routes
        .route(
            "/api/servers",
            get(servers::list_servers).post(servers::create_server),
        )
        .route(
            "/api/servers/{id}",
            patch(servers::update_server).delete(servers::delete_server),
        )
        .route("/api/servers/{id}/leave", post(servers::leave_server))
        .route(
            "/api/servers/{id}/members/{member_id}",
            patch(servers::update_member).delete(servers::remove_member),
        )
        .route(
            "/api/servers/{id}/invite-code",
            post(servers::regenerate_invite_code),
        )
        .route("/api/invites/{code}", post(servers::join_server))
        .route(
            "/api/servers/{id}/channels",
            get(servers::list_channels).post(servers::create_channel),
        )
        .route(
            "/api/servers/{id}/channels/{channel_id}",
            patch(servers::update_channel).delete(servers::delete_channel),
        )
        .route("/api/servers/{id}/unread", get(servers::unread))
        .route("/api/servers/{id}/unread/total", get(servers::total_unread))
        // Channel routes
        .route(
            "/api/channels/{id}/messages",
            get(messages::list_channel_messages).post(messages::create_channel_message),
        )
        .route("/api/channels/{id}/read", post(channels::mark_read))
        // Conversation routes
        .route(
            "/api/conversations",
            get(conversations::list_conversations).post(conversations::open_conversation),
        )
        .route(
            "/api/conversations/{id}/messages",
            get(messages::list_direct_messages).post(messages::create_direct_message),
        )
        .route("/api/conversations/{id}/read", post(conversations::mark_read))
        // Initial page-load badges
        .route(
            "/api/notification/server/{profile_id}",
            get(notifications::server_unread),
        )
        .route(
            "/api/notification/conversation/{profile_id}",
            get(notifications::conversation_unread),
        )
        // WebSocket endpoint
        .route("/ws", get(ws::handler::ws_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
