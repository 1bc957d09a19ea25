use async_trait::async_trait;
use huddle_protocol::{Room, ServerEvent};
use std::collections::HashSet;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Room membership and delivery for live connections.
///
/// The fan-out engine only talks to this trait, so a single process can use
/// the in-memory [`LocalHub`](super::LocalHub) and a multi-instance
/// deployment can use [`RelayHub`](super::RelayHub) without either side
/// knowing the transport.
#[async_trait]
pub trait RoomHub: Send + Sync {
    /// Register a connection and the queue its socket writer drains.
    async fn connect(&self, connection_id: Uuid, sender: mpsc::UnboundedSender<String>);

    /// Bind the connection to a profile. The binding is set once; returns
    /// `false` if the connection is unknown or already bound to someone else.
    async fn identify(&self, connection_id: Uuid, profile_id: Uuid) -> bool;

    /// Idempotent. Returns `true` only when the connection was not yet in the room.
    async fn join(&self, connection_id: Uuid, room: Room) -> bool;

    /// Returns `true` if the connection was in the room.
    async fn leave(&self, connection_id: Uuid, room: Room) -> bool;

    /// Drop the connection from every room, returning the rooms it was in.
    async fn disconnect(&self, connection_id: Uuid) -> Vec<Room>;

    /// Deliver to every subscriber of the room. Zero subscribers is fine.
    async fn emit(&self, room: Room, event: &ServerEvent);

    async fn send_to_connection(&self, connection_id: Uuid, event: &ServerEvent);

    /// Profiles with at least one bound connection in the room.
    async fn profiles_in(&self, room: Room) -> HashSet<Uuid>;
}

pub(crate) fn encode(event: &ServerEvent) -> Option<String> {
    match serde_json::to_string(event) {
        Ok(json) => Some(json),
        Err(e) => {
            tracing::error!("Failed to serialize event: {}", e);
            None
        }
    }
}
