use crate::ws::hub::{encode, RoomHub};
use async_trait::async_trait;
use huddle_protocol::{Room, ServerEvent};
use std::collections::{HashMap, HashSet};
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
pub struct ConnectionInfo {
    pub profile_id: Option<Uuid>,
    pub rooms: HashSet<Room>,
}

/// Process-local room registry.
///
/// Locks are always taken in the order `connection_info`, `room_members`,
/// `senders`.
pub struct LocalHub {
    /// Map from connection ID to message sender channel
    senders: RwLock<HashMap<Uuid, mpsc::UnboundedSender<String>>>,
    /// Map from connection ID to its bound profile and rooms
    connection_info: RwLock<HashMap<Uuid, ConnectionInfo>>,
    /// Map from room to the connection IDs subscribed to it
    room_members: RwLock<HashMap<Room, HashSet<Uuid>>>,
}

impl LocalHub {
    pub fn new() -> Self {
        Self {
            senders: RwLock::new(HashMap::new()),
            connection_info: RwLock::new(HashMap::new()),
            room_members: RwLock::new(HashMap::new()),
        }
    }

    /// Write an already encoded frame to every local subscriber of the room.
    pub(crate) async fn deliver(&self, room: Room, json: &str) {
        let room_members = self.room_members.read().await;
        let senders = self.senders.read().await;

        let Some(subs) = room_members.get(&room) else {
            tracing::debug!(%room, "No subscribers");
            return;
        };

        tracing::debug!(%room, subscribers = subs.len(), "Broadcasting");
        for conn_id in subs {
            if let Some(sender) = senders.get(conn_id) {
                if let Err(e) = sender.send(json.to_string()) {
                    tracing::error!("Failed to send message to {}: {}", conn_id, e);
                }
            }
        }
    }
}

#[cfg(test)]
impl LocalHub {
    /// Connection IDs currently in the room.
    async fn connections_in(&self, room: Room) -> HashSet<Uuid> {
        self.room_members
            .read()
            .await
            .get(&room)
            .cloned()
            .unwrap_or_default()
    }

    async fn connection_count(&self) -> usize {
        self.senders.read().await.len()
    }

    async fn profile_of(&self, connection_id: Uuid) -> Option<Uuid> {
        self.connection_info
            .read()
            .await
            .get(&connection_id)
            .and_then(|info| info.profile_id)
    }
}

impl Default for LocalHub {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RoomHub for LocalHub {
    async fn connect(&self, connection_id: Uuid, sender: mpsc::UnboundedSender<String>) {
        self.connection_info
            .write()
            .await
            .insert(connection_id, ConnectionInfo::default());
        self.senders.write().await.insert(connection_id, sender);

        tracing::debug!(%connection_id, "Connection registered");
    }

    async fn identify(&self, connection_id: Uuid, profile_id: Uuid) -> bool {
        let mut connection_info = self.connection_info.write().await;
        let Some(info) = connection_info.get_mut(&connection_id) else {
            return false;
        };

        match info.profile_id {
            Some(bound) => bound == profile_id,
            None => {
                info.profile_id = Some(profile_id);
                tracing::debug!(%connection_id, %profile_id, "Connection bound to profile");
                true
            }
        }
    }

    async fn join(&self, connection_id: Uuid, room: Room) -> bool {
        let mut connection_info = self.connection_info.write().await;
        let Some(info) = connection_info.get_mut(&connection_id) else {
            return false;
        };
        if !info.rooms.insert(room) {
            return false;
        }

        self.room_members
            .write()
            .await
            .entry(room)
            .or_default()
            .insert(connection_id);

        tracing::debug!(%connection_id, %room, "Joined room");
        true
    }

    async fn leave(&self, connection_id: Uuid, room: Room) -> bool {
        let mut connection_info = self.connection_info.write().await;
        let Some(info) = connection_info.get_mut(&connection_id) else {
            return false;
        };
        if !info.rooms.remove(&room) {
            return false;
        }

        let mut room_members = self.room_members.write().await;
        if let Some(subs) = room_members.get_mut(&room) {
            subs.remove(&connection_id);
            if subs.is_empty() {
                room_members.remove(&room);
            }
        }

        tracing::debug!(%connection_id, %room, "Left room");
        true
    }

    async fn disconnect(&self, connection_id: Uuid) -> Vec<Room> {
        let info = self.connection_info.write().await.remove(&connection_id);

        let rooms: Vec<Room> = match info {
            Some(info) => {
                let mut room_members = self.room_members.write().await;
                for room in &info.rooms {
                    if let Some(subs) = room_members.get_mut(room) {
                        subs.remove(&connection_id);
                        if subs.is_empty() {
                            room_members.remove(room);
                        }
                    }
                }
                info.rooms.into_iter().collect()
            }
            None => Vec::new(),
        };

        self.senders.write().await.remove(&connection_id);

        tracing::debug!(%connection_id, rooms = rooms.len(), "Connection removed");
        rooms
    }

    async fn emit(&self, room: Room, event: &ServerEvent) {
        if let Some(json) = encode(event) {
            self.deliver(room, &json).await;
        }
    }

    async fn send_to_connection(&self, connection_id: Uuid, event: &ServerEvent) {
        let Some(json) = encode(event) else {
            return;
        };

        let senders = self.senders.read().await;
        if let Some(sender) = senders.get(&connection_id) {
            if let Err(e) = sender.send(json) {
                tracing::error!("Failed to send message to {}: {}", connection_id, e);
            }
        }
    }

    async fn profiles_in(&self, room: Room) -> HashSet<Uuid> {
        let connection_info = self.connection_info.read().await;
        let room_members = self.room_members.read().await;

        room_members
            .get(&room)
            .into_iter()
            .flatten()
            .filter_map(|conn_id| connection_info.get(conn_id).and_then(|i| i.profile_id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn connected(hub: &LocalHub) -> (Uuid, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        hub.connect(id, tx).await;
        (id, rx)
    }

    #[tokio::test]
    async fn join_is_idempotent() {
        let hub = LocalHub::new();
        let (conn, _rx) = connected(&hub).await;
        let room = Room::Channel(Uuid::new_v4());

        assert!(hub.join(conn, room).await);
        assert!(!hub.join(conn, room).await);
        assert_eq!(hub.connections_in(room).await.len(), 1);
    }

    #[tokio::test]
    async fn emit_reaches_only_room_subscribers() {
        let hub = LocalHub::new();
        let (a, mut rx_a) = connected(&hub).await;
        let (b, mut rx_b) = connected(&hub).await;
        let c1 = Room::Channel(Uuid::new_v4());
        let c2 = Room::Channel(Uuid::new_v4());
        hub.join(a, c1).await;
        hub.join(b, c2).await;

        hub.emit(c1, &ServerEvent::Pong).await;

        assert!(rx_a.try_recv().unwrap().contains("pong"));
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn profile_binding_is_set_once() {
        let hub = LocalHub::new();
        let (conn, _rx) = connected(&hub).await;
        let p1 = Uuid::new_v4();

        assert!(hub.identify(conn, p1).await);
        assert!(hub.identify(conn, p1).await);
        assert!(!hub.identify(conn, Uuid::new_v4()).await);
        assert_eq!(hub.profile_of(conn).await, Some(p1));
    }

    #[tokio::test]
    async fn presence_counts_only_bound_connections() {
        let hub = LocalHub::new();
        let (bound, _rx1) = connected(&hub).await;
        let (anon, _rx2) = connected(&hub).await;
        let profile = Uuid::new_v4();
        let room = Room::Channel(Uuid::new_v4());
        hub.identify(bound, profile).await;
        hub.join(bound, room).await;
        hub.join(anon, room).await;

        assert_eq!(hub.profiles_in(room).await, HashSet::from([profile]));
    }

    #[tokio::test]
    async fn disconnect_clears_every_room() {
        let hub = LocalHub::new();
        let (conn, _rx) = connected(&hub).await;
        let r1 = Room::Profile(Uuid::new_v4());
        let r2 = Room::Conversation(Uuid::new_v4());
        hub.join(conn, r1).await;
        hub.join(conn, r2).await;

        let mut rooms = hub.disconnect(conn).await;
        rooms.sort_by_key(|r| r.to_string());
        let mut expected = vec![r1, r2];
        expected.sort_by_key(|r| r.to_string());
        assert_eq!(rooms, expected);
        assert!(hub.connections_in(r1).await.is_empty());
        assert_eq!(hub.connection_count().await, 0);
        assert!(!hub.leave(conn, r1).await);
    }
}
