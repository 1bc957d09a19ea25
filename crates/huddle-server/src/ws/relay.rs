//! Room hub for running several hub instances side by side.
//!
//! Every emit is published on a shared bus and each instance writes it to its
//! own local subscribers. Presence (which connections sit in which room, and
//! whose they are) lives on a board every instance shares, so notification
//! suppression sees viewers connected to other instances too.
//!
//! The bus is a `tokio::sync::broadcast` channel plus a shared presence map,
//! so all instances must live in one process. Spanning processes means
//! replacing [`RelayBus`] with a networked transport; [`RelayHub`] only
//! publishes [`Envelope`]s and pumps received ones into its [`LocalHub`].

use crate::ws::connections::LocalHub;
use crate::ws::hub::{encode, RoomHub};
use async_trait::async_trait;
use huddle_protocol::{Room, ServerEvent};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

const DEFAULT_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
pub struct Envelope {
    pub room: Room,
    pub payload: Arc<str>,
}

#[derive(Debug, Default)]
struct Presence {
    rooms: HashMap<Room, HashSet<Uuid>>,
    profiles: HashMap<Uuid, Uuid>,
}

/// The shared transport. Clone it into every hub that should see the others.
/// In-process only.
#[derive(Clone)]
pub struct RelayBus {
    sender: broadcast::Sender<Envelope>,
    presence: Arc<RwLock<Presence>>,
}

impl RelayBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            presence: Arc::new(RwLock::new(Presence::default())),
        }
    }

    fn publish(&self, envelope: Envelope) {
        // No receivers means no instance is listening yet
        if let Err(e) = self.sender.send(envelope) {
            tracing::debug!(room = %e.0.room, "No relay subscribers");
        }
    }
}

impl Default for RelayBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

pub struct RelayHub {
    bus: RelayBus,
    local: Arc<LocalHub>,
    pump: JoinHandle<()>,
}

impl RelayHub {
    /// Must be called from within a tokio runtime.
    pub fn new(bus: RelayBus) -> Self {
        let local = Arc::new(LocalHub::new());
        let mut rx = bus.sender.subscribe();
        let pump_local = local.clone();

        let pump = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(envelope) => pump_local.deliver(envelope.room, &envelope.payload).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Relay receiver lagged, events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Self { bus, local, pump }
    }
}

impl Drop for RelayHub {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

#[async_trait]
impl RoomHub for RelayHub {
    async fn connect(&self, connection_id: Uuid, sender: mpsc::UnboundedSender<String>) {
        self.local.connect(connection_id, sender).await;
    }

    async fn identify(&self, connection_id: Uuid, profile_id: Uuid) -> bool {
        if !self.local.identify(connection_id, profile_id).await {
            return false;
        }
        self.bus
            .presence
            .write()
            .await
            .profiles
            .insert(connection_id, profile_id);
        true
    }

    async fn join(&self, connection_id: Uuid, room: Room) -> bool {
        if !self.local.join(connection_id, room).await {
            return false;
        }
        self.bus
            .presence
            .write()
            .await
            .rooms
            .entry(room)
            .or_default()
            .insert(connection_id);
        true
    }

    async fn leave(&self, connection_id: Uuid, room: Room) -> bool {
        if !self.local.leave(connection_id, room).await {
            return false;
        }
        let mut presence = self.bus.presence.write().await;
        if let Some(conns) = presence.rooms.get_mut(&room) {
            conns.remove(&connection_id);
            if conns.is_empty() {
                presence.rooms.remove(&room);
            }
        }
        true
    }

    async fn disconnect(&self, connection_id: Uuid) -> Vec<Room> {
        let rooms = self.local.disconnect(connection_id).await;

        let mut presence = self.bus.presence.write().await;
        presence.profiles.remove(&connection_id);
        for room in &rooms {
            if let Some(conns) = presence.rooms.get_mut(room) {
                conns.remove(&connection_id);
                if conns.is_empty() {
                    presence.rooms.remove(room);
                }
            }
        }
        rooms
    }

    async fn emit(&self, room: Room, event: &ServerEvent) {
        if let Some(json) = encode(event) {
            self.bus.publish(Envelope {
                room,
                payload: json.into(),
            });
        }
    }

    async fn send_to_connection(&self, connection_id: Uuid, event: &ServerEvent) {
        self.local.send_to_connection(connection_id, event).await;
    }

    async fn profiles_in(&self, room: Room) -> HashSet<Uuid> {
        let presence = self.bus.presence.read().await;
        presence
            .rooms
            .get(&room)
            .into_iter()
            .flatten()
            .filter_map(|conn_id| presence.profiles.get(conn_id).copied())
            .collect()
    }
}
