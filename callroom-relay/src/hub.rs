//! Room hub: in-memory room membership and fan-out routing.
//!
//! The [`RoomHub`] maps room identifiers to the set of connections that have
//! joined them and forwards a frame from one connection to every other member
//! of the addressed room. It never inspects frames; they are cloned and
//! pushed onto each member's outbound channel as-is.
//!
//! Membership is tied to the lifetime of a [`Connection`] handle. Dropping
//! the handle removes the connection from every room it joined, so cleanup
//! cannot be skipped by a forgotten code path.
//!
//! All state sits behind a single mutex. Join, relay and disconnect each run
//! in one critical section; the only work done while holding the lock is
//! `try_send` onto each member's bounded outbound queue, which never blocks.
//! A member whose queue is full misses that frame.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use callroom_proto::room::RoomId;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

/// Server-assigned identifier for a single client connection (UUID v7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Creates a new time-ordered connection identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A registered connection: its outbound channel and the rooms it joined.
struct Member<M> {
    sender: mpsc::Sender<M>,
    rooms: HashSet<RoomId>,
}

struct Registry<M> {
    connections: HashMap<ConnectionId, Member<M>>,
    rooms: HashMap<RoomId, HashSet<ConnectionId>>,
}

impl<M> Default for Registry<M> {
    fn default() -> Self {
        Self {
            connections: HashMap::new(),
            rooms: HashMap::new(),
        }
    }
}

/// Room membership registry and fan-out router.
///
/// Generic over the outbound frame type `M` so the routing logic does not
/// depend on a particular transport. The WebSocket server uses
/// `RoomHub<axum::extract::ws::Message>`.
pub struct RoomHub<M> {
    registry: Mutex<Registry<M>>,
}

impl<M> Default for RoomHub<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> RoomHub<M> {
    /// Creates an empty hub with no connections and no rooms.
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: Mutex::new(Registry::default()),
        }
    }

    /// Registers a new connection whose outbound frames go to `sender`.
    ///
    /// No room state is created until the connection joins a room. The
    /// returned [`Connection`] removes all of the connection's memberships
    /// when dropped.
    #[must_use]
    pub fn connect(self: &Arc<Self>, sender: mpsc::Sender<M>) -> Connection<M> {
        let id = ConnectionId::new();
        self.registry.lock().connections.insert(
            id,
            Member {
                sender,
                rooms: HashSet::new(),
            },
        );
        tracing::info!(connection_id = %id, "client connected");
        Connection {
            hub: Arc::clone(self),
            id,
        }
    }

    /// Number of currently registered connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.registry.lock().connections.len()
    }

    /// Number of rooms with at least one member.
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.registry.lock().rooms.len()
    }

    /// Current members of `room`, in no particular order.
    #[must_use]
    pub fn members(&self, room: &RoomId) -> Vec<ConnectionId> {
        self.registry
            .lock()
            .rooms
            .get(room)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Number of current members of `room`.
    #[must_use]
    pub fn member_count(&self, room: &RoomId) -> usize {
        self.registry.lock().rooms.get(room).map_or(0, HashSet::len)
    }

    /// Rooms the connection currently belongs to, in no particular order.
    #[must_use]
    pub fn rooms_of(&self, id: &ConnectionId) -> Vec<RoomId> {
        self.registry
            .lock()
            .connections
            .get(id)
            .map(|member| member.rooms.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Adds `id` to `room`. Returns `true` if it was not already a member.
    ///
    /// Unknown (already disconnected) connections are ignored so that a late
    /// join can never resurrect membership for a dead connection.
    fn join(&self, id: ConnectionId, room: RoomId) -> bool {
        let mut registry = self.registry.lock();
        let Some(member) = registry.connections.get_mut(&id) else {
            return false;
        };
        if !member.rooms.insert(room.clone()) {
            return false;
        }
        registry.rooms.entry(room).or_default().insert(id);
        true
    }

    /// Removes `id` from every room and forgets its sender.
    ///
    /// Returns the rooms it was a member of. Idempotent.
    fn disconnect(&self, id: ConnectionId) -> Vec<RoomId> {
        let mut registry = self.registry.lock();
        let Some(member) = registry.connections.remove(&id) else {
            return Vec::new();
        };
        let mut left = Vec::with_capacity(member.rooms.len());
        for room in member.rooms {
            if let Some(members) = registry.rooms.get_mut(&room) {
                members.remove(&id);
                if members.is_empty() {
                    registry.rooms.remove(&room);
                }
            }
            left.push(room);
        }
        drop(registry);
        left
    }
}

impl<M: Clone> RoomHub<M> {
    /// Hands `frame` to every member of `room` except `from`.
    ///
    /// Returns the number of members the frame was successfully queued for.
    /// A member whose queue is full or already closed is skipped without
    /// affecting the others; a closed member's own task performs cleanup.
    fn relay(&self, from: ConnectionId, room: &RoomId, frame: &M) -> usize {
        let registry = self.registry.lock();
        let Some(members) = registry.rooms.get(room) else {
            return 0;
        };
        let mut delivered = 0;
        for member_id in members.iter().filter(|member_id| **member_id != from) {
            let Some(member) = registry.connections.get(member_id) else {
                continue;
            };
            match member.sender.try_send(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(
                        connection_id = %member_id,
                        room_id = %room,
                        "member outbound queue full, dropping frame"
                    );
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!(
                        connection_id = %member_id,
                        room_id = %room,
                        "member channel closed, skipping"
                    );
                }
            }
        }
        drop(registry);
        delivered
    }
}

/// Handle for one registered connection.
///
/// All room operations for a connection go through this handle. Dropping it
/// disconnects the connection from the hub.
pub struct Connection<M> {
    hub: Arc<RoomHub<M>>,
    id: ConnectionId,
}

impl<M> Connection<M> {
    /// The server-assigned identifier of this connection.
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    /// Joins `room`, creating it if it does not exist.
    ///
    /// Joining a room twice is a no-op. Any identifier is accepted as-is.
    pub fn join(&self, room: RoomId) {
        let room_label = room.to_string();
        if self.hub.join(self.id, room) {
            tracing::info!(connection_id = %self.id, room_id = %room_label, "client joined room");
        } else {
            tracing::debug!(connection_id = %self.id, room_id = %room_label, "join ignored");
        }
    }

    /// Rooms this connection currently belongs to.
    #[must_use]
    pub fn rooms(&self) -> Vec<RoomId> {
        self.hub.rooms_of(&self.id)
    }
}

impl<M: Clone> Connection<M> {
    /// Forwards `frame` to every other member of `room`.
    ///
    /// Returns how many members it was handed to. Relaying to an empty or
    /// unknown room is a no-op that returns `0`. The sender does not need to
    /// be a member of `room`.
    pub fn relay(&self, room: &RoomId, frame: &M) -> usize {
        let delivered = self.hub.relay(self.id, room, frame);
        tracing::debug!(
            connection_id = %self.id,
            room_id = %room,
            delivered,
            "relayed voice data"
        );
        delivered
    }
}

impl<M> Drop for Connection<M> {
    fn drop(&mut self) {
        let left = self.hub.disconnect(self.id);
        tracing::info!(
            connection_id = %self.id,
            rooms_left = left.len(),
            "client disconnected"
        );
    }
}
