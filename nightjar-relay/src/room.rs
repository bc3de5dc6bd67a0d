//! Server-side room registry: opaque `room_id` -> subscriber set, with
//! delete-on-empty and idempotent recreation.

use crate::auth::AuthPolicy;
use crate::error::{RelayError, RelayResult};
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;

const ROOM_ID_MAX_BYTES: usize = 256;
const OUTBOUND_QUEUE_CAPACITY: usize = 64;

/// Identifies one WebSocket subscriber for as long as its connection lives.
/// Never reused once a connection closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(u64);

static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

impl ClientId {
    pub fn next() -> Self {
        Self(NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// A stable textual id to use as `node_id` in peer listings when the
    /// client never supplied a `public_key` via `identity`.
    pub fn to_placeholder_node_id(self) -> String {
        format!("{:016x}", self.0)
    }
}

/// A message queued for delivery to one subscriber's connection task.
#[derive(Debug, Clone)]
pub enum OutboundMessage {
    /// A JSON control message (`peers-list`, echoed `sync`/`awareness`
    /// framing lives in [`OutboundMessage::Sync`] instead).
    Control(String),
    /// A binary `SyncFrame` payload, already encoded.
    Sync(Bytes),
    /// Ask the connection task to close with this WebSocket close code.
    Close(u16, &'static str),
}

pub fn validate_room_id(room_id: &str) -> RelayResult<()> {
    if room_id.len() > ROOM_ID_MAX_BYTES {
        Err(RelayError::RoomIdTooLong)
    } else {
        Ok(())
    }
}

/// Minimal identity summary for `peers-list` responses.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PeerSummary {
    pub node_id: String,
    pub display_name: Option<String>,
}

struct Subscriber {
    sender: mpsc::Sender<OutboundMessage>,
    /// Set by [`RoomRegistry::broadcast`] right before a slow subscriber is
    /// dropped, so the connection task (which observes its channel close)
    /// can tell a forced slow-consumer drop apart from a normal teardown.
    slow: Arc<AtomicBool>,
    identity: PeerSummary,
}

struct Room {
    auth_policy: AuthPolicy,
    subscribers: HashMap<ClientId, Subscriber>,
    created_at: Instant,
    last_activity: Instant,
}

impl Room {
    fn new(auth_policy: AuthPolicy) -> Self {
        let now = Instant::now();
        Self {
            auth_policy,
            subscribers: HashMap::new(),
            created_at: now,
            last_activity: now,
        }
    }
}

/// Shared registry of every room this server currently has subscribers
/// for. Rooms are created lazily on first join and deleted the instant
/// their subscriber set becomes empty.
pub struct RoomRegistry {
    rooms: RwLock<HashMap<String, Room>>,
    max_peers_per_room: usize,
}

impl RoomRegistry {
    pub fn new(max_peers_per_room: usize) -> Self {
        Self { rooms: RwLock::new(HashMap::new()), max_peers_per_room }
    }

    /// The auth policy that would govern a join to `room_id` right now:
    /// the room's existing policy, or `default_if_new` if the room does
    /// not exist yet.
    pub fn auth_policy_for(&self, room_id: &str, default_if_new: &AuthPolicy) -> AuthPolicy {
        let rooms = self.rooms.read();
        rooms.get(room_id).map(|r| r.auth_policy.clone()).unwrap_or_else(|| default_if_new.clone())
    }

    /// Admit an already-authenticated client. Creates the room (with
    /// `policy`) if it doesn't exist; reuses the existing policy otherwise.
    /// Returns `(room_was_new, slow_flag)`.
    pub fn admit(
        &self,
        room_id: &str,
        client_id: ClientId,
        sender: mpsc::Sender<OutboundMessage>,
        policy: AuthPolicy,
        identity: PeerSummary,
    ) -> RelayResult<(bool, Arc<AtomicBool>)> {
        let mut rooms = self.rooms.write();
        let is_new = !rooms.contains_key(room_id);
        let room = rooms.entry(room_id.to_string()).or_insert_with(|| Room::new(policy));

        if room.subscribers.len() >= self.max_peers_per_room {
            if is_new {
                rooms.remove(room_id);
            }
            return Err(RelayError::RoomFull);
        }

        let slow = Arc::new(AtomicBool::new(false));
        room.subscribers.insert(client_id, Subscriber { sender, slow: Arc::clone(&slow), identity });
        room.last_activity = Instant::now();
        Ok((is_new, slow))
    }

    /// Local WebSocket subscribers of `room_id`, excluding `exclude`.
    pub fn local_peers(&self, room_id: &str, exclude: Option<ClientId>) -> Vec<PeerSummary> {
        let rooms = self.rooms.read();
        let Some(room) = rooms.get(room_id) else { return Vec::new() };
        room.subscribers
            .iter()
            .filter(|(id, _)| Some(**id) != exclude)
            .map(|(_, subscriber)| subscriber.identity.clone())
            .collect()
    }

    /// Remove a subscriber. Returns `true` if the room is now empty and
    /// was deleted from the registry.
    pub fn leave(&self, room_id: &str, client_id: ClientId) -> bool {
        let mut rooms = self.rooms.write();
        let Some(room) = rooms.get_mut(room_id) else { return false };
        room.subscribers.remove(&client_id);
        if room.subscribers.is_empty() {
            rooms.remove(room_id);
            true
        } else {
            room.last_activity = Instant::now();
            false
        }
    }

    /// Fan out `message` to every subscriber of `room_id` except `exclude`.
    /// A subscriber whose outbound queue is full is dropped from the room
    /// immediately (never allowed to block the others).
    pub fn broadcast(&self, room_id: &str, exclude: Option<ClientId>, message: OutboundMessage) {
        let mut rooms = self.rooms.write();
        let Some(room) = rooms.get_mut(room_id) else { return };
        room.subscribers.retain(|id, subscriber| {
            if Some(*id) == exclude {
                return true;
            }
            match subscriber.sender.try_send(message.clone()) {
                Ok(()) => true,
                Err(_) => {
                    subscriber.slow.store(true, Ordering::SeqCst);
                    false
                }
            }
        });
        room.last_activity = Instant::now();
        if room.subscribers.is_empty() {
            rooms.remove(room_id);
        }
    }

    pub fn room_exists(&self, room_id: &str) -> bool {
        self.rooms.read().contains_key(room_id)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.read().len()
    }

    /// Best-effort close of every subscriber in every room, and clears the
    /// registry. Used by graceful shutdown; does not wait for the
    /// connection tasks to actually finish closing.
    pub fn close_all(&self, code: u16, reason: &'static str) {
        let mut rooms = self.rooms.write();
        for room in rooms.values() {
            for subscriber in room.subscribers.values() {
                let _ = subscriber.sender.try_send(OutboundMessage::Close(code, reason));
            }
        }
        rooms.clear();
    }
}

pub const OUTBOUND_QUEUE_DEPTH: usize = OUTBOUND_QUEUE_CAPACITY;

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_identity() -> PeerSummary {
        PeerSummary { node_id: "test".to_string(), display_name: None }
    }

    #[test]
    fn room_id_over_256_bytes_is_rejected() {
        let long_id = "x".repeat(257);
        assert!(matches!(validate_room_id(&long_id), Err(RelayError::RoomIdTooLong)));
        assert!(validate_room_id(&"x".repeat(256)).is_ok());
    }

    #[test]
    fn first_join_creates_the_room_with_the_default_policy() {
        let registry = RoomRegistry::new(10);
        let (tx, _rx) = mpsc::channel(4);
        let (is_new, _slow) = registry.admit("r1", ClientId::next(), tx, AuthPolicy::Open, noop_identity()).unwrap();
        assert!(is_new);
        assert!(registry.room_exists("r1"));
    }

    #[test]
    fn second_join_reuses_the_existing_policy_regardless_of_what_is_passed() {
        let registry = RoomRegistry::new(10);
        let secret_policy = AuthPolicy::HmacToken { secret: b"s".to_vec() };
        let (tx1, _rx1) = mpsc::channel(4);
        registry.admit("r1", ClientId::next(), tx1, secret_policy, noop_identity()).unwrap();

        let effective = registry.auth_policy_for("r1", &AuthPolicy::Open);
        assert!(matches!(effective, AuthPolicy::HmacToken { .. }));
    }

    #[test]
    fn room_is_deleted_once_its_last_subscriber_leaves() {
        let registry = RoomRegistry::new(10);
        let client = ClientId::next();
        let (tx, _rx) = mpsc::channel(4);
        registry.admit("r1", client, tx, AuthPolicy::Open, noop_identity()).unwrap();
        assert!(registry.room_exists("r1"));

        let deleted = registry.leave("r1", client);
        assert!(deleted);
        assert!(!registry.room_exists("r1"));
    }

    #[test]
    fn recreating_an_empty_room_is_idempotent() {
        let registry = RoomRegistry::new(10);
        let client_a = ClientId::next();
        let (tx_a, _rx_a) = mpsc::channel(4);
        registry.admit("r1", client_a, tx_a, AuthPolicy::Open, noop_identity()).unwrap();
        registry.leave("r1", client_a);

        let client_b = ClientId::next();
        let (tx_b, _rx_b) = mpsc::channel(4);
        let (is_new, _slow) = registry.admit("r1", client_b, tx_b, AuthPolicy::Open, noop_identity()).unwrap();
        assert!(is_new);
    }

    #[test]
    fn admit_rejects_once_the_room_is_at_capacity() {
        let registry = RoomRegistry::new(1);
        let (tx_a, _rx_a) = mpsc::channel(4);
        registry.admit("r1", ClientId::next(), tx_a, AuthPolicy::Open, noop_identity()).unwrap();

        let (tx_b, _rx_b) = mpsc::channel(4);
        assert!(matches!(registry.admit("r1", ClientId::next(), tx_b, AuthPolicy::Open, noop_identity()), Err(RelayError::RoomFull)));
    }

    #[test]
    fn broadcast_excludes_the_originating_client_and_skips_other_rooms() {
        let registry = RoomRegistry::new(10);
        let originator = ClientId::next();
        let other = ClientId::next();
        let (tx_o, mut rx_o) = mpsc::channel(4);
        let (tx_other, mut rx_other) = mpsc::channel(4);
        registry.admit("r1", originator, tx_o, AuthPolicy::Open, noop_identity()).unwrap();
        registry.admit("r1", other, tx_other, AuthPolicy::Open, noop_identity()).unwrap();

        registry.broadcast("r1", Some(originator), OutboundMessage::Control("hi".to_string()));

        assert!(rx_o.try_recv().is_err());
        assert!(rx_other.try_recv().is_ok());
    }

    #[test]
    fn a_full_outbound_queue_drops_only_that_subscriber() {
        let registry = RoomRegistry::new(10);
        let slow_client = ClientId::next();
        let healthy_client = ClientId::next();
        let (tx_slow, _rx_slow) = mpsc::channel(1);
        let (tx_healthy, mut rx_healthy) = mpsc::channel(4);
        let (_, slow_flag) = registry.admit("r1", slow_client, tx_slow, AuthPolicy::Open, noop_identity()).unwrap();
        registry.admit("r1", healthy_client, tx_healthy, AuthPolicy::Open, noop_identity()).unwrap();

        // Fill the slow client's queue so the next send overflows it.
        registry.broadcast("r1", None, OutboundMessage::Control("a".to_string()));
        registry.broadcast("r1", None, OutboundMessage::Control("b".to_string()));

        assert!(slow_flag.load(Ordering::SeqCst));
        assert!(rx_healthy.try_recv().is_ok());
    }
}
