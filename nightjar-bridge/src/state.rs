//! Per-room attachment state.

/// Lifecycle of one room's attachment to a relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomState {
    /// Never connected, or cleanly disconnected; no reconnect pending.
    Idle,
    /// A connect attempt is in flight.
    Pending,
    /// The WebSocket is open and sync/awareness frames are flowing.
    Connected,
    /// The connection dropped; a reconnect is scheduled after a backoff delay.
    BackingOff,
    /// The retry budget was exhausted, or auth was rejected; no further
    /// automatic reconnection until an explicit `reconnect` call.
    GaveUp,
}

impl RoomState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RoomState::GaveUp)
    }
}
