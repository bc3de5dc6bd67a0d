//! Relay Bridge client: maintains a persistent per-room WebSocket
//! attachment to a relay, carrying CRDT sync and awareness traffic both
//! directions with exponential-backoff reconnection.

mod backoff_policy;
mod bridge;
mod crdt;
mod error;
mod state;

pub use bridge::{BridgeConfig, RelayBridge, RoomHandles};
pub use crdt::{AwarenessStore, CrdtEngine};
pub use error::{BridgeError, BridgeResult};
pub use state::RoomState;
