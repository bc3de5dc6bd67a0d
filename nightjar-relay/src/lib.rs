//! Signaling/relay server: authenticates WebSocket clients,
//! fans sync/awareness traffic out to a room's subscribers, and bridges
//! room membership into the embedded mesh participant when running in
//! `host` or `relay` mode.

mod auth;
mod config;
mod connection;
mod error;
mod persistence;
mod protocol;
mod room;
mod server;
mod sync_frame;

pub use auth::{room_token, AuthPolicy, ClientCredentials};
pub use config::{RelayConfig, ServerMode};
pub use error::{RelayError, RelayResult};
pub use persistence::{NullSink, PersistenceSink};
pub use protocol::{ClientMessage, ServerMessage};
pub use room::{PeerSummary, OUTBOUND_QUEUE_DEPTH};
pub use server::RelayServer;
pub use sync_frame::{SyncFrame, SyncFrameKind, SyncInner};
