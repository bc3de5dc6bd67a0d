//! Normative constants shared by every component of the mesh.

use std::time::Duration;

/// Well-known mesh rendezvous string, hashed by [`crate::topic::mesh_topic`].
pub const MESH_TOPIC_V1: &str = "nightjar-mesh-v1";

/// Prefix hashed together with a workspace id by [`crate::topic::workspace_topic`].
pub const WORKSPACE_TOPIC_PREFIX: &str = "nightjar-workspace:";

/// How often a relay re-broadcasts its `relay-announce`.
pub const RELAY_ANNOUNCE_INTERVAL: Duration = Duration::from_secs(60);

/// Deadline for collecting `workspace-response` replies to a peer query.
pub const PEER_QUERY_TIMEOUT: Duration = Duration::from_secs(3);

/// Validity window of an [`crate::token::AnnouncementToken`].
pub const TOKEN_VALIDITY: Duration = Duration::from_secs(600);

/// Maximum number of entries kept in a routing table.
pub const MAX_ROUTING_TABLE_SIZE: usize = 100;

/// Maximum number of catalog entries embedded in a bootstrap response.
pub const MAX_EMBEDDED_NODES: usize = 50;

/// A node sends a `bootstrap-request` on every new mesh connection while
/// its routing table holds fewer entries than this.
pub const MIN_CATALOG_SIZE_FOR_BOOTSTRAP: usize = 10;

/// Default truncation applied by `MeshParticipant::top_relays`.
pub const DEFAULT_TOP_RELAYS: usize = 5;

/// Default cap on subscribers admitted to a single room.
pub const DEFAULT_MAX_PEERS: usize = 100;

/// Initial delay of the backoff schedule (attempt 0).
pub const BACKOFF_INITIAL: Duration = Duration::from_secs(1);

/// Ceiling on the backoff delay, regardless of attempt count.
pub const BACKOFF_MAX: Duration = Duration::from_secs(60);

/// Multiplier applied to the delay after each failed attempt.
pub const BACKOFF_MULT: f64 = 2.0;

/// Symmetric jitter fraction applied to the computed delay.
pub const BACKOFF_JITTER: f64 = 0.30;

/// Attempts after which a room gives up reconnecting on its own.
pub const BACKOFF_MAX_RETRIES: u32 = 15;

/// Cumulative unframed inbound buffer cap before a connection is destroyed.
pub const MUX_BUFFER_OVERFLOW_BYTES: usize = 10 * 1024 * 1024;

/// Per-line cap; lines beyond this are dropped but the connection survives.
pub const MUX_MAX_LINE_BYTES: usize = 1024 * 1024;

/// Sliding window over which exact-duplicate frames are suppressed.
pub const MUX_DEDUP_WINDOW: Duration = Duration::from_secs(30);

/// Idle period after which a heartbeat ping is sent.
pub const MUX_PING_INTERVAL: Duration = Duration::from_secs(30);

/// Deadline for a pong before the connection is declared dead.
pub const MUX_PONG_TIMEOUT: Duration = Duration::from_secs(10);

/// Max size of a control message over the relay WebSocket protocol.
pub const MAX_CONTROL_PAYLOAD_BYTES: usize = 1024 * 1024;

/// Max size of a sync/awareness `SyncFrame` payload.
pub const MAX_SYNC_PAYLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Hard deadline for a client to authenticate after connecting.
pub const CLIENT_AUTH_TIMEOUT: Duration = Duration::from_secs(30);

/// Hard deadline for the Relay Bridge to complete a WebSocket connect.
pub const BRIDGE_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default bound on a graceful shutdown before forcing close.
pub const GRACEFUL_SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// WebSocket close code: authentication did not complete within [`CLIENT_AUTH_TIMEOUT`].
pub const CLOSE_AUTH_TIMEOUT: u16 = 4001;

/// WebSocket close code: auth token mismatch or signature rejected. Do not retry.
pub const CLOSE_AUTH_REJECTED: u16 = 4403;

/// WebSocket close code: normal, voluntary close.
pub const CLOSE_NORMAL: u16 = 1000;
