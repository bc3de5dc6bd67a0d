//! Abstraction over the embedder's local CRDT document and awareness
//! store (`ydoc_handle`/`awareness_handle`: opaque references this crate
//! never interprets). No concrete CRDT implementation ships here; an
//! embedder adapts its own document engine to these traits.

use tokio::sync::mpsc;

/// A local CRDT document the bridge keeps in sync with a relay.
///
/// Implementations decide their own sync-protocol encoding; the bridge
/// only moves the resulting byte blobs in and out of `SyncFrame`s.
pub trait CrdtEngine: Send + Sync {
    /// The local state vector, sent as the opening `sync`/`state-vector`
    /// frame when a room connects.
    fn state_vector(&self) -> Vec<u8>;

    /// Compute a diff to send in reply to a peer's state vector.
    fn diff_since(&self, remote_state_vector: &[u8]) -> Vec<u8>;

    /// Apply a remote `sync` update (state-diff or incremental-update) to
    /// local state. Called with frames received from the relay, i.e.
    /// tagged origin `relay` by the caller.
    fn apply_update(&self, update: &[u8]);

    /// Subscribe to updates this engine produces from local mutations
    /// (origin != `relay`), to be forwarded to the relay as
    /// `sync`/`incremental-update` frames. Bound once per connection
    /// attempt and dropped on disconnect: the handlers bound during setup
    /// are stored so `disconnect()` unbinds exactly them.
    fn subscribe_updates(&self) -> mpsc::UnboundedReceiver<Vec<u8>>;
}

/// A local awareness (ephemeral presence) store.
pub trait AwarenessStore: Send + Sync {
    /// The local client's current awareness payload, sent once on connect.
    fn local_state(&self) -> Vec<u8>;

    /// Apply a remote awareness payload, tagged origin `relay`.
    fn apply_remote(&self, state: &[u8]);

    /// Subscribe to local awareness changes to forward to the relay.
    fn subscribe_changes(&self) -> mpsc::UnboundedReceiver<Vec<u8>>;
}
