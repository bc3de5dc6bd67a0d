//! Persistence sink boundary: the relay core itself never persists
//! forwarded payloads, it only calls out to an external collaborator when
//! running in `host` mode. The relay never inspects
//! CRDT semantics; it just hands the sink the room id and raw frame.

use crate::sync_frame::SyncFrame;

/// External collaborator that durably stores sync frames. Only invoked in
/// [`crate::config::ServerMode::Host`].
pub trait PersistenceSink: Send + Sync {
    fn persist(&self, room_id: &str, frame: &SyncFrame);
}

/// The sink used in `relay`/`private` mode, and the default for `host`
/// mode until an embedder supplies a real one.
#[derive(Debug, Default)]
pub struct NullSink;

impl PersistenceSink for NullSink {
    fn persist(&self, _room_id: &str, _frame: &SyncFrame) {}
}
