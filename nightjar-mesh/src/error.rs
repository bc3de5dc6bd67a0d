use displaydoc::Display;
use thiserror::Error;

/// Errors produced by the mesh participant.
#[derive(Debug, Display, Error)]
pub enum MeshError {
    /// failed to build or configure the underlying network behaviour: {0}
    TransportError(String),
    /// message serialization failed: {0}
    SerializationError(String),
    /// message deserialization failed: {0}
    DeserializationError(String),
    /// the mesh participant's background task is no longer running
    ChannelClosed,
    /// no reply was collected before the peer-query deadline
    Timeout,
}

pub type MeshResult<T> = Result<T, MeshError>;
