use displaydoc::Display;
use thiserror::Error;

/// Errors produced while framing or dispatching messages over a
/// multiplexed connection.
#[derive(Debug, Display, Error)]
pub enum MuxError {
    /// inbound buffer exceeded the cumulative size cap with no newline
    BufferOverflow,
    /// decoded frame was missing a `type` field
    MissingType,
    /// peer did not answer a heartbeat ping before the pong timeout
    HeartbeatTimeout,
    /// transport I/O error: {0}
    Io(#[from] std::io::Error),
}

pub type MuxResult<T> = Result<T, MuxError>;
