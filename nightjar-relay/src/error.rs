use displaydoc::Display;
use thiserror::Error;

/// Errors produced by the signaling/relay server.
#[derive(Debug, Display, Error)]
pub enum RelayError {
    /// room id exceeds the 256-byte limit
    RoomIdTooLong,
    /// authentication was rejected
    AuthRejected,
    /// payload of {0} bytes exceeds the {1}-byte limit for this message kind
    PayloadTooLarge(usize, usize),
    /// malformed sync frame: {0}
    MalformedSyncFrame(String),
    /// malformed client message: {0}
    MalformedClientMessage(String),
    /// room already has the maximum number of subscribers
    RoomFull,
    /// transport error: {0}
    Transport(#[from] std::io::Error),
    /// websocket protocol error: {0}
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    /// hyper error: {0}
    Hyper(#[from] hyper::Error),
    /// the relay server's background state is no longer reachable
    ChannelClosed,
}

pub type RelayResult<T> = Result<T, RelayError>;
