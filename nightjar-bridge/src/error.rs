use displaydoc::Display;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Display, Error)]
pub enum BridgeError {
    /// connect attempt did not complete within {0:?}
    ConnectTimeout(Duration),
    /// websocket protocol error: {0}
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    /// SOCKS proxy dial failed: {0}
    Proxy(#[from] tokio_socks::Error),
    /// transport error: {0}
    Io(#[from] std::io::Error),
    /// malformed sync frame: {0}
    SyncFrame(#[from] nightjar_relay::RelayError),
    /// the relay rejected authentication; this room will not be retried
    AuthRejected,
    /// room `{0}` is not attached to this bridge
    UnknownRoom(String),
    /// the bridge's background task is no longer reachable
    ChannelClosed,
}

pub type BridgeResult<T> = Result<T, BridgeError>;
