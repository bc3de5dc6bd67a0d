//! Per-room relay attachment: one task per room runs the
//! connect/backoff/reconnect state machine, grounded on the same
//! `tokio::select!`-driven read/write loop shape used server-side in
//! `nightjar-relay`'s `connection.rs`, mirrored here for an outbound
//! (client) connection instead of an accepted one.

use crate::backoff_policy;
use crate::crdt::{AwarenessStore, CrdtEngine};
use crate::error::{BridgeError, BridgeResult};
use crate::state::RoomState;
use futures_util::{SinkExt, StreamExt};
use nightjar_core::constants::{BRIDGE_CONNECT_TIMEOUT, CLOSE_AUTH_REJECTED};
use nightjar_relay::{SyncFrame, SyncFrameKind, SyncInner};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{client_async_tls, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

/// The embedder's local document and presence store for one room. Opaque
/// to this crate beyond the [`CrdtEngine`]/[`AwarenessStore`] contracts.
pub struct RoomHandles {
    pub ydoc: Arc<dyn CrdtEngine>,
    pub awareness: Arc<dyn AwarenessStore>,
}

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Base relay URL, e.g. `wss://relay.example.com` (no trailing slash,
    /// no room path).
    pub relay_url: String,
    pub socks_proxy: Option<SocketAddr>,
}

enum RoomCommand {
    Disconnect,
    Reconnect,
}

struct RoomTask {
    command_tx: mpsc::Sender<RoomCommand>,
    status_rx: watch::Receiver<RoomState>,
    join: JoinHandle<()>,
}

/// Owns every room this process has attached to a relay. Each room is
/// driven by its own task; there is no shared connection between rooms.
pub struct RelayBridge {
    config: BridgeConfig,
    rooms: RwLock<HashMap<String, RoomTask>>,
}

impl RelayBridge {
    pub fn new(config: BridgeConfig) -> Self {
        Self { config, rooms: RwLock::new(HashMap::new()) }
    }

    pub fn room_state(&self, room_id: &str) -> Option<RoomState> {
        self.rooms.read().get(room_id).map(|r| *r.status_rx.borrow())
    }

    pub fn attached_rooms(&self) -> Vec<String> {
        self.rooms.read().keys().cloned().collect()
    }

    /// Attach a room: connect now, and keep reconnecting per the backoff
    /// schedule until [`RelayBridge::disconnect_room`] is called or the
    /// retry budget/an auth rejection moves it to `gave_up`. A no-op if
    /// the room is already attached.
    pub fn attach_room(&self, room_id: impl Into<String>, handles: RoomHandles, auth_token: Option<String>) {
        let room_id = room_id.into();
        if self.rooms.read().contains_key(&room_id) {
            return;
        }
        let (command_tx, command_rx) = mpsc::channel(8);
        let (status_tx, status_rx) = watch::channel(RoomState::Idle);
        let config = self.config.clone();
        let task_room_id = room_id.clone();
        let join = tokio::spawn(run_room(task_room_id, config, handles, auth_token, command_rx, status_tx));
        self.rooms.write().insert(room_id, RoomTask { command_tx, status_rx, join });
    }

    /// Clean local disconnect: cancels any pending reconnect, unbinds the
    /// room's update/awareness subscriptions, and drops its task.
    pub async fn disconnect_room(&self, room_id: &str) -> BridgeResult<()> {
        let task = self
            .rooms
            .write()
            .remove(room_id)
            .ok_or_else(|| BridgeError::UnknownRoom(room_id.to_string()))?;
        let _ = task.command_tx.send(RoomCommand::Disconnect).await;
        task.join.abort();
        Ok(())
    }

    /// Explicitly request a reconnect, including out of `gave_up`.
    pub async fn reconnect_room(&self, room_id: &str) -> BridgeResult<()> {
        let command_tx = {
            let rooms = self.rooms.read();
            let task = rooms.get(room_id).ok_or_else(|| BridgeError::UnknownRoom(room_id.to_string()))?;
            task.command_tx.clone()
        };
        command_tx.send(RoomCommand::Reconnect).await.map_err(|_| BridgeError::ChannelClosed)
    }

    /// Disconnect every attached room. Used during process shutdown.
    pub async fn shutdown(&self) {
        let tasks: Vec<_> = self.rooms.write().drain().collect();
        for (room_id, task) in tasks {
            let _ = task.command_tx.send(RoomCommand::Disconnect).await;
            task.join.abort();
            debug!(room = %room_id, "bridge room task stopped for shutdown");
        }
    }
}

enum ConnectOutcome {
    Connected(WebSocketStream<MaybeTlsStream<TcpStream>>),
    Failed(BridgeError),
    CommandDuringConnect(Option<RoomCommand>),
}

enum ConnectionOutcome {
    LocalDisconnect,
    AuthRejected,
    Abnormal,
}

async fn run_room(
    room_id: String,
    config: BridgeConfig,
    handles: RoomHandles,
    auth_token: Option<String>,
    mut command_rx: mpsc::Receiver<RoomCommand>,
    status_tx: watch::Sender<RoomState>,
) {
    let mut attempt: u32 = 0;

    'outer: loop {
        let _ = status_tx.send(RoomState::Pending);
        let url = build_url(&config.relay_url, &room_id, auth_token.as_deref());

        let outcome = {
            let connect_fut = connect_with_timeout(url, config.socks_proxy);
            tokio::pin!(connect_fut);
            tokio::select! {
                result = &mut connect_fut => match result {
                    Ok(ws) => ConnectOutcome::Connected(ws),
                    Err(e) => ConnectOutcome::Failed(e),
                },
                cmd = command_rx.recv() => ConnectOutcome::CommandDuringConnect(cmd),
            }
        };

        match outcome {
            ConnectOutcome::CommandDuringConnect(Some(RoomCommand::Disconnect)) | ConnectOutcome::CommandDuringConnect(None) => {
                let _ = status_tx.send(RoomState::Idle);
                return;
            }
            ConnectOutcome::CommandDuringConnect(Some(RoomCommand::Reconnect)) => {
                // Already attempting to connect; the reconnect-already-
                // scheduled guard makes this a no-op.
                continue 'outer;
            }
            ConnectOutcome::Failed(e) => {
                debug!(room = %room_id, error = %e, "connect attempt failed");
                attempt += 1;
            }
            ConnectOutcome::Connected(ws) => {
                info!(room = %room_id, "attached to relay");
                attempt = 0;
                let _ = status_tx.send(RoomState::Connected);
                match drive_connection(&room_id, ws, &handles, &mut command_rx).await {
                    ConnectionOutcome::LocalDisconnect => {
                        let _ = status_tx.send(RoomState::Idle);
                        return;
                    }
                    ConnectionOutcome::AuthRejected => {
                        warn!(room = %room_id, "relay rejected authentication, giving up");
                        let _ = status_tx.send(RoomState::GaveUp);
                        if !wait_for_explicit_reconnect(&mut command_rx).await {
                            let _ = status_tx.send(RoomState::Idle);
                            return;
                        }
                        attempt = 0;
                        continue 'outer;
                    }
                    ConnectionOutcome::Abnormal => {
                        attempt += 1;
                    }
                }
            }
        }

        if backoff_policy::is_exhausted(attempt) {
            let _ = status_tx.send(RoomState::GaveUp);
            if !wait_for_explicit_reconnect(&mut command_rx).await {
                let _ = status_tx.send(RoomState::Idle);
                return;
            }
            attempt = 0;
            continue 'outer;
        }

        let delay = backoff_policy::next_delay(attempt);
        let _ = status_tx.send(RoomState::BackingOff);
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            cmd = command_rx.recv() => match cmd {
                Some(RoomCommand::Disconnect) | None => {
                    let _ = status_tx.send(RoomState::Idle);
                    return;
                }
                Some(RoomCommand::Reconnect) => {
                    attempt = 0;
                }
            },
        }
    }
}

/// Block until an explicit reconnect request arrives. Returns `false` if a
/// disconnect was requested (or the command channel closed) instead.
async fn wait_for_explicit_reconnect(command_rx: &mut mpsc::Receiver<RoomCommand>) -> bool {
    loop {
        match command_rx.recv().await {
            Some(RoomCommand::Reconnect) => return true,
            Some(RoomCommand::Disconnect) | None => return false,
        }
    }
}

async fn drive_connection(
    room_id: &str,
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    handles: &RoomHandles,
    command_rx: &mut mpsc::Receiver<RoomCommand>,
) -> ConnectionOutcome {
    let (mut sender, mut receiver) = ws.split();

    if let Ok(frame) = SyncFrame::sync(SyncInner::StateVector, handles.ydoc.state_vector()) {
        if sender.send(Message::Binary(frame.encode().to_vec().into())).await.is_err() {
            return ConnectionOutcome::Abnormal;
        }
    }
    if let Ok(frame) = SyncFrame::awareness(handles.awareness.local_state()) {
        let _ = sender.send(Message::Binary(frame.encode().to_vec().into())).await;
    }

    let mut doc_updates = handles.ydoc.subscribe_updates();
    let mut awareness_changes = handles.awareness.subscribe_changes();

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Binary(data))) => {
                        match SyncFrame::decode(data.into()) {
                            Ok(frame) => match frame.kind {
                                SyncFrameKind::Sync(_) => handles.ydoc.apply_update(&frame.payload),
                                SyncFrameKind::Awareness => handles.awareness.apply_remote(&frame.payload),
                            },
                            Err(e) => debug!(room = %room_id, error = %e, "dropping malformed sync frame"),
                        }
                    }
                    Some(Ok(Message::Close(close_frame))) => {
                        let code = close_frame.map(|f| u16::from(f.code)).unwrap_or(1000);
                        return if code == CLOSE_AUTH_REJECTED {
                            ConnectionOutcome::AuthRejected
                        } else {
                            ConnectionOutcome::Abnormal
                        };
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        if sender.send(Message::Pong(payload)).await.is_err() {
                            return ConnectionOutcome::Abnormal;
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(room = %room_id, error = %e, "websocket transport error");
                        return ConnectionOutcome::Abnormal;
                    }
                    None => return ConnectionOutcome::Abnormal,
                }
            }

            // Locally-originated CRDT updates (origin != "relay" by the
            // CrdtEngine contract: the engine must not re-surface updates
            // it just received via apply_update), forwarded as incremental
            // sync frames.
            Some(update) = doc_updates.recv() => {
                if let Ok(frame) = SyncFrame::sync(SyncInner::IncrementalUpdate, update) {
                    if sender.send(Message::Binary(frame.encode().to_vec().into())).await.is_err() {
                        return ConnectionOutcome::Abnormal;
                    }
                }
            }

            Some(state) = awareness_changes.recv() => {
                if let Ok(frame) = SyncFrame::awareness(state) {
                    if sender.send(Message::Binary(frame.encode().to_vec().into())).await.is_err() {
                        return ConnectionOutcome::Abnormal;
                    }
                }
            }

            cmd = command_rx.recv() => {
                match cmd {
                    Some(RoomCommand::Disconnect) | None => {
                        let _ = sender.close().await;
                        return ConnectionOutcome::LocalDisconnect;
                    }
                    Some(RoomCommand::Reconnect) => {
                        // Already connected; nothing to do.
                    }
                }
            }
        }
    }
}

async fn connect_with_timeout(
    url: String,
    socks_proxy: Option<SocketAddr>,
) -> BridgeResult<WebSocketStream<MaybeTlsStream<TcpStream>>> {
    tokio::time::timeout(BRIDGE_CONNECT_TIMEOUT, connect(url, socks_proxy))
        .await
        .map_err(|_| BridgeError::ConnectTimeout(BRIDGE_CONNECT_TIMEOUT))?
}

async fn connect(url: String, socks_proxy: Option<SocketAddr>) -> BridgeResult<WebSocketStream<MaybeTlsStream<TcpStream>>> {
    let (host, port) = parse_host_port(&url)?;
    let tcp = match socks_proxy {
        None => TcpStream::connect((host.as_str(), port)).await?,
        Some(proxy_addr) => tokio_socks::tcp::Socks5Stream::connect(proxy_addr, (host.as_str(), port)).await?.into_inner(),
    };
    let (ws, _response) = client_async_tls(url, tcp).await?;
    Ok(ws)
}

fn build_url(relay_url: &str, room_id: &str, auth_token: Option<&str>) -> String {
    match auth_token {
        Some(token) => format!("{relay_url}/{room_id}?auth={token}"),
        None => format!("{relay_url}/{room_id}"),
    }
}

fn parse_host_port(url: &str) -> BridgeResult<(String, u16)> {
    let invalid = || BridgeError::Io(std::io::Error::new(std::io::ErrorKind::InvalidInput, "unsupported relay url"));
    let (rest, default_port) = url
        .strip_prefix("wss://")
        .map(|rest| (rest, 443))
        .or_else(|| url.strip_prefix("ws://").map(|rest| (rest, 80)))
        .ok_or_else(invalid)?;
    let host_port = rest.split('/').next().unwrap_or(rest);
    match host_port.rsplit_once(':') {
        Some((host, port)) => {
            let port: u16 = port.parse().map_err(|_| invalid())?;
            Ok((host.to_string(), port))
        }
        None => Ok((host_port.to_string(), default_port)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_url_appends_the_room_and_optional_token() {
        assert_eq!(build_url("wss://relay.example", "room-1", None), "wss://relay.example/room-1");
        assert_eq!(
            build_url("wss://relay.example", "room-1", Some("tok")),
            "wss://relay.example/room-1?auth=tok"
        );
    }

    #[test]
    fn parse_host_port_defaults_by_scheme() {
        assert_eq!(parse_host_port("wss://relay.example/room-1").unwrap(), ("relay.example".to_string(), 443));
        assert_eq!(parse_host_port("ws://relay.example/room-1").unwrap(), ("relay.example".to_string(), 80));
    }

    #[test]
    fn parse_host_port_honors_an_explicit_port() {
        assert_eq!(parse_host_port("ws://relay.example:9001/room-1").unwrap(), ("relay.example".to_string(), 9001));
    }

    #[test]
    fn parse_host_port_rejects_an_unsupported_scheme() {
        assert!(parse_host_port("http://relay.example").is_err());
    }
}
