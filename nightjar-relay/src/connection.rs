//! Per-client WebSocket connection driver.
//!
//! One task per connection: a `tokio::select!` loop over inbound WebSocket
//! frames and this client's outbound queue, grounded on the same shape as
//! the teacher's broadcast-driven WebSocket handler, but with the
//! broadcast channel replaced by a per-client mpsc queue so a slow
//! subscriber can be dropped without affecting the others.

use crate::auth::{AuthPolicy, ClientCredentials};
use crate::error::RelayResult;
use crate::persistence::PersistenceSink;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::room::{ClientId, OutboundMessage, PeerSummary, RoomRegistry, OUTBOUND_QUEUE_DEPTH};
use crate::sync_frame::SyncFrame;
use futures_util::{SinkExt, StreamExt};
use hyper::upgrade::Upgraded;
use hyper_util::rt::TokioIo;
use nightjar_core::constants::{
    CLIENT_AUTH_TIMEOUT, CLOSE_AUTH_REJECTED, CLOSE_AUTH_TIMEOUT, MAX_CONTROL_PAYLOAD_BYTES,
    MAX_SYNC_PAYLOAD_BYTES,
};
use nightjar_mesh::MeshParticipant;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message};
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, warn};

/// `4000 + 9`, not a spec-normative code: a message exceeded its size cap.
/// Distinct from the standard WS 1009 so relay operators can tell a
/// policy-enforced close apart from one the underlying library raised.
const CLOSE_PAYLOAD_TOO_LARGE: u16 = 4009;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionState {
    Authenticating,
    Open,
}

pub struct ConnectionContext {
    pub client_id: ClientId,
    pub room_id: String,
    pub query_token: Option<String>,
    pub registry: Arc<RoomRegistry>,
    pub default_policy: AuthPolicy,
    pub mesh: Option<Arc<MeshParticipant>>,
    pub persistence: Arc<dyn PersistenceSink>,
}

pub async fn handle_connection(ws: WebSocketStream<TokioIo<Upgraded>>, ctx: ConnectionContext) {
    let (mut ws_sender, mut ws_receiver) = ws.split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_DEPTH);

    let policy = ctx.registry.auth_policy_for(&ctx.room_id, &ctx.default_policy);
    let mut state = ConnectionState::Authenticating;
    let mut joined = false;
    let mut node_id = ctx.client_id.to_placeholder_node_id();
    let mut display_name: Option<String> = None;

    if !policy.requires_identity() {
        match policy.authorize(&ctx.room_id, ctx.query_token.as_deref(), None) {
            Ok(()) => state = ConnectionState::Open,
            Err(_) => {
                close_with(&mut ws_sender, CLOSE_AUTH_REJECTED, "auth_token_mismatch").await;
                return;
            }
        }
    }

    let mut auth_deadline = Box::pin(tokio::time::sleep(CLIENT_AUTH_TIMEOUT));

    loop {
        tokio::select! {
            msg = ws_receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if text.len() > MAX_CONTROL_PAYLOAD_BYTES {
                            close_with(&mut ws_sender, CLOSE_PAYLOAD_TOO_LARGE, "payload_too_large").await;
                            break;
                        }
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(client_msg) => {
                                let outcome = dispatch_control_message(
                                    client_msg,
                                    &ctx,
                                    &policy,
                                    &mut state,
                                    &mut joined,
                                    &mut node_id,
                                    &mut display_name,
                                    &outbound_tx,
                                    &mut ws_sender,
                                ).await;
                                if outcome.is_err() {
                                    break;
                                }
                            }
                            Err(e) => {
                                debug!(error = %e, "dropping malformed client message");
                            }
                        }
                    }
                    Some(Ok(Message::Binary(data))) => {
                        if data.len() > MAX_SYNC_PAYLOAD_BYTES {
                            close_with(&mut ws_sender, CLOSE_PAYLOAD_TOO_LARGE, "payload_too_large").await;
                            break;
                        }
                        if state != ConnectionState::Open || !joined {
                            continue;
                        }
                        handle_sync_frame(data.into(), &ctx).await;
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        if ws_sender.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "websocket transport error");
                        break;
                    }
                    None => break,
                }
            }

            _ = &mut auth_deadline, if state == ConnectionState::Authenticating => {
                close_with(&mut ws_sender, CLOSE_AUTH_TIMEOUT, "authentication_timeout").await;
                break;
            }

            out = outbound_rx.recv() => {
                match out {
                    Some(OutboundMessage::Control(json)) => {
                        if ws_sender.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    Some(OutboundMessage::Sync(bytes)) => {
                        if ws_sender.send(Message::Binary(bytes.to_vec().into())).await.is_err() {
                            break;
                        }
                    }
                    Some(OutboundMessage::Close(code, reason)) => {
                        close_with(&mut ws_sender, code, reason).await;
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    if joined {
        let emptied = ctx.registry.leave(&ctx.room_id, ctx.client_id);
        if emptied {
            if let Some(mesh) = &ctx.mesh {
                let _ = mesh.leave_workspace(ctx.room_id.clone()).await;
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn dispatch_control_message<S>(
    message: ClientMessage,
    ctx: &ConnectionContext,
    policy: &AuthPolicy,
    state: &mut ConnectionState,
    joined: &mut bool,
    node_id: &mut String,
    display_name: &mut Option<String>,
    outbound_tx: &mpsc::Sender<OutboundMessage>,
    ws_sender: &mut S,
) -> RelayResult<()>
where
    S: futures_util::Sink<Message> + Unpin,
{
    match message {
        ClientMessage::Identity { public_key, display_name: dn, signature, timestamp, .. } => {
            if let Some(pk) = &public_key {
                *node_id = pk.clone();
            }
            *display_name = dn;

            if *state == ConnectionState::Authenticating {
                let public_key_bytes = public_key.as_deref().and_then(|s| hex::decode(s).ok());
                let signature_bytes: Option<[u8; 64]> = signature
                    .as_deref()
                    .and_then(|s| hex::decode(s).ok())
                    .and_then(|v| v.try_into().ok());
                let creds = ClientCredentials {
                    public_key: public_key_bytes.as_deref(),
                    signature: signature_bytes.as_ref(),
                    timestamp,
                };
                match policy.authorize(&ctx.room_id, ctx.query_token.as_deref(), Some(&creds)) {
                    Ok(()) => *state = ConnectionState::Open,
                    Err(_) => return Err(crate::error::RelayError::AuthRejected),
                }
            }
            Ok(())
        }

        ClientMessage::JoinTopic { topic } => {
            if *state != ConnectionState::Open {
                return Err(crate::error::RelayError::AuthRejected);
            }
            if topic != ctx.room_id {
                let _ = send_json(
                    ws_sender,
                    &ServerMessage::Error { message: format!("unknown topic {topic}") },
                )
                .await;
                return Ok(());
            }

            if !*joined {
                let identity = PeerSummary { node_id: node_id.clone(), display_name: display_name.clone() };
                match ctx.registry.admit(
                    &ctx.room_id,
                    ctx.client_id,
                    outbound_tx.clone(),
                    policy.clone(),
                    identity,
                ) {
                    Ok((is_new, _slow)) => {
                        *joined = true;
                        if is_new {
                            if let Some(mesh) = &ctx.mesh {
                                let _ = mesh.join_workspace(ctx.room_id.clone()).await;
                            }
                        }
                    }
                    Err(e) => {
                        let _ = send_json(ws_sender, &ServerMessage::Error { message: e.to_string() }).await;
                        return Ok(());
                    }
                }
            }

            let mut peers = ctx.registry.local_peers(&ctx.room_id, Some(ctx.client_id));
            if let Some(mesh) = &ctx.mesh {
                if let Ok(dht_peers) = mesh.query_workspace_peers(ctx.room_id.clone()).await {
                    peers.extend(dht_peers.into_iter().map(|p| PeerSummary {
                        node_id: p.node_id.to_hex(),
                        display_name: None,
                    }));
                }
            }
            let _ = send_json(ws_sender, &ServerMessage::PeersList { topic, peers }).await;
            Ok(())
        }

        ClientMessage::LeaveTopic { topic } => {
            if topic == ctx.room_id && *joined {
                *joined = false;
                let emptied = ctx.registry.leave(&ctx.room_id, ctx.client_id);
                if emptied {
                    if let Some(mesh) = &ctx.mesh {
                        let _ = mesh.leave_workspace(ctx.room_id.clone()).await;
                    }
                }
            }
            Ok(())
        }
    }
}

async fn handle_sync_frame(bytes: bytes::Bytes, ctx: &ConnectionContext) {
    match SyncFrame::decode(bytes) {
        Ok(frame) => {
            ctx.persistence.persist(&ctx.room_id, &frame);
            let encoded = frame.encode();
            ctx.registry.broadcast(&ctx.room_id, Some(ctx.client_id), OutboundMessage::Sync(encoded.clone()));
            if let Some(mesh) = &ctx.mesh {
                if let Err(e) = mesh.forward_sync(ctx.room_id.clone(), encoded.to_vec()).await {
                    debug!(error = %e, "failed to hand off sync frame to the mesh");
                }
            }
        }
        Err(e) => {
            debug!(error = %e, "dropping malformed sync frame");
        }
    }
}

async fn send_json<S>(sender: &mut S, message: &ServerMessage) -> Result<(), ()>
where
    S: futures_util::Sink<Message> + Unpin,
{
    sender.send(Message::Text(message.to_json().into())).await.map_err(|_| ())
}

async fn close_with<S>(sender: &mut S, code: u16, reason: &'static str)
where
    S: futures_util::Sink<Message> + Unpin,
{
    let _ = sender
        .send(Message::Close(Some(CloseFrame { code: code.into(), reason: reason.into() })))
        .await;
}
