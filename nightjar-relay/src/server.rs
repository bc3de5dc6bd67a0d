//! Hyper accept loop + WebSocket upgrade for client subscribers, grounded
//! on the teacher's `start_rpc_server` accept-loop shape (one task per
//! accepted connection, `service_fn` dispatch) with the WebSocket upgrade
//! handshake itself following the standard hyper+tokio-tungstenite
//! manual-upgrade idiom (no direct teacher precedent for the upgrade step;
//! see DESIGN.md).

use crate::config::RelayConfig;
use crate::connection::{handle_connection, ConnectionContext};
use crate::error::{RelayError, RelayResult};
use crate::persistence::PersistenceSink;
use crate::room::{validate_room_id, ClientId, OutboundMessage, RoomRegistry};
use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{CONNECTION, UPGRADE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use nightjar_core::constants::CLOSE_NORMAL;
use nightjar_mesh::{MeshEvent, MeshParticipant};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tokio_tungstenite::tungstenite::protocol::Role;
use tokio_tungstenite::WebSocketStream;
use tracing::{error, info, warn};

struct ServerShared {
    config: RelayConfig,
    registry: Arc<RoomRegistry>,
    mesh: Option<Arc<MeshParticipant>>,
    persistence: Arc<dyn PersistenceSink>,
}

/// The signaling/relay server: a WebSocket acceptor for room subscribers,
/// optionally fronting an embedded [`MeshParticipant`] (in `relay`/`host`
/// mode) and a [`PersistenceSink`] (in `host` mode).
pub struct RelayServer {
    shared: Arc<ServerShared>,
    stop: Arc<Notify>,
}

impl RelayServer {
    pub fn new(
        config: RelayConfig,
        mesh: Option<Arc<MeshParticipant>>,
        persistence: Arc<dyn PersistenceSink>,
    ) -> Self {
        let registry = Arc::new(RoomRegistry::new(config.max_peers_per_room));
        Self {
            shared: Arc::new(ServerShared { config, registry, mesh, persistence }),
            stop: Arc::new(Notify::new()),
        }
    }

    pub fn room_count(&self) -> usize {
        self.shared.registry.room_count()
    }

    /// Accept connections until [`RelayServer::shutdown`] is called.
    pub async fn run(&self) -> RelayResult<()> {
        let listener = TcpListener::bind(self.shared.config.bind_addr).await?;
        info!(addr = %self.shared.config.bind_addr, "relay server listening");

        if let Some(mesh) = self.shared.mesh.clone() {
            let registry = Arc::clone(&self.shared.registry);
            tokio::spawn(async move { drain_mesh_events(mesh, registry).await });
        }

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer_addr) = accepted?;
                    let io = TokioIo::new(stream);
                    let shared = Arc::clone(&self.shared);

                    tokio::spawn(async move {
                        let service = service_fn(move |req| handle_request(req, Arc::clone(&shared)));
                        if let Err(err) = http1::Builder::new()
                            .serve_connection(io, service)
                            .with_upgrades()
                            .await
                        {
                            error!(%peer_addr, error = %err, "error serving relay connection");
                        }
                    });
                }
                _ = self.stop.notified() => {
                    info!("relay server stopped accepting new connections");
                    break;
                }
            }
        }
        Ok(())
    }

    /// Stop accepting, close every subscriber with a normal-close code,
    /// and drain the embedded mesh participant.
    pub async fn shutdown(&self) {
        self.stop.notify_one();
        self.shared.registry.close_all(CLOSE_NORMAL, "server_shutdown");
        if let Some(mesh) = &self.shared.mesh {
            if let Err(e) = mesh.shutdown().await {
                warn!(error = %e, "mesh participant did not shut down cleanly");
            }
        }
    }
}

/// Forward sync frames the embedded mesh participant receives from other
/// relays to this relay's local subscribers of the same workspace. Runs
/// until the participant reports [`MeshEvent::Stopped`] or its event
/// channel closes.
async fn drain_mesh_events(mesh: Arc<MeshParticipant>, registry: Arc<RoomRegistry>) {
    loop {
        match mesh.next_event().await {
            Some(MeshEvent::WorkspaceSync { workspace_id, data }) => {
                registry.broadcast(&workspace_id, None, OutboundMessage::Sync(data.into()));
            }
            Some(MeshEvent::Stopped) | None => break,
            Some(_) => {}
        }
    }
}

fn is_websocket_upgrade(req: &Request<hyper::body::Incoming>) -> bool {
    req.headers()
        .get(UPGRADE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false)
}

/// Split `/<roomId>?auth=<token>` into `(room_id, token)`.
fn parse_path(uri: &hyper::Uri) -> RelayResult<(String, Option<String>)> {
    let room_id = uri.path().trim_start_matches('/').to_string();
    validate_room_id(&room_id)?;
    let token = uri.query().and_then(|query| {
        query.split('&').find_map(|pair| {
            let mut parts = pair.splitn(2, '=');
            match (parts.next(), parts.next()) {
                (Some("auth"), Some(value)) => Some(value.to_string()),
                _ => None,
            }
        })
    });
    Ok((room_id, token))
}

async fn handle_request(
    mut req: Request<hyper::body::Incoming>,
    shared: Arc<ServerShared>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    if !is_websocket_upgrade(&req) {
        return Ok(plain_response(StatusCode::BAD_REQUEST, "expected a websocket upgrade"));
    }

    let (room_id, query_token) = match parse_path(req.uri()) {
        Ok(parsed) => parsed,
        Err(RelayError::RoomIdTooLong) => {
            return Ok(plain_response(StatusCode::BAD_REQUEST, "room id too long"));
        }
        Err(_) => return Ok(plain_response(StatusCode::BAD_REQUEST, "invalid request")),
    };

    let Some(ws_key) = req.headers().get("Sec-WebSocket-Key").cloned() else {
        return Ok(plain_response(StatusCode::BAD_REQUEST, "missing Sec-WebSocket-Key"));
    };
    let accept_key = derive_accept_key(ws_key.as_bytes());

    let ctx = ConnectionContext {
        client_id: ClientId::next(),
        room_id,
        query_token,
        registry: Arc::clone(&shared.registry),
        default_policy: shared.config.default_auth_policy.clone(),
        mesh: shared.mesh.clone(),
        persistence: Arc::clone(&shared.persistence),
    };

    let upgrade_fut = hyper::upgrade::on(&mut req);
    tokio::spawn(async move {
        match upgrade_fut.await {
            Ok(upgraded) => {
                let io = TokioIo::new(upgraded);
                let ws = WebSocketStream::from_raw_socket(io, Role::Server, None).await;
                handle_connection(ws, ctx).await;
            }
            Err(e) => warn!(error = %e, "websocket upgrade failed"),
        }
    });

    Ok(Response::builder()
        .status(StatusCode::SWITCHING_PROTOCOLS)
        .header(UPGRADE, "websocket")
        .header(CONNECTION, "Upgrade")
        .header("Sec-WebSocket-Accept", accept_key)
        .body(Full::new(Bytes::new()))
        .expect("a fixed set of well-formed headers always builds"))
}

fn plain_response(status: StatusCode, message: &'static str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .body(Full::new(Bytes::from(message)))
        .expect("a fixed status and body always builds")
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::Uri;

    #[test]
    fn parse_path_splits_room_id_and_auth_token() {
        let uri: Uri = "/docs-room?auth=abc123".parse().unwrap();
        let (room_id, token) = parse_path(&uri).unwrap();
        assert_eq!(room_id, "docs-room");
        assert_eq!(token.as_deref(), Some("abc123"));
    }

    #[test]
    fn parse_path_accepts_a_room_with_no_token() {
        let uri: Uri = "/docs-room".parse().unwrap();
        let (room_id, token) = parse_path(&uri).unwrap();
        assert_eq!(room_id, "docs-room");
        assert_eq!(token, None);
    }

    #[test]
    fn parse_path_rejects_an_oversized_room_id() {
        let long_id = "x".repeat(257);
        let uri: Uri = format!("/{long_id}").parse().unwrap();
        assert!(matches!(parse_path(&uri), Err(RelayError::RoomIdTooLong)));
    }
}
