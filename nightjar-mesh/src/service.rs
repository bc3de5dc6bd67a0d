//! High-level mesh participant that owns the libp2p swarm, the relay
//! catalog and the per-workspace peer directory.
//!
//! Startup sequence: initialize the DHT client, join the well-known mesh
//! topic, wait for the initial flush of connections, and (if configured to
//! announce) start the periodic `relay-announce` timer. Shutdown reverses
//! that order: stop the timer, leave every joined topic, tear down the DHT
//! client, and report back once the swarm task exits.

use crate::{
    behaviour::{mesh_ident_topic, MeshBehaviour, MeshBehaviourEvent},
    config::MeshConfig,
    error::{MeshError, MeshResult},
    messages::{
        CatalogNode, Capabilities, MeshRpcRequest, MeshRpcResponse, PeerEndpoint, RelayAnnounce,
        RelayAnnounceTag,
    },
    routing_table::{RelayEntry, RoutingTable, SharedRoutingTable},
    topic_map::TopicMap,
};
use futures::StreamExt;
use libp2p::{
    gossipsub, identify, kad, noise,
    request_response::{self, ResponseChannel},
    swarm::SwarmEvent,
    tcp, yamux, Multiaddr, PeerId, Swarm, SwarmBuilder,
};
use nightjar_core::constants::{MAX_EMBEDDED_NODES, MIN_CATALOG_SIZE_FOR_BOOTSTRAP};
use nightjar_core::NodeId;
use nightjar_kernel::Suspendable;
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};
use tokio::{
    select,
    sync::{mpsc, oneshot, Mutex},
    time::interval,
};
use tracing::{debug, info, trace, warn};

/// Events surfaced to whoever is driving [`MeshParticipant::next_event`].
#[derive(Debug)]
pub enum MeshEvent {
    PeerConnected(PeerId),
    PeerDisconnected(PeerId),
    RelayAnnounceReceived(NodeId),
    /// A `sync`/`awareness` frame arrived from another relay on a
    /// workspace's gossipsub topic and should be fanned out to this
    /// node's local subscribers of that workspace.
    WorkspaceSync { workspace_id: String, data: Vec<u8> },
    Stopped,
}

/// Point-in-time view returned by [`MeshParticipant::status`].
#[derive(Debug, Clone)]
pub struct MeshStatus {
    pub node_id: NodeId,
    pub connected_peers: usize,
    pub catalog_size: usize,
    pub joined_workspaces: Vec<String>,
}

enum MeshCommand {
    /// Workspace id, its topic hash, and a reply once the subscribe completes.
    JoinWorkspace(String, String, oneshot::Sender<()>),
    LeaveWorkspace(String),
    QueryWorkspacePeers(String, oneshot::Sender<Vec<PeerEndpoint>>),
    TopRelays(usize, oneshot::Sender<Vec<RelayEntry>>),
    Status(oneshot::Sender<MeshStatus>),
    Dial(Multiaddr),
    /// Publish an encoded `sync`/`awareness` frame on a workspace's topic
    /// (topic hash, encoded frame).
    PublishSync(String, Vec<u8>),
    Suspend,
    Resume,
    Shutdown,
}

/// Cheaply cloneable handle for sending commands to a running participant.
#[derive(Clone)]
struct MeshHandle {
    command_tx: mpsc::Sender<MeshCommand>,
}

impl MeshHandle {
    async fn send(&self, command: MeshCommand) -> MeshResult<()> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| MeshError::ChannelClosed)
    }
}

/// This node's participation in the relay mesh: DHT membership, the relay
/// catalog, and per-workspace peer discovery.
pub struct MeshParticipant {
    node_id: NodeId,
    config: MeshConfig,
    version: String,
    started_at: Instant,
    routing_table: SharedRoutingTable,
    topic_map: Arc<TopicMap>,
    handle: Option<MeshHandle>,
    /// Wrapped in a `Mutex` so [`MeshParticipant::next_event`] can take
    /// `&self`: callers typically hold this participant behind an `Arc` and
    /// drain events from a background task rather than owning it uniquely.
    event_rx: Mutex<Option<mpsc::Receiver<MeshEvent>>>,
    /// Whether this participant is paused ("relay-only" mode): disconnected
    /// from the DHT transport while retaining `topic_map`, so
    /// [`MeshParticipant::resume`] can reconnect without losing workspace
    /// membership.
    suspended: Suspendable,
}

impl MeshParticipant {
    pub fn new(node_id: NodeId, version: impl Into<String>, config: MeshConfig) -> Self {
        let capacity = config.max_routing_table_size();
        Self {
            node_id,
            config,
            version: version.into(),
            started_at: Instant::now(),
            routing_table: Arc::new(RoutingTable::new(node_id, capacity)),
            topic_map: Arc::new(TopicMap::new()),
            handle: None,
            event_rx: Mutex::new(None),
            suspended: Suspendable::new(),
        }
    }

    pub fn routing_table(&self) -> SharedRoutingTable {
        Arc::clone(&self.routing_table)
    }

    /// Spawn the swarm task. Must be called once before any other method.
    pub async fn start(&mut self) -> MeshResult<()> {
        let (command_tx, command_rx) = mpsc::channel(256);
        let (event_tx, event_rx) = mpsc::channel(256);
        self.handle = Some(MeshHandle { command_tx });
        *self.event_rx.get_mut() = Some(event_rx);

        let node_id = self.node_id;
        let version = self.version.clone();
        let config = self.config.clone();
        let routing_table = Arc::clone(&self.routing_table);
        let topic_map = Arc::clone(&self.topic_map);
        let started_at = self.started_at;

        tokio::spawn(async move {
            if let Err(e) = run_swarm(
                node_id,
                version,
                config,
                routing_table,
                topic_map,
                started_at,
                command_rx,
                event_tx.clone(),
            )
            .await
            {
                warn!(error = %e, "mesh swarm task exited with an error");
            }
            let _ = event_tx.send(MeshEvent::Stopped).await;
        });

        info!(node_id = %self.node_id, "mesh participant started");
        Ok(())
    }

    pub async fn next_event(&self) -> Option<MeshEvent> {
        let mut event_rx = self.event_rx.lock().await;
        match event_rx.as_mut() {
            Some(rx) => rx.recv().await,
            None => None,
        }
    }

    pub async fn dial(&self, addr: Multiaddr) -> MeshResult<()> {
        self.require_handle()?.send(MeshCommand::Dial(addr)).await
    }

    pub async fn join_workspace(&self, workspace_id: impl Into<String>) -> MeshResult<()> {
        let workspace_id = workspace_id.into();
        let topic = nightjar_core::topic::workspace_topic(&workspace_id)
            .map_err(|e| MeshError::TransportError(e.to_string()))?;
        let (tx, rx) = oneshot::channel();
        self.require_handle()?
            .send(MeshCommand::JoinWorkspace(workspace_id, topic.to_hex(), tx))
            .await?;
        rx.await.map_err(|_| MeshError::ChannelClosed)
    }

    /// Publish an already-encoded `sync`/`awareness` frame to a workspace's
    /// gossipsub topic, so every other relay subscribed to that workspace
    /// receives it and can fan it out to its own local subscribers.
    pub async fn forward_sync(&self, workspace_id: impl Into<String>, data: Vec<u8>) -> MeshResult<()> {
        let topic = nightjar_core::topic::workspace_topic(&workspace_id.into())
            .map_err(|e| MeshError::TransportError(e.to_string()))?;
        self.require_handle()?
            .send(MeshCommand::PublishSync(topic.to_hex(), data))
            .await
    }

    pub async fn leave_workspace(&self, workspace_id: impl Into<String>) -> MeshResult<()> {
        let topic = nightjar_core::topic::workspace_topic(&workspace_id.into())
            .map_err(|e| MeshError::TransportError(e.to_string()))?;
        self.require_handle()?
            .send(MeshCommand::LeaveWorkspace(topic.to_hex()))
            .await
    }

    /// Broadcasts a `workspace-query` to every open mesh connection and
    /// collects `workspace-response` replies, deduped by node id, until the
    /// configured peer-query timeout elapses.
    pub async fn query_workspace_peers(
        &self,
        workspace_id: impl Into<String>,
    ) -> MeshResult<Vec<PeerEndpoint>> {
        let topic = nightjar_core::topic::workspace_topic(&workspace_id.into())
            .map_err(|e| MeshError::TransportError(e.to_string()))?;
        let (tx, rx) = oneshot::channel();
        self.require_handle()?
            .send(MeshCommand::QueryWorkspacePeers(topic.to_hex(), tx))
            .await?;
        tokio::time::timeout(self.config.peer_query_timeout(), rx)
            .await
            .map_err(|_| MeshError::Timeout)?
            .map_err(|_| MeshError::ChannelClosed)
    }

    pub async fn top_relays(&self, n: usize) -> MeshResult<Vec<RelayEntry>> {
        let (tx, rx) = oneshot::channel();
        self.require_handle()?
            .send(MeshCommand::TopRelays(n, tx))
            .await?;
        rx.await.map_err(|_| MeshError::ChannelClosed)
    }

    pub async fn status(&self) -> MeshResult<MeshStatus> {
        let (tx, rx) = oneshot::channel();
        self.require_handle()?.send(MeshCommand::Status(tx)).await?;
        rx.await.map_err(|_| MeshError::ChannelClosed)
    }

    /// Pause DHT participation without tearing down workspace membership.
    /// Disconnects from every currently connected peer; idempotent.
    pub async fn suspend(&self) -> MeshResult<()> {
        if self.suspended.suspend() {
            self.require_handle()?.send(MeshCommand::Suspend).await?;
        }
        Ok(())
    }

    /// Resume DHT participation: redial the configured bootstrap peers and
    /// rejoin every workspace this participant was a member of before
    /// suspension. Idempotent.
    pub async fn resume(&self) -> MeshResult<()> {
        if self.suspended.resume() {
            self.require_handle()?.send(MeshCommand::Resume).await?;
        }
        Ok(())
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended.is_suspended()
    }

    pub async fn shutdown(&self) -> MeshResult<()> {
        match &self.handle {
            Some(handle) => handle.send(MeshCommand::Shutdown).await,
            None => Ok(()),
        }
    }

    fn require_handle(&self) -> MeshResult<&MeshHandle> {
        self.handle.as_ref().ok_or(MeshError::ChannelClosed)
    }
}

struct PendingQuery {
    outstanding: HashSet<request_response::OutboundRequestId>,
    collected: HashMap<NodeId, PeerEndpoint>,
    reply_to: oneshot::Sender<Vec<PeerEndpoint>>,
}

#[allow(clippy::too_many_arguments)]
async fn run_swarm(
    node_id: NodeId,
    version: String,
    config: MeshConfig,
    routing_table: SharedRoutingTable,
    topic_map: Arc<TopicMap>,
    started_at: Instant,
    mut command_rx: mpsc::Receiver<MeshCommand>,
    event_tx: mpsc::Sender<MeshEvent>,
) -> MeshResult<()> {
    let mut swarm = SwarmBuilder::with_new_identity()
        .with_tokio()
        .with_tcp(tcp::Config::default(), noise::Config::new, yamux::Config::default)
        .map_err(|e| MeshError::TransportError(e.to_string()))?
        .with_behaviour(|key| {
            let local_peer_id = PeerId::from(key.public());
            MeshBehaviour::new(local_peer_id, &config).expect("failed to build mesh behaviour")
        })
        .map_err(|e| MeshError::TransportError(e.to_string()))?
        .with_swarm_config(|c| c.with_idle_connection_timeout(Duration::from_secs(60)))
        .build();

    swarm
        .behaviour_mut()
        .subscribe_mesh_topic()
        .map_err(|e| MeshError::TransportError(e.to_string()))?;
    topic_map.join(nightjar_core::topic::mesh_topic().to_hex());

    swarm
        .listen_on(config.listen_multiaddr())
        .map_err(|e| MeshError::TransportError(e.to_string()))?;

    for addr in &config.bootstrap_peers {
        match swarm.dial(addr.clone()) {
            Ok(()) => info!(%addr, "dialing bootstrap peer"),
            Err(e) => warn!(%addr, error = %e, "failed to dial bootstrap peer"),
        }
    }

    let mut announce_interval = interval(config.announce_interval());
    let mut connected_peers: HashSet<PeerId> = HashSet::new();
    let mut pending_queries: HashMap<request_response::OutboundRequestId, String> = HashMap::new();
    let mut active_queries: HashMap<String, PendingQuery> = HashMap::new();
    let mut peer_nodes: HashMap<PeerId, NodeId> = HashMap::new();

    loop {
        select! {
            event = swarm.select_next_some() => {
                match event {
                    SwarmEvent::NewListenAddr { address, .. } => {
                        info!(%address, "mesh listening");
                    }
                    SwarmEvent::ConnectionEstablished { peer_id, .. } => {
                        connected_peers.insert(peer_id);
                        if routing_table.len() < MIN_CATALOG_SIZE_FOR_BOOTSTRAP {
                            swarm.behaviour_mut().send_request(
                                &peer_id,
                                MeshRpcRequest::BootstrapRequest { node_id },
                            );
                        }
                        let _ = event_tx.send(MeshEvent::PeerConnected(peer_id)).await;
                    }
                    SwarmEvent::ConnectionClosed { peer_id, .. } => {
                        connected_peers.remove(&peer_id);
                        if let Some(node_id) = peer_nodes.remove(&peer_id) {
                            topic_map.remove_peer_everywhere(&node_id);
                        }
                        let _ = event_tx.send(MeshEvent::PeerDisconnected(peer_id)).await;
                    }
                    SwarmEvent::Behaviour(event) => {
                        handle_behaviour_event(
                            event,
                            &mut swarm,
                            &node_id,
                            &version,
                            &config,
                            &started_at,
                            &routing_table,
                            &topic_map,
                            &mut pending_queries,
                            &mut active_queries,
                            &mut peer_nodes,
                            &event_tx,
                        ).await;
                    }
                    _ => {}
                }
            }

            Some(command) = command_rx.recv() => {
                match command {
                    MeshCommand::JoinWorkspace(workspace_id, topic_hash, reply) => {
                        topic_map.join(&topic_hash);
                        topic_map.record_workspace_id(&topic_hash, workspace_id);
                        if let Err(e) = swarm.behaviour_mut().subscribe_workspace_topic(&topic_hash) {
                            warn!(error = %e, "failed to subscribe to workspace topic");
                        }
                        let _ = reply.send(());
                    }
                    MeshCommand::LeaveWorkspace(topic_hash) => {
                        topic_map.leave(&topic_hash);
                        swarm.behaviour_mut().unsubscribe_workspace_topic(&topic_hash);
                    }
                    MeshCommand::PublishSync(topic_hash, data) => {
                        if let Err(e) = swarm.behaviour_mut().publish_workspace_sync(&topic_hash, data) {
                            warn!(error = %e, "failed to publish workspace sync frame");
                        }
                    }
                    MeshCommand::QueryWorkspacePeers(topic_hash, reply) => {
                        let mut outstanding = HashSet::new();
                        for peer in connected_peers.iter().copied() {
                            let request_id = swarm.behaviour_mut().send_request(
                                &peer,
                                MeshRpcRequest::WorkspaceQuery {
                                    topic_hash: topic_hash.clone(),
                                    requester_id: node_id,
                                },
                            );
                            outstanding.insert(request_id);
                            pending_queries.insert(request_id, topic_hash.clone());
                        }
                        if outstanding.is_empty() {
                            let _ = reply.send(topic_map.peers_for(&topic_hash));
                        } else {
                            active_queries.insert(topic_hash, PendingQuery {
                                outstanding,
                                collected: HashMap::new(),
                                reply_to: reply,
                            });
                        }
                    }
                    MeshCommand::TopRelays(n, reply) => {
                        let self_entry = self_relay_entry(&node_id, &version, &config, &topic_map, started_at);
                        let _ = reply.send(routing_table.top_relays(n, self_entry));
                    }
                    MeshCommand::Status(reply) => {
                        let _ = reply.send(MeshStatus {
                            node_id,
                            connected_peers: connected_peers.len(),
                            catalog_size: routing_table.len(),
                            joined_workspaces: topic_map.joined_topics(),
                        });
                    }
                    MeshCommand::Dial(addr) => {
                        if let Err(e) = swarm.dial(addr.clone()) {
                            warn!(%addr, error = %e, "failed to dial peer");
                        }
                    }
                    MeshCommand::Suspend => {
                        info!("suspending mesh participation");
                        for peer in connected_peers.iter().copied().collect::<Vec<_>>() {
                            let _ = swarm.disconnect_peer_id(peer);
                        }
                    }
                    MeshCommand::Resume => {
                        info!(workspaces = ?topic_map.joined_topics(), "resuming mesh participation");
                        for addr in &config.bootstrap_peers {
                            match swarm.dial(addr.clone()) {
                                Ok(()) => info!(%addr, "redialing bootstrap peer on resume"),
                                Err(e) => warn!(%addr, error = %e, "failed to redial bootstrap peer on resume"),
                            }
                        }
                    }
                    MeshCommand::Shutdown => {
                        info!("shutting down mesh swarm");
                        break;
                    }
                }
            }

            _ = announce_interval.tick(), if config.should_announce() => {
                publish_announce(&mut swarm, &node_id, &version, &config, &topic_map, started_at);
            }
        }
    }

    swarm.behaviour_mut().unsubscribe_mesh_topic();
    Ok(())
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn self_relay_entry(
    node_id: &NodeId,
    version: &str,
    config: &MeshConfig,
    topic_map: &TopicMap,
    started_at: Instant,
) -> Option<RelayEntry> {
    let public_url = config.public_url.as_ref()?;
    let mut endpoints = HashMap::new();
    endpoints.insert("wss".to_string(), public_url.clone());
    Some(RelayEntry {
        node_id: *node_id,
        endpoints,
        capabilities: Capabilities {
            relay: true,
            persist: config.announce_workspaces,
            max_peers: 1000,
        },
        workspace_count: topic_map.joined_topics().len() as u32,
        uptime_seconds: started_at.elapsed().as_secs(),
        version: version.to_string(),
        last_seen: unix_now(),
    })
}

fn publish_announce(
    swarm: &mut Swarm<MeshBehaviour>,
    node_id: &NodeId,
    version: &str,
    config: &MeshConfig,
    topic_map: &TopicMap,
    started_at: Instant,
) {
    let Some(public_url) = &config.public_url else { return };
    let mut endpoints = HashMap::new();
    endpoints.insert("wss".to_string(), public_url.clone());
    let announce = RelayAnnounce {
        r#type: RelayAnnounceTag,
        node_id: *node_id,
        version: version.to_string(),
        capabilities: Capabilities {
            relay: true,
            persist: config.announce_workspaces,
            max_peers: 1000,
        },
        endpoints,
        workspace_count: topic_map.joined_topics().len() as u32,
        uptime: started_at.elapsed().as_secs(),
        timestamp: unix_now(),
    };
    match serde_json::to_vec(&announce) {
        Ok(data) => {
            if let Err(e) = swarm.behaviour_mut().publish_announce(data) {
                warn!(error = %e, "failed to publish relay-announce");
            }
        }
        Err(e) => warn!(error = %e, "failed to serialize relay-announce"),
    }
}

#[allow(clippy::too_many_arguments)]
async fn handle_behaviour_event(
    event: MeshBehaviourEvent,
    swarm: &mut Swarm<MeshBehaviour>,
    node_id: &NodeId,
    version: &str,
    config: &MeshConfig,
    started_at: &Instant,
    routing_table: &SharedRoutingTable,
    topic_map: &Arc<TopicMap>,
    pending_queries: &mut HashMap<request_response::OutboundRequestId, String>,
    active_queries: &mut HashMap<String, PendingQuery>,
    peer_nodes: &mut HashMap<PeerId, NodeId>,
    event_tx: &mpsc::Sender<MeshEvent>,
) {
    match event {
        MeshBehaviourEvent::Gossipsub(gossipsub::Event::Message { message, .. }) => {
            if message.topic == mesh_ident_topic().hash() {
                match serde_json::from_slice::<RelayAnnounce>(&message.data) {
                    Ok(announce) => {
                        if announce.node_id == *node_id {
                            return;
                        }
                        let entry = RelayEntry {
                            node_id: announce.node_id,
                            endpoints: announce.endpoints,
                            capabilities: announce.capabilities,
                            workspace_count: announce.workspace_count,
                            uptime_seconds: announce.uptime,
                            version: announce.version,
                            last_seen: announce.timestamp,
                        };
                        if routing_table.upsert(entry) {
                            let _ = event_tx
                                .send(MeshEvent::RelayAnnounceReceived(announce.node_id))
                                .await;
                        }
                    }
                    Err(e) => trace!(error = %e, "failed to parse gossipsub message as relay-announce"),
                }
            } else {
                let topic_hash = message.topic.as_str().to_string();
                if let Some(workspace_id) = topic_map.workspace_id_for(&topic_hash) {
                    let _ = event_tx
                        .send(MeshEvent::WorkspaceSync { workspace_id, data: message.data })
                        .await;
                }
            }
        }

        MeshBehaviourEvent::Identify(identify::Event::Received { peer_id, info, .. }) => {
            for addr in info.listen_addrs {
                swarm.behaviour_mut().kademlia.add_address(&peer_id, addr);
            }
        }

        MeshBehaviourEvent::Kademlia(kad::Event::OutboundQueryProgressed {
            result: kad::QueryResult::Bootstrap(Ok(_)),
            ..
        }) => {
            debug!("kademlia bootstrap completed");
        }

        MeshBehaviourEvent::Rpc(request_response::Event::Message { peer, message }) => {
            handle_rpc_message(
                swarm,
                node_id,
                version,
                config,
                started_at,
                routing_table,
                topic_map,
                pending_queries,
                active_queries,
                peer_nodes,
                peer,
                message,
            )
            .await;
        }

        _ => {}
    }
}

#[allow(clippy::too_many_arguments)]
async fn handle_rpc_message(
    swarm: &mut Swarm<MeshBehaviour>,
    node_id: &NodeId,
    version: &str,
    config: &MeshConfig,
    started_at: &Instant,
    routing_table: &SharedRoutingTable,
    topic_map: &Arc<TopicMap>,
    pending_queries: &mut HashMap<request_response::OutboundRequestId, String>,
    active_queries: &mut HashMap<String, PendingQuery>,
    peer_nodes: &mut HashMap<PeerId, NodeId>,
    peer: PeerId,
    message: request_response::Message<MeshRpcRequest, MeshRpcResponse>,
) {
    match message {
        request_response::Message::Request { request, channel, .. } => {
            handle_rpc_request(
                swarm, node_id, version, config, started_at, routing_table, topic_map,
                peer_nodes, peer, request, channel,
            );
        }
        request_response::Message::Response { request_id, response } => {
            handle_rpc_response(routing_table, topic_map, pending_queries, active_queries, request_id, response)
                .await;
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn handle_rpc_request(
    swarm: &mut Swarm<MeshBehaviour>,
    node_id: &NodeId,
    version: &str,
    config: &MeshConfig,
    started_at: &Instant,
    routing_table: &SharedRoutingTable,
    topic_map: &Arc<TopicMap>,
    peer_nodes: &mut HashMap<PeerId, NodeId>,
    peer: PeerId,
    request: MeshRpcRequest,
    channel: ResponseChannel<MeshRpcResponse>,
) {
    let requester_node_id = match &request {
        MeshRpcRequest::BootstrapRequest { node_id } => *node_id,
        MeshRpcRequest::WorkspaceQuery { requester_id, .. } => *requester_id,
    };
    peer_nodes.insert(peer, requester_node_id);

    let response = match request {
        MeshRpcRequest::BootstrapRequest { node_id: requester } => {
            debug!(%peer, requester = %requester, "bootstrap-request");
            let mut nodes: Vec<CatalogNode> = routing_table
                .sample(MAX_EMBEDDED_NODES)
                .into_iter()
                .filter(|entry| entry.node_id != *node_id)
                .map(|entry| entry.to_catalog_node())
                .collect();
            if let Some(self_entry) = self_relay_entry(node_id, version, config, topic_map, *started_at) {
                nodes.push(self_entry.to_catalog_node());
            }
            MeshRpcResponse::BootstrapResponse { nodes }
        }
        MeshRpcRequest::WorkspaceQuery { topic_hash, requester_id } => {
            debug!(%peer, requester = %requester_id, topic_hash = %topic_hash, "workspace-query");
            let mut peers = topic_map.peers_for(&topic_hash);
            if topic_map.is_joined(&topic_hash) {
                if let Some(public_url) = &config.public_url {
                    let mut endpoints = HashMap::new();
                    endpoints.insert("wss".to_string(), public_url.clone());
                    peers.push(PeerEndpoint { node_id: *node_id, endpoints, last_seen: unix_now() });
                }
            }
            MeshRpcResponse::WorkspaceResponse { topic_hash: topic_hash.clone(), peers }
        }
    };

    if let Err(e) = swarm.behaviour_mut().rpc.send_response(channel, response) {
        warn!(?e, "failed to send mesh rpc response");
    }
}

async fn handle_rpc_response(
    routing_table: &SharedRoutingTable,
    topic_map: &Arc<TopicMap>,
    pending_queries: &mut HashMap<request_response::OutboundRequestId, String>,
    active_queries: &mut HashMap<String, PendingQuery>,
    request_id: request_response::OutboundRequestId,
    response: MeshRpcResponse,
) {
    match response {
        MeshRpcResponse::BootstrapResponse { nodes } => {
            let now = unix_now();
            for node in nodes {
                routing_table.upsert(RelayEntry {
                    node_id: node.node_id,
                    endpoints: node.endpoints,
                    capabilities: node.capabilities,
                    workspace_count: 0,
                    uptime_seconds: 0,
                    version: String::new(),
                    last_seen: now,
                });
            }
        }
        MeshRpcResponse::WorkspaceResponse { topic_hash, peers } => {
            pending_queries.remove(&request_id);
            for peer in &peers {
                topic_map.record_peer(&topic_hash, peer.clone());
            }

            let finished = if let Some(query) = active_queries.get_mut(&topic_hash) {
                query.outstanding.remove(&request_id);
                for peer in peers {
                    query.collected.insert(peer.node_id, peer);
                }
                query.outstanding.is_empty()
            } else {
                false
            };

            if finished {
                if let Some(query) = active_queries.remove(&topic_hash) {
                    let _ = query.reply_to.send(query.collected.into_values().collect());
                }
            }
        }
    }
}
