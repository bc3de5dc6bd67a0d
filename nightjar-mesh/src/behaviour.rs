//! libp2p network behaviour for the relay mesh: gossipsub carries
//! `relay-announce`, Kademlia provides peer discovery, identify exposes
//! protocol versions, native ping covers DHT-connection liveness, and a
//! request-response behaviour carries the bootstrap/workspace RPC pair.

use crate::{
    config::MeshConfig,
    error::{MeshError, MeshResult},
    messages::{MeshRpcRequest, MeshRpcResponse, MESH_RPC_PROTOCOL},
};
use libp2p::{
    gossipsub::{self, IdentTopic, MessageAuthenticity, ValidationMode},
    identify,
    kad::{self, store::MemoryStore},
    ping,
    request_response::{self, Codec, ProtocolSupport},
    swarm::NetworkBehaviour,
    Multiaddr, PeerId, StreamProtocol,
};
use std::io;
use std::time::Duration;

/// Request-response codec for the mesh RPC pair. JSON over the substream,
/// one message per stream (request then close, response then close).
#[derive(Debug, Clone, Default)]
pub struct MeshRpcCodec;

impl Codec for MeshRpcCodec {
    type Protocol = StreamProtocol;
    type Request = MeshRpcRequest;
    type Response = MeshRpcResponse;

    fn read_request<'life0, 'life1, 'life2, 'async_trait, T>(
        &'life0 mut self,
        _protocol: &'life1 Self::Protocol,
        io: &'life2 mut T,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = io::Result<Self::Request>> + Send + 'async_trait>,
    >
    where
        T: futures::AsyncRead + Unpin + Send + 'async_trait,
        'life0: 'async_trait,
        'life1: 'async_trait,
        'life2: 'async_trait,
        Self: 'async_trait,
    {
        Box::pin(async move {
            use futures::AsyncReadExt;
            let mut buf = Vec::new();
            io.read_to_end(&mut buf).await?;
            serde_json::from_slice(&buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
        })
    }

    fn read_response<'life0, 'life1, 'life2, 'async_trait, T>(
        &'life0 mut self,
        _protocol: &'life1 Self::Protocol,
        io: &'life2 mut T,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = io::Result<Self::Response>> + Send + 'async_trait>,
    >
    where
        T: futures::AsyncRead + Unpin + Send + 'async_trait,
        'life0: 'async_trait,
        'life1: 'async_trait,
        'life2: 'async_trait,
        Self: 'async_trait,
    {
        Box::pin(async move {
            use futures::AsyncReadExt;
            let mut buf = Vec::new();
            io.read_to_end(&mut buf).await?;
            serde_json::from_slice(&buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
        })
    }

    fn write_request<'life0, 'life1, 'life2, 'async_trait, T>(
        &'life0 mut self,
        _protocol: &'life1 Self::Protocol,
        io: &'life2 mut T,
        req: Self::Request,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = io::Result<()>> + Send + 'async_trait>>
    where
        T: futures::AsyncWrite + Unpin + Send + 'async_trait,
        'life0: 'async_trait,
        'life1: 'async_trait,
        'life2: 'async_trait,
        Self: 'async_trait,
    {
        Box::pin(async move {
            use futures::AsyncWriteExt;
            let bytes = serde_json::to_vec(&req)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            io.write_all(&bytes).await?;
            io.close().await?;
            Ok(())
        })
    }

    fn write_response<'life0, 'life1, 'life2, 'async_trait, T>(
        &'life0 mut self,
        _protocol: &'life1 Self::Protocol,
        io: &'life2 mut T,
        resp: Self::Response,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = io::Result<()>> + Send + 'async_trait>>
    where
        T: futures::AsyncWrite + Unpin + Send + 'async_trait,
        'life0: 'async_trait,
        'life1: 'async_trait,
        'life2: 'async_trait,
        Self: 'async_trait,
    {
        Box::pin(async move {
            use futures::AsyncWriteExt;
            let bytes = serde_json::to_vec(&resp)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            io.write_all(&bytes).await?;
            io.close().await?;
            Ok(())
        })
    }
}

pub const MESH_TOPIC_NAME: &str = "nightjar-relay-mesh-v1";

pub fn mesh_ident_topic() -> IdentTopic {
    IdentTopic::new(MESH_TOPIC_NAME)
}

#[derive(NetworkBehaviour)]
pub struct MeshBehaviour {
    pub gossipsub: gossipsub::Behaviour,
    pub kademlia: kad::Behaviour<MemoryStore>,
    pub identify: identify::Behaviour,
    pub ping: ping::Behaviour,
    pub rpc: request_response::Behaviour<MeshRpcCodec>,
}

impl MeshBehaviour {
    pub fn new(local_peer_id: PeerId, config: &MeshConfig) -> MeshResult<Self> {
        let gossipsub_config = gossipsub::ConfigBuilder::default()
            .heartbeat_interval(Duration::from_secs(10))
            .validation_mode(ValidationMode::Strict)
            .message_id_fn(|msg| {
                let mut hasher = std::collections::hash_map::DefaultHasher::new();
                std::hash::Hash::hash(&msg.data, &mut hasher);
                std::hash::Hash::hash(&msg.topic, &mut hasher);
                gossipsub::MessageId::from(std::hash::Hasher::finish(&hasher).to_string())
            })
            .build()
            .map_err(|e| MeshError::TransportError(e.to_string()))?;

        let gossipsub = gossipsub::Behaviour::new(
            MessageAuthenticity::Signed(libp2p::identity::Keypair::generate_ed25519()),
            gossipsub_config,
        )
        .map_err(|e| MeshError::TransportError(e.to_string()))?;

        let kademlia = kad::Behaviour::new(local_peer_id, MemoryStore::new(local_peer_id));

        let identify = identify::Behaviour::new(identify::Config::new(
            "/nightjar/mesh/1".to_string(),
            libp2p::identity::Keypair::generate_ed25519().public(),
        ));

        let ping = ping::Behaviour::default();

        let rpc = request_response::Behaviour::new(
            [(MESH_RPC_PROTOCOL, ProtocolSupport::Full)],
            request_response::Config::default().with_request_timeout(config.request_timeout()),
        );

        Ok(Self {
            gossipsub,
            kademlia,
            identify,
            ping,
            rpc,
        })
    }

    pub fn subscribe_mesh_topic(&mut self) -> MeshResult<()> {
        self.gossipsub
            .subscribe(&mesh_ident_topic())
            .map_err(|e| MeshError::TransportError(format!("subscribe failed: {e:?}")))?;
        Ok(())
    }

    pub fn unsubscribe_mesh_topic(&mut self) {
        self.gossipsub.unsubscribe(&mesh_ident_topic());
    }

    pub fn publish_announce(&mut self, data: Vec<u8>) -> MeshResult<()> {
        self.gossipsub
            .publish(mesh_ident_topic(), data)
            .map_err(|e| MeshError::TransportError(format!("publish failed: {e:?}")))?;
        Ok(())
    }

    /// Subscribe to the gossipsub topic for a workspace, identified by its
    /// hex-encoded topic hash. Distinct from [`Self::subscribe_mesh_topic`]:
    /// every workspace gets its own topic so sync traffic for one workspace
    /// is never delivered to a node that hasn't joined it.
    pub fn subscribe_workspace_topic(&mut self, topic_hash: &str) -> MeshResult<()> {
        self.gossipsub
            .subscribe(&IdentTopic::new(topic_hash))
            .map_err(|e| MeshError::TransportError(format!("subscribe failed: {e:?}")))?;
        Ok(())
    }

    pub fn unsubscribe_workspace_topic(&mut self, topic_hash: &str) {
        self.gossipsub.unsubscribe(&IdentTopic::new(topic_hash));
    }

    /// Publish an already-encoded `sync`/`awareness` frame to a workspace's
    /// gossipsub topic for cross-relay delivery.
    pub fn publish_workspace_sync(&mut self, topic_hash: &str, data: Vec<u8>) -> MeshResult<()> {
        self.gossipsub
            .publish(IdentTopic::new(topic_hash), data)
            .map_err(|e| MeshError::TransportError(format!("publish failed: {e:?}")))?;
        Ok(())
    }

    pub fn add_address(&mut self, peer: PeerId, addr: Multiaddr) {
        self.kademlia.add_address(&peer, addr);
    }

    pub fn bootstrap(&mut self) -> MeshResult<()> {
        self.kademlia
            .bootstrap()
            .map_err(|e| MeshError::TransportError(format!("bootstrap failed: {e:?}")))?;
        Ok(())
    }

    pub fn send_request(
        &mut self,
        peer: &PeerId,
        request: MeshRpcRequest,
    ) -> request_response::OutboundRequestId {
        self.rpc.send_request(peer, request)
    }
}
