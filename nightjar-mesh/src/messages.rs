//! Mesh DHT wire messages, exactly as they appear on the wire:
//! `relay-announce` over gossipsub, and the request/response RPC pair
//! `bootstrap-request`/`bootstrap-response` and
//! `workspace-query`/`workspace-response` over a dedicated protocol.
//! `ping`/`pong` liveness is delegated to libp2p's own ping behaviour rather
//! than reimplemented here (see DESIGN.md).

use libp2p::StreamProtocol;
use nightjar_core::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const MESH_RPC_PROTOCOL: StreamProtocol = StreamProtocol::new("/nightjar/mesh-rpc/1");

/// A relay's self-reported capabilities, carried in `relay-announce`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub relay: bool,
    pub persist: bool,
    #[serde(rename = "maxPeers")]
    pub max_peers: u32,
}

/// `{"type":"relay-announce", ...}` — published on the well-known mesh
/// gossipsub topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayAnnounce {
    pub r#type: RelayAnnounceTag,
    pub node_id: NodeId,
    pub version: String,
    pub capabilities: Capabilities,
    pub endpoints: HashMap<String, String>,
    pub workspace_count: u32,
    pub uptime: u64,
    pub timestamp: u64,
}

/// A unit type that always serializes to the literal string `"relay-announce"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayAnnounceTag;

impl Serialize for RelayAnnounceTag {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str("relay-announce")
    }
}

impl<'de> Deserialize<'de> for RelayAnnounceTag {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        if s == "relay-announce" {
            Ok(RelayAnnounceTag)
        } else {
            Err(serde::de::Error::custom("expected type \"relay-announce\""))
        }
    }
}

impl RelayAnnounce {
    pub fn new(
        node_id: NodeId,
        version: impl Into<String>,
        capabilities: Capabilities,
        endpoints: HashMap<String, String>,
        workspace_count: u32,
        uptime: u64,
        timestamp: u64,
    ) -> Self {
        Self {
            r#type: RelayAnnounceTag,
            node_id,
            version: version.into(),
            capabilities,
            endpoints,
            workspace_count,
            uptime,
            timestamp,
        }
    }
}

/// One entry embedded in a `bootstrap-response`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogNode {
    #[serde(rename = "nodeId")]
    pub node_id: NodeId,
    pub endpoints: HashMap<String, String>,
    pub capabilities: Capabilities,
}

/// One entry in a `workspace-response`'s peer list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerEndpoint {
    #[serde(rename = "nodeId")]
    pub node_id: NodeId,
    pub endpoints: HashMap<String, String>,
    #[serde(rename = "lastSeen")]
    pub last_seen: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum MeshRpcRequest {
    BootstrapRequest {
        #[serde(rename = "nodeId")]
        node_id: NodeId,
    },
    WorkspaceQuery {
        #[serde(rename = "topicHash")]
        topic_hash: String,
        #[serde(rename = "requesterId")]
        requester_id: NodeId,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum MeshRpcResponse {
    BootstrapResponse { nodes: Vec<CatalogNode> },
    WorkspaceResponse {
        #[serde(rename = "topicHash")]
        topic_hash: String,
        peers: Vec<PeerEndpoint>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relay_announce_round_trips_with_the_documented_field_names() {
        let mut endpoints = HashMap::new();
        endpoints.insert("wss".to_string(), "wss://relay.example".to_string());
        let announce = RelayAnnounce::new(
            NodeId::generate(),
            "1.0.0",
            Capabilities { relay: true, persist: false, max_peers: 100 },
            endpoints,
            3,
            120,
            1_700_000_000_000,
        );
        let json = serde_json::to_value(&announce).unwrap();
        assert_eq!(json["type"], "relay-announce");
        assert_eq!(json["workspaceCount"], 3);
        assert_eq!(json["capabilities"]["maxPeers"], 100);

        let round_tripped: RelayAnnounce = serde_json::from_value(json).unwrap();
        assert_eq!(round_tripped.node_id, announce.node_id);
    }

    #[test]
    fn bootstrap_request_tags_as_documented() {
        let req = MeshRpcRequest::BootstrapRequest { node_id: NodeId::generate() };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["type"], "bootstrap-request");
    }

    #[test]
    fn workspace_query_tags_as_documented() {
        let req = MeshRpcRequest::WorkspaceQuery {
            topic_hash: "ab".repeat(32),
            requester_id: NodeId::generate(),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["type"], "workspace-query");
        assert_eq!(json["topicHash"], "ab".repeat(32));
    }
}
