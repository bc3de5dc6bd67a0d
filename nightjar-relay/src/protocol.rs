//! JSON control messages exchanged over the relay WebSocket. Sync/awareness
//! payloads themselves travel as binary `SyncFrame`s
//! (see [`crate::sync_frame`]); this module covers the control channel
//! that negotiates identity, topic membership and peer discovery.

use crate::room::PeerSummary;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    Identity {
        public_key: Option<String>,
        display_name: Option<String>,
        color: Option<String>,
        /// Only present for `owner_gated` rooms: an ed25519 signature
        /// (hex) over `room_id || client_pubkey || timestamp`.
        signature: Option<String>,
        timestamp: Option<u64>,
    },
    JoinTopic {
        topic: String,
    },
    LeaveTopic {
        topic: String,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    PeersList {
        topic: String,
        peers: Vec<PeerSummary>,
    },
    Error {
        message: String,
    },
}

impl ServerMessage {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("ServerMessage always serializes")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_topic_parses_from_the_documented_shape() {
        let json = r#"{"type":"join-topic","topic":"docs-room"}"#;
        let parsed: ClientMessage = serde_json::from_str(json).unwrap();
        assert!(matches!(parsed, ClientMessage::JoinTopic { topic } if topic == "docs-room"));
    }

    #[test]
    fn identity_parses_with_optional_fields_absent() {
        let json = r#"{"type":"identity","public_key":"abcd"}"#;
        let parsed: ClientMessage = serde_json::from_str(json).unwrap();
        assert!(matches!(parsed, ClientMessage::Identity { public_key: Some(pk), .. } if pk == "abcd"));
    }

    #[test]
    fn peers_list_serializes_with_the_documented_tag() {
        let msg = ServerMessage::PeersList {
            topic: "t".to_string(),
            peers: vec![PeerSummary { node_id: "abc".to_string(), display_name: None }],
        };
        let json = msg.to_json();
        assert!(json.contains("\"type\":\"peers-list\""));
    }
}
