//! Tracks which workspace topics this node has joined, and what this node
//! knows about the peers present on each one, so incoming `workspace-query`
//! RPCs can be answered locally without a network round trip.

use crate::messages::PeerEndpoint;
use nightjar_core::NodeId;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};

#[derive(Default)]
struct Inner {
    joined: HashSet<String>,
    peers: HashMap<String, HashMap<NodeId, PeerEndpoint>>,
    /// Plaintext workspace id for each joined topic hash, recorded at join
    /// time since the hash itself can't be reversed.
    workspace_ids: HashMap<String, String>,
}

/// Per-topic-hash peer directory for workspaces this node participates in
/// or has learned about through `workspace-response`.
#[derive(Default)]
pub struct TopicMap {
    inner: RwLock<Inner>,
}

impl TopicMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn join(&self, topic_hash: impl Into<String>) {
        self.inner.write().joined.insert(topic_hash.into());
    }

    pub fn leave(&self, topic_hash: &str) {
        let mut inner = self.inner.write();
        inner.joined.remove(topic_hash);
        inner.peers.remove(topic_hash);
        inner.workspace_ids.remove(topic_hash);
    }

    /// Record the plaintext workspace id behind a topic hash, so an
    /// incoming gossipsub message on that topic can be attributed back to
    /// its workspace.
    pub fn record_workspace_id(&self, topic_hash: &str, workspace_id: impl Into<String>) {
        self.inner.write().workspace_ids.insert(topic_hash.to_string(), workspace_id.into());
    }

    pub fn workspace_id_for(&self, topic_hash: &str) -> Option<String> {
        self.inner.read().workspace_ids.get(topic_hash).cloned()
    }

    pub fn is_joined(&self, topic_hash: &str) -> bool {
        self.inner.read().joined.contains(topic_hash)
    }

    pub fn joined_topics(&self) -> Vec<String> {
        self.inner.read().joined.iter().cloned().collect()
    }

    /// Record (or refresh) a peer's presence on a topic. Ignored if the new
    /// `last_seen` is not newer than what's on file.
    pub fn record_peer(&self, topic_hash: &str, endpoint: PeerEndpoint) {
        let mut inner = self.inner.write();
        let entries = inner.peers.entry(topic_hash.to_string()).or_default();
        match entries.get(&endpoint.node_id) {
            Some(existing) if existing.last_seen >= endpoint.last_seen => {}
            _ => {
                entries.insert(endpoint.node_id, endpoint);
            }
        }
    }

    pub fn remove_peer(&self, topic_hash: &str, node_id: &NodeId) {
        if let Some(entries) = self.inner.write().peers.get_mut(topic_hash) {
            entries.remove(node_id);
        }
    }

    /// Drop every peer entry tracked under this topic for `node_id` (used
    /// when a connection to that peer is lost).
    pub fn remove_peer_everywhere(&self, node_id: &NodeId) {
        let mut inner = self.inner.write();
        for entries in inner.peers.values_mut() {
            entries.remove(node_id);
        }
    }

    pub fn peers_for(&self, topic_hash: &str) -> Vec<PeerEndpoint> {
        self.inner
            .read()
            .peers
            .get(topic_hash)
            .map(|entries| entries.values().cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as StdHashMap;

    fn endpoint(node_id: NodeId, last_seen: u64) -> PeerEndpoint {
        PeerEndpoint { node_id, endpoints: StdHashMap::new(), last_seen }
    }

    #[test]
    fn joining_and_leaving_toggles_membership() {
        let map = TopicMap::new();
        assert!(!map.is_joined("abc"));
        map.join("abc");
        assert!(map.is_joined("abc"));
        map.leave("abc");
        assert!(!map.is_joined("abc"));
    }

    #[test]
    fn leaving_a_topic_drops_its_peer_list() {
        let map = TopicMap::new();
        map.join("abc");
        map.record_peer("abc", endpoint(NodeId::generate(), 1));
        assert_eq!(map.peers_for("abc").len(), 1);
        map.leave("abc");
        assert!(map.peers_for("abc").is_empty());
    }

    #[test]
    fn stale_peer_record_does_not_overwrite_newer_one() {
        let map = TopicMap::new();
        let id = NodeId::generate();
        map.record_peer("abc", endpoint(id, 10));
        map.record_peer("abc", endpoint(id, 5));
        assert_eq!(map.peers_for("abc")[0].last_seen, 10);
    }

    #[test]
    fn removing_a_peer_everywhere_clears_all_topics() {
        let map = TopicMap::new();
        let id = NodeId::generate();
        map.record_peer("a", endpoint(id, 1));
        map.record_peer("b", endpoint(id, 1));
        map.remove_peer_everywhere(&id);
        assert!(map.peers_for("a").is_empty());
        assert!(map.peers_for("b").is_empty());
    }
}
