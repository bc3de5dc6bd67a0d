//! The relay catalog: other known relays, their endpoints and capabilities,
//! bounded and LRU-evicted.

use crate::messages::{CatalogNode, Capabilities, PeerEndpoint};
use nightjar_core::NodeId;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// A relay known to this node, as tracked in the routing table.
#[derive(Debug, Clone)]
pub struct RelayEntry {
    pub node_id: NodeId,
    pub endpoints: HashMap<String, String>,
    pub capabilities: Capabilities,
    pub workspace_count: u32,
    pub uptime_seconds: u64,
    pub version: String,
    /// Monotonic last-seen marker; higher is more recent. Not a wall-clock
    /// timestamp so tests can drive it deterministically.
    pub last_seen: u64,
}

impl RelayEntry {
    pub fn to_catalog_node(&self) -> CatalogNode {
        CatalogNode {
            node_id: self.node_id,
            endpoints: self.endpoints.clone(),
            capabilities: self.capabilities,
        }
    }

    pub fn to_peer_endpoint(&self) -> PeerEndpoint {
        PeerEndpoint {
            node_id: self.node_id,
            endpoints: self.endpoints.clone(),
            last_seen: self.last_seen,
        }
    }
}

struct Inner {
    entries: HashMap<NodeId, RelayEntry>,
    capacity: usize,
    self_id: NodeId,
}

/// Thread-safe, bounded, LRU-evicting catalog of other relays.
///
/// Invariants: `size <= capacity` always; `self_id` is never stored;
/// inserting the `capacity + 1`th distinct entry evicts exactly one entry,
/// the one with the lowest `last_seen`.
pub struct RoutingTable {
    inner: RwLock<Inner>,
}

impl RoutingTable {
    pub fn new(self_id: NodeId, capacity: usize) -> Self {
        Self {
            inner: RwLock::new(Inner {
                entries: HashMap::new(),
                capacity,
                self_id,
            }),
        }
    }

    /// Upsert a relay entry. Silently ignored if `entry.node_id` is our own
    /// id. Returns `true` if this call changed the table (insert or a
    /// newer `last_seen` on an existing entry).
    pub fn upsert(&self, entry: RelayEntry) -> bool {
        let mut inner = self.inner.write();
        if entry.node_id == inner.self_id {
            return false;
        }
        let is_new = !inner.entries.contains_key(&entry.node_id);
        if let Some(existing) = inner.entries.get(&entry.node_id) {
            if entry.last_seen <= existing.last_seen {
                return false;
            }
        }
        inner.entries.insert(entry.node_id, entry);
        if is_new {
            Self::evict_if_over_capacity(&mut inner);
        }
        true
    }

    fn evict_if_over_capacity(inner: &mut Inner) {
        while inner.entries.len() > inner.capacity {
            if let Some(oldest) = inner
                .entries
                .values()
                .min_by_key(|e| e.last_seen)
                .map(|e| e.node_id)
            {
                inner.entries.remove(&oldest);
            } else {
                break;
            }
        }
    }

    pub fn get(&self, node_id: &NodeId) -> Option<RelayEntry> {
        self.inner.read().entries.get(node_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Self (if it qualifies), then catalog entries with a `wss` endpoint,
    /// sorted by `last_seen` descending, truncated to `n`.
    pub fn top_relays(&self, n: usize, self_entry: Option<RelayEntry>) -> Vec<RelayEntry> {
        let inner = self.inner.read();
        let mut candidates: Vec<RelayEntry> = self_entry.into_iter().collect();
        candidates.extend(
            inner
                .entries
                .values()
                .filter(|e| e.endpoints.contains_key("wss"))
                .cloned(),
        );
        candidates.sort_by(|a, b| b.last_seen.cmp(&a.last_seen));
        candidates.truncate(n);
        candidates
    }

    /// Up to `limit` entries for a `bootstrap-response`, excluding self.
    pub fn sample(&self, limit: usize) -> Vec<RelayEntry> {
        let inner = self.inner.read();
        inner.entries.values().take(limit).cloned().collect()
    }

    pub fn snapshot(&self) -> Vec<RelayEntry> {
        self.inner.read().entries.values().cloned().collect()
    }
}

pub type SharedRoutingTable = Arc<RoutingTable>;

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: NodeId, last_seen: u64) -> RelayEntry {
        RelayEntry {
            node_id: id,
            endpoints: HashMap::new(),
            capabilities: Capabilities { relay: true, persist: false, max_peers: 100 },
            workspace_count: 0,
            uptime_seconds: 0,
            version: "1.0.0".into(),
            last_seen,
        }
    }

    #[test]
    fn self_entry_is_never_stored() {
        let self_id = NodeId::generate();
        let table = RoutingTable::new(self_id, 100);
        assert!(!table.upsert(entry(self_id, 1)));
        assert!(table.is_empty());
    }

    #[test]
    fn evicts_least_recently_seen_on_overflow() {
        let table = RoutingTable::new(NodeId::generate(), 100);
        for i in 0..120u64 {
            table.upsert(entry(NodeId::generate(), i));
        }
        assert_eq!(table.len(), 100);
    }

    #[test]
    fn overflow_evicts_exactly_the_twenty_oldest() {
        let table = RoutingTable::new(NodeId::generate(), 100);
        let mut ids = Vec::new();
        for i in 0..120u64 {
            let id = NodeId::generate();
            ids.push(id);
            table.upsert(entry(id, i));
        }
        assert_eq!(table.len(), 100);
        for oldest in &ids[0..20] {
            assert!(table.get(oldest).is_none());
        }
        for newest in &ids[20..120] {
            assert!(table.get(newest).is_some());
        }
    }

    #[test]
    fn stale_update_does_not_overwrite_newer_entry() {
        let table = RoutingTable::new(NodeId::generate(), 100);
        let id = NodeId::generate();
        table.upsert(entry(id, 10));
        table.upsert(entry(id, 5));
        assert_eq!(table.get(&id).unwrap().last_seen, 10);
    }
}
