//! Mesh participant configuration.

use libp2p::Multiaddr;
use nightjar_core::constants::{MAX_ROUTING_TABLE_SIZE, PEER_QUERY_TIMEOUT, RELAY_ANNOUNCE_INTERVAL};
use std::time::Duration;

/// How this node participates in the mesh.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MeshConfig {
    /// TCP port to listen on for mesh connections.
    pub listen_port: u16,
    /// Known peers to dial at startup; an empty list is legal and starts
    /// the node DHT-only, relying on incoming dials.
    pub bootstrap_peers: Vec<Multiaddr>,
    /// Whether this node announces itself as a relay (requires `public_url`).
    pub relay_mode: bool,
    /// The `wss://` endpoint to advertise in announcements, if relaying.
    pub public_url: Option<String>,
    /// Whether to announce which workspaces this node hosts.
    pub announce_workspaces: bool,
    announce_interval: Duration,
    peer_query_timeout: Duration,
    max_routing_table_size: usize,
    request_timeout: Duration,
    min_peers_for_bootstrap: usize,
}

impl MeshConfig {
    pub fn announce_interval(&self) -> Duration {
        if self.announce_interval.is_zero() {
            RELAY_ANNOUNCE_INTERVAL
        } else {
            self.announce_interval
        }
    }

    pub fn peer_query_timeout(&self) -> Duration {
        if self.peer_query_timeout.is_zero() {
            PEER_QUERY_TIMEOUT
        } else {
            self.peer_query_timeout
        }
    }

    pub fn max_routing_table_size(&self) -> usize {
        if self.max_routing_table_size == 0 {
            MAX_ROUTING_TABLE_SIZE
        } else {
            self.max_routing_table_size
        }
    }

    pub fn request_timeout(&self) -> Duration {
        if self.request_timeout.is_zero() {
            Duration::from_secs(10)
        } else {
            self.request_timeout
        }
    }

    pub fn min_peers_for_bootstrap(&self) -> usize {
        self.min_peers_for_bootstrap.max(1)
    }

    pub fn has_bootstrap_peers(&self) -> bool {
        !self.bootstrap_peers.is_empty()
    }

    pub fn listen_multiaddr(&self) -> Multiaddr {
        format!("/ip4/0.0.0.0/tcp/{}", self.listen_port)
            .parse()
            .expect("a port-only multiaddr is always well-formed")
    }

    /// Whether this node announces presence in `server` mode, per the
    /// startup sequence: relay mode AND a reachable public URL.
    pub fn should_announce(&self) -> bool {
        self.relay_mode && self.public_url.is_some()
    }
}

#[derive(Default)]
pub struct MeshConfigBuilder(MeshConfig);

impl MeshConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn listen_port(mut self, port: u16) -> Self {
        self.0.listen_port = port;
        self
    }

    pub fn bootstrap_peers(mut self, peers: Vec<Multiaddr>) -> Self {
        self.0.bootstrap_peers = peers;
        self
    }

    pub fn relay_mode(mut self, relay_mode: bool) -> Self {
        self.0.relay_mode = relay_mode;
        self
    }

    pub fn public_url(mut self, url: impl Into<String>) -> Self {
        self.0.public_url = Some(url.into());
        self
    }

    pub fn announce_workspaces(mut self, announce: bool) -> Self {
        self.0.announce_workspaces = announce;
        self
    }

    pub fn announce_interval(mut self, interval: Duration) -> Self {
        self.0.announce_interval = interval;
        self
    }

    pub fn build(self) -> MeshConfig {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fall_back_to_normative_constants() {
        let config = MeshConfig::default();
        assert_eq!(config.announce_interval(), RELAY_ANNOUNCE_INTERVAL);
        assert_eq!(config.peer_query_timeout(), PEER_QUERY_TIMEOUT);
        assert_eq!(config.max_routing_table_size(), MAX_ROUTING_TABLE_SIZE);
    }

    #[test]
    fn should_announce_requires_both_relay_mode_and_public_url() {
        let relay_only = MeshConfigBuilder::new().relay_mode(true).build();
        assert!(!relay_only.should_announce());

        let both = MeshConfigBuilder::new().relay_mode(true).public_url("wss://relay.example").build();
        assert!(both.should_announce());
    }

    #[test]
    fn listen_multiaddr_binds_all_interfaces() {
        let config = MeshConfigBuilder::new().listen_port(4001).build();
        assert_eq!(config.listen_multiaddr().to_string(), "/ip4/0.0.0.0/tcp/4001");
    }
}
