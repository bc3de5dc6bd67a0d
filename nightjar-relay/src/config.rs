//! Relay server configuration: server mode, bind address, and the
//! relay-wide defaults applied to rooms that don't set their own policy.

use crate::auth::AuthPolicy;
use nightjar_core::constants::DEFAULT_MAX_PEERS;
use std::net::SocketAddr;

/// The three mutually exclusive server modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerMode {
    /// Accept clients, persist payloads, participate in the mesh.
    Host,
    /// Accept clients, no persistence, participate in the mesh.
    Relay,
    /// Accept only authenticated clients, do not participate in the mesh.
    Private,
}

impl ServerMode {
    pub fn participates_in_mesh(self) -> bool {
        !matches!(self, ServerMode::Private)
    }

    pub fn persists_payloads(self) -> bool {
        matches!(self, ServerMode::Host)
    }
}

impl Default for ServerMode {
    fn default() -> Self {
        ServerMode::Host
    }
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub mode: ServerMode,
    pub bind_addr: SocketAddr,
    /// The `wss://` endpoint announced in the mesh, if relaying.
    pub public_url: Option<String>,
    pub max_peers_per_room: usize,
    /// Auth policy applied to a room the first time it is created; a room
    /// keeps whatever policy it was created with for its lifetime.
    pub default_auth_policy: AuthPolicy,
}

impl RelayConfig {
    pub fn new(mode: ServerMode, bind_addr: SocketAddr) -> Self {
        Self {
            mode,
            bind_addr,
            public_url: None,
            max_peers_per_room: DEFAULT_MAX_PEERS,
            default_auth_policy: AuthPolicy::Open,
        }
    }

    pub fn with_public_url(mut self, url: impl Into<String>) -> Self {
        self.public_url = Some(url.into());
        self
    }

    pub fn with_max_peers_per_room(mut self, max_peers: usize) -> Self {
        self.max_peers_per_room = max_peers;
        self
    }

    pub fn with_default_auth_policy(mut self, policy: AuthPolicy) -> Self {
        self.default_auth_policy = policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn private_mode_never_participates_in_mesh() {
        assert!(!ServerMode::Private.participates_in_mesh());
        assert!(ServerMode::Host.participates_in_mesh());
        assert!(ServerMode::Relay.participates_in_mesh());
    }

    #[test]
    fn only_host_mode_persists() {
        assert!(ServerMode::Host.persists_payloads());
        assert!(!ServerMode::Relay.persists_payloads());
        assert!(!ServerMode::Private.persists_payloads());
    }
}
