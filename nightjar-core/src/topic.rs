//! Deterministic derivation of gossip topic identifiers.

use crate::constants::{MESH_TOPIC_V1, WORKSPACE_TOPIC_PREFIX};
use crate::error::{CoreError, CoreResult};
use sha2::{Digest, Sha256};
use std::fmt;

/// A 32-byte topic identifier, hex-encoded when it needs to travel as text.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Topic([u8; 32]);

impl Topic {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Topic({})", self.to_hex())
    }
}

/// The single well-known topic every participant subscribes to on join.
pub fn mesh_topic() -> Topic {
    let mut hasher = Sha256::new();
    hasher.update(MESH_TOPIC_V1.as_bytes());
    Topic(hasher.finalize().into())
}

/// Per-workspace topic, derived so peers who know only a workspace id can
/// independently arrive at the same gossip topic without a lookup.
///
/// Rejects an empty `workspace_id`: there is no well-defined topic for "no
/// workspace", and silently hashing the empty string would make it
/// indistinguishable from a workspace literally named `""`.
pub fn workspace_topic(workspace_id: &str) -> CoreResult<Topic> {
    if workspace_id.is_empty() {
        return Err(CoreError::EmptyWorkspaceId);
    }
    let mut hasher = Sha256::new();
    hasher.update(WORKSPACE_TOPIC_PREFIX.as_bytes());
    hasher.update(workspace_id.as_bytes());
    Ok(Topic(hasher.finalize().into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mesh_topic_is_stable() {
        assert_eq!(mesh_topic(), mesh_topic());
    }

    #[test]
    fn workspace_topic_is_pure() {
        let a = workspace_topic("docs-room").unwrap();
        let b = workspace_topic("docs-room").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_workspaces_get_distinct_topics() {
        let a = workspace_topic("docs-room").unwrap();
        let b = workspace_topic("other-room").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn workspace_topic_never_collides_with_mesh_topic() {
        let w = workspace_topic(MESH_TOPIC_V1).unwrap();
        assert_ne!(w, mesh_topic());
    }

    #[test]
    fn empty_workspace_id_is_rejected() {
        assert_eq!(workspace_topic(""), Err(CoreError::EmptyWorkspaceId));
    }
}
