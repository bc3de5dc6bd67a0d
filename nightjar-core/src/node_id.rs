//! Node identity: 32 random bytes, hex-encoded on the wire.

use crate::error::{CoreError, CoreResult};
use rand::RngCore;
use std::fmt;

/// A node's identity for the lifetime of a process.
///
/// Stable across reconnects; may be persisted to disk and reused across
/// restarts by the embedding application. Equality and hashing operate on
/// the raw bytes.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId([u8; 32]);

impl NodeId {
    /// Generate a fresh, random node id.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Wrap an already-known 32-byte identifier.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Parse a 64-char lowercase hex string (the `H64` wire format, §6).
    pub fn from_hex(s: &str) -> CoreResult<Self> {
        let decoded = hex::decode(s).map_err(|_| CoreError::InvalidHex)?;
        let bytes: [u8; 32] = decoded.try_into().map_err(|_| CoreError::InvalidHex)?;
        Ok(Self(bytes))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.to_hex())
    }
}

impl serde::Serialize for NodeId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> serde::Deserialize<'de> for NodeId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NodeId::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_produces_distinct_ids() {
        let a = NodeId::generate();
        let b = NodeId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn hex_round_trip() {
        let id = NodeId::generate();
        let hex = id.to_hex();
        assert_eq!(hex.len(), 64);
        let parsed = NodeId::from_hex(&hex).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn rejects_malformed_hex() {
        assert!(NodeId::from_hex("not-hex").is_err());
        assert!(NodeId::from_hex("ab").is_err());
    }

    #[test]
    fn serde_round_trip() {
        let id = NodeId::generate();
        let json = serde_json::to_string(&id).unwrap();
        let parsed: NodeId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }
}
