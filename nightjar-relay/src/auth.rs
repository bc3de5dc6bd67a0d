//! Room authentication policies.
//!
//! `open` admits anyone. `hmac_token` derives a per-room token from a
//! shared secret (reusing the HMAC/constant-time-compare shape of
//! [`nightjar_core::token`], but keyed by room id rather than by IP, since
//! the join URL carries no issuance timestamp to re-derive against).
//! `owner_gated` verifies an ed25519 signature over
//! `room_id || client_pubkey || timestamp`.

use crate::error::{RelayError, RelayResult};
use ed25519_dalek::{Signature, VerifyingKey};
use hmac::{Hmac, Mac};
use nightjar_core::constants::TOKEN_VALIDITY;
use sha2::Sha256;
use std::time::{SystemTime, UNIX_EPOCH};
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Proof of identity a client supplies when joining a room, carried in the
/// `identity` client message. `signature`/`timestamp` are only consulted
/// for `owner_gated` rooms.
#[derive(Debug, Clone)]
pub struct ClientCredentials<'a> {
    pub public_key: Option<&'a [u8]>,
    pub signature: Option<&'a [u8; 64]>,
    pub timestamp: Option<u64>,
}

#[derive(Debug, Clone)]
pub enum AuthPolicy {
    Open,
    HmacToken { secret: Vec<u8> },
    OwnerGated { owner_public_key: VerifyingKey },
}

impl AuthPolicy {
    /// Check a join attempt. `room_id` and `query_token` come from the
    /// WebSocket URL; `credentials` comes from the client's `identity`
    /// message, if one has arrived yet.
    pub fn authorize(
        &self,
        room_id: &str,
        query_token: Option<&str>,
        credentials: Option<&ClientCredentials<'_>>,
    ) -> RelayResult<()> {
        match self {
            AuthPolicy::Open => Ok(()),
            AuthPolicy::HmacToken { secret } => {
                let token = query_token.ok_or(RelayError::AuthRejected)?;
                if verify_room_token(room_id, secret, token) {
                    Ok(())
                } else {
                    Err(RelayError::AuthRejected)
                }
            }
            AuthPolicy::OwnerGated { owner_public_key } => {
                let creds = credentials.ok_or(RelayError::AuthRejected)?;
                let (public_key, signature, timestamp) = match (creds.public_key, creds.signature, creds.timestamp) {
                    (Some(pk), Some(sig), Some(ts)) => (pk, sig, ts),
                    _ => return Err(RelayError::AuthRejected),
                };
                if verify_owner_signature(owner_public_key, room_id, public_key, timestamp, signature) {
                    Ok(())
                } else {
                    Err(RelayError::AuthRejected)
                }
            }
        }
    }

    /// Whether this policy needs an `identity` message before it can decide
    /// (i.e. it cannot be resolved purely from the join URL).
    pub fn requires_identity(&self) -> bool {
        matches!(self, AuthPolicy::OwnerGated { .. })
    }
}

/// Derive the token a room's `hmac_token` policy expects: `hex(HMAC-SHA256(secret, room_id))`.
pub fn room_token(room_id: &str, secret: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts keys of any length");
    mac.update(room_id.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

fn verify_room_token(room_id: &str, secret: &[u8], candidate: &str) -> bool {
    let expected = room_token(room_id, secret);
    expected.as_bytes().ct_eq(candidate.as_bytes()).into()
}

fn verify_owner_signature(
    owner_public_key: &VerifyingKey,
    room_id: &str,
    client_public_key: &[u8],
    timestamp: u64,
    signature: &[u8; 64],
) -> bool {
    if !timestamp_is_fresh(timestamp) {
        return false;
    }
    let mut message = Vec::with_capacity(room_id.len() + client_public_key.len() + 8);
    message.extend_from_slice(room_id.as_bytes());
    message.extend_from_slice(client_public_key);
    message.extend_from_slice(&timestamp.to_be_bytes());

    let signature = Signature::from_bytes(signature);
    owner_public_key.verify_strict(&message, &signature).is_ok()
}

fn timestamp_is_fresh(timestamp: u64) -> bool {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    now.saturating_sub(timestamp) <= TOKEN_VALIDITY.as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::SigningKey;
    use rand::rngs::OsRng;

    #[test]
    fn open_policy_admits_anyone() {
        assert!(AuthPolicy::Open.authorize("room-1", None, None).is_ok());
    }

    #[test]
    fn hmac_token_accepts_the_derived_token() {
        let policy = AuthPolicy::HmacToken { secret: b"room-secret".to_vec() };
        let token = room_token("room-1", b"room-secret");
        assert!(policy.authorize("room-1", Some(&token), None).is_ok());
    }

    #[test]
    fn hmac_token_rejects_a_mismatched_token() {
        let policy = AuthPolicy::HmacToken { secret: b"room-secret".to_vec() };
        assert!(matches!(
            policy.authorize("room-1", Some("deadbeef"), None),
            Err(RelayError::AuthRejected)
        ));
    }

    #[test]
    fn hmac_token_rejects_a_missing_token() {
        let policy = AuthPolicy::HmacToken { secret: b"room-secret".to_vec() };
        assert!(matches!(policy.authorize("room-1", None, None), Err(RelayError::AuthRejected)));
    }

    #[test]
    fn owner_gated_accepts_a_valid_signature() {
        let signing_key = SigningKey::generate(&mut OsRng);
        let owner_public_key = signing_key.verifying_key();
        let client_public_key = b"client-pubkey-bytes";
        let timestamp = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs();

        let mut message = Vec::new();
        message.extend_from_slice(b"room-1".as_slice());
        message.extend_from_slice(client_public_key);
        message.extend_from_slice(&timestamp.to_be_bytes());
        let signature = {
            use ed25519_dalek::Signer;
            signing_key.sign(&message)
        };
        let sig_bytes = signature.to_bytes();

        let policy = AuthPolicy::OwnerGated { owner_public_key };
        let creds = ClientCredentials {
            public_key: Some(client_public_key),
            signature: Some(&sig_bytes),
            timestamp: Some(timestamp),
        };
        assert!(policy.authorize("room-1", None, Some(&creds)).is_ok());
    }

    #[test]
    fn owner_gated_rejects_a_stale_timestamp() {
        let signing_key = SigningKey::generate(&mut OsRng);
        let owner_public_key = signing_key.verifying_key();
        let client_public_key = b"client-pubkey-bytes";
        let stale_timestamp = 0u64;

        let mut message = Vec::new();
        message.extend_from_slice(b"room-1".as_slice());
        message.extend_from_slice(client_public_key);
        message.extend_from_slice(&stale_timestamp.to_be_bytes());
        let signature = {
            use ed25519_dalek::Signer;
            signing_key.sign(&message)
        };
        let sig_bytes = signature.to_bytes();

        let policy = AuthPolicy::OwnerGated { owner_public_key };
        let creds = ClientCredentials {
            public_key: Some(client_public_key),
            signature: Some(&sig_bytes),
            timestamp: Some(stale_timestamp),
        };
        assert!(matches!(
            policy.authorize("room-1", None, Some(&creds)),
            Err(RelayError::AuthRejected)
        ));
    }
}
