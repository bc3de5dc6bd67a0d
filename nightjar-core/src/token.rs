//! Short-lived, IP-bound tokens handed out to relays announcing themselves.
//!
//! A token is an HMAC-SHA256 over the claimant's IP address and an issuance
//! timestamp, keyed by a secret shared out of band. It is not a capability
//! token or a session credential: it only proves "whoever asked for this
//! token, at this time, was talking from this IP".

use crate::constants::TOKEN_VALIDITY;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::{SystemTime, UNIX_EPOCH};
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Issue a token for `ip`, valid from now until the returned unix timestamp.
///
/// Returns `(token, expires_at)` where `expires_at` is seconds since the
/// epoch. The issuance time itself must be kept by the caller and supplied
/// back to [`verify_token`].
pub fn issue_token(ip: &str, secret: &[u8]) -> (String, u64) {
    let issued_at = unix_now();
    let token = compute_token(ip, secret, issued_at);
    (token, issued_at + TOKEN_VALIDITY.as_secs())
}

/// Check a token against the claimed `ip`, `secret` and `issued_at`.
///
/// Returns `false` once `issued_at + TOKEN_VALIDITY` has passed, or if the
/// token does not match what [`issue_token`] would have produced for the
/// same inputs. The comparison is constant-time so a network attacker
/// timing responses cannot recover the token byte by byte.
pub fn verify_token(token: &str, ip: &str, secret: &[u8], issued_at: u64) -> bool {
    verify_token_at(token, ip, secret, issued_at, unix_now())
}

fn verify_token_at(token: &str, ip: &str, secret: &[u8], issued_at: u64, now: u64) -> bool {
    if now.saturating_sub(issued_at) > TOKEN_VALIDITY.as_secs() {
        return false;
    }
    let expected = compute_token(ip, secret, issued_at);
    expected.as_bytes().ct_eq(token.as_bytes()).into()
}

fn compute_token(ip: &str, secret: &[u8], issued_at: u64) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts keys of any length");
    mac.update(ip.as_bytes());
    mac.update(&issued_at.to_be_bytes());
    hex::encode(mac.finalize().into_bytes())
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the unix epoch")
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"shared-relay-secret";

    #[test]
    fn issued_token_verifies_immediately() {
        let (token, _) = issue_token("203.0.113.9", SECRET);
        let issued_at = unix_now();
        assert!(verify_token_at(&token, "203.0.113.9", SECRET, issued_at, issued_at));
    }

    #[test]
    fn token_is_bound_to_the_issuing_ip() {
        let issued_at = 1_700_000_000;
        let token = compute_token("203.0.113.9", SECRET, issued_at);
        assert!(!verify_token_at(&token, "198.51.100.4", SECRET, issued_at, issued_at));
    }

    #[test]
    fn token_expires_after_the_validity_window() {
        let issued_at = 1_700_000_000;
        let token = compute_token("203.0.113.9", SECRET, issued_at);
        let still_valid = issued_at + TOKEN_VALIDITY.as_secs();
        let expired = still_valid + 1;
        assert!(verify_token_at(&token, "203.0.113.9", SECRET, issued_at, still_valid));
        assert!(!verify_token_at(&token, "203.0.113.9", SECRET, issued_at, expired));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let issued_at = 1_700_000_000;
        let token = compute_token("203.0.113.9", SECRET, issued_at);
        assert!(!verify_token_at(&token, "203.0.113.9", b"other-secret", issued_at, issued_at));
    }
}
