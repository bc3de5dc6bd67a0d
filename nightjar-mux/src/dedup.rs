//! Per-peer sliding-window duplicate suppression.

use nightjar_core::constants::MUX_DEDUP_WINDOW;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::time::{Duration, Instant};

type Fingerprint = [u8; 32];

/// Tracks recently-seen `(type, content_hash)` fingerprints for one
/// connection, pruning anything older than [`MUX_DEDUP_WINDOW`].
///
/// Ping/pong and `bypassDedup`-tagged frames are never passed to
/// [`DedupWindow::check`] by the connection driver; this type has no
/// special-casing for them, it only ever sees frames the caller chose to
/// dedup-check.
pub struct DedupWindow {
    window: Duration,
    seen: HashMap<Fingerprint, Instant>,
}

impl DedupWindow {
    pub fn new() -> Self {
        Self::with_window(MUX_DEDUP_WINDOW)
    }

    pub fn with_window(window: Duration) -> Self {
        Self { window, seen: HashMap::new() }
    }

    /// Returns `true` if `(frame_type, content)` is a duplicate of
    /// something seen within the window (and should be suppressed); `false`
    /// if it is new (and is now recorded).
    pub fn check(&mut self, frame_type: &str, content: &[u8]) -> bool {
        self.check_at(frame_type, content, Instant::now())
    }

    fn check_at(&mut self, frame_type: &str, content: &[u8], now: Instant) -> bool {
        self.prune(now);
        let fp = fingerprint(frame_type, content);
        if self.seen.contains_key(&fp) {
            return true;
        }
        self.seen.insert(fp, now);
        false
    }

    fn prune(&mut self, now: Instant) {
        let window = self.window;
        self.seen.retain(|_, seen_at| now.duration_since(*seen_at) < window);
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

impl Default for DedupWindow {
    fn default() -> Self {
        Self::new()
    }
}

fn fingerprint(frame_type: &str, content: &[u8]) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(frame_type.as_bytes());
    hasher.update(b"\0");
    hasher.update(content);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sighting_is_never_a_duplicate() {
        let mut w = DedupWindow::new();
        assert!(!w.check("sync", b"payload"));
    }

    #[test]
    fn exact_repeat_within_window_is_suppressed() {
        let mut w = DedupWindow::new();
        assert!(!w.check("sync", b"payload"));
        assert!(w.check("sync", b"payload"));
    }

    #[test]
    fn differing_by_a_single_byte_is_never_suppressed() {
        let mut w = DedupWindow::new();
        assert!(!w.check("sync", b"payloadA"));
        assert!(!w.check("sync", b"payloadB"));
    }

    #[test]
    fn different_types_with_identical_content_are_distinct() {
        let mut w = DedupWindow::new();
        assert!(!w.check("sync", b"payload"));
        assert!(!w.check("awareness", b"payload"));
    }

    #[test]
    fn entries_expire_after_the_window_elapses() {
        let mut w = DedupWindow::with_window(Duration::from_millis(10));
        let t0 = Instant::now();
        assert!(!w.check_at("sync", b"payload", t0));
        assert!(w.check_at("sync", b"payload", t0 + Duration::from_millis(5)));
        assert!(!w.check_at("sync", b"payload", t0 + Duration::from_millis(50)));
    }
}
