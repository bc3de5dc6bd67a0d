//! Thin wrapper over [`nightjar_kernel::backoff`] for room reconnection
//! scheduling: kept as its own module so the reconnect loop in `bridge.rs`
//! reads as policy-then-mechanism rather than reaching into the kernel
//! crate directly at every call site.

use std::time::Duration;

/// Delay before the `attempt`'th reconnect (0-indexed).
pub fn next_delay(attempt: u32) -> Duration {
    nightjar_kernel::backoff(attempt)
}

/// Whether `attempt` has used up the retry budget; the caller should stop
/// scheduling automatic reconnects and move the room to `gave_up`.
pub fn is_exhausted(attempt: u32) -> bool {
    nightjar_kernel::has_exhausted_retries(attempt)
}
