//! Idle-based heartbeat scheduling: send a ping after a quiet period, and
//! declare the connection dead if the pong does not arrive in time.

use nightjar_core::constants::{MUX_PING_INTERVAL, MUX_PONG_TIMEOUT};
use std::time::{Duration, Instant};

pub struct Heartbeat {
    ping_interval: Duration,
    pong_timeout: Duration,
    last_activity: Instant,
    pong_deadline: Option<Instant>,
}

impl Heartbeat {
    pub fn new() -> Self {
        Self::with_intervals(MUX_PING_INTERVAL, MUX_PONG_TIMEOUT)
    }

    pub fn with_intervals(ping_interval: Duration, pong_timeout: Duration) -> Self {
        Self {
            ping_interval,
            pong_timeout,
            last_activity: Instant::now(),
            pong_deadline: None,
        }
    }

    /// Any inbound frame resets the idle clock used to decide when to next
    /// send a ping. It does not by itself cancel a pending pong deadline —
    /// only [`Heartbeat::record_pong`] does that.
    pub fn record_activity(&mut self) {
        self.last_activity = Instant::now();
    }

    /// A pong cancels whatever ping is currently outstanding.
    pub fn record_pong(&mut self) {
        self.pong_deadline = None;
    }

    /// Whether the idle period has elapsed with no ping currently awaiting
    /// a pong.
    pub fn should_send_ping(&self) -> bool {
        self.should_send_ping_at(Instant::now())
    }

    fn should_send_ping_at(&self, now: Instant) -> bool {
        self.pong_deadline.is_none() && now.duration_since(self.last_activity) >= self.ping_interval
    }

    /// Call once a ping has actually been written to the wire.
    pub fn ping_sent(&mut self) {
        self.pong_deadline = Some(Instant::now() + self.pong_timeout);
    }

    /// Whether an outstanding ping's pong deadline has passed.
    pub fn is_timed_out(&self) -> bool {
        self.is_timed_out_at(Instant::now())
    }

    fn is_timed_out_at(&self, now: Instant) -> bool {
        matches!(self.pong_deadline, Some(deadline) if now >= deadline)
    }
}

impl Default for Heartbeat {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn does_not_ping_while_recently_active() {
        let hb = Heartbeat::with_intervals(Duration::from_secs(30), Duration::from_secs(10));
        assert!(!hb.should_send_ping_at(Instant::now()));
    }

    #[test]
    fn pings_after_the_idle_interval() {
        let hb = Heartbeat::with_intervals(Duration::from_millis(10), Duration::from_secs(10));
        let future = Instant::now() + Duration::from_millis(20);
        assert!(hb.should_send_ping_at(future));
    }

    #[test]
    fn pong_cancels_the_pending_timeout() {
        let mut hb = Heartbeat::with_intervals(Duration::from_millis(10), Duration::from_millis(20));
        hb.ping_sent();
        assert!(!hb.is_timed_out_at(Instant::now()));
        hb.record_pong();
        let future = Instant::now() + Duration::from_millis(50);
        assert!(!hb.is_timed_out_at(future));
    }

    #[test]
    fn missed_pong_times_out() {
        let mut hb = Heartbeat::with_intervals(Duration::from_millis(10), Duration::from_millis(20));
        hb.ping_sent();
        let future = Instant::now() + Duration::from_millis(25);
        assert!(hb.is_timed_out_at(future));
    }

    #[test]
    fn does_not_schedule_a_second_ping_while_one_is_outstanding() {
        let mut hb = Heartbeat::with_intervals(Duration::from_millis(1), Duration::from_secs(10));
        hb.ping_sent();
        let future = Instant::now() + Duration::from_secs(1);
        assert!(!hb.should_send_ping_at(future));
    }
}
