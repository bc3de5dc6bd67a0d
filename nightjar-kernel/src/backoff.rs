//! Jittered exponential backoff, shared by the mesh participant, relay
//! server and relay bridge wherever a connection attempt needs a retry
//! schedule.

use nightjar_core::constants::{BACKOFF_INITIAL, BACKOFF_JITTER, BACKOFF_MAX, BACKOFF_MAX_RETRIES, BACKOFF_MULT};
use rand::Rng;
use std::time::Duration;

/// Compute the delay before retry attempt `attempt` (0-indexed).
///
/// `delay(n) = min(INITIAL * MULT^n, MAX) * (1 +/- JITTER)`. Jitter is
/// applied after capping, so once `attempt` is large enough to saturate the
/// cap the realized delay hovers around `MAX +/- JITTER` rather than
/// growing further (matches "capped at 60s +/- 30%" in the retry scenario).
pub fn backoff(attempt: u32) -> Duration {
    backoff_with_rng(attempt, &mut rand::thread_rng())
}

/// Whether `attempt` has exhausted the retry budget and the caller should
/// stop scheduling further reconnects on its own.
pub fn has_exhausted_retries(attempt: u32) -> bool {
    attempt >= BACKOFF_MAX_RETRIES
}

fn backoff_with_rng(attempt: u32, rng: &mut impl Rng) -> Duration {
    let base = BACKOFF_INITIAL.as_secs_f64() * BACKOFF_MULT.powi(attempt as i32);
    let capped = base.min(BACKOFF_MAX.as_secs_f64());
    let jitter = rng.gen_range(-BACKOFF_JITTER..=BACKOFF_JITTER);
    let jittered = (capped * (1.0 + jitter)).max(0.0);
    Duration::from_secs_f64(jittered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::mock::StepRng;

    fn rng_at_fraction(fraction: u64) -> StepRng {
        // StepRng with a fixed starting value produces a deterministic,
        // repeatable draw from `gen_range` for a single call.
        StepRng::new(fraction, 0)
    }

    #[test]
    fn first_attempt_is_near_initial_delay() {
        let mut rng = rng_at_fraction(u64::MAX / 2);
        let d = backoff_with_rng(0, &mut rng);
        assert!(d.as_secs_f64() >= BACKOFF_INITIAL.as_secs_f64() * (1.0 - BACKOFF_JITTER) - 0.01);
        assert!(d.as_secs_f64() <= BACKOFF_INITIAL.as_secs_f64() * (1.0 + BACKOFF_JITTER) + 0.01);
    }

    #[test]
    fn grows_exponentially_before_the_cap() {
        let mut rng = rng_at_fraction(u64::MAX / 2);
        let d0 = backoff_with_rng(0, &mut rng).as_secs_f64();
        let mut rng2 = rng_at_fraction(u64::MAX / 2);
        let d1 = backoff_with_rng(1, &mut rng2).as_secs_f64();
        assert!(d1 > d0);
    }

    #[test]
    fn never_exceeds_the_cap_plus_jitter() {
        for attempt in 0..30 {
            let mut rng = rand::thread_rng();
            let d = backoff_with_rng(attempt, &mut rng).as_secs_f64();
            assert!(d <= BACKOFF_MAX.as_secs_f64() * (1.0 + BACKOFF_JITTER) + 0.001);
        }
    }

    #[test]
    fn large_attempts_hover_around_the_cap() {
        let mut rng = rng_at_fraction(0);
        let d = backoff_with_rng(20, &mut rng).as_secs_f64();
        assert!(d >= BACKOFF_MAX.as_secs_f64() * (1.0 - BACKOFF_JITTER) - 0.01);
    }

    #[test]
    fn retry_budget_is_exhausted_at_the_configured_count() {
        assert!(!has_exhausted_retries(BACKOFF_MAX_RETRIES - 1));
        assert!(has_exhausted_retries(BACKOFF_MAX_RETRIES));
    }
}
