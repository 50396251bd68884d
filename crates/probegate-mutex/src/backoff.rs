//! Escalating backoff with symmetric jitter.
//!
//! The backoff sequence plateaus at its last entry; it never grows past
//! it. Jitter draws from the calling thread's RNG on every call, so
//! concurrent callers backing off from the same target spread out
//! instead of retrying in lockstep.

use std::time::Duration;

use rand::Rng;

use crate::config::saturating_duration;

/// Pick the base delay for `attempt` (1-based; 0 is treated as 1) from
/// `sequence`, without jitter.
pub fn base_backoff(sequence: &[Duration], attempt: u32) -> Duration {
    let Some(last) = sequence.len().checked_sub(1) else {
        return Duration::ZERO;
    };
    let index = (attempt.saturating_sub(1) as usize).min(last);
    sequence[index]
}

/// Base delay for `attempt` with `jitter_pct` jitter applied.
pub fn compute_backoff(sequence: &[Duration], jitter_pct: f64, attempt: u32) -> Duration {
    apply_jitter(base_backoff(sequence, attempt), jitter_pct)
}

/// Return a delay uniformly distributed in
/// `[base * (1 - jitter_pct), base * (1 + jitter_pct)]`, saturating at
/// [`Duration::MAX`].
pub fn apply_jitter(base: Duration, jitter_pct: f64) -> Duration {
    if base.is_zero() || jitter_pct <= 0.0 {
        return base;
    }
    let base_secs = base.as_secs_f64();
    let spread = base_secs * jitter_pct;
    let offset = rand::thread_rng().gen_range(-spread..=spread);
    saturating_duration(base_secs + offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_sequence() -> Vec<Duration> {
        vec![
            Duration::from_secs(2),
            Duration::from_secs(5),
            Duration::from_secs(10),
        ]
    }

    fn assert_within(d: Duration, lo: f64, hi: f64) {
        // Duration keeps nanosecond precision.
        let secs = d.as_secs_f64();
        assert!(
            (lo - 1e-9..=hi + 1e-9).contains(&secs),
            "{secs} not in [{lo}, {hi}]"
        );
    }

    #[test]
    fn base_backoff_escalates_then_plateaus() {
        let seq = default_sequence();
        assert_eq!(base_backoff(&seq, 1), Duration::from_secs(2));
        assert_eq!(base_backoff(&seq, 2), Duration::from_secs(5));
        assert_eq!(base_backoff(&seq, 3), Duration::from_secs(10));
        assert_eq!(base_backoff(&seq, 50), Duration::from_secs(10));
        assert_eq!(base_backoff(&seq, u32::MAX), Duration::from_secs(10));
    }

    #[test]
    fn attempt_zero_uses_first_step() {
        assert_eq!(base_backoff(&default_sequence(), 0), Duration::from_secs(2));
    }

    #[test]
    fn empty_sequence_yields_zero() {
        assert_eq!(base_backoff(&[], 3), Duration::ZERO);
    }

    #[test]
    fn compute_backoff_bounds() {
        let seq = default_sequence();
        for _ in 0..500 {
            assert_within(compute_backoff(&seq, 0.2, 1), 1.6, 2.4);
            assert_within(compute_backoff(&seq, 0.2, 2), 4.0, 6.0);
            assert_within(compute_backoff(&seq, 0.2, 5), 8.0, 12.0);
        }
    }

    #[test]
    fn jitter_bounds() {
        for base in [0.05, 1.0, 7.5, 300.0] {
            for _ in 0..200 {
                assert_within(
                    apply_jitter(Duration::from_secs_f64(base), 0.2),
                    base * 0.8,
                    base * 1.2,
                );
            }
        }
    }

    #[test]
    fn jitter_actually_varies() {
        let base = Duration::from_secs(10);
        let samples: Vec<Duration> = (0..50).map(|_| apply_jitter(base, 0.2)).collect();
        assert!(samples.iter().any(|d| *d != samples[0]));
    }

    #[test]
    fn jitter_saturates_near_duration_max() {
        let max = Duration::MAX.as_secs_f64();
        for _ in 0..200 {
            let jittered = apply_jitter(Duration::MAX, 0.2);
            assert!(jittered.as_secs_f64() >= max * 0.79);
        }
        assert_within(
            compute_backoff(&[Duration::from_secs_f64(1.5e19)], 0.2, 3),
            1.19e19,
            max,
        );
    }

    #[test]
    fn zero_jitter_or_zero_base_is_identity() {
        assert_eq!(apply_jitter(Duration::from_secs(3), 0.0), Duration::from_secs(3));
        assert_eq!(apply_jitter(Duration::ZERO, 0.2), Duration::ZERO);
    }
}
