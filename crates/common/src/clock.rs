//! Timing helpers for frame-stepped capture.
//!
//! During capture the render surface no longer follows wall-clock time; the
//! page renders frame `i` at `start + i / fps`. The host only needs:
//! - Converting a duration into a frame count
//! - Bounded retry schedules for polling the surface

use std::time::Duration;

/// Number of frames needed to cover `duration_secs` at `fps`.
///
/// Rounds to the nearest frame. Returns 0 for non-positive inputs; callers
/// validate before relying on the result.
pub fn frame_count(duration_secs: f64, fps: u32) -> u64 {
    if !duration_secs.is_finite() || duration_secs <= 0.0 || fps == 0 {
        return 0;
    }
    (duration_secs * fps as f64).round() as u64
}

/// A bounded retry schedule: `attempts` checks spaced `interval` apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrySchedule {
    pub attempts: u32,
    pub interval: Duration,
}

impl RetrySchedule {
    pub fn new(attempts: u32, interval: Duration) -> Self {
        Self { attempts, interval }
    }

    /// Upper bound on the time spent before giving up.
    pub fn timeout(&self) -> Duration {
        self.interval * self.attempts
    }
}

impl Default for RetrySchedule {
    fn default() -> Self {
        Self::new(20, Duration::from_millis(500))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_frame_count_rounds() {
        assert_eq!(frame_count(1.0, 10), 10);
        assert_eq!(frame_count(1.04, 10), 10);
        assert_eq!(frame_count(1.05, 10), 11);
        assert_eq!(frame_count(0.0, 60), 0);
        assert_eq!(frame_count(f64::NAN, 60), 0);
        assert_eq!(frame_count(3.0, 0), 0);
    }

    #[test]
    fn test_default_retry_schedule_times_out_after_ten_seconds() {
        let schedule = RetrySchedule::default();
        assert_eq!(schedule.attempts, 20);
        assert_eq!(schedule.timeout(), Duration::from_secs(10));
    }

    proptest! {
        #[test]
        fn frame_count_matches_rounded_product(duration in 0.01f64..600.0, fps in 1u32..240) {
            let expected = (duration * fps as f64).round() as u64;
            prop_assert_eq!(frame_count(duration, fps), expected);
        }
    }
}
