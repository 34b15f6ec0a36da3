//! Poll pacing.
//!
//! A single aggressiveness level moves every delay between its baseline
//! (lowest level) and its floor (highest level). Higher levels never yield
//! longer delays, and no delay is ever negative.

mod config;

pub use config::{PacingConfig, PacingSpan};

use rand::Rng;
use std::time::Duration;

/// What the last poll saw, which decides how long to sleep before the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollTier {
    NoRows,
    RowsNoClaim,
    ClaimAttempted,
}

impl PollTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoRows => "no_rows",
            Self::RowsNoClaim => "rows_no_claim",
            Self::ClaimAttempted => "claim_attempted",
        }
    }
}

/// Delays for one aggressiveness level.
#[derive(Debug, Clone)]
pub struct PacingController {
    config: PacingConfig,
    level: u8,
    t: f64,
}

impl PacingController {
    /// Build a controller; `level` is clamped into the configured bounds and
    /// defaults to `default_level` when absent.
    pub fn new(config: PacingConfig, level: Option<u8>) -> Self {
        let min = config.min_level.min(config.max_level);
        let max = config.max_level.max(config.min_level);
        let level = level.unwrap_or(config.default_level).clamp(min, max);
        let t = if max == min {
            0.0
        } else {
            (level - min) as f64 / (max - min) as f64
        };
        Self { config, level, t }
    }

    pub fn level(&self) -> u8 {
        self.level
    }

    pub fn implicit_wait(&self) -> Duration {
        ms(self.config.implicit_wait.at(self.t))
    }

    pub fn auth_retry_delay(&self, jitter_fraction: f64) -> Duration {
        ms(self.config.auth_retry.at(self.t) + self.jitter_ms(jitter_fraction))
    }

    /// Deterministic sleep for `tier` with `jitter_fraction` in `[0, 1]` of the
    /// jitter bound.
    pub fn sleep_for(&self, tier: PollTier, jitter_fraction: f64) -> Duration {
        let span = match tier {
            PollTier::NoRows => self.config.no_rows,
            PollTier::RowsNoClaim => self.config.rows_no_claim,
            PollTier::ClaimAttempted => self.config.claim_attempted,
        };
        ms(span.at(self.t) + self.jitter_ms(jitter_fraction))
    }

    /// Sleep for `tier` with a random jitter.
    pub fn next_sleep(&self, tier: PollTier) -> Duration {
        self.sleep_for(tier, rand::rng().random_range(0.0..=1.0))
    }

    /// Login retry delay with a random jitter.
    pub fn next_auth_retry(&self) -> Duration {
        self.auth_retry_delay(rand::rng().random_range(0.0..=1.0))
    }

    fn jitter_ms(&self, fraction: f64) -> f64 {
        self.config.jitter.at(self.t) * fraction.clamp(0.0, 1.0)
    }
}

fn ms(value: f64) -> Duration {
    Duration::from_micros((value.max(0.0) * 1000.0) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller(level: u8) -> PacingController {
        PacingController::new(PacingConfig::default(), Some(level))
    }

    #[test]
    fn test_level_clamped_and_defaulted() {
        assert_eq!(controller(0).level(), 1);
        assert_eq!(controller(9).level(), 5);
        assert_eq!(PacingController::new(PacingConfig::default(), None).level(), 3);
    }

    #[test]
    fn test_endpoints_match_baseline_and_floor() {
        assert_eq!(controller(1).implicit_wait(), Duration::from_secs(8));
        assert_eq!(controller(5).implicit_wait(), Duration::from_secs(2));
        assert_eq!(
            controller(1).sleep_for(PollTier::NoRows, 0.0),
            Duration::from_millis(4000)
        );
        assert_eq!(
            controller(5).sleep_for(PollTier::NoRows, 0.0),
            Duration::from_millis(1000)
        );
        assert_eq!(
            controller(1).sleep_for(PollTier::RowsNoClaim, 1.0),
            Duration::from_millis(3500)
        );
    }

    #[test]
    fn test_monotonic_non_increasing() {
        let tiers = [PollTier::NoRows, PollTier::RowsNoClaim, PollTier::ClaimAttempted];
        for tier in tiers {
            for jitter in [0.0, 0.5, 1.0] {
                let mut previous = Duration::MAX;
                for level in 1..=5 {
                    let sleep = controller(level).sleep_for(tier, jitter);
                    assert!(sleep <= previous, "{:?} level {} grew", tier, level);
                    previous = sleep;
                }
            }
        }

        let mut previous = Duration::MAX;
        for level in 1..=5 {
            let wait = controller(level).implicit_wait();
            assert!(wait <= previous);
            previous = wait;
        }
    }

    #[test]
    fn test_tier_ordering() {
        let c = controller(3);
        assert!(c.sleep_for(PollTier::NoRows, 0.0) > c.sleep_for(PollTier::RowsNoClaim, 0.0));
        assert!(
            c.sleep_for(PollTier::RowsNoClaim, 0.0) > c.sleep_for(PollTier::ClaimAttempted, 0.0)
        );
    }

    #[test]
    fn test_random_sleep_within_bounds() {
        let c = controller(2);
        let low = c.sleep_for(PollTier::ClaimAttempted, 0.0);
        let high = c.sleep_for(PollTier::ClaimAttempted, 1.0);
        for _ in 0..50 {
            let sleep = c.next_sleep(PollTier::ClaimAttempted);
            assert!(sleep >= low && sleep <= high);
        }
    }

    #[test]
    fn test_degenerate_bounds() {
        let config = PacingConfig {
            min_level: 3,
            max_level: 3,
            ..Default::default()
        };
        let c = PacingController::new(config, Some(5));
        assert_eq!(c.level(), 3);
        assert_eq!(c.implicit_wait(), Duration::from_secs(8));
    }

    #[test]
    fn test_never_negative() {
        let config = PacingConfig {
            no_rows: PacingSpan::new(0, 0),
            jitter: PacingSpan::new(0, 0),
            ..Default::default()
        };
        let c = PacingController::new(config, Some(5));
        assert_eq!(c.sleep_for(PollTier::NoRows, 1.0), Duration::ZERO);
    }
}
