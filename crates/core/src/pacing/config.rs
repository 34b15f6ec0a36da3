//! Pacing configuration.

use serde::{Deserialize, Serialize};

/// A delay that shrinks from `baseline_ms` at the lowest aggressiveness level
/// to `floor_ms` at the highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacingSpan {
    pub baseline_ms: u64,
    pub floor_ms: u64,
}

impl PacingSpan {
    pub const fn new(baseline_ms: u64, floor_ms: u64) -> Self {
        Self {
            baseline_ms,
            floor_ms,
        }
    }

    /// Interpolate at `t` in `[0, 1]`; 0 is the baseline, 1 the floor.
    pub fn at(&self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        let baseline = self.baseline_ms as f64;
        let floor = self.floor_ms as f64;
        (baseline + (floor - baseline) * t).max(0.0)
    }
}

/// Configuration for poll pacing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacingConfig {
    #[serde(default = "default_min_level")]
    pub min_level: u8,

    #[serde(default = "default_max_level")]
    pub max_level: u8,

    /// Level used when a request does not specify one.
    #[serde(default = "default_level")]
    pub default_level: u8,

    #[serde(default = "default_implicit_wait")]
    pub implicit_wait: PacingSpan,

    /// Sleep after a poll that found no rows.
    #[serde(default = "default_no_rows")]
    pub no_rows: PacingSpan,

    /// Sleep after a poll with rows but nothing claimable.
    #[serde(default = "default_rows_no_claim")]
    pub rows_no_claim: PacingSpan,

    /// Sleep after a poll where a claim was attempted and lost.
    #[serde(default = "default_claim_attempted")]
    pub claim_attempted: PacingSpan,

    /// Upper bound of the random jitter added to every sleep.
    #[serde(default = "default_jitter")]
    pub jitter: PacingSpan,

    /// Delay before retrying a login rejected with a transient dialog.
    #[serde(default = "default_auth_retry")]
    pub auth_retry: PacingSpan,
}

fn default_min_level() -> u8 {
    1
}

fn default_max_level() -> u8 {
    5
}

fn default_level() -> u8 {
    3
}

fn default_implicit_wait() -> PacingSpan {
    PacingSpan::new(8000, 2000)
}

fn default_no_rows() -> PacingSpan {
    PacingSpan::new(4000, 1000)
}

fn default_rows_no_claim() -> PacingSpan {
    PacingSpan::new(2000, 600)
}

fn default_claim_attempted() -> PacingSpan {
    PacingSpan::new(1000, 300)
}

fn default_jitter() -> PacingSpan {
    PacingSpan::new(1500, 300)
}

fn default_auth_retry() -> PacingSpan {
    PacingSpan::new(3000, 1000)
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            min_level: default_min_level(),
            max_level: default_max_level(),
            default_level: default_level(),
            implicit_wait: default_implicit_wait(),
            no_rows: default_no_rows(),
            rows_no_claim: default_rows_no_claim(),
            claim_attempted: default_claim_attempted(),
            jitter: default_jitter(),
            auth_retry: default_auth_retry(),
        }
    }
}
