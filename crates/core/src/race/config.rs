//! Configuration for racing workers.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaceConfig {
    /// Upper bound for a request's `concurrency`.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Delay between worker starts when a request does not set one.
    #[serde(default = "default_stagger_ms")]
    pub default_stagger_ms: u64,

    /// Upper bound of the random delay added to each worker's start.
    #[serde(default = "default_stagger_jitter_ms")]
    pub stagger_jitter_ms: u64,
}

fn default_max_concurrency() -> usize {
    4
}

fn default_stagger_ms() -> u64 {
    1500
}

fn default_stagger_jitter_ms() -> u64 {
    250
}

impl Default for RaceConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            default_stagger_ms: default_stagger_ms(),
            stagger_jitter_ms: default_stagger_jitter_ms(),
        }
    }
}
