//! The per-worker attempt engine.
//!
//! An [`AttemptMachine`] owns one browser session and drives it from login
//! to a terminal [`AttemptOutcome`]. Page drift is absorbed by the ordered
//! strategies in `strategy` and the structured row projection in `row`.

mod config;
mod machine;
mod row;
mod strategy;
mod types;

pub use config::{CarrierFilterConfig, EngineSettings, SiteConfig, SuccessProbe};
pub use machine::{AttemptMachine, AttemptState, PollSnapshot};
pub use row::{project_row, CarrierFilter, CellView, ResultRow};
pub use strategy::{
    activate_claim, apply_activation, apply_filter_strategy, detect_success,
    select_carrier_filter, ActivationStrategy, ClaimTarget, FilterStrategy, StrategyResult,
    CLICK_SCRIPT,
};
pub use types::*;
