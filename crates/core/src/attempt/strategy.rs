//! Ordered fallback strategies.
//!
//! Each step that is prone to page drift (selecting the carrier filter,
//! activating a claim control, recognising the success page) has a fixed
//! list of named strategies tried in order. Every attempt reports a tagged
//! [`StrategyResult`] so the log shows which one won or why each failed.

use std::fmt;
use std::time::Duration;

use serde_json::Value;

use crate::driver::wait::poll_until;
use crate::driver::{keys, Driver, ElementRef, Locator};
use crate::layout::ColumnRole;
use crate::session::WorkerLog;

use super::config::{CarrierFilterConfig, SiteConfig, SuccessProbe};
use super::types::SeatKind;

/// Clicks through script, bypassing overlays that intercept pointer events.
pub const CLICK_SCRIPT: &str = "arguments[0].click();";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrategyResult {
    Applied,
    /// The strategy had nothing to work with (not configured, no control).
    Skipped(String),
    Failed(String),
}

impl StrategyResult {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }
}

impl fmt::Display for StrategyResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Applied => write!(f, "applied"),
            Self::Skipped(why) => write!(f, "skipped ({})", why),
            Self::Failed(why) => write!(f, "failed ({})", why),
        }
    }
}

/// Ways to locate the carrier filter control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterStrategy {
    FixedPosition,
    StructuralSibling,
    AttributeScan,
}

impl FilterStrategy {
    pub const ORDER: [FilterStrategy; 3] = [
        Self::FixedPosition,
        Self::StructuralSibling,
        Self::AttributeScan,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FixedPosition => "fixed_position",
            Self::StructuralSibling => "structural_sibling",
            Self::AttributeScan => "attribute_scan",
        }
    }
}

async fn click_found(driver: &dyn Driver, locator: &Locator) -> StrategyResult {
    match driver.find(locator).await {
        Ok(el) => match driver.click(&el).await {
            Ok(()) => StrategyResult::Applied,
            Err(e) => StrategyResult::Failed(e.to_string()),
        },
        Err(e) => StrategyResult::Failed(e.to_string()),
    }
}

pub async fn apply_filter_strategy(
    driver: &dyn Driver,
    config: &CarrierFilterConfig,
    carrier: &str,
    strategy: FilterStrategy,
) -> StrategyResult {
    match strategy {
        FilterStrategy::FixedPosition => match &config.fixed_position {
            Some(locator) => click_found(driver, locator).await,
            None => StrategyResult::Skipped("no fixed position configured".into()),
        },
        FilterStrategy::StructuralSibling => match &config.sibling_template {
            Some(template) => {
                let locator = Locator::xpath(template.replace("{carrier}", carrier));
                click_found(driver, &locator).await
            }
            None => StrategyResult::Skipped("no sibling template configured".into()),
        },
        FilterStrategy::AttributeScan => {
            let candidates = match driver.find_all(&config.scan).await {
                Ok(found) => found,
                Err(e) => return StrategyResult::Failed(e.to_string()),
            };
            let needle = carrier.to_lowercase();
            for candidate in &candidates {
                for name in &config.scan_attributes {
                    let matches = matches!(
                        driver.attribute(candidate, name).await,
                        Ok(Some(value)) if value.to_lowercase().contains(&needle)
                    );
                    if matches {
                        return match driver.click(candidate).await {
                            Ok(()) => StrategyResult::Applied,
                            Err(e) => StrategyResult::Failed(e.to_string()),
                        };
                    }
                }
            }
            StrategyResult::Failed(format!(
                "none of {} controls mention {}",
                candidates.len(),
                carrier
            ))
        }
    }
}

/// Try every filter strategy in order; `None` when all fail.
pub async fn select_carrier_filter(
    driver: &dyn Driver,
    config: &CarrierFilterConfig,
    carrier: &str,
    log: &WorkerLog,
) -> Option<FilterStrategy> {
    for strategy in FilterStrategy::ORDER {
        let result = apply_filter_strategy(driver, config, carrier, strategy).await;
        if result.is_applied() {
            log.info(format!("carrier filter {} via {}", carrier, strategy.as_str()));
            return Some(strategy);
        }
        tracing::debug!(worker = log.worker(), strategy = strategy.as_str(), %result, "carrier filter strategy");
    }
    log.warn(format!("could not select carrier filter for {}", carrier));
    None
}

/// A claimable cell chosen during evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimTarget {
    /// 1-based row position.
    pub row: usize,
    /// 1-based column position.
    pub column: usize,
    pub role: ColumnRole,
    pub seat: Option<SeatKind>,
    pub control: Option<ElementRef>,
    pub label: String,
}

impl ClaimTarget {
    pub fn describe(&self) -> String {
        format!("row {} {} ({})", self.row, self.role.as_str(), self.label)
    }
}

/// Ways to activate a claim control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationStrategy {
    Click,
    KeyboardEnter,
    DirectPath,
}

impl ActivationStrategy {
    pub const ORDER: [ActivationStrategy; 3] = [Self::Click, Self::KeyboardEnter, Self::DirectPath];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Click => "click",
            Self::KeyboardEnter => "keyboard",
            Self::DirectPath => "direct_path",
        }
    }
}

pub async fn apply_activation(
    driver: &dyn Driver,
    site: &SiteConfig,
    target: &ClaimTarget,
    strategy: ActivationStrategy,
) -> StrategyResult {
    let result = match strategy {
        ActivationStrategy::Click => match &target.control {
            Some(control) => driver.click(control).await,
            None => return StrategyResult::Skipped("no control reference".into()),
        },
        ActivationStrategy::KeyboardEnter => match &target.control {
            Some(control) => driver.send_keys(control, keys::ENTER).await,
            None => return StrategyResult::Skipped("no control reference".into()),
        },
        ActivationStrategy::DirectPath => {
            let Some(locator) = site.control_path_for(target.row, target.column) else {
                return StrategyResult::Skipped("rows locator is not css".into());
            };
            match driver.find(&locator).await {
                Ok(el) => driver
                    .execute_script(CLICK_SCRIPT, vec![el.to_wire()])
                    .await
                    .map(|_: Value| ()),
                Err(e) => Err(e),
            }
        }
    };

    match result {
        Ok(()) => StrategyResult::Applied,
        Err(e) => StrategyResult::Failed(e.to_string()),
    }
}

/// Try every activation strategy in order; `None` when all fail.
pub async fn activate_claim(
    driver: &dyn Driver,
    site: &SiteConfig,
    target: &ClaimTarget,
    log: &WorkerLog,
) -> Option<ActivationStrategy> {
    let mut failures = Vec::new();
    for strategy in ActivationStrategy::ORDER {
        let result = apply_activation(driver, site, target, strategy).await;
        if result.is_applied() {
            if !failures.is_empty() {
                log.info(format!(
                    "{} activated via {} after {}",
                    target.describe(),
                    strategy.as_str(),
                    failures.join(", ")
                ));
            }
            return Some(strategy);
        }
        failures.push(format!("{} {}", strategy.as_str(), result));
    }
    log.warn(format!("could not activate {}: {}", target.describe(), failures.join(", ")));
    None
}

async fn probe_matches(driver: &dyn Driver, probe: &SuccessProbe) -> bool {
    match probe {
        SuccessProbe::Marker(locator) => driver
            .find_all(locator)
            .await
            .map(|found| !found.is_empty())
            .unwrap_or(false),
        SuccessProbe::UrlContains(fragment) => driver
            .current_url()
            .await
            .map(|url| url.contains(fragment.as_str()))
            .unwrap_or(false),
    }
}

/// Index of the first probe that matches within `timeout`.
pub async fn detect_success(
    driver: &dyn Driver,
    probes: &[SuccessProbe],
    timeout: Duration,
) -> Option<usize> {
    if probes.is_empty() {
        return None;
    }
    poll_until(timeout, || async {
        for (i, probe) in probes.iter().enumerate() {
            if probe_matches(driver, probe).await {
                return Some(i);
            }
        }
        None
    })
    .await
}
