//! The per-worker attempt state machine.
//!
//! One machine drives one browser session from login to a terminal state:
//!
//! ```text
//! Authenticating -> Navigating -> Configuring -> Polling -> Evaluating
//!                                                  ^            |
//!                                                  |            v
//!                                      Sleeping <- Retreating <- Claiming
//! ```
//!
//! Cancellation is checked at every state boundary and before each claim;
//! sleeps race against the cancel signal. A claim in flight is never
//! interrupted.

use std::fmt;
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

use crate::driver::wait::{wait_for_dialog, wait_for_elements, wait_for_new_window};
use crate::driver::{Driver, DriverError, ElementRef, Locator};
use crate::layout::{detect_columns, ColumnMap, ColumnRole};
use crate::metrics;
use crate::pacing::{PacingController, PollTier};
use crate::schedule::{parse_slot_minutes, resolve_slot, ResolvedSlot};
use crate::session::{CancelSignal, WorkerLog};

use super::config::EngineSettings;
use super::row::{project_row, CarrierFilter, ResultRow};
use super::strategy::{activate_claim, detect_success, select_carrier_filter, ClaimTarget, CLICK_SCRIPT};
use super::types::{AttemptOutcome, AttemptRequest, ClaimMode, ErrorKind};

const SELECT_SCRIPT: &str = r#"
const select = arguments[0];
const wanted = arguments[1];
const option = Array.from(select.options).find(o => o.value === wanted);
if (!option) { return false; }
select.style.display = '';
select.value = option.value;
select.dispatchEvent(new Event('change', { bubbles: true }));
return true;
"#;

/// Rows seen by one poll, after the carrier filter and `num_to_check` cap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollSnapshot {
    pub number: u64,
    /// Rows present in the table before filtering.
    pub raw_rows: usize,
    pub rows: Vec<ResultRow>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptState {
    Authenticating,
    Navigating,
    Configuring,
    Polling,
    Evaluating(PollSnapshot),
    Claiming {
        targets: Vec<ClaimTarget>,
        next: usize,
    },
    Retreating {
        targets: Vec<ClaimTarget>,
        next: usize,
        /// The claim navigated away from the results page.
        left_results: bool,
    },
    Sleeping(PollTier),
    Succeeded(ClaimTarget),
    Cancelled,
    Failed(ErrorKind, String),
}

impl AttemptState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Authenticating => "authenticating",
            Self::Navigating => "navigating",
            Self::Configuring => "configuring",
            Self::Polling => "polling",
            Self::Evaluating(_) => "evaluating",
            Self::Claiming { .. } => "claiming",
            Self::Retreating { .. } => "retreating",
            Self::Sleeping(_) => "sleeping",
            Self::Succeeded(_) => "succeeded",
            Self::Cancelled => "cancelled",
            Self::Failed(..) => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded(_) | Self::Cancelled | Self::Failed(..))
    }
}

impl fmt::Display for AttemptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error)]
enum AttemptError {
    #[error("cancelled")]
    Cancelled,

    #[error("login failed: {0}")]
    Authentication(String),

    #[error("search page blocked: {0}")]
    NavigationBlocked(String),

    #[error("date unavailable: {0}")]
    DateUnavailable(String),

    #[error(transparent)]
    Driver(#[from] DriverError),
}

impl AttemptError {
    fn into_state(self) -> AttemptState {
        let kind = match &self {
            Self::Cancelled => return AttemptState::Cancelled,
            Self::Authentication(_) => ErrorKind::AuthenticationFailed,
            Self::NavigationBlocked(_) => ErrorKind::NavigationBlocked,
            Self::DateUnavailable(_) => ErrorKind::DateUnavailable,
            Self::Driver(_) => ErrorKind::Unexpected,
        };
        AttemptState::Failed(kind, self.to_string())
    }
}

enum ClaimResult {
    Confirmed,
    Lost { left_results: bool },
    NotActivated,
}

struct SelectOption {
    value: String,
    text: String,
}

/// Drives one worker's browser session to a terminal [`AttemptOutcome`].
pub struct AttemptMachine<'a> {
    request: &'a AttemptRequest,
    settings: &'a EngineSettings,
    driver: &'a dyn Driver,
    cancel: &'a CancelSignal,
    log: WorkerLog,
    pacing: PacingController,
    columns: Option<ColumnMap>,
    carrier: CarrierFilter,
    polls: u64,
}

impl<'a> AttemptMachine<'a> {
    pub fn new(
        request: &'a AttemptRequest,
        settings: &'a EngineSettings,
        driver: &'a dyn Driver,
        cancel: &'a CancelSignal,
        log: WorkerLog,
    ) -> Self {
        Self {
            request,
            settings,
            driver,
            cancel,
            log,
            pacing: PacingController::new(settings.pacing.clone(), request.aggressiveness),
            columns: None,
            carrier: CarrierFilter::new(request.carrier.as_deref()),
            polls: 0,
        }
    }

    pub async fn run(mut self) -> AttemptOutcome {
        let worker = self.request.worker_index;
        let mut state = AttemptState::Authenticating;

        while !state.is_terminal() {
            let from = state.name();
            state = if self.cancel.is_set() {
                AttemptState::Cancelled
            } else {
                match self.step(state).await {
                    Ok(next) => next,
                    Err(e) => e.into_state(),
                }
            };
            debug!(worker, from, to = state.name(), "attempt transition");
        }

        match state {
            AttemptState::Succeeded(target) => {
                let what = match self.request.mode {
                    ClaimMode::Reserve => "reservation",
                    ClaimMode::Waitlist => "waitlist entry",
                };
                self.log.success(format!("{} secured: {}", what, target.describe()));
                AttemptOutcome::succeeded(worker, self.request.mode, target.seat)
            }
            AttemptState::Failed(kind, message) => {
                self.log.error(&message);
                AttemptOutcome::failed(Some(worker), kind, message)
            }
            _ => {
                self.log.info("stopped");
                AttemptOutcome::cancelled(Some(worker))
            }
        }
    }

    async fn step(&mut self, state: AttemptState) -> Result<AttemptState, AttemptError> {
        let next = match state {
            AttemptState::Authenticating => {
                self.authenticate().await?;
                AttemptState::Navigating
            }
            AttemptState::Navigating => {
                self.open_search().await?;
                AttemptState::Configuring
            }
            AttemptState::Configuring => {
                self.configure().await?;
                AttemptState::Polling
            }
            AttemptState::Polling => AttemptState::Evaluating(self.poll().await?),
            AttemptState::Evaluating(snapshot) => self.evaluate(snapshot),
            AttemptState::Claiming { targets, next } => {
                self.checkpoint()?;
                let Some(target) = targets.get(next) else {
                    return Ok(AttemptState::Sleeping(PollTier::ClaimAttempted));
                };
                match self.claim(target).await? {
                    ClaimResult::Confirmed => AttemptState::Succeeded(target.clone()),
                    ClaimResult::Lost { left_results } => AttemptState::Retreating {
                        targets,
                        next: next + 1,
                        left_results,
                    },
                    ClaimResult::NotActivated => AttemptState::Retreating {
                        targets,
                        next: next + 1,
                        left_results: false,
                    },
                }
            }
            AttemptState::Retreating {
                targets,
                next,
                left_results,
            } => {
                if left_results {
                    self.retreat().await;
                }
                if next < targets.len() {
                    AttemptState::Claiming { targets, next }
                } else {
                    AttemptState::Sleeping(PollTier::ClaimAttempted)
                }
            }
            AttemptState::Sleeping(tier) => {
                self.refresh_and_sleep(tier).await?;
                AttemptState::Polling
            }
            terminal => terminal,
        };
        Ok(next)
    }

    fn checkpoint(&self) -> Result<(), AttemptError> {
        if self.cancel.is_set() {
            Err(AttemptError::Cancelled)
        } else {
            Ok(())
        }
    }

    async fn sleep_or_cancel(&self, delay: Duration) -> Result<(), AttemptError> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(AttemptError::Cancelled),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }

    fn dialog_timeout(&self) -> Duration {
        Duration::from_millis(self.settings.site.dialog_timeout_ms)
    }

    async fn dismiss_stray_dialog(&self) {
        if let Ok(Some(text)) = self.driver.dialog_text().await {
            let _ = self.driver.accept_dialog().await;
            self.log.warn(format!("dismissed dialog: {}", text.trim()));
        }
    }

    // -------------------------------------------------------------------------
    // Authenticating
    // -------------------------------------------------------------------------

    async fn authenticate(&mut self) -> Result<(), AttemptError> {
        let site = &self.settings.site;
        self.log.info("opening login page");
        self.driver.navigate(&site.login_url).await?;

        let implicit = self.pacing.implicit_wait();
        if let Err(e) = self.driver.set_implicit_wait(implicit).await {
            self.log.warn(format!("could not set implicit wait: {}", e));
        }

        let mut retried = false;
        loop {
            self.submit_credentials()
                .await
                .map_err(|e| AttemptError::Authentication(format!("login form unavailable: {}", e)))?;

            let Some(text) = wait_for_dialog(self.driver, self.dialog_timeout()).await else {
                self.log.info("logged in");
                return Ok(());
            };
            let text = text.trim().to_string();
            let _ = self.driver.accept_dialog().await;

            if !retried && site.is_transient_login_message(&text) {
                retried = true;
                let delay = self.pacing.next_auth_retry();
                self.log.warn(format!(
                    "login rejected ({}), retrying in {:.1}s",
                    text,
                    delay.as_secs_f64()
                ));
                self.sleep_or_cancel(delay).await?;
                self.driver.navigate(&site.login_url).await?;
                continue;
            }

            return Err(AttemptError::Authentication(text));
        }
    }

    async fn submit_credentials(&self) -> Result<(), DriverError> {
        let site = &self.settings.site;
        self.fill(&site.login_id_field, &self.request.user_id).await?;
        self.fill(&site.login_password_field, &self.request.password).await?;
        let submit = self.driver.find(&site.login_submit).await?;
        self.driver.click(&submit).await
    }

    async fn fill(&self, locator: &Locator, value: &str) -> Result<(), DriverError> {
        let field = self.driver.find(locator).await?;
        let _ = self.driver.clear(&field).await;
        self.driver.send_keys(&field, value).await
    }

    // -------------------------------------------------------------------------
    // Navigating / Configuring
    // -------------------------------------------------------------------------

    async fn open_search(&mut self) -> Result<(), AttemptError> {
        self.log.info("opening search page");
        self.driver.navigate(&self.settings.site.search_url).await?;

        if let Some(text) = wait_for_dialog(self.driver, self.dialog_timeout()).await {
            let _ = self.driver.accept_dialog().await;
            return Err(AttemptError::NavigationBlocked(text.trim().to_string()));
        }
        Ok(())
    }

    async fn configure(&mut self) -> Result<(), AttemptError> {
        let site = &self.settings.site;
        let request = self.request;

        self.fill(&site.origin_field, &request.origin).await?;
        self.fill(&site.destination_field, &request.destination).await?;
        self.select_date().await?;

        match self.select_time().await {
            Ok(slot) => self.log.info(format!(
                "requested {} → using time slot {}",
                request.time, slot.label
            )),
            Err(reason) => self.log.warn(format!(
                "could not set departure time ({}), keeping form default",
                reason
            )),
        }

        if let Some(carrier) = request.carrier.as_deref().filter(|c| !c.trim().is_empty()) {
            select_carrier_filter(self.driver, &site.carrier_filter, carrier.trim(), &self.log).await;
        }

        self.submit_query().await;
        self.log.info(format!("searching {}", request.summary()));

        // From here on a lookup that misses must return at once; only the
        // result rows get a bounded wait.
        if let Err(e) = self.driver.set_implicit_wait(Duration::ZERO).await {
            self.log.warn(format!("could not clear implicit wait: {}", e));
        }
        Ok(())
    }

    async fn read_options(&self, select: &ElementRef) -> Result<Vec<SelectOption>, DriverError> {
        let mut options = Vec::new();
        for option in self.driver.find_all_in(select, &Locator::css("option")).await? {
            let value = self.driver.attribute(&option, "value").await?.unwrap_or_default();
            let text = self.driver.text(&option).await?;
            options.push(SelectOption {
                value,
                text: text.trim().to_string(),
            });
        }
        Ok(options)
    }

    async fn set_select(&self, select: &ElementRef, value: &str) -> Result<bool, DriverError> {
        let result = self
            .driver
            .execute_script(SELECT_SCRIPT, vec![select.to_wire(), json!(value)])
            .await?;
        Ok(result == Value::Bool(true))
    }

    async fn select_date(&self) -> Result<(), AttemptError> {
        let value = self.request.date_value();
        let select = self.driver.find(&self.settings.site.date_select).await?;
        let options = self.read_options(&select).await?;

        if !options.iter().any(|o| o.value == value) {
            return Err(AttemptError::DateUnavailable(format!(
                "{} is not offered by the search form",
                self.request.date
            )));
        }
        if !self.set_select(&select, &value).await? {
            return Err(AttemptError::DateUnavailable(format!(
                "{} could not be selected",
                self.request.date
            )));
        }
        Ok(())
    }

    async fn select_time(&self) -> Result<ResolvedSlot, String> {
        let select = self
            .driver
            .find(&self.settings.site.time_select)
            .await
            .map_err(|e| e.to_string())?;
        let options = self.read_options(&select).await.map_err(|e| e.to_string())?;

        let labels: Vec<&str> = options
            .iter()
            .map(|o| {
                if parse_slot_minutes(&o.text).is_some() {
                    o.text.as_str()
                } else {
                    o.value.as_str()
                }
            })
            .collect();

        let slot = resolve_slot(self.request.time, &labels).map_err(|e| e.to_string())?;
        let value = &options[slot.index].value;
        match self.set_select(&select, value).await {
            Ok(true) => Ok(slot),
            Ok(false) => Err(format!("option {} rejected", value)),
            Err(e) => Err(e.to_string()),
        }
    }

    async fn submit_query(&self) {
        let result = match self.driver.find(&self.settings.site.query_button).await {
            Ok(button) => self
                .driver
                .execute_script(CLICK_SCRIPT, vec![button.to_wire()])
                .await
                .map(|_| ()),
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            self.log.warn(format!("search submit failed: {}", e));
        }
    }

    // -------------------------------------------------------------------------
    // Polling / Evaluating
    // -------------------------------------------------------------------------

    async fn poll(&mut self) -> Result<PollSnapshot, AttemptError> {
        self.polls += 1;
        metrics::POLLS_TOTAL.inc();
        let started = Instant::now();

        self.dismiss_stray_dialog().await;

        let rows_wait = self.pacing.implicit_wait();
        let rows = match wait_for_elements(self.driver, &self.settings.site.result_rows, rows_wait).await {
            Ok(rows) => rows,
            Err(e) if e.is_element_scoped() || matches!(e, DriverError::UnexpectedDialog(_)) => {
                Vec::new()
            }
            Err(e) => return Err(e.into()),
        };

        if rows.is_empty() {
            self.log.info(format!("poll #{}: no results yet", self.polls));
            return Ok(PollSnapshot {
                number: self.polls,
                raw_rows: 0,
                rows: Vec::new(),
            });
        }

        let columns = match self.columns {
            Some(columns) => columns,
            None => {
                let columns = self.detect_layout().await;
                self.columns = Some(columns);
                columns
            }
        };

        let scanned = self.scan_rows(&rows, &columns).await;
        metrics::POLL_SCAN_DURATION.observe(started.elapsed().as_secs_f64());

        Ok(PollSnapshot {
            number: self.polls,
            raw_rows: rows.len(),
            rows: scanned,
        })
    }

    async fn detect_layout(&self) -> ColumnMap {
        let site = &self.settings.site;
        let headers = self.driver.find_all(&site.result_headers).await.unwrap_or_default();
        let mut texts = Vec::with_capacity(headers.len());
        for header in &headers {
            texts.push(self.driver.text(header).await.unwrap_or_default());
        }

        let detection = detect_columns(&texts, &self.settings.layout);
        match &detection.fallback {
            Some(reason) => {
                metrics::LAYOUT_FALLBACKS.inc();
                self.log.warn(format!("using default seat columns: {}", reason));
            }
            None => self.log.info(format!(
                "seat columns: standard {}, premium {}, waitlist {}",
                detection.columns.standard, detection.columns.premium, detection.columns.waitlist
            )),
        }
        detection.columns
    }

    /// Project rows in table order until `num_to_check` rows pass the carrier filter.
    async fn scan_rows(&mut self, rows: &[ElementRef], columns: &ColumnMap) -> Vec<ResultRow> {
        let limit = self.request.num_to_check;
        let filtering = self.carrier.is_active();
        let mut matching = Vec::new();
        let mut scanned = Vec::new();

        for (i, element) in rows.iter().enumerate() {
            if matching.len() >= limit {
                break;
            }
            match project_row(self.driver, &self.settings.site, element, i + 1, columns, filtering).await {
                Ok(row) => {
                    if self.carrier.accepts(&row) {
                        matching.push(row.clone());
                    }
                    if filtering {
                        scanned.push(row);
                    }
                }
                Err(e) => debug!(worker = self.log.worker(), row = i + 1, error = %e, "skipping row"),
            }
        }

        if filtering && matching.is_empty() && !scanned.is_empty() && self.carrier.degrade() {
            metrics::CARRIER_FILTER_DEGRADED.inc();
            self.log.warn(format!(
                "no rows match carrier {}, ignoring carrier from now on",
                self.request.carrier.as_deref().unwrap_or_default()
            ));
            matching = scanned.into_iter().take(limit).collect();
        }

        matching
    }

    fn evaluate(&self, snapshot: PollSnapshot) -> AttemptState {
        if snapshot.rows.is_empty() {
            let tier = if snapshot.raw_rows == 0 {
                PollTier::NoRows
            } else {
                PollTier::RowsNoClaim
            };
            return AttemptState::Sleeping(tier);
        }

        let targets = self.plan_claims(&snapshot.rows);
        if targets.is_empty() {
            self.log.info(format!(
                "poll #{}: {} rows checked, nothing available",
                snapshot.number,
                snapshot.rows.len()
            ));
            return AttemptState::Sleeping(PollTier::RowsNoClaim);
        }

        self.log.info(format!(
            "poll #{}: {} claimable cell(s)",
            snapshot.number,
            targets.len()
        ));
        AttemptState::Claiming { targets, next: 0 }
    }

    fn plan_claims(&self, rows: &[ResultRow]) -> Vec<ClaimTarget> {
        let columns = self.columns.unwrap_or(self.settings.layout.default_columns);
        let mut targets = Vec::new();

        for row in rows {
            match self.request.mode {
                ClaimMode::Reserve => {
                    for seat in self.request.seat_order() {
                        if row.offers_seat(seat) {
                            if let Some(cell) = row.cell(seat.role()) {
                                targets.push(ClaimTarget {
                                    row: row.position,
                                    column: columns.column(seat.role()),
                                    role: seat.role(),
                                    seat: Some(seat),
                                    control: cell.control.clone(),
                                    label: cell.label().to_string(),
                                });
                            }
                        }
                    }
                }
                ClaimMode::Waitlist => {
                    if let Some(cell) = row.waitlist.as_ref().filter(|c| c.offered) {
                        targets.push(ClaimTarget {
                            row: row.position,
                            column: columns.column(ColumnRole::Waitlist),
                            role: ColumnRole::Waitlist,
                            seat: None,
                            control: cell.control.clone(),
                            label: cell.label().to_string(),
                        });
                    }
                }
            }
        }
        targets
    }

    // -------------------------------------------------------------------------
    // Claiming / Retreating / Sleeping
    // -------------------------------------------------------------------------

    async fn claim(&mut self, target: &ClaimTarget) -> Result<ClaimResult, AttemptError> {
        let driver = self.driver;
        let site = &self.settings.site;
        let seat = target.role.as_str();

        let original = driver.current_window().await.ok();
        let before = driver.window_handles().await.unwrap_or_default();
        let url_before = driver.current_url().await.ok();

        self.log.info(format!("attempting {}", target.describe()));
        if activate_claim(driver, site, target, &self.log).await.is_none() {
            metrics::CLAIM_ATTEMPTS.with_label_values(&[seat, "not_activated"]).inc();
            return Ok(ClaimResult::NotActivated);
        }

        if let Some(text) = wait_for_dialog(driver, self.dialog_timeout()).await {
            let _ = driver.accept_dialog().await;
            self.log.info(format!("site says: {}", text.trim()));
        }

        let popup = wait_for_new_window(
            driver,
            &before,
            Duration::from_millis(site.new_window_timeout_ms),
        )
        .await;
        if let Some(handle) = &popup {
            if let Err(e) = driver.switch_window(handle).await {
                self.log.warn(format!("could not switch to new window: {}", e));
            }
        }

        let probes = match self.request.mode {
            ClaimMode::Reserve => &site.reserve_success,
            ClaimMode::Waitlist => &site.waitlist_success,
        };
        let confirmed = detect_success(driver, probes, Duration::from_millis(site.success_timeout_ms))
            .await
            .is_some();

        if popup.is_some() {
            if let Err(e) = driver.close_window().await {
                self.log.warn(format!("could not close new window: {}", e));
            }
            if let Some(original) = &original {
                if let Err(e) = driver.switch_window(original).await {
                    self.log.warn(format!("could not return to results window: {}", e));
                }
            }
        }

        if confirmed {
            metrics::CLAIM_ATTEMPTS.with_label_values(&[seat, "confirmed"]).inc();
            return Ok(ClaimResult::Confirmed);
        }

        metrics::CLAIM_ATTEMPTS.with_label_values(&[seat, "lost"]).inc();
        self.log.warn(format!("{} was not confirmed", target.describe()));

        let left_results = popup.is_none()
            && match (&url_before, driver.current_url().await) {
                (Some(before), Ok(after)) => *before != after,
                _ => true,
            };
        Ok(ClaimResult::Lost { left_results })
    }

    async fn retreat(&mut self) {
        if let Err(e) = self.driver.back().await {
            self.log.warn(format!("could not return to results: {}", e));
        }
        self.dismiss_stray_dialog().await;
    }

    async fn refresh_and_sleep(&mut self, tier: PollTier) -> Result<(), AttemptError> {
        self.submit_query().await;
        let delay = self.pacing.next_sleep(tier);
        debug!(
            worker = self.log.worker(),
            tier = tier.as_str(),
            delay_ms = delay.as_millis() as u64,
            "pacing"
        );
        self.sleep_or_cancel(delay).await
    }
}
