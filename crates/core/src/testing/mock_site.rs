//! Scripted booking site shared by mock browser sessions.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;

use crate::attempt::SiteConfig;
use crate::driver::{DriverError, Locator};

/// A claim activation observed by the site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimEvent {
    pub worker: usize,
    /// Number of query submissions the worker had made when it claimed.
    pub poll: u64,
    /// 1-based row.
    pub row: usize,
    /// 1-based column.
    pub column: usize,
    /// "click", "keyboard" or "script".
    pub via: &'static str,
}

/// How the site reacts to a claim activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimResponse {
    pub success: bool,
    pub dialog: Option<String>,
    /// Open the result page in a new window instead of navigating.
    pub popup: bool,
    /// Navigate away from the results to a result page.
    pub navigates: bool,
}

impl ClaimResponse {
    pub fn confirmed() -> Self {
        Self {
            success: true,
            dialog: None,
            popup: false,
            navigates: true,
        }
    }

    /// Navigates to a page without the success marker.
    pub fn lost() -> Self {
        Self {
            success: false,
            dialog: None,
            popup: false,
            navigates: true,
        }
    }

    /// Shows a dialog and stays on the results.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            dialog: Some(message.into()),
            popup: false,
            navigates: false,
        }
    }

    pub fn in_popup(mut self) -> Self {
        self.popup = true;
        self
    }

    pub fn with_dialog(mut self, message: impl Into<String>) -> Self {
        self.dialog = Some(message.into());
        self
    }
}

/// One cell of a mock result row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCell {
    pub text: String,
    pub control: bool,
    pub attrs: HashMap<String, String>,
    /// Pointer clicks on the control fail; keyboard and script still work.
    pub click_intercepted: bool,
}

impl MockCell {
    /// A text cell; it gets a control when the text is a call to action.
    pub fn text(text: impl Into<String>) -> Self {
        let text = text.into();
        let control = text.contains("예약하기") || text.contains("신청하기");
        Self {
            text,
            control,
            attrs: HashMap::new(),
            click_intercepted: false,
        }
    }

    /// A control with no visible text, only an accessible label.
    pub fn labelled(attr: &str, value: &str) -> Self {
        Self {
            text: String::new(),
            control: true,
            attrs: HashMap::from([(attr.to_string(), value.to_string())]),
            click_intercepted: false,
        }
    }

    pub fn intercepted(mut self) -> Self {
        self.click_intercepted = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockRow {
    pub cells: Vec<MockCell>,
}

impl MockRow {
    /// A row in the default eight-column layout.
    pub fn train(carrier: &str, premium: &str, standard: &str, waitlist: &str) -> Self {
        Self {
            cells: vec![
                MockCell::text(carrier),
                MockCell::text("301"),
                MockCell::text("수서"),
                MockCell::text("부산"),
                MockCell::text("09:00"),
                MockCell::text(premium),
                MockCell::text(standard),
                MockCell::text(waitlist),
            ],
        }
    }

    pub fn cells(cells: Vec<MockCell>) -> Self {
        Self { cells }
    }

    /// Replace the 1-based cell `column`.
    pub fn with_cell(mut self, column: usize, cell: MockCell) -> Self {
        if let Some(slot) = column.checked_sub(1).and_then(|i| self.cells.get_mut(i)) {
            *slot = cell;
        }
        self
    }
}

/// A carrier filter control on the search form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockFilterControl {
    pub id: String,
    pub attrs: HashMap<String, String>,
    /// Locator that finds this control directly.
    pub at: Option<Locator>,
    /// Text of the label next to it.
    pub label: Option<String>,
}

impl MockFilterControl {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attrs: HashMap::new(),
            at: None,
            label: None,
        }
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attrs.insert(name.to_string(), value.to_string());
        self
    }

    pub fn at(mut self, locator: Locator) -> Self {
        self.at = Some(locator);
        self
    }

    pub fn label(mut self, text: &str) -> Self {
        self.label = Some(text.to_string());
        self
    }
}

/// Something a mock session did, for assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockEvent {
    Navigated { worker: usize, url: String },
    LoginSubmitted { worker: usize },
    Selected { worker: usize, field: String, value: String },
    FilterClicked { worker: usize, id: String },
    QuerySubmitted { worker: usize, poll: u64 },
    Claimed(ClaimEvent),
    DialogAccepted { worker: usize, text: String },
    Back { worker: usize },
    WindowClosed { worker: usize, handle: String },
    ImplicitWaitSet { worker: usize, wait: Duration },
    /// A lookup found nothing while an implicit wait was set, so a real
    /// browser would have blocked for `wait`.
    LookupBlocked { worker: usize, poll: u64, wait: Duration },
    Quit { worker: usize },
}

type RowsHandler = Box<dyn Fn(usize, u64) -> Vec<MockRow> + Send + Sync>;
type ClaimHandler = Box<dyn Fn(&ClaimEvent) -> ClaimResponse + Send + Sync>;

/// The booking site as seen by every mock session of a test.
///
/// Scripted behaviour is fixed at build time; launches, failures and the
/// event log are shared mutable state.
pub struct MockSite {
    pub(crate) config: SiteConfig,
    pub(crate) login_dialogs: Vec<String>,
    pub(crate) search_dialog: Option<String>,
    pub(crate) dates: Vec<String>,
    pub(crate) times: Vec<(String, String)>,
    pub(crate) headers: Vec<String>,
    pub(crate) filter_controls: Vec<MockFilterControl>,
    pub(crate) quit_delay: Duration,
    rows: RowsHandler,
    claim: ClaimHandler,
    launch_errors: RwLock<VecDeque<DriverError>>,
    next_error: RwLock<Option<DriverError>>,
    events: RwLock<Vec<MockEvent>>,
}

impl std::fmt::Debug for MockSite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockSite")
            .field("login_dialogs", &self.login_dialogs)
            .field("search_dialog", &self.search_dialog)
            .field("dates", &self.dates)
            .field("headers", &self.headers)
            .field("rows", &"<handler>")
            .field("claim", &"<handler>")
            .finish()
    }
}

impl MockSite {
    pub fn builder() -> MockSiteBuilder {
        MockSiteBuilder::default()
    }

    pub(crate) fn rows_for(&self, worker: usize, poll: u64) -> Vec<MockRow> {
        (self.rows)(worker, poll)
    }

    pub(crate) fn respond(&self, event: &ClaimEvent) -> ClaimResponse {
        (self.claim)(event)
    }

    pub(crate) async fn take_launch_error(&self) -> Option<DriverError> {
        self.launch_errors.write().await.pop_front()
    }

    pub(crate) async fn take_error(&self) -> Option<DriverError> {
        self.next_error.write().await.take()
    }

    pub(crate) async fn record(&self, event: MockEvent) {
        self.events.write().await.push(event);
    }

    /// Fail the next driver call of any session with `error`.
    pub async fn fail_next(&self, error: DriverError) {
        *self.next_error.write().await = Some(error);
    }

    pub async fn events(&self) -> Vec<MockEvent> {
        self.events.read().await.clone()
    }

    pub async fn claims(&self) -> Vec<ClaimEvent> {
        self.events
            .read()
            .await
            .iter()
            .filter_map(|e| match e {
                MockEvent::Claimed(claim) => Some(claim.clone()),
                _ => None,
            })
            .collect()
    }

    pub async fn login_attempts(&self) -> usize {
        self.count(|e| matches!(e, MockEvent::LoginSubmitted { .. })).await
    }

    pub async fn queries(&self) -> usize {
        self.count(|e| matches!(e, MockEvent::QuerySubmitted { .. })).await
    }

    pub async fn quits(&self) -> usize {
        self.count(|e| matches!(e, MockEvent::Quit { .. })).await
    }

    /// Implicit-wait time charged to empty lookups after the first search.
    pub async fn blocked_while_polling(&self) -> Duration {
        self.events
            .read()
            .await
            .iter()
            .filter_map(|e| match e {
                MockEvent::LookupBlocked { poll, wait, .. } if *poll > 0 => Some(*wait),
                _ => None,
            })
            .sum()
    }

    /// Every implicit wait the sessions set, in order.
    pub async fn implicit_waits(&self) -> Vec<Duration> {
        self.events
            .read()
            .await
            .iter()
            .filter_map(|e| match e {
                MockEvent::ImplicitWaitSet { wait, .. } => Some(*wait),
                _ => None,
            })
            .collect()
    }

    pub async fn filter_clicks(&self) -> Vec<String> {
        self.events
            .read()
            .await
            .iter()
            .filter_map(|e| match e {
                MockEvent::FilterClicked { id, .. } => Some(id.clone()),
                _ => None,
            })
            .collect()
    }

    async fn count(&self, pred: impl Fn(&MockEvent) -> bool) -> usize {
        self.events.read().await.iter().filter(|e| pred(e)).count()
    }
}

pub struct MockSiteBuilder {
    config: SiteConfig,
    login_dialogs: Vec<String>,
    search_dialog: Option<String>,
    dates: Vec<String>,
    times: Vec<(String, String)>,
    headers: Vec<String>,
    filter_controls: Vec<MockFilterControl>,
    quit_delay: Duration,
    rows: RowsHandler,
    claim: ClaimHandler,
    launch_errors: VecDeque<DriverError>,
}

impl Default for MockSiteBuilder {
    fn default() -> Self {
        Self {
            config: SiteConfig::default(),
            login_dialogs: Vec::new(),
            search_dialog: None,
            dates: vec!["20260313".into(), "20260314".into(), "20260315".into()],
            times: (0..=22)
                .step_by(2)
                .map(|h| (format!("{:02}", h), format!("{:02}0000", h)))
                .collect(),
            headers: ["구분", "열차번호", "출발역", "도착역", "출발시간", "특실", "일반실", "예약대기"]
                .into_iter()
                .map(String::from)
                .collect(),
            filter_controls: Vec::new(),
            quit_delay: Duration::ZERO,
            rows: Box::new(|_, _| Vec::new()),
            claim: Box::new(|_| ClaimResponse::rejected("잔여석이 없습니다.")),
            launch_errors: VecDeque::new(),
        }
    }
}

impl MockSiteBuilder {
    /// Locators the mock answers to. Defaults to [`SiteConfig::default`].
    pub fn site(mut self, config: SiteConfig) -> Self {
        self.config = config;
        self
    }

    /// Dialog shown after the next login submission (one per call, in order).
    pub fn login_dialog(mut self, text: &str) -> Self {
        self.login_dialogs.push(text.to_string());
        self
    }

    /// Dialog shown every time the search page loads.
    pub fn search_dialog(mut self, text: &str) -> Self {
        self.search_dialog = Some(text.to_string());
        self
    }

    /// `YYYYMMDD` values of the date select.
    pub fn dates(mut self, dates: &[&str]) -> Self {
        self.dates = dates.iter().map(|d| d.to_string()).collect();
        self
    }

    /// `(text, value)` pairs of the time select.
    pub fn times(mut self, times: &[(&str, &str)]) -> Self {
        self.times = times
            .iter()
            .map(|(t, v)| (t.to_string(), v.to_string()))
            .collect();
        self
    }

    pub fn headers(mut self, headers: &[&str]) -> Self {
        self.headers = headers.iter().map(|h| h.to_string()).collect();
        self
    }

    pub fn filter_control(mut self, control: MockFilterControl) -> Self {
        self.filter_controls.push(control);
        self
    }

    /// Rows shown for `(worker, poll)`; polls count query submissions from 1.
    pub fn rows<F>(mut self, rows: F) -> Self
    where
        F: Fn(usize, u64) -> Vec<MockRow> + Send + Sync + 'static,
    {
        self.rows = Box::new(rows);
        self
    }

    pub fn claim<F>(mut self, claim: F) -> Self
    where
        F: Fn(&ClaimEvent) -> ClaimResponse + Send + Sync + 'static,
    {
        self.claim = Box::new(claim);
        self
    }

    /// How long closing a session takes.
    pub fn quit_delay(mut self, delay: Duration) -> Self {
        self.quit_delay = delay;
        self
    }

    /// Fail the next launch with `error` (one per call, in order).
    pub fn launch_error(mut self, error: DriverError) -> Self {
        self.launch_errors.push_back(error);
        self
    }

    pub fn build(self) -> Arc<MockSite> {
        Arc::new(MockSite {
            config: self.config,
            login_dialogs: self.login_dialogs,
            search_dialog: self.search_dialog,
            dates: self.dates,
            times: self.times,
            headers: self.headers,
            filter_controls: self.filter_controls,
            quit_delay: self.quit_delay,
            rows: self.rows,
            claim: self.claim,
            launch_errors: RwLock::new(self.launch_errors),
            next_error: RwLock::new(None),
            events: RwLock::new(Vec::new()),
        })
    }
}
