//! Mock browser sessions over a [`MockSite`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex_lite::Regex;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};

use crate::attempt::{SiteConfig, SuccessProbe, CLICK_SCRIPT};
use crate::driver::{keys, Driver, DriverError, DriverFactory, ElementRef, Locator, SessionSpec};

use super::mock_site::{ClaimEvent, MockCell, MockEvent, MockRow, MockSite};

const BLANK_URL: &str = "about:blank";
const MAIN_URL: &str = "https://mock.invalid/main";
const CLAIMED_URL: &str = "https://mock.invalid/confirm";

static NTH_CHILD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r":nth-child\((\d+)\) > td:nth-child\((\d+)\)").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
enum Page {
    Blank(String),
    Login,
    Search { results: bool },
    Claimed { success: bool },
}

/// Elements the mock site renders. Row and column indices are 0-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Node {
    LoginId,
    LoginPassword,
    LoginSubmit,
    Origin,
    Destination,
    DateSelect,
    TimeSelect,
    DateOption(usize),
    TimeOption(usize),
    Query,
    Filter(usize),
    Header(usize),
    Row(usize),
    Cell(usize, usize),
    Control(usize, usize),
    SuccessMarker,
}

impl Node {
    fn encode(&self) -> String {
        match self {
            Self::LoginId => "loginid".into(),
            Self::LoginPassword => "loginpw".into(),
            Self::LoginSubmit => "loginsubmit".into(),
            Self::Origin => "origin".into(),
            Self::Destination => "destination".into(),
            Self::DateSelect => "datesel".into(),
            Self::TimeSelect => "timesel".into(),
            Self::DateOption(i) => format!("dateopt-{}", i),
            Self::TimeOption(i) => format!("timeopt-{}", i),
            Self::Query => "query".into(),
            Self::Filter(i) => format!("filter-{}", i),
            Self::Header(i) => format!("header-{}", i),
            Self::Row(r) => format!("row-{}", r),
            Self::Cell(r, c) => format!("cell-{}-{}", r, c),
            Self::Control(r, c) => format!("control-{}-{}", r, c),
            Self::SuccessMarker => "success".into(),
        }
    }

    fn decode(s: &str) -> Option<Self> {
        let mut parts = s.split('-');
        let kind = parts.next()?;
        let nums = parts
            .map(|p| p.parse::<usize>())
            .collect::<Result<Vec<_>, _>>()
            .ok()?;
        let node = match (kind, nums.as_slice()) {
            ("loginid", []) => Self::LoginId,
            ("loginpw", []) => Self::LoginPassword,
            ("loginsubmit", []) => Self::LoginSubmit,
            ("origin", []) => Self::Origin,
            ("destination", []) => Self::Destination,
            ("datesel", []) => Self::DateSelect,
            ("timesel", []) => Self::TimeSelect,
            ("dateopt", [i]) => Self::DateOption(*i),
            ("timeopt", [i]) => Self::TimeOption(*i),
            ("query", []) => Self::Query,
            ("filter", [i]) => Self::Filter(*i),
            ("header", [i]) => Self::Header(*i),
            ("row", [r]) => Self::Row(*r),
            ("cell", [r, c]) => Self::Cell(*r, *c),
            ("control", [r, c]) => Self::Control(*r, *c),
            ("success", []) => Self::SuccessMarker,
            _ => return None,
        };
        Some(node)
    }
}

#[derive(Debug)]
struct Window {
    handle: String,
    history: Vec<Page>,
}

#[derive(Debug)]
struct SessionState {
    windows: Vec<Window>,
    current: Option<String>,
    /// Bumped on every page render; older element references are stale.
    generation: u64,
    poll: u64,
    rows: Vec<MockRow>,
    dialog: Option<String>,
    implicit_wait: Duration,
    logins: usize,
    opened: usize,
    quit: bool,
}

impl SessionState {
    fn window(&self) -> Result<&Window, DriverError> {
        let handle = self.current.as_deref().unwrap_or_default();
        self.windows
            .iter()
            .find(|w| w.handle == handle)
            .ok_or_else(|| DriverError::NoSuchWindow(handle.to_string()))
    }

    fn window_mut(&mut self) -> Result<&mut Window, DriverError> {
        let handle = self.current.clone().unwrap_or_default();
        self.windows
            .iter_mut()
            .find(|w| w.handle == handle)
            .ok_or(DriverError::NoSuchWindow(handle))
    }

    fn page(&self) -> Result<Page, DriverError> {
        self.window()?
            .history
            .last()
            .cloned()
            .ok_or_else(|| DriverError::Protocol("empty history".into()))
    }

    fn push_page(&mut self, page: Page) -> Result<(), DriverError> {
        self.window_mut()?.history.push(page);
        self.generation += 1;
        Ok(())
    }

    fn replace_page(&mut self, page: Page) -> Result<(), DriverError> {
        let window = self.window_mut()?;
        window.history.pop();
        window.history.push(page);
        self.generation += 1;
        Ok(())
    }
}

/// A simulated browser session for one worker.
///
/// Element references embed the page generation they were read from, so any
/// reference taken before a navigation, a query submission or `back()`
/// fails with [`DriverError::StaleElement`], like a real re-rendered page.
#[derive(Debug)]
pub struct MockDriver {
    worker: usize,
    site: Arc<MockSite>,
    state: Mutex<SessionState>,
}

impl MockDriver {
    pub fn new(worker: usize, site: Arc<MockSite>) -> Self {
        let handle = format!("w{}-0", worker);
        Self {
            worker,
            site,
            state: Mutex::new(SessionState {
                windows: vec![Window {
                    handle: handle.clone(),
                    history: vec![Page::Blank(BLANK_URL.to_string())],
                }],
                current: Some(handle),
                generation: 0,
                poll: 0,
                rows: Vec::new(),
                dialog: None,
                implicit_wait: Duration::ZERO,
                logins: 0,
                opened: 0,
                quit: false,
            }),
        }
    }

    /// Jump straight to an empty search page.
    pub async fn goto_search(&self) {
        let mut state = self.state.lock().await;
        let _ = state.push_page(Page::Search { results: false });
    }

    fn config(&self) -> &SiteConfig {
        &self.site.config
    }

    async fn enter(&self) -> Result<tokio::sync::MutexGuard<'_, SessionState>, DriverError> {
        if let Some(error) = self.site.take_error().await {
            return Err(error);
        }
        let state = self.state.lock().await;
        if state.quit {
            return Err(DriverError::ConnectionFailed("session closed".into()));
        }
        Ok(state)
    }

    /// Record the time a real browser would block on a lookup that found nothing.
    async fn charge_empty_lookup(&self, state: &SessionState) {
        if !state.implicit_wait.is_zero() {
            self.site
                .record(MockEvent::LookupBlocked {
                    worker: self.worker,
                    poll: state.poll,
                    wait: state.implicit_wait,
                })
                .await;
        }
    }

    fn reference(&self, state: &SessionState, node: Node) -> ElementRef {
        ElementRef::new(format!("{}:{}:{}", self.worker, state.generation, node.encode()))
    }

    fn resolve(&self, state: &SessionState, element: &ElementRef) -> Result<Node, DriverError> {
        let mut parts = element.id().splitn(3, ':');
        let worker = parts.next().and_then(|p| p.parse::<usize>().ok());
        let generation = parts.next().and_then(|p| p.parse::<u64>().ok());
        let node = parts.next().and_then(Node::decode);
        match (worker, generation, node) {
            (Some(w), Some(g), Some(node)) if w == self.worker => {
                if g == state.generation {
                    Ok(node)
                } else {
                    Err(DriverError::StaleElement(element.id().to_string()))
                }
            }
            _ => Err(DriverError::Protocol(format!("unknown element {}", element.id()))),
        }
    }

    fn locate(&self, state: &SessionState, locator: &Locator) -> Result<Vec<Node>, DriverError> {
        let site = self.config();
        let mut found = Vec::new();

        match state.page()? {
            Page::Login => {
                let fields = [
                    (&site.login_id_field, Node::LoginId),
                    (&site.login_password_field, Node::LoginPassword),
                    (&site.login_submit, Node::LoginSubmit),
                ];
                found.extend(fields.into_iter().filter(|(l, _)| *l == locator).map(|(_, n)| n));
            }
            Page::Search { results } => {
                let fields = [
                    (&site.origin_field, Node::Origin),
                    (&site.destination_field, Node::Destination),
                    (&site.date_select, Node::DateSelect),
                    (&site.time_select, Node::TimeSelect),
                    (&site.query_button, Node::Query),
                ];
                found.extend(fields.into_iter().filter(|(l, _)| *l == locator).map(|(_, n)| n));

                for (i, control) in self.site.filter_controls.iter().enumerate() {
                    let by_position = control.at.as_ref() == Some(locator);
                    let by_label = match (&control.label, &site.carrier_filter.sibling_template, locator) {
                        (Some(label), Some(template), Locator::XPath(expr)) => {
                            *expr == template.replace("{carrier}", label)
                        }
                        _ => false,
                    };
                    if by_position || by_label || *locator == site.carrier_filter.scan {
                        found.push(Node::Filter(i));
                    }
                }

                if results {
                    if *locator == site.result_rows {
                        found.extend((0..state.rows.len()).map(Node::Row));
                    }
                    if *locator == site.result_headers {
                        found.extend((0..self.site.headers.len()).map(Node::Header));
                    }
                    if let Some((r, c)) = control_path(site, locator) {
                        let has_control = state
                            .rows
                            .get(r)
                            .and_then(|row| row.cells.get(c))
                            .is_some_and(|cell| cell.control);
                        if has_control {
                            found.push(Node::Control(r, c));
                        }
                    }
                }
            }
            Page::Claimed { success: true } => {
                let marked = site
                    .reserve_success
                    .iter()
                    .chain(&site.waitlist_success)
                    .any(|p| matches!(p, SuccessProbe::Marker(l) if l == locator));
                if marked {
                    found.push(Node::SuccessMarker);
                }
            }
            Page::Claimed { success: false } | Page::Blank(_) => {}
        }

        Ok(found)
    }

    fn locate_in(&self, state: &SessionState, parent: Node, locator: &Locator) -> Vec<Node> {
        let site = self.config();
        let option = Locator::css("option");
        match parent {
            Node::Row(r) if *locator == site.cell => {
                let cells = state.rows.get(r).map(|row| row.cells.len()).unwrap_or(0);
                (0..cells).map(|c| Node::Cell(r, c)).collect()
            }
            Node::Cell(r, c) if *locator == site.control => {
                let has_control = state
                    .rows
                    .get(r)
                    .and_then(|row| row.cells.get(c))
                    .is_some_and(|cell| cell.control);
                if has_control {
                    vec![Node::Control(r, c)]
                } else {
                    Vec::new()
                }
            }
            Node::DateSelect if *locator == option => {
                (0..self.site.dates.len()).map(Node::DateOption).collect()
            }
            Node::TimeSelect if *locator == option => {
                (0..self.site.times.len()).map(Node::TimeOption).collect()
            }
            _ => Vec::new(),
        }
    }

    fn cell<'s>(&self, state: &'s SessionState, r: usize, c: usize) -> Option<&'s MockCell> {
        state.rows.get(r).and_then(|row| row.cells.get(c))
    }

    async fn activate(
        &self,
        state: &mut SessionState,
        r: usize,
        c: usize,
        via: &'static str,
    ) -> Result<(), DriverError> {
        let event = ClaimEvent {
            worker: self.worker,
            poll: state.poll,
            row: r + 1,
            column: c + 1,
            via,
        };
        self.site.record(MockEvent::Claimed(event.clone())).await;
        let response = self.site.respond(&event);

        if let Some(text) = response.dialog {
            state.dialog = Some(text);
        }
        if response.popup {
            state.opened += 1;
            state.windows.push(Window {
                handle: format!("w{}-{}", self.worker, state.opened),
                history: vec![Page::Claimed {
                    success: response.success,
                }],
            });
        } else if response.navigates {
            state.push_page(Page::Claimed {
                success: response.success,
            })?;
        }
        Ok(())
    }

    /// Click on anything that is not a seat control.
    async fn press(&self, state: &mut SessionState, node: Node) -> Result<(), DriverError> {
        match node {
            Node::LoginSubmit => {
                let attempt = state.logins;
                state.logins += 1;
                self.site
                    .record(MockEvent::LoginSubmitted { worker: self.worker })
                    .await;
                match self.site.login_dialogs.get(attempt) {
                    Some(text) => state.dialog = Some(text.clone()),
                    None => state.push_page(Page::Blank(MAIN_URL.to_string()))?,
                }
            }
            Node::Query => {
                if !matches!(state.page()?, Page::Search { .. }) {
                    return Ok(());
                }
                state.poll += 1;
                state.rows = self.site.rows_for(self.worker, state.poll);
                state.replace_page(Page::Search { results: true })?;
                self.site
                    .record(MockEvent::QuerySubmitted {
                        worker: self.worker,
                        poll: state.poll,
                    })
                    .await;
            }
            Node::Filter(i) => {
                if let Some(control) = self.site.filter_controls.get(i) {
                    self.site
                        .record(MockEvent::FilterClicked {
                            worker: self.worker,
                            id: control.id.clone(),
                        })
                        .await;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn page_for(&self, url: &str) -> Page {
        let site = self.config();
        if url == site.login_url {
            Page::Login
        } else if url == site.search_url {
            Page::Search { results: false }
        } else {
            Page::Blank(url.to_string())
        }
    }

    fn url_of(&self, page: &Page) -> String {
        match page {
            Page::Blank(url) => url.clone(),
            Page::Login => self.config().login_url.clone(),
            Page::Search { .. } => self.config().search_url.clone(),
            Page::Claimed { .. } => CLAIMED_URL.to_string(),
        }
    }
}

fn control_path(site: &SiteConfig, locator: &Locator) -> Option<(usize, usize)> {
    let (Locator::Css(path), Locator::Css(rows)) = (locator, &site.result_rows) else {
        return None;
    };
    let rest = path.strip_prefix(rows.as_str())?;
    let caps = NTH_CHILD.captures(rest)?;
    let row: usize = caps[1].parse().ok()?;
    let column: usize = caps[2].parse().ok()?;
    Some((row.checked_sub(1)?, column.checked_sub(1)?))
}

#[async_trait]
impl Driver for MockDriver {
    async fn navigate(&self, url: &str) -> Result<(), DriverError> {
        let mut state = self.enter().await?;
        let page = self.page_for(url);
        let is_search = matches!(page, Page::Search { .. });
        state.push_page(page)?;
        if is_search {
            if let Some(text) = &self.site.search_dialog {
                state.dialog = Some(text.clone());
            }
        }
        self.site
            .record(MockEvent::Navigated {
                worker: self.worker,
                url: url.to_string(),
            })
            .await;
        Ok(())
    }

    async fn back(&self) -> Result<(), DriverError> {
        let mut state = self.enter().await?;
        let window = state.window_mut()?;
        if window.history.len() > 1 {
            window.history.pop();
        }
        state.generation += 1;
        self.site.record(MockEvent::Back { worker: self.worker }).await;
        Ok(())
    }

    async fn current_url(&self) -> Result<String, DriverError> {
        let state = self.enter().await?;
        Ok(self.url_of(&state.page()?))
    }

    async fn find(&self, locator: &Locator) -> Result<ElementRef, DriverError> {
        let state = self.enter().await?;
        match self.locate(&state, locator)?.first() {
            Some(node) => Ok(self.reference(&state, *node)),
            None => {
                self.charge_empty_lookup(&state).await;
                Err(DriverError::ElementNotFound(locator.to_string()))
            }
        }
    }

    async fn find_all(&self, locator: &Locator) -> Result<Vec<ElementRef>, DriverError> {
        let state = self.enter().await?;
        let nodes = self.locate(&state, locator)?;
        if nodes.is_empty() {
            self.charge_empty_lookup(&state).await;
        }
        Ok(nodes.into_iter().map(|n| self.reference(&state, n)).collect())
    }

    async fn find_all_in(
        &self,
        parent: &ElementRef,
        locator: &Locator,
    ) -> Result<Vec<ElementRef>, DriverError> {
        let state = self.enter().await?;
        let parent = self.resolve(&state, parent)?;
        let nodes = self.locate_in(&state, parent, locator);
        if nodes.is_empty() {
            self.charge_empty_lookup(&state).await;
        }
        Ok(nodes.into_iter().map(|n| self.reference(&state, n)).collect())
    }

    async fn text(&self, element: &ElementRef) -> Result<String, DriverError> {
        let state = self.enter().await?;
        let text = match self.resolve(&state, element)? {
            Node::Header(i) => self.site.headers.get(i).cloned(),
            Node::Cell(r, c) | Node::Control(r, c) => self.cell(&state, r, c).map(|cell| cell.text.clone()),
            Node::Row(r) => state.rows.get(r).map(|row| {
                row.cells
                    .iter()
                    .map(|c| c.text.as_str())
                    .collect::<Vec<_>>()
                    .join(" ")
            }),
            Node::DateOption(i) => self.site.dates.get(i).cloned(),
            Node::TimeOption(i) => self.site.times.get(i).map(|(text, _)| text.clone()),
            _ => None,
        };
        Ok(text.unwrap_or_default())
    }

    async fn attribute(
        &self,
        element: &ElementRef,
        name: &str,
    ) -> Result<Option<String>, DriverError> {
        let state = self.enter().await?;
        let value = match self.resolve(&state, element)? {
            Node::DateOption(i) if name == "value" => self.site.dates.get(i).cloned(),
            Node::TimeOption(i) if name == "value" => self.site.times.get(i).map(|(_, v)| v.clone()),
            Node::Filter(i) => self
                .site
                .filter_controls
                .get(i)
                .and_then(|control| control.attrs.get(name).cloned()),
            Node::Control(r, c) => self
                .cell(&state, r, c)
                .and_then(|cell| cell.attrs.get(name).cloned()),
            _ => None,
        };
        Ok(value)
    }

    async fn click(&self, element: &ElementRef) -> Result<(), DriverError> {
        let mut state = self.enter().await?;
        match self.resolve(&state, element)? {
            Node::Control(r, c) => {
                if self.cell(&state, r, c).is_some_and(|cell| cell.click_intercepted) {
                    return Err(DriverError::Protocol("element click intercepted".into()));
                }
                self.activate(&mut state, r, c, "click").await
            }
            other => self.press(&mut state, other).await,
        }
    }

    async fn send_keys(&self, element: &ElementRef, text: &str) -> Result<(), DriverError> {
        let mut state = self.enter().await?;
        match self.resolve(&state, element)? {
            Node::Control(r, c) if text == keys::ENTER => {
                self.activate(&mut state, r, c, "keyboard").await
            }
            _ => Ok(()),
        }
    }

    async fn clear(&self, element: &ElementRef) -> Result<(), DriverError> {
        let state = self.enter().await?;
        self.resolve(&state, element).map(|_| ())
    }

    async fn execute_script(&self, script: &str, args: Vec<Value>) -> Result<Value, DriverError> {
        let mut state = self.enter().await?;
        let Some(target) = args.first().and_then(ElementRef::from_wire) else {
            return Ok(Value::Null);
        };
        let node = self.resolve(&state, &target)?;

        if script == CLICK_SCRIPT {
            match node {
                Node::Control(r, c) => self.activate(&mut state, r, c, "script").await?,
                other => self.press(&mut state, other).await?,
            }
            return Ok(Value::Null);
        }

        let Some(wanted) = args.get(1).and_then(Value::as_str) else {
            return Ok(Value::Null);
        };
        let (field, offered) = match node {
            Node::DateSelect => ("date", self.site.dates.iter().any(|d| d == wanted)),
            Node::TimeSelect => ("time", self.site.times.iter().any(|(_, v)| v == wanted)),
            _ => return Ok(Value::Bool(false)),
        };
        if offered {
            self.site
                .record(MockEvent::Selected {
                    worker: self.worker,
                    field: field.to_string(),
                    value: wanted.to_string(),
                })
                .await;
        }
        Ok(Value::Bool(offered))
    }

    async fn set_implicit_wait(&self, wait: Duration) -> Result<(), DriverError> {
        let mut state = self.enter().await?;
        state.implicit_wait = wait;
        self.site
            .record(MockEvent::ImplicitWaitSet {
                worker: self.worker,
                wait,
            })
            .await;
        Ok(())
    }

    async fn window_handles(&self) -> Result<Vec<String>, DriverError> {
        let state = self.enter().await?;
        Ok(state.windows.iter().map(|w| w.handle.clone()).collect())
    }

    async fn current_window(&self) -> Result<String, DriverError> {
        let state = self.enter().await?;
        state.window().map(|w| w.handle.clone())
    }

    async fn switch_window(&self, handle: &str) -> Result<(), DriverError> {
        let mut state = self.enter().await?;
        if !state.windows.iter().any(|w| w.handle == handle) {
            return Err(DriverError::NoSuchWindow(handle.to_string()));
        }
        state.current = Some(handle.to_string());
        Ok(())
    }

    async fn close_window(&self) -> Result<(), DriverError> {
        let mut state = self.enter().await?;
        let handle = state.window()?.handle.clone();
        state.windows.retain(|w| w.handle != handle);
        state.current = None;
        self.site
            .record(MockEvent::WindowClosed {
                worker: self.worker,
                handle,
            })
            .await;
        Ok(())
    }

    async fn dialog_text(&self) -> Result<Option<String>, DriverError> {
        let state = self.enter().await?;
        Ok(state.dialog.clone())
    }

    async fn accept_dialog(&self) -> Result<(), DriverError> {
        let mut state = self.enter().await?;
        let text = state.dialog.take().ok_or(DriverError::NoDialog)?;
        self.site
            .record(MockEvent::DialogAccepted {
                worker: self.worker,
                text,
            })
            .await;
        Ok(())
    }

    async fn quit(&self) -> Result<(), DriverError> {
        if !self.site.quit_delay.is_zero() {
            tokio::time::sleep(self.site.quit_delay).await;
        }
        let mut state = self.state.lock().await;
        state.quit = true;
        self.site.record(MockEvent::Quit { worker: self.worker }).await;
        Ok(())
    }
}

/// Launches [`MockDriver`]s and records every launch request.
#[derive(Debug)]
pub struct MockDriverFactory {
    site: Arc<MockSite>,
    launches: RwLock<Vec<SessionSpec>>,
}

impl MockDriverFactory {
    pub fn new(site: Arc<MockSite>) -> Self {
        Self {
            site,
            launches: RwLock::new(Vec::new()),
        }
    }

    pub fn site(&self) -> &Arc<MockSite> {
        &self.site
    }

    /// Every launch request, including failed ones.
    pub async fn launches(&self) -> Vec<SessionSpec> {
        self.launches.read().await.clone()
    }
}

#[async_trait]
impl DriverFactory for MockDriverFactory {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn launch(&self, spec: &SessionSpec) -> Result<Box<dyn Driver>, DriverError> {
        self.launches.write().await.push(spec.clone());
        if let Some(error) = self.site.take_launch_error().await {
            return Err(error);
        }
        Ok(Box::new(MockDriver::new(spec.worker_index, self.site.clone())))
    }
}
