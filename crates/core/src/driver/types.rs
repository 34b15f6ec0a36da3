//! Types for the browser driver abstraction.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// W3C WebDriver key that identifies a serialized element reference.
pub const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Key codes understood by `send_keys`.
pub mod keys {
    pub const ENTER: &str = "\u{E007}";
}

/// How to find an element on the page.
///
/// In TOML a locator is a single-key table, e.g. `{ id = "dptDt" }` or
/// `{ xpath = "//input[@value='조회하기']" }`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Locator {
    Css(String),
    #[serde(rename = "xpath")]
    XPath(String),
    Id(String),
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Self::Css(selector.into())
    }

    pub fn xpath(expr: impl Into<String>) -> Self {
        Self::XPath(expr.into())
    }

    pub fn id(id: impl Into<String>) -> Self {
        Self::Id(id.into())
    }

    /// The `(using, value)` pair sent over the wire.
    ///
    /// W3C WebDriver has no `id` strategy, so ids become CSS attribute selectors.
    pub fn to_wire(&self) -> (&'static str, String) {
        match self {
            Self::Css(s) => ("css selector", s.clone()),
            Self::XPath(s) => ("xpath", s.clone()),
            Self::Id(s) => ("css selector", format!("[id=\"{}\"]", s.replace('"', "\\\""))),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Css(s) => write!(f, "css:{s}"),
            Self::XPath(s) => write!(f, "xpath:{s}"),
            Self::Id(s) => write!(f, "id:{s}"),
        }
    }
}

/// Opaque handle to an element inside a live browser session.
///
/// Handles go stale when the page re-renders; operations on a stale handle
/// fail with [`DriverError::StaleElement`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementRef(String);

impl ElementRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }

    /// Serialized form used as a script argument.
    pub fn to_wire(&self) -> Value {
        serde_json::json!({ ELEMENT_KEY: self.0 })
    }

    /// Parse a serialized element reference (W3C or legacy key).
    pub fn from_wire(value: &Value) -> Option<Self> {
        value
            .get(ELEMENT_KEY)
            .or_else(|| value.get("ELEMENT"))
            .and_then(Value::as_str)
            .map(Self::new)
    }
}

/// Errors from browser driver operations.
#[derive(Debug, Clone, Error)]
pub enum DriverError {
    #[error("element not found: {0}")]
    ElementNotFound(String),

    #[error("stale element reference: {0}")]
    StaleElement(String),

    #[error("no such window: {0}")]
    NoSuchWindow(String),

    #[error("unexpected dialog open: {0}")]
    UnexpectedDialog(String),

    #[error("no dialog open")]
    NoDialog,

    #[error("operation timed out: {0}")]
    Timeout(String),

    #[error("failed to launch browser: {0}")]
    LaunchFailed(String),

    #[error("connection to driver failed: {0}")]
    ConnectionFailed(String),

    #[error("driver protocol error: {0}")]
    Protocol(String),
}

impl DriverError {
    /// Errors that only affect a single element lookup, not the session.
    pub fn is_element_scoped(&self) -> bool {
        matches!(self, Self::ElementNotFound(_) | Self::StaleElement(_))
    }
}

/// Headless launch mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeadlessMode {
    /// `--headless=new`
    New,
    /// Plain `--headless`, for browsers that reject the new mode.
    Legacy,
}

impl HeadlessMode {
    pub fn flag(&self) -> &'static str {
        match self {
            Self::New => "--headless=new",
            Self::Legacy => "--headless",
        }
    }
}

/// Parameters for launching one isolated browser session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSpec {
    pub worker_index: usize,
    pub headless: Option<HeadlessMode>,
}

/// A live browser session.
///
/// Implementations talk to a real browser ([`super::WebDriverSession`]) or
/// simulate one in tests (`testing::MockDriver`).
#[async_trait]
pub trait Driver: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<(), DriverError>;

    async fn back(&self) -> Result<(), DriverError>;

    async fn current_url(&self) -> Result<String, DriverError>;

    async fn find(&self, locator: &Locator) -> Result<ElementRef, DriverError>;

    /// Find all matches. An empty result is not an error.
    async fn find_all(&self, locator: &Locator) -> Result<Vec<ElementRef>, DriverError>;

    async fn find_all_in(
        &self,
        parent: &ElementRef,
        locator: &Locator,
    ) -> Result<Vec<ElementRef>, DriverError>;

    async fn text(&self, element: &ElementRef) -> Result<String, DriverError>;

    async fn attribute(
        &self,
        element: &ElementRef,
        name: &str,
    ) -> Result<Option<String>, DriverError>;

    async fn click(&self, element: &ElementRef) -> Result<(), DriverError>;

    async fn send_keys(&self, element: &ElementRef, text: &str) -> Result<(), DriverError>;

    async fn clear(&self, element: &ElementRef) -> Result<(), DriverError>;

    async fn execute_script(&self, script: &str, args: Vec<Value>) -> Result<Value, DriverError>;

    async fn set_implicit_wait(&self, wait: Duration) -> Result<(), DriverError>;

    async fn window_handles(&self) -> Result<Vec<String>, DriverError>;

    async fn current_window(&self) -> Result<String, DriverError>;

    async fn switch_window(&self, handle: &str) -> Result<(), DriverError>;

    async fn close_window(&self) -> Result<(), DriverError>;

    /// Text of the open dialog, `None` when no dialog is showing.
    async fn dialog_text(&self) -> Result<Option<String>, DriverError>;

    async fn accept_dialog(&self) -> Result<(), DriverError>;

    async fn quit(&self) -> Result<(), DriverError>;
}

/// Launches isolated browser sessions.
#[async_trait]
pub trait DriverFactory: Send + Sync {
    fn name(&self) -> &'static str;

    async fn launch(&self, spec: &SessionSpec) -> Result<Box<dyn Driver>, DriverError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locator_from_toml_table() {
        #[derive(Deserialize)]
        struct Wrap {
            a: Locator,
            b: Locator,
            c: Locator,
        }
        let toml = r#"
a = { id = "dptDt" }
b = { css = "input.loginSubmit" }
c = { xpath = "//input[@value='조회하기']" }
"#;
        let w: Wrap = toml::from_str(toml).unwrap();
        assert_eq!(w.a, Locator::id("dptDt"));
        assert_eq!(w.b, Locator::css("input.loginSubmit"));
        assert_eq!(w.c, Locator::xpath("//input[@value='조회하기']"));
    }

    #[test]
    fn test_id_locator_becomes_css() {
        let (using, value) = Locator::id("srchDvNm01").to_wire();
        assert_eq!(using, "css selector");
        assert_eq!(value, "[id=\"srchDvNm01\"]");
    }

    #[test]
    fn test_element_ref_wire_roundtrip() {
        let el = ElementRef::new("abc-123");
        let wire = el.to_wire();
        assert_eq!(ElementRef::from_wire(&wire), Some(el));
        assert_eq!(
            ElementRef::from_wire(&serde_json::json!({"ELEMENT": "legacy"})),
            Some(ElementRef::new("legacy"))
        );
        assert_eq!(ElementRef::from_wire(&serde_json::json!("nope")), None);
    }

    #[test]
    fn test_element_scoped_errors() {
        assert!(DriverError::ElementNotFound("x".into()).is_element_scoped());
        assert!(DriverError::StaleElement("x".into()).is_element_scoped());
        assert!(!DriverError::NoSuchWindow("x".into()).is_element_scoped());
    }
}
