//! W3C WebDriver client over HTTP.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, Response};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::process::Child;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{Driver, DriverError, ElementRef, Locator};

/// A browser session driven through a WebDriver endpoint.
pub struct WebDriverSession {
    client: Client,
    base_url: String,
    session_id: String,
    /// chromedriver process owned by this session, if we spawned it.
    service: Mutex<Option<Child>>,
    /// Temporary profile directory, removed on drop.
    _profile: Option<TempDir>,
}

impl std::fmt::Debug for WebDriverSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebDriverSession")
            .field("base_url", &self.base_url)
            .field("session_id", &self.session_id)
            .finish()
    }
}

impl WebDriverSession {
    /// Open a new session against a running WebDriver endpoint.
    pub async fn create(
        client: Client,
        base_url: impl Into<String>,
        capabilities: Value,
    ) -> Result<Self, DriverError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let response = client
            .post(format!("{}/session", base_url))
            .json(&json!({ "capabilities": capabilities }))
            .send()
            .await
            .map_err(transport_error)?;

        let value = parse_response(response).await.map_err(|e| match e {
            DriverError::Protocol(msg) => DriverError::LaunchFailed(msg),
            other => other,
        })?;

        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| DriverError::Protocol("new session response has no sessionId".into()))?
            .to_string();

        debug!(%base_url, %session_id, "webdriver session created");

        Ok(Self {
            client,
            base_url,
            session_id,
            service: Mutex::new(None),
            _profile: None,
        })
    }

    /// Tie a spawned chromedriver process and profile dir to this session's lifetime.
    pub(crate) fn with_service(mut self, service: Child, profile: TempDir) -> Self {
        self.service = Mutex::new(Some(service));
        self._profile = Some(profile);
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    async fn command(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, DriverError> {
        let url = format!("{}/session/{}{}", self.base_url, self.session_id, path);
        let mut request = self.client.request(method.clone(), &url);
        if method == Method::POST {
            request = request.json(&body.unwrap_or_else(|| json!({})));
        }

        let response = request.send().await.map_err(transport_error)?;
        parse_response(response).await
    }

    async fn get(&self, path: &str) -> Result<Value, DriverError> {
        self.command(Method::GET, path, None).await
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value, DriverError> {
        self.command(Method::POST, path, Some(body)).await
    }

    async fn delete(&self, path: &str) -> Result<Value, DriverError> {
        self.command(Method::DELETE, path, None).await
    }
}

fn transport_error(e: reqwest::Error) -> DriverError {
    if e.is_timeout() {
        DriverError::Timeout(e.to_string())
    } else if e.is_connect() {
        DriverError::ConnectionFailed(e.to_string())
    } else {
        DriverError::Protocol(e.to_string())
    }
}

async fn parse_response(response: Response) -> Result<Value, DriverError> {
    let status = response.status();
    let body: Value = response
        .json()
        .await
        .map_err(|e| DriverError::Protocol(format!("HTTP {}: invalid body: {}", status, e)))?;

    let value = body.get("value").cloned().unwrap_or(Value::Null);
    if let Some(code) = value.get("error").and_then(Value::as_str) {
        let message = value.get("message").and_then(Value::as_str).unwrap_or_default();
        return Err(map_wire_error(code, message));
    }
    if !status.is_success() {
        return Err(DriverError::Protocol(format!("HTTP {}", status)));
    }
    Ok(value)
}

/// Map a W3C error code to a [`DriverError`].
pub(crate) fn map_wire_error(code: &str, message: &str) -> DriverError {
    let message = message.lines().next().unwrap_or_default().to_string();
    match code {
        "no such element" => DriverError::ElementNotFound(message),
        "stale element reference" => DriverError::StaleElement(message),
        "no such window" => DriverError::NoSuchWindow(message),
        "no such alert" => DriverError::NoDialog,
        "unexpected alert open" => DriverError::UnexpectedDialog(message),
        "timeout" | "script timeout" => DriverError::Timeout(message),
        "session not created" => DriverError::LaunchFailed(message),
        other => DriverError::Protocol(format!("{}: {}", other, message)),
    }
}

fn as_string(value: Value) -> Result<String, DriverError> {
    match value {
        Value::String(s) => Ok(s),
        other => Err(DriverError::Protocol(format!("expected string, got {}", other))),
    }
}

fn element_from(value: &Value) -> Result<ElementRef, DriverError> {
    ElementRef::from_wire(value)
        .ok_or_else(|| DriverError::Protocol(format!("not an element reference: {}", value)))
}

fn elements_from(value: Value) -> Result<Vec<ElementRef>, DriverError> {
    match value {
        Value::Array(items) => items.iter().map(element_from).collect(),
        other => Err(DriverError::Protocol(format!("expected array, got {}", other))),
    }
}

fn locator_body(locator: &Locator) -> Value {
    let (using, value) = locator.to_wire();
    json!({ "using": using, "value": value })
}

#[async_trait]
impl Driver for WebDriverSession {
    async fn navigate(&self, url: &str) -> Result<(), DriverError> {
        self.post("/url", json!({ "url": url })).await.map(|_| ())
    }

    async fn back(&self) -> Result<(), DriverError> {
        self.post("/back", json!({})).await.map(|_| ())
    }

    async fn current_url(&self) -> Result<String, DriverError> {
        as_string(self.get("/url").await?)
    }

    async fn find(&self, locator: &Locator) -> Result<ElementRef, DriverError> {
        let value = self.post("/element", locator_body(locator)).await?;
        element_from(&value)
    }

    async fn find_all(&self, locator: &Locator) -> Result<Vec<ElementRef>, DriverError> {
        elements_from(self.post("/elements", locator_body(locator)).await?)
    }

    async fn find_all_in(
        &self,
        parent: &ElementRef,
        locator: &Locator,
    ) -> Result<Vec<ElementRef>, DriverError> {
        let path = format!("/element/{}/elements", parent.id());
        elements_from(self.post(&path, locator_body(locator)).await?)
    }

    async fn text(&self, element: &ElementRef) -> Result<String, DriverError> {
        as_string(self.get(&format!("/element/{}/text", element.id())).await?)
    }

    async fn attribute(
        &self,
        element: &ElementRef,
        name: &str,
    ) -> Result<Option<String>, DriverError> {
        let path = format!("/element/{}/attribute/{}", element.id(), name);
        match self.get(&path).await? {
            Value::Null => Ok(None),
            Value::String(s) => Ok(Some(s)),
            other => Ok(Some(other.to_string())),
        }
    }

    async fn click(&self, element: &ElementRef) -> Result<(), DriverError> {
        let path = format!("/element/{}/click", element.id());
        self.post(&path, json!({})).await.map(|_| ())
    }

    async fn send_keys(&self, element: &ElementRef, text: &str) -> Result<(), DriverError> {
        let path = format!("/element/{}/value", element.id());
        self.post(&path, json!({ "text": text })).await.map(|_| ())
    }

    async fn clear(&self, element: &ElementRef) -> Result<(), DriverError> {
        let path = format!("/element/{}/clear", element.id());
        self.post(&path, json!({})).await.map(|_| ())
    }

    async fn execute_script(&self, script: &str, args: Vec<Value>) -> Result<Value, DriverError> {
        self.post("/execute/sync", json!({ "script": script, "args": args }))
            .await
    }

    async fn set_implicit_wait(&self, wait: Duration) -> Result<(), DriverError> {
        let ms = wait.as_millis() as u64;
        self.post("/timeouts", json!({ "implicit": ms })).await.map(|_| ())
    }

    async fn window_handles(&self) -> Result<Vec<String>, DriverError> {
        match self.get("/window/handles").await? {
            Value::Array(items) => items.into_iter().map(as_string).collect(),
            other => Err(DriverError::Protocol(format!("expected array, got {}", other))),
        }
    }

    async fn current_window(&self) -> Result<String, DriverError> {
        as_string(self.get("/window").await?)
    }

    async fn switch_window(&self, handle: &str) -> Result<(), DriverError> {
        self.post("/window", json!({ "handle": handle })).await.map(|_| ())
    }

    async fn close_window(&self) -> Result<(), DriverError> {
        self.delete("/window").await.map(|_| ())
    }

    async fn dialog_text(&self) -> Result<Option<String>, DriverError> {
        match self.get("/alert/text").await {
            Ok(value) => as_string(value).map(Some),
            Err(DriverError::NoDialog) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn accept_dialog(&self) -> Result<(), DriverError> {
        self.post("/alert/accept", json!({})).await.map(|_| ())
    }

    async fn quit(&self) -> Result<(), DriverError> {
        let result = self.delete("").await.map(|_| ());

        if let Some(mut child) = self.service.lock().await.take() {
            if let Err(e) = child.kill().await {
                warn!(error = %e, "failed to stop chromedriver");
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_wire_error() {
        assert!(matches!(
            map_wire_error("no such element", "Unable to locate"),
            DriverError::ElementNotFound(_)
        ));
        assert!(matches!(
            map_wire_error("stale element reference", "gone"),
            DriverError::StaleElement(_)
        ));
        assert!(matches!(map_wire_error("no such alert", ""), DriverError::NoDialog));
        assert!(matches!(
            map_wire_error("session not created", "bad flag"),
            DriverError::LaunchFailed(_)
        ));
        match map_wire_error("javascript error", "boom\n  at line 1") {
            DriverError::Protocol(msg) => assert_eq!(msg, "javascript error: boom"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_elements_from_array() {
        let value = json!([
            { crate::driver::ELEMENT_KEY: "a" },
            { crate::driver::ELEMENT_KEY: "b" }
        ]);
        let elements = elements_from(value).unwrap();
        assert_eq!(elements, vec![ElementRef::new("a"), ElementRef::new("b")]);
        assert!(elements_from(json!({})).is_err());
    }

    #[test]
    fn test_locator_body() {
        let body = locator_body(&Locator::xpath("//a"));
        assert_eq!(body["using"], "xpath");
        assert_eq!(body["value"], "//a");
    }
}
