//! Common test utilities for API testing with a simulated booking site.
//!
//! This module provides a test fixture that creates an in-process router
//! with the mock driver factory injected, enabling end-to-end runs without
//! a browser or network access.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use seatrace_core::testing::{MockDriverFactory, MockNotifier, MockSite};
use seatrace_core::{Config, DriverFactory, Notifier};
use seatrace_server::state::AppState;

/// Re-export fixtures for test convenience
pub use seatrace_core::testing::fixtures;

/// Test fixture for API testing with mock dependencies.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_start() {
///     let fixture = TestFixture::new(MockSite::builder().build());
///     let response = fixture.post("/api/v1/start", start_body()).await;
///     assert_eq!(response.status, 200);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Shared state behind the router
    pub state: Arc<AppState>,
    /// Simulated booking site - inspect recorded events
    pub site: Arc<MockSite>,
    /// Mock driver factory - inspect launches
    pub factory: Arc<MockDriverFactory>,
    /// Mock notifier - inspect delivered notifications
    pub notifier: Arc<MockNotifier>,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestFixture {
    /// Create a fixture with fast pacing against `site`.
    pub fn new(site: Arc<MockSite>) -> Self {
        Self::with_config(site, fixtures::fast_config())
    }

    /// Create a fixture with a custom configuration.
    pub fn with_config(site: Arc<MockSite>, config: Config) -> Self {
        let factory = Arc::new(MockDriverFactory::new(site.clone()));
        let notifier = Arc::new(MockNotifier::new());

        let state = Arc::new(AppState::new(
            config,
            Arc::clone(&factory) as Arc<dyn DriverFactory>,
            Arc::clone(&notifier) as Arc<dyn Notifier>,
        ));
        let router = seatrace_server::api::create_router(state.clone());

        Self {
            router,
            state,
            site,
            factory,
            notifier,
        }
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a POST request without a body.
    pub async fn post_empty(&self, path: &str) -> TestResponse {
        self.request("POST", path, None).await
    }

    /// Send a GET request and return the raw text body.
    pub async fn get_text(&self, path: &str) -> (StatusCode, String) {
        let request = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        (status, String::from_utf8_lossy(&body_bytes).into_owned())
    }

    /// Poll `/api/v1/status` until the run is no longer running.
    pub async fn wait_until_idle(&self, max_wait: Duration) -> TestResponse {
        let deadline = tokio::time::Instant::now() + max_wait;
        loop {
            let response = self.get("/api/v1/status").await;
            if response.body["running"] == json!(false) {
                return response;
            }
            if tokio::time::Instant::now() >= deadline {
                panic!("run still active after {:?}: {}", max_wait, response.body);
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    /// Send a request to the test server.
    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        let request = request_builder.body(body).unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body }
    }
}

/// A valid `/start` body matching the fixture site's defaults.
pub fn start_body() -> Value {
    json!({
        "userId": "user",
        "password": "secret",
        "origin": "수서",
        "destination": "부산",
        "date": "2026-03-14",
        "time": "09:00",
    })
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}
