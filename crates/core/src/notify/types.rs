//! Types for outcome notification.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::attempt::{AttemptOutcome, ClaimKind, RequestSummary};

/// Configuration for outcome notifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Receives a JSON POST of every [`Notification`].
    #[serde(default)]
    pub webhook_url: Option<String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Also emit notifications as log events.
    #[serde(default = "default_log")]
    pub log: bool,
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_log() -> bool {
    true
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout_secs: default_timeout_secs(),
            log: default_log(),
        }
    }
}

/// The message sent when a run secures a seat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub request: RequestSummary,
    pub outcome: AttemptOutcome,
}

impl Notification {
    pub fn for_success(request: RequestSummary, outcome: AttemptOutcome) -> Self {
        let title = match outcome.kind {
            ClaimKind::Waitlist => "Waitlist entry secured",
            _ => "Seat reserved",
        }
        .to_string();

        let mut body = request.to_string();
        if let Some(seat) = outcome.seat {
            body.push_str(&format!(" ({})", seat.as_str()));
        }
        if let Some(worker) = outcome.worker {
            body.push_str(&format!(", worker {}", worker));
        }

        Self {
            title,
            body,
            request,
            outcome,
        }
    }
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("invalid notifier configuration: {0}")]
    Config(String),

    #[error("delivery failed: {0}")]
    Delivery(String),

    #[error("endpoint rejected notification: HTTP {0}")]
    Rejected(u16),
}

/// Delivers notifications. Delivery is best effort; callers log failures.
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}
