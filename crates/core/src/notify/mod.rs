//! Outcome notification.
//!
//! A run notifies exactly once, after it secures a seat. Backends are
//! selected from [`NotifyConfig`]: a tracing log line, a webhook, or both.

mod types;
mod webhook;

pub use types::*;
pub use webhook::WebhookNotifier;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

/// Writes notifications to the tracing log.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        info!(title = %notification.title, "{}", notification.body);
        Ok(())
    }
}

/// Fans a notification out to several backends.
///
/// Every backend is tried; the first failure is returned after all ran.
pub struct CompositeNotifier {
    notifiers: Vec<Arc<dyn Notifier>>,
}

impl CompositeNotifier {
    pub fn new(notifiers: Vec<Arc<dyn Notifier>>) -> Self {
        Self { notifiers }
    }

    pub fn is_empty(&self) -> bool {
        self.notifiers.is_empty()
    }
}

#[async_trait]
impl Notifier for CompositeNotifier {
    fn name(&self) -> &str {
        "composite"
    }

    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        let mut first_error = None;
        for notifier in &self.notifiers {
            if let Err(e) = notifier.notify(notification).await {
                tracing::warn!(notifier = notifier.name(), error = %e, "notification failed");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Build the notifier described by `config`.
pub fn create_notifier(config: &NotifyConfig) -> Result<Arc<dyn Notifier>, NotifyError> {
    let mut notifiers: Vec<Arc<dyn Notifier>> = Vec::new();
    if config.log {
        notifiers.push(Arc::new(LogNotifier));
    }
    if let Some(url) = config.webhook_url.as_deref().filter(|u| !u.trim().is_empty()) {
        notifiers.push(Arc::new(WebhookNotifier::new(
            url.trim(),
            Duration::from_secs(config.timeout_secs),
        )?));
    }

    Ok(match notifiers.len() {
        1 => notifiers.remove(0),
        _ => Arc::new(CompositeNotifier::new(notifiers)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attempt::{AttemptOutcome, ClaimMode, SeatKind};
    use crate::testing::{fixtures, MockNotifier};

    fn notification() -> Notification {
        Notification::for_success(
            fixtures::request().summary(),
            AttemptOutcome::succeeded(1, ClaimMode::Reserve, Some(SeatKind::Premium)),
        )
    }

    #[test]
    fn test_success_notification_text() {
        let n = notification();
        assert_eq!(n.title, "Seat reserved");
        assert!(n.body.contains("수서 → 부산"));
        assert!(n.body.contains("(premium)"));
        assert!(n.body.contains("worker 1"));

        let waitlist = Notification::for_success(
            fixtures::request().summary(),
            AttemptOutcome::succeeded(0, ClaimMode::Waitlist, None),
        );
        assert_eq!(waitlist.title, "Waitlist entry secured");
    }

    #[test]
    fn test_create_notifier_selection() {
        let log_only = create_notifier(&NotifyConfig::default()).unwrap();
        assert_eq!(log_only.name(), "log");

        let both = create_notifier(&NotifyConfig {
            webhook_url: Some("http://localhost:9000/hook".into()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(both.name(), "composite");

        let bad = create_notifier(&NotifyConfig {
            webhook_url: Some("localhost".into()),
            ..Default::default()
        });
        assert!(bad.is_err());
    }

    #[tokio::test]
    async fn test_composite_runs_every_backend() {
        let failing = Arc::new(MockNotifier::new());
        failing.set_fail(true).await;
        let working = Arc::new(MockNotifier::new());
        let composite = CompositeNotifier::new(vec![failing.clone(), working.clone()]);

        assert!(composite.notify(&notification()).await.is_err());
        assert_eq!(working.notifications().await.len(), 1);
        assert_eq!(failing.notifications().await.len(), 1);
    }
}
