//! Webhook notification backend.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use super::{Notification, Notifier, NotifyError};

/// POSTs each notification as JSON to a fixed URL.
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, NotifyError> {
        let url = url.into();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(NotifyError::Config(format!("webhook URL must be http(s): {}", url)));
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::Config(e.to_string()))?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.url)
            .json(notification)
            .send()
            .await
            .map_err(|e| NotifyError::Delivery(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Rejected(status.as_u16()));
        }
        debug!(url = %self.url, "webhook notification delivered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_http_url() {
        let result = WebhookNotifier::new("ftp://example.com", Duration::from_secs(1));
        assert!(matches!(result, Err(NotifyError::Config(_))));
        assert!(WebhookNotifier::new("https://example.com/hook", Duration::from_secs(1)).is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_delivery_error() {
        let notifier =
            WebhookNotifier::new("http://127.0.0.1:9/hook", Duration::from_millis(500)).unwrap();
        let notification = Notification::for_success(
            crate::testing::fixtures::request().summary(),
            crate::attempt::AttemptOutcome::succeeded(0, Default::default(), None),
        );
        assert!(matches!(
            notifier.notify(&notification).await,
            Err(NotifyError::Delivery(_))
        ));
    }
}
