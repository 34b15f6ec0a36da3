//! Mock notifier for testing.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{Notify, RwLock};

use crate::notify::{Notification, Notifier, NotifyError};

/// Records every notification; can be told to fail.
#[derive(Debug, Default)]
pub struct MockNotifier {
    notifications: Arc<RwLock<Vec<Notification>>>,
    fail: Arc<RwLock<bool>>,
    delivered: Arc<Notify>,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent deliveries fail (they are still recorded).
    pub async fn set_fail(&self, fail: bool) {
        *self.fail.write().await = fail;
    }

    pub async fn notifications(&self) -> Vec<Notification> {
        self.notifications.read().await.clone()
    }

    /// Wait until at least `count` notifications were recorded.
    pub async fn wait_for(&self, count: usize) {
        loop {
            let delivered = self.delivered.notified();
            tokio::pin!(delivered);
            delivered.as_mut().enable();
            if self.notifications.read().await.len() >= count {
                return;
            }
            delivered.await;
        }
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    fn name(&self) -> &str {
        "mock"
    }

    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.notifications.write().await.push(notification.clone());
        self.delivered.notify_waiters();
        if *self.fail.read().await {
            return Err(NotifyError::Delivery("mock failure".into()));
        }
        Ok(())
    }
}
