//! Mock push notifier for testing.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::notify::{Notifier, NotifyError, PushMessage, PushTarget};

/// A delivered message.
#[derive(Debug, Clone)]
pub struct SentNotification {
    pub target: PushTarget,
    pub message: PushMessage,
}

/// Mock implementation of [`Notifier`] that records deliveries.
///
/// Failed deliveries are not recorded.
#[derive(Debug, Default)]
pub struct MockNotifier {
    sent: Arc<RwLock<Vec<SentNotification>>>,
    next_error: Arc<RwLock<Option<NotifyError>>>,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<SentNotification> {
        self.sent.read().await.clone()
    }

    pub async fn fail_next(&self, error: NotifyError) {
        *self.next_error.write().await = Some(error);
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn send(&self, target: &PushTarget, message: &PushMessage) -> Result<(), NotifyError> {
        if let Some(error) = self.next_error.write().await.take() {
            return Err(error);
        }
        self.sent.write().await.push(SentNotification {
            target: target.clone(),
            message: message.clone(),
        });
        Ok(())
    }
}
