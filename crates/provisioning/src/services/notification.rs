//! Notification service trait and in-memory implementation.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::error::ProvisioningError;

/// Sends templated messages (email and the like).
#[async_trait]
pub trait NotificationService: Send + Sync {
    async fn send(
        &self,
        template: &str,
        recipient: &str,
        data: &serde_json::Value,
    ) -> Result<(), ProvisioningError>;
}

/// A message recorded by [`InMemoryNotificationService`].
#[derive(Debug, Clone, PartialEq)]
pub struct SentNotification {
    pub template: String,
    pub recipient: String,
    pub data: serde_json::Value,
}

#[derive(Debug, Default)]
struct InMemoryNotificationState {
    sent: Vec<SentNotification>,
    fail: bool,
}

/// In-memory notification service for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotificationService {
    state: Arc<RwLock<InMemoryNotificationState>>,
}

impl InMemoryNotificationService {
    /// Creates a new in-memory notification service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures sends to fail.
    pub fn set_fail(&self, fail: bool) {
        self.state.write().unwrap().fail = fail;
    }

    /// Returns the sent messages, oldest first.
    pub fn sent(&self) -> Vec<SentNotification> {
        self.state.read().unwrap().sent.clone()
    }

    /// Returns the sent messages using a template.
    pub fn sent_with(&self, template: &str) -> Vec<SentNotification> {
        self.state
            .read()
            .unwrap()
            .sent
            .iter()
            .filter(|n| n.template == template)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl NotificationService for InMemoryNotificationService {
    async fn send(
        &self,
        template: &str,
        recipient: &str,
        data: &serde_json::Value,
    ) -> Result<(), ProvisioningError> {
        let mut state = self.state.write().unwrap();
        if state.fail {
            return Err(ProvisioningError::Notification(format!(
                "could not deliver {template} to {recipient}"
            )));
        }
        state.sent.push(SentNotification {
            template: template.to_string(),
            recipient: recipient.to_string(),
            data: data.clone(),
        });
        Ok(())
    }
}
