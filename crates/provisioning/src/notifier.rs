//! Fire-and-forget outcome notifications.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::services::NotificationService;

/// Sent to the owner once the tenant is active.
pub const TEMPLATE_WELCOME: &str = "tenant_welcome";

/// Sent to the owner when reconciliation gives up on the tenant.
pub const TEMPLATE_PROVISIONING_FAILED: &str = "tenant_provisioning_failed";

/// Dispatches notifications on background tasks. Failures are logged and
/// counted, never returned.
#[derive(Clone)]
pub struct NotificationDispatcher {
    service: Arc<dyn NotificationService>,
}

impl NotificationDispatcher {
    pub fn new(service: Arc<dyn NotificationService>) -> Self {
        Self { service }
    }

    /// Sends `template` to `recipient` without waiting for the result.
    ///
    /// The handle is only useful to tests that need to observe delivery.
    pub fn dispatch(
        &self,
        template: &'static str,
        recipient: impl Into<String>,
        data: serde_json::Value,
    ) -> JoinHandle<()> {
        let service = Arc::clone(&self.service);
        let recipient = recipient.into();

        tokio::spawn(async move {
            match service.send(template, &recipient, &data).await {
                Ok(()) => tracing::debug!(template, recipient = %recipient, "Notification sent"),
                Err(e) => {
                    metrics::counter!("notifications_failed_total", "template" => template)
                        .increment(1);
                    tracing::warn!(template, recipient = %recipient, error = %e, "Notification failed");
                }
            }
        })
    }
}
