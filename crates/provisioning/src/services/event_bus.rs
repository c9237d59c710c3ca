//! Message bus traits and in-memory implementation.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::error::ProvisioningError;

/// A connected publisher on the message bus.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publishes a message and waits for the broker to confirm it.
    async fn publish(&self, topic: &str, payload: &serde_json::Value)
    -> Result<(), ProvisioningError>;
}

/// Establishes bus connections.
#[async_trait]
pub trait BusConnector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn EventBus>, ProvisioningError>;
}

/// A message recorded by [`InMemoryEventBus`].
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: serde_json::Value,
}

#[derive(Debug, Default)]
struct InMemoryBusState {
    published: Vec<PublishedMessage>,
    fail_on_publish: bool,
}

/// In-memory message bus for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEventBus {
    state: Arc<RwLock<InMemoryBusState>>,
}

impl InMemoryEventBus {
    /// Creates a new in-memory bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures publishes to go unconfirmed.
    pub fn set_fail_on_publish(&self, fail: bool) {
        self.state.write().unwrap().fail_on_publish = fail;
    }

    /// Returns every confirmed message, oldest first.
    pub fn published(&self) -> Vec<PublishedMessage> {
        self.state.read().unwrap().published.clone()
    }

    /// Returns the confirmed messages on a topic.
    pub fn published_on(&self, topic: &str) -> Vec<PublishedMessage> {
        self.state
            .read()
            .unwrap()
            .published
            .iter()
            .filter(|m| m.topic == topic)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(
        &self,
        topic: &str,
        payload: &serde_json::Value,
    ) -> Result<(), ProvisioningError> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_publish {
            return Err(ProvisioningError::unavailable("bus", "publish not confirmed"));
        }

        state.published.push(PublishedMessage {
            topic: topic.to_string(),
            payload: payload.clone(),
        });
        Ok(())
    }
}

#[derive(Debug, Default)]
struct InMemoryConnectorState {
    failures_remaining: u32,
    refuse: bool,
    attempts: u32,
}

/// Connector handing out a shared [`InMemoryEventBus`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryBusConnector {
    bus: InMemoryEventBus,
    state: Arc<RwLock<InMemoryConnectorState>>,
}

impl InMemoryBusConnector {
    /// Creates a connector for `bus`.
    pub fn new(bus: InMemoryEventBus) -> Self {
        Self {
            bus,
            state: Arc::default(),
        }
    }

    /// Makes the next `n` connection attempts fail.
    pub fn fail_times(&self, n: u32) {
        self.state.write().unwrap().failures_remaining = n;
    }

    /// Configures every connection attempt to fail.
    pub fn set_refuse(&self, refuse: bool) {
        self.state.write().unwrap().refuse = refuse;
    }

    /// Returns how many connection attempts were made.
    pub fn attempts(&self) -> u32 {
        self.state.read().unwrap().attempts
    }
}

#[async_trait]
impl BusConnector for InMemoryBusConnector {
    async fn connect(&self) -> Result<Arc<dyn EventBus>, ProvisioningError> {
        let mut state = self.state.write().unwrap();
        state.attempts += 1;

        if state.refuse {
            return Err(ProvisioningError::unavailable("bus", "connection refused"));
        }
        if state.failures_remaining > 0 {
            state.failures_remaining -= 1;
            return Err(ProvisioningError::unavailable("bus", "connection refused"));
        }

        Ok(Arc::new(self.bus.clone()))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn test_publish_records_messages() {
        let bus = InMemoryEventBus::new();
        bus.publish("tenant.created", &json!({"slug": "acme"}))
            .await
            .unwrap();

        assert_eq!(bus.published_on("tenant.created").len(), 1);
        assert!(bus.published_on("tenant.deleted").is_empty());

        bus.set_fail_on_publish(true);
        assert!(bus.publish("tenant.created", &json!({})).await.is_err());
        assert_eq!(bus.published().len(), 1);
    }

    #[tokio::test]
    async fn test_connector_failures() {
        let bus = InMemoryEventBus::new();
        let connector = InMemoryBusConnector::new(bus.clone());
        connector.fail_times(1);

        assert!(connector.connect().await.is_err());
        let connected = connector.connect().await.unwrap();
        connected.publish("t", &json!(1)).await.unwrap();

        assert_eq!(connector.attempts(), 2);
        assert_eq!(bus.published().len(), 1);
    }
}
