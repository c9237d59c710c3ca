//! At-least-once tenant lifecycle announcements with an HTTP fallback.
//!
//! Every event is published on the bus. When the bus cannot confirm it
//! (publish error or no connection yet) and a [`HostProvisioner`] is
//! configured, the routing hosts are provisioned synchronously instead. The
//! two paths are independent best-effort calls; consumers deduplicate by
//! `event_id` and `tenant_id`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::{TenantId, UserId};
use domain::Tenant;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::{HostConfig, RetryPolicy};
use crate::error::{ProvisioningError, Result};
use crate::retry::with_retry;
use crate::services::{BusConnector, EventBus, HostProvisioner, HostRequest};

/// Topic announcing a newly active tenant.
pub const TOPIC_TENANT_CREATED: &str = "tenant.created";

/// Topic announcing a removed tenant.
pub const TOPIC_TENANT_DELETED: &str = "tenant.deleted";

/// Payload published for tenant lifecycle changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantLifecycleEvent {
    pub event_id: Uuid,
    pub event_type: String,
    pub tenant_id: TenantId,
    pub slug: String,
    pub name: String,
    pub owner_id: Option<UserId>,
    pub admin_host: String,
    pub storefront_host: String,
    pub occurred_at: DateTime<Utc>,
}

impl TenantLifecycleEvent {
    fn new(topic: &str, tenant: &Tenant, hosts: &HostConfig) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type: topic.to_string(),
            tenant_id: tenant.id,
            slug: tenant.slug.to_string(),
            name: tenant.name.clone(),
            owner_id: tenant.owner_id,
            admin_host: hosts.admin_host(&tenant.slug),
            storefront_host: hosts.storefront_host(&tenant.slug),
            occurred_at: Utc::now(),
        }
    }
}

/// Event bus connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BusHealth {
    Connected,
    Disconnected,
}

impl BusHealth {
    pub fn as_str(&self) -> &'static str {
        match self {
            BusHealth::Connected => "connected",
            BusHealth::Disconnected => "disconnected",
        }
    }
}

/// What happened on one delivery path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PathOutcome {
    Confirmed,
    Failed,
    Skipped,
}

impl PathOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            PathOutcome::Confirmed => "confirmed",
            PathOutcome::Failed => "failed",
            PathOutcome::Skipped => "skipped",
        }
    }
}

/// Per-path result of publishing one lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    pub event_id: Uuid,
    pub bus: PathOutcome,
    pub http_fallback: PathOutcome,
}

impl DeliveryReport {
    /// Returns true if at least one path confirmed delivery.
    pub fn delivered(&self) -> bool {
        self.bus == PathOutcome::Confirmed || self.http_fallback == PathOutcome::Confirmed
    }
}

/// Publishes tenant lifecycle events.
///
/// Starts disconnected; [`EventPublisher::spawn_connect`] establishes the bus
/// connection in the background so start-up never waits on the broker.
pub struct EventPublisher {
    bus: RwLock<Option<Arc<dyn EventBus>>>,
    connector: Arc<dyn BusConnector>,
    hosts: Option<Arc<dyn HostProvisioner>>,
    host_config: HostConfig,
    retry: RetryPolicy,
}

impl EventPublisher {
    /// Creates a disconnected publisher without an HTTP fallback.
    pub fn new(connector: Arc<dyn BusConnector>, host_config: HostConfig, retry: RetryPolicy) -> Self {
        Self {
            bus: RwLock::new(None),
            connector,
            hosts: None,
            host_config,
            retry,
        }
    }

    /// Enables the synchronous host-provisioning fallback.
    pub fn with_host_provisioner(mut self, hosts: Arc<dyn HostProvisioner>) -> Self {
        self.hosts = Some(hosts);
        self
    }

    /// Connects to the bus, retrying transient failures with backoff.
    #[tracing::instrument(skip(self, token))]
    pub async fn connect(&self, token: &CancellationToken) -> Result<()> {
        let connector = &self.connector;
        let bus = with_retry(&self.retry, token, "bus_connect", move || async move {
            connector.connect().await
        })
        .await?;

        *self.bus.write().await = Some(bus);
        tracing::info!("Event bus connected");
        Ok(())
    }

    /// Connects in a background task. Failure leaves the publisher
    /// disconnected and is reported through [`EventPublisher::health`].
    pub fn spawn_connect(self: &Arc<Self>, token: CancellationToken) -> JoinHandle<()> {
        let publisher = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = publisher.connect(&token).await {
                tracing::warn!(error = %e, "Event bus unavailable; publishing will use the HTTP fallback");
            }
        })
    }

    /// Returns the bus connection state.
    pub async fn health(&self) -> BusHealth {
        if self.bus.read().await.is_some() {
            BusHealth::Connected
        } else {
            BusHealth::Disconnected
        }
    }

    /// Announces an active tenant on the bus, falling back to direct host
    /// provisioning when the bus does not confirm.
    #[tracing::instrument(skip(self, tenant), fields(tenant_id = %tenant.id, slug = %tenant.slug))]
    pub async fn publish_tenant_created(&self, tenant: &Tenant) -> DeliveryReport {
        let event = TenantLifecycleEvent::new(TOPIC_TENANT_CREATED, tenant, &self.host_config);
        let bus = self.publish_on_bus(TOPIC_TENANT_CREATED, &event).await;

        let http_fallback = match (&self.hosts, bus) {
            (Some(hosts), PathOutcome::Failed) => {
                let request = HostRequest {
                    slug: event.slug.clone(),
                    tenant_id: event.tenant_id,
                    admin_host: event.admin_host.clone(),
                    storefront_host: event.storefront_host.clone(),
                };
                match hosts.provision_hosts(&request).await {
                    Ok(()) => {
                        tracing::info!("Routing hosts provisioned via HTTP fallback");
                        PathOutcome::Confirmed
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "HTTP host provisioning fallback failed");
                        PathOutcome::Failed
                    }
                }
            }
            _ => PathOutcome::Skipped,
        };
        record("http_fallback", http_fallback);

        DeliveryReport {
            event_id: event.event_id,
            bus,
            http_fallback,
        }
    }

    /// Announces a removed tenant. Bus only.
    #[tracing::instrument(skip(self, tenant), fields(tenant_id = %tenant.id))]
    pub async fn publish_tenant_deleted(&self, tenant: &Tenant) -> DeliveryReport {
        let event = TenantLifecycleEvent::new(TOPIC_TENANT_DELETED, tenant, &self.host_config);
        let bus = self.publish_on_bus(TOPIC_TENANT_DELETED, &event).await;

        DeliveryReport {
            event_id: event.event_id,
            bus,
            http_fallback: PathOutcome::Skipped,
        }
    }

    async fn publish_on_bus(&self, topic: &str, event: &TenantLifecycleEvent) -> PathOutcome {
        let outcome = match self.try_publish(topic, event).await {
            Ok(()) => PathOutcome::Confirmed,
            Err(e) => {
                tracing::warn!(topic, event_id = %event.event_id, error = %e, "Bus publish not confirmed");
                PathOutcome::Failed
            }
        };
        record("bus", outcome);
        outcome
    }

    async fn try_publish(&self, topic: &str, event: &TenantLifecycleEvent) -> Result<()> {
        let bus = self
            .bus
            .read()
            .await
            .clone()
            .ok_or_else(|| ProvisioningError::unavailable("bus", "not connected"))?;
        let payload = serde_json::to_value(event)?;
        bus.publish(topic, &payload).await
    }
}

fn record(path: &'static str, outcome: PathOutcome) {
    if outcome != PathOutcome::Skipped {
        metrics::counter!(
            "tenant_events_published_total",
            "path" => path,
            "outcome" => outcome.as_str()
        )
        .increment(1);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use domain::Slug;

    use super::*;
    use crate::services::{InMemoryBusConnector, InMemoryEventBus, InMemoryHostProvisioner};

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 2,
            initial_backoff: Duration::from_millis(1),
            multiplier: 2,
            max_backoff: Duration::from_millis(2),
        }
    }

    fn tenant() -> Tenant {
        Tenant::creating(Slug::parse("acme").unwrap(), "Acme", "USD", "en-US")
    }

    fn publisher(
        connector: &InMemoryBusConnector,
        hosts: Option<&InMemoryHostProvisioner>,
    ) -> EventPublisher {
        let publisher = EventPublisher::new(
            Arc::new(connector.clone()),
            HostConfig::default(),
            fast_retry(),
        );
        match hosts {
            Some(hosts) => publisher.with_host_provisioner(Arc::new(hosts.clone())),
            None => publisher,
        }
    }

    #[tokio::test]
    async fn test_connected_publish_skips_fallback() {
        let bus = InMemoryEventBus::new();
        let connector = InMemoryBusConnector::new(bus.clone());
        let hosts = InMemoryHostProvisioner::new();
        let publisher = publisher(&connector, Some(&hosts));

        assert_eq!(publisher.health().await, BusHealth::Disconnected);
        publisher.connect(&CancellationToken::new()).await.unwrap();
        assert_eq!(publisher.health().await, BusHealth::Connected);

        let tenant = tenant();
        let report = publisher.publish_tenant_created(&tenant).await;

        assert_eq!(report.bus, PathOutcome::Confirmed);
        assert_eq!(report.http_fallback, PathOutcome::Skipped);
        assert!(hosts.requests().is_empty());

        let published = bus.published_on(TOPIC_TENANT_CREATED);
        assert_eq!(published.len(), 1);
        let event: TenantLifecycleEvent =
            serde_json::from_value(published[0].payload.clone()).unwrap();
        assert_eq!(event.tenant_id, tenant.id);
        assert_eq!(event.event_id, report.event_id);
        assert_eq!(event.admin_host, "acme.admin.example.com");
    }

    #[tokio::test]
    async fn test_disconnected_uses_fallback() {
        let connector = InMemoryBusConnector::new(InMemoryEventBus::new());
        let hosts = InMemoryHostProvisioner::new();
        let publisher = publisher(&connector, Some(&hosts));

        let report = publisher.publish_tenant_created(&tenant()).await;

        assert_eq!(report.bus, PathOutcome::Failed);
        assert_eq!(report.http_fallback, PathOutcome::Confirmed);
        assert!(report.delivered());
        let requests = hosts.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].storefront_host, "acme.example.com");
    }

    #[tokio::test]
    async fn test_unconfirmed_publish_uses_fallback() {
        let bus = InMemoryEventBus::new();
        bus.set_fail_on_publish(true);
        let connector = InMemoryBusConnector::new(bus);
        let hosts = InMemoryHostProvisioner::new();
        let publisher = publisher(&connector, Some(&hosts));
        publisher.connect(&CancellationToken::new()).await.unwrap();

        let report = publisher.publish_tenant_created(&tenant()).await;
        assert_eq!(report.bus, PathOutcome::Failed);
        assert_eq!(report.http_fallback, PathOutcome::Confirmed);
    }

    #[tokio::test]
    async fn test_both_paths_failing_is_reported_not_raised() {
        let connector = InMemoryBusConnector::new(InMemoryEventBus::new());
        let hosts = InMemoryHostProvisioner::new();
        hosts.set_fail(true);
        let publisher = publisher(&connector, Some(&hosts));

        let report = publisher.publish_tenant_created(&tenant()).await;
        assert!(!report.delivered());
        assert_eq!(report.http_fallback, PathOutcome::Failed);
    }

    #[tokio::test]
    async fn test_connect_retries_then_gives_up() {
        let connector = InMemoryBusConnector::new(InMemoryEventBus::new());
        connector.set_refuse(true);
        let publisher = Arc::new(publisher(&connector, None));

        publisher
            .spawn_connect(CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(connector.attempts(), 2);
        assert_eq!(publisher.health().await, BusHealth::Disconnected);

        connector.set_refuse(false);
        publisher.connect(&CancellationToken::new()).await.unwrap();
        assert_eq!(publisher.health().await, BusHealth::Connected);
    }

    #[tokio::test]
    async fn test_deleted_is_bus_only() {
        let bus = InMemoryEventBus::new();
        let connector = InMemoryBusConnector::new(bus.clone());
        let hosts = InMemoryHostProvisioner::new();
        let publisher = publisher(&connector, Some(&hosts));

        let report = publisher.publish_tenant_deleted(&tenant()).await;
        assert_eq!(report.bus, PathOutcome::Failed);
        assert_eq!(report.http_fallback, PathOutcome::Skipped);
        assert!(hosts.requests().is_empty());

        publisher.connect(&CancellationToken::new()).await.unwrap();
        publisher.publish_tenant_deleted(&tenant()).await;
        assert_eq!(bus.published_on(TOPIC_TENANT_DELETED).len(), 1);
    }
}
