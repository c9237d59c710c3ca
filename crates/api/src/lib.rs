//! HTTP API server for tenant provisioning.
//!
//! Provides REST endpoints for onboarding, slug reservation, saga execution
//! and reconciliation, with structured logging (tracing) and Prometheus
//! metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use provisioning::services::{
    HostProvisioner, HttpHostProvisioner, InMemoryAuthorizationService, InMemoryBusConnector,
    InMemoryEventBus, InMemoryIdentityProvider, InMemoryNotificationService,
    InMemoryVendorService,
};
use provisioning::{
    EventPublisher, NotificationDispatcher, ProvisioningSaga, Reconciler, ReconcilerConfig,
};
use tenant_store::ProvisioningStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::{Config, ConfigError};

/// The saga as wired by this server.
pub type AppSaga<S> = ProvisioningSaga<
    S,
    InMemoryIdentityProvider,
    InMemoryAuthorizationService,
    InMemoryVendorService,
>;

/// The reconciler as wired by this server.
pub type AppReconciler<S> = Reconciler<
    S,
    InMemoryIdentityProvider,
    InMemoryAuthorizationService,
    InMemoryVendorService,
>;

/// Shared application state accessible from all handlers.
pub struct AppState<S: ProvisioningStore> {
    pub saga: Arc<AppSaga<S>>,
    pub reconciler: AppReconciler<S>,
    pub reconciler_config: ReconcilerConfig,
    pub identity: InMemoryIdentityProvider,
    pub authorization: InMemoryAuthorizationService,
    pub vendor: InMemoryVendorService,
    pub bus: InMemoryEventBus,
    pub notifications: InMemoryNotificationService,
}

impl<S: ProvisioningStore + Clone + 'static> AppState<S> {
    /// Returns a reconciler for the background loop, sharing this state's saga.
    pub fn background_reconciler(&self) -> AppReconciler<S> {
        Reconciler::new(Arc::clone(&self.saga), self.reconciler_config.clone())
    }
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: ProvisioningStore + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check::<S>))
        .route("/onboarding", post(routes::onboarding::create::<S>))
        .route("/onboarding/{id}", get(routes::onboarding::get::<S>))
        .route("/onboarding/{id}/complete", post(routes::onboarding::complete::<S>))
        .route("/slugs/reserve", post(routes::slugs::reserve::<S>))
        .route("/tenants/{id}", get(routes::tenants::get::<S>))
        .route("/admin/reconcile", post(routes::admin::reconcile::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the default application state: the given store with in-memory
/// collaborators, plus the HTTP host-provisioning fallback when configured.
pub fn create_default_state<S: ProvisioningStore + Clone + 'static>(
    store: S,
    config: &Config,
) -> Result<Arc<AppState<S>>, ConfigError> {
    let identity = InMemoryIdentityProvider::new();
    let authorization = InMemoryAuthorizationService::new();
    let vendor = InMemoryVendorService::new();
    let bus = InMemoryEventBus::new();
    let notifications = InMemoryNotificationService::new();
    let provisioning = &config.provisioning;

    let mut publisher = EventPublisher::new(
        Arc::new(InMemoryBusConnector::new(bus.clone())),
        provisioning.hosts.clone(),
        provisioning.retry.clone(),
    );
    if let Some(endpoint) = &config.hosts_fallback_url {
        let fallback: Arc<dyn HostProvisioner> = Arc::new(HttpHostProvisioner::new(
            endpoint.clone(),
            config.hosts_fallback_timeout,
        )?);
        publisher = publisher.with_host_provisioner(fallback);
        tracing::info!(endpoint = %endpoint, "Host-provisioning fallback enabled");
    }

    let saga = Arc::new(ProvisioningSaga::new(
        store,
        identity.clone(),
        authorization.clone(),
        vendor.clone(),
        Arc::new(publisher),
        NotificationDispatcher::new(Arc::new(notifications.clone())),
        provisioning,
    ));

    Ok(Arc::new(AppState {
        reconciler: Reconciler::new(Arc::clone(&saga), provisioning.reconciler.clone()),
        reconciler_config: provisioning.reconciler.clone(),
        saga,
        identity,
        authorization,
        vendor,
        bus,
        notifications,
    }))
}
