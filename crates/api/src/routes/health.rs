//! Health check endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use provisioning::BusHealth;
use serde::Serialize;
use tenant_store::ProvisioningStore;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub event_bus: &'static str,
}

/// GET /health: `ok`, or `degraded` while the event bus is disconnected.
///
/// Always answers 200; a disconnected bus only disables one delivery path.
pub async fn check<S: ProvisioningStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Json<HealthResponse> {
    let bus = state.saga.publisher().health().await;
    let status = match bus {
        BusHealth::Connected => "ok",
        BusHealth::Disconnected => "degraded",
    };
    Json(HealthResponse {
        status,
        event_bus: bus.as_str(),
    })
}
