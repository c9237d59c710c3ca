//! Tenant status endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::TenantId;
use domain::Tenant;
use serde::Serialize;
use tenant_store::{ProvisioningStore, TenantStore};

use crate::AppState;
use crate::error::ApiError;

#[derive(Serialize)]
pub struct TenantResponse {
    #[serde(flatten)]
    pub tenant: Tenant,
    pub saga_state: &'static str,
    pub completed_steps: Vec<&'static str>,
    pub pending_steps: Vec<&'static str>,
}

/// GET /tenants/{id}: tenant row plus provisioning progress.
pub async fn get<S: ProvisioningStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<TenantResponse>, ApiError> {
    let tenant_id = TenantId::parse(&id)
        .map_err(|e| ApiError::BadRequest(format!("Invalid tenant id: {e}")))?;

    let tenant = state
        .saga
        .store()
        .get_tenant(tenant_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Tenant {tenant_id} not found")))?;
    let progress = state.saga.progress(tenant_id).await?;

    let pending = progress.pending_steps();
    let completed = domain::ProvisioningStep::ALL
        .into_iter()
        .filter(|step| progress.is_completed(*step))
        .map(|step| step.as_str())
        .collect();

    Ok(Json(TenantResponse {
        tenant,
        saga_state: progress.state().as_str(),
        completed_steps: completed,
        pending_steps: pending.into_iter().map(|step| step.as_str()).collect(),
    }))
}
