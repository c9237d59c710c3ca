//! Operator endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use provisioning::ReconcileReport;
use tenant_store::ProvisioningStore;
use tokio_util::sync::CancellationToken;

use crate::AppState;
use crate::error::ApiError;

/// POST /admin/reconcile: run one reconciliation pass now.
#[tracing::instrument(skip(state))]
pub async fn reconcile<S: ProvisioningStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<ReconcileReport>, ApiError> {
    let report = state
        .reconciler
        .run_once(&CancellationToken::new())
        .await?;
    Ok(Json(report))
}
