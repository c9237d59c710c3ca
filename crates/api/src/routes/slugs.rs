//! Slug reservation endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use provisioning::ReserveOutcome;
use serde::Deserialize;
use tenant_store::{ProvisioningStore, SessionStore};

use super::onboarding::parse_session_id;
use crate::AppState;
use crate::error::ApiError;

#[derive(Deserialize)]
pub struct ReserveRequest {
    pub slug: String,
    pub session_id: String,
}

/// POST /slugs/reserve: reserve a slug for a session.
///
/// A taken slug answers 200 with `available: false` and suggestions.
#[tracing::instrument(skip(state, req), fields(slug = %req.slug))]
pub async fn reserve<S: ProvisioningStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<ReserveRequest>,
) -> Result<Json<ReserveOutcome>, ApiError> {
    let session_id = parse_session_id(&req.session_id)?;
    let session = state
        .saga
        .store()
        .get_session(session_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Onboarding session {session_id} not found")))?;

    let outcome = state
        .saga
        .slugs()
        .reserve(&req.slug, session.id, Some(&session.contact.email))
        .await?;
    Ok(Json(outcome))
}
