//! Onboarding session and saga trigger endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{SessionId, TenantId};
use domain::{ContactDetails, OnboardingSession, SessionStatus};
use provisioning::{ProvisionOutcome, ProvisionRequest};
use serde::{Deserialize, Serialize};
use tenant_store::{ProvisioningStore, SessionStore};

use crate::AppState;
use crate::error::ApiError;

// -- Request types --

#[derive(Deserialize)]
pub struct CreateSessionRequest {
    pub business_name: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub slug: Option<String>,
    pub currency: Option<String>,
    pub locale: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct CompleteRequest {
    #[serde(default)]
    pub password: Option<String>,
}

// -- Response types --

#[derive(Serialize)]
pub struct SessionResponse {
    pub session_id: SessionId,
    pub business_name: String,
    pub email: String,
    pub requested_slug: Option<String>,
    pub status: SessionStatus,
    pub tenant_id: Option<TenantId>,
}

impl From<OnboardingSession> for SessionResponse {
    fn from(session: OnboardingSession) -> Self {
        Self {
            session_id: session.id,
            business_name: session.business_name,
            email: session.contact.email,
            requested_slug: session.requested_slug,
            status: session.status,
            tenant_id: session.tenant_id,
        }
    }
}

pub(crate) fn parse_session_id(raw: &str) -> Result<SessionId, ApiError> {
    SessionId::parse(raw).map_err(|e| ApiError::BadRequest(format!("Invalid session id: {e}")))
}

// -- Handlers --

/// POST /onboarding: open an onboarding session.
#[tracing::instrument(skip(state, req), fields(business_name = %req.business_name))]
pub async fn create<S: ProvisioningStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<SessionResponse>), ApiError> {
    if req.business_name.trim().is_empty() {
        return Err(ApiError::BadRequest("business_name is required".into()));
    }
    if !req.email.contains('@') {
        return Err(ApiError::BadRequest("email is invalid".into()));
    }

    let mut session = OnboardingSession::new(
        req.business_name.trim(),
        ContactDetails::new(req.email, req.first_name, req.last_name),
    );
    if let Some(slug) = req.slug.filter(|s| !s.trim().is_empty()) {
        session = session.with_slug(slug);
    }
    if let Some(currency) = req.currency {
        session = session.with_currency(currency);
    }
    if let Some(locale) = req.locale {
        session = session.with_locale(locale);
    }

    state.saga.store().create_session(&session).await?;
    tracing::info!(session_id = %session.id, "Onboarding session created");

    Ok((StatusCode::CREATED, Json(session.into())))
}

/// GET /onboarding/{id}: fetch a session.
pub async fn get<S: ProvisioningStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<SessionResponse>, ApiError> {
    let session_id = parse_session_id(&id)?;
    let session = state
        .saga
        .store()
        .get_session(session_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Onboarding session {session_id} not found")))?;
    Ok(Json(session.into()))
}

/// POST /onboarding/{id}/complete: run the provisioning saga.
///
/// Safe to repeat; later calls re-link the owner and return a fresh token.
#[tracing::instrument(skip(state, req))]
pub async fn complete<S: ProvisioningStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<CompleteRequest>,
) -> Result<Json<ProvisionOutcome>, ApiError> {
    let session_id = parse_session_id(&id)?;
    let outcome = state
        .saga
        .provision(
            session_id,
            ProvisionRequest {
                password: req.password,
            },
        )
        .await?;
    Ok(Json(outcome))
}
