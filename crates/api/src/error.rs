//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use provisioning::ProvisioningError;
use tenant_store::StoreError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Provisioning error.
    Provisioning(ProvisioningError),
    /// Store error.
    Store(StoreError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = serde_json::Map::new();
        let status = match self {
            ApiError::NotFound(msg) => {
                body.insert("error".into(), msg.into());
                StatusCode::NOT_FOUND
            }
            ApiError::BadRequest(msg) => {
                body.insert("error".into(), msg.into());
                StatusCode::BAD_REQUEST
            }
            ApiError::Provisioning(err) => {
                let status = provisioning_status(&err);
                if let ProvisioningError::SlugUnavailable { suggestions, .. } = &err {
                    body.insert("suggestions".into(), suggestions.clone().into());
                }
                body.insert("error".into(), err.to_string().into());
                status
            }
            ApiError::Store(err) => {
                let status = store_status(&err);
                body.insert("error".into(), err.to_string().into());
                status
            }
        };

        if status.is_server_error() {
            tracing::error!(status = %status, error = ?body.get("error"), "request failed");
        }
        (status, axum::Json(serde_json::Value::Object(body))).into_response()
    }
}

fn provisioning_status(err: &ProvisioningError) -> StatusCode {
    match err {
        ProvisioningError::InvalidSlug(_) => StatusCode::BAD_REQUEST,
        ProvisioningError::SlugUnavailable { .. } => StatusCode::CONFLICT,
        ProvisioningError::SessionNotFound(_)
        | ProvisioningError::TenantNotFound(_)
        | ProvisioningError::OrphanTenant(_) => StatusCode::NOT_FOUND,
        ProvisioningError::InvalidCredentials => StatusCode::UNAUTHORIZED,
        ProvisioningError::Identity(_)
        | ProvisioningError::Authorization(_)
        | ProvisioningError::Unavailable { .. }
        | ProvisioningError::TenantMismatch { .. }
        | ProvisioningError::RetryExhausted { .. }
        | ProvisioningError::HostProvisioning(_)
        | ProvisioningError::Notification(_) => StatusCode::BAD_GATEWAY,
        ProvisioningError::Store(err) => store_status(err),
        ProvisioningError::Cancelled
        | ProvisioningError::Domain(_)
        | ProvisioningError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn store_status(err: &StoreError) -> StatusCode {
    match err {
        StoreError::SlugConflict(_) | StoreError::SessionAlreadyProvisioned { .. } => {
            StatusCode::CONFLICT
        }
        StoreError::TenantNotFound(_) | StoreError::SessionNotFound(_) => StatusCode::NOT_FOUND,
        StoreError::Tenant(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<ProvisioningError> for ApiError {
    fn from(err: ProvisioningError) -> Self {
        ApiError::Provisioning(err)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Store(err)
    }
}
