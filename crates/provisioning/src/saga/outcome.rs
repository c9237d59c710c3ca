//! Saga inputs and results.

use common::{TenantId, UserId};
use domain::TenantStatus;
use serde::Serialize;

use crate::services::LoginToken;

/// Caller-supplied data that is never persisted.
#[derive(Clone, Default)]
pub struct ProvisionRequest {
    /// The owner's password. Required when the owner has no account yet.
    pub password: Option<String>,
}

impl ProvisionRequest {
    /// Creates a request carrying the owner's password.
    pub fn with_password(password: impl Into<String>) -> Self {
        Self {
            password: Some(password.into()),
        }
    }
}

impl std::fmt::Debug for ProvisionRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProvisionRequest")
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Result of a provisioning call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProvisionOutcome {
    pub tenant_id: TenantId,
    pub slug: String,
    pub status: TenantStatus,
    pub owner_id: Option<UserId>,
    /// True if the session already had a tenant and only identity and login
    /// state were repaired.
    pub resumed: bool,
    /// Absent when token issuance failed; the owner can still sign in normally.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub login_token: Option<LoginToken>,
}
