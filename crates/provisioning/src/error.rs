//! Provisioning error types.

use common::{SessionId, TenantId};
use domain::{DomainError, SlugError};
use tenant_store::StoreError;
use thiserror::Error;

/// Errors that can occur while provisioning a tenant.
#[derive(Debug, Error)]
pub enum ProvisioningError {
    /// The candidate slug failed validation.
    #[error("Invalid slug: {0}")]
    InvalidSlug(#[from] SlugError),

    /// The slug is held by another session or tenant.
    #[error("Slug '{slug}' is not available")]
    SlugUnavailable {
        slug: String,
        suggestions: Vec<String>,
    },

    /// Onboarding session not found.
    #[error("Onboarding session not found: {0}")]
    SessionNotFound(SessionId),

    /// Tenant not found.
    #[error("Tenant not found: {0}")]
    TenantNotFound(TenantId),

    /// The tenant has no onboarding session to resume from.
    #[error("Tenant {0} has no onboarding session")]
    OrphanTenant(TenantId),

    /// The identity provider rejected or failed a registration step.
    #[error("Identity provider error: {0}")]
    Identity(String),

    /// The supplied password does not match the existing account.
    #[error("Invalid credentials for existing account")]
    InvalidCredentials,

    /// The authorization service failed to bootstrap the owner role.
    #[error("Authorization bootstrap failed: {0}")]
    Authorization(String),

    /// A collaborator is temporarily unavailable. Retryable.
    #[error("{service} service unavailable: {message}")]
    Unavailable {
        service: &'static str,
        message: String,
    },

    /// A collaborator returned a resource belonging to another tenant.
    #[error("Tenant mismatch: expected {expected}, got {actual}")]
    TenantMismatch { expected: TenantId, actual: TenantId },

    /// A retryable operation failed on every attempt.
    #[error("{operation} failed after {attempts} attempts: {last_error}")]
    RetryExhausted {
        operation: String,
        attempts: u32,
        last_error: String,
    },

    /// The operation was cancelled while waiting to retry.
    #[error("Operation cancelled")]
    Cancelled,

    /// The synchronous host-provisioning fallback failed.
    #[error("Host provisioning failed: {0}")]
    HostProvisioning(String),

    /// A notification could not be sent.
    #[error("Notification failed: {0}")]
    Notification(String),

    /// Store error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Domain error.
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ProvisioningError {
    /// Returns true for transient faults worth retrying with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProvisioningError::Unavailable { .. })
    }

    /// Shorthand for a retryable collaborator fault.
    pub fn unavailable(service: &'static str, message: impl Into<String>) -> Self {
        ProvisioningError::Unavailable {
            service,
            message: message.into(),
        }
    }
}

/// Convenience type alias for provisioning results.
pub type Result<T> = std::result::Result<T, ProvisioningError>;
