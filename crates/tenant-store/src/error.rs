use common::{SessionId, TenantId};
use domain::TenantError;
use thiserror::Error;

/// Errors that can occur when interacting with the provisioning store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Another live reservation or tenant already holds the slug.
    #[error("Slug already claimed: {0}")]
    SlugConflict(String),

    /// The session is already bound to a tenant.
    #[error("Session {session_id} already provisioned tenant {tenant_id}")]
    SessionAlreadyProvisioned {
        session_id: SessionId,
        tenant_id: TenantId,
    },

    /// The tenant was not found.
    #[error("Tenant not found: {0}")]
    TenantNotFound(TenantId),

    /// The onboarding session was not found.
    #[error("Onboarding session not found: {0}")]
    SessionNotFound(SessionId),

    /// A status change was rejected by the transition table or lost a
    /// compare-and-set race.
    #[error(transparent)]
    Tenant(#[from] TenantError),

    /// A stored value could not be decoded into its domain type.
    #[error("Invalid stored value: {0}")]
    Decode(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
