//! Domain error types.

use thiserror::Error;

use crate::slug::SlugError;
use crate::tenant::TenantError;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// A candidate slug failed validation.
    #[error("Slug error: {0}")]
    Slug(#[from] SlugError),

    /// A tenant lifecycle rule was violated.
    #[error("Tenant error: {0}")]
    Tenant(#[from] TenantError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
