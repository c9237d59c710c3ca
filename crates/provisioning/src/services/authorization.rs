//! Authorization (RBAC) service trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::{TenantId, UserId};

use crate::error::ProvisioningError;

/// Data needed to grant the owner role in a tenant.
#[derive(Debug, Clone)]
pub struct OwnerBootstrap {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

/// Result of a successful owner bootstrap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerGrant {
    pub staff_id: String,
    pub role_id: String,
}

/// Trait for the authorization service that owns staff and role records.
///
/// `bootstrap_owner` must be idempotent per (tenant, user).
#[async_trait]
pub trait AuthorizationService: Send + Sync {
    async fn bootstrap_owner(
        &self,
        request: &OwnerBootstrap,
    ) -> Result<OwnerGrant, ProvisioningError>;
}

#[derive(Debug, Default)]
struct InMemoryAuthorizationState {
    grants: HashMap<(TenantId, UserId), OwnerGrant>,
    next_id: u32,
    calls: u32,
    fail_on_bootstrap: bool,
}

/// In-memory authorization service for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAuthorizationService {
    state: Arc<RwLock<InMemoryAuthorizationState>>,
}

impl InMemoryAuthorizationService {
    /// Creates a new in-memory authorization service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the service to fail on bootstrap calls.
    pub fn set_fail_on_bootstrap(&self, fail: bool) {
        self.state.write().unwrap().fail_on_bootstrap = fail;
    }

    /// Returns the number of distinct grants.
    pub fn grant_count(&self) -> usize {
        self.state.read().unwrap().grants.len()
    }

    /// Returns how many times `bootstrap_owner` was called.
    pub fn calls(&self) -> u32 {
        self.state.read().unwrap().calls
    }

    /// Returns true if the user holds the owner role in the tenant.
    pub fn has_owner(&self, tenant_id: TenantId, user_id: UserId) -> bool {
        self.state
            .read()
            .unwrap()
            .grants
            .contains_key(&(tenant_id, user_id))
    }
}

#[async_trait]
impl AuthorizationService for InMemoryAuthorizationService {
    async fn bootstrap_owner(
        &self,
        request: &OwnerBootstrap,
    ) -> Result<OwnerGrant, ProvisioningError> {
        let mut state = self.state.write().unwrap();
        state.calls += 1;

        if state.fail_on_bootstrap {
            return Err(ProvisioningError::Authorization(
                "role service returned 500".to_string(),
            ));
        }

        let key = (request.tenant_id, request.user_id);
        if let Some(grant) = state.grants.get(&key) {
            return Ok(grant.clone());
        }

        state.next_id += 1;
        let grant = OwnerGrant {
            staff_id: format!("STAFF-{:04}", state.next_id),
            role_id: format!("ROLE-OWNER-{}", request.tenant_id),
        };
        state.grants.insert(key, grant.clone());
        Ok(grant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> OwnerBootstrap {
        OwnerBootstrap {
            tenant_id: TenantId::new(),
            user_id: UserId::new(),
            email: "a@acme.test".to_string(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
        }
    }

    #[tokio::test]
    async fn test_bootstrap_is_idempotent() {
        let service = InMemoryAuthorizationService::new();
        let req = request();

        let first = service.bootstrap_owner(&req).await.unwrap();
        let second = service.bootstrap_owner(&req).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(service.grant_count(), 1);
        assert_eq!(service.calls(), 2);
        assert!(service.has_owner(req.tenant_id, req.user_id));
    }

    #[tokio::test]
    async fn test_fail_on_bootstrap() {
        let service = InMemoryAuthorizationService::new();
        service.set_fail_on_bootstrap(true);

        let result = service.bootstrap_owner(&request()).await;
        assert!(matches!(result, Err(ProvisioningError::Authorization(_))));
        assert_eq!(service.grant_count(), 0);
    }
}
