//! Tenant record and lifecycle.

mod status;

pub use status::{TENANT_TRANSITIONS, TenantStatus};

use chrono::{DateTime, Duration, Utc};
use common::{StorefrontId, TenantId, UserId, VendorId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::slug::Slug;

/// Default billing currency for new tenants.
pub const DEFAULT_CURRENCY: &str = "USD";

/// Default locale for new tenants.
pub const DEFAULT_LOCALE: &str = "en-US";

/// Errors that can occur during tenant lifecycle operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TenantError {
    /// The transition table does not allow this status change.
    #[error("Invalid tenant status transition: {from} -> {to}")]
    InvalidTransition {
        from: TenantStatus,
        to: TenantStatus,
    },

    /// The tenant was found in a different status than the caller expected.
    #[error("Tenant {tenant_id} is {actual}, expected {expected}")]
    StatusConflict {
        tenant_id: TenantId,
        expected: TenantStatus,
        actual: TenantStatus,
    },
}

/// A tenant (store): the unit of provisioning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub slug: Slug,
    pub name: String,
    pub status: TenantStatus,
    pub owner_id: Option<UserId>,
    pub currency: String,
    pub locale: String,
    pub vendor_id: Option<VendorId>,
    pub storefront_id: Option<StorefrontId>,
    /// Failed resume attempts made by reconciliation.
    pub reconcile_attempts: u32,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tenant {
    /// Creates a tenant in the `Creating` status with a fresh id.
    pub fn creating(
        slug: Slug,
        name: impl Into<String>,
        currency: impl Into<String>,
        locale: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: TenantId::new(),
            slug,
            name: name.into(),
            status: TenantStatus::Creating,
            owner_id: None,
            currency: currency.into(),
            locale: locale.into(),
            vendor_id: None,
            storefront_id: None,
            reconcile_attempts: 0,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns how long ago the tenant row was created.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.created_at
    }

    /// Returns true if both downstream resources are recorded.
    pub fn has_resources(&self) -> bool {
        self.vendor_id.is_some() && self.storefront_id.is_some()
    }

    /// Validates and applies a status change.
    pub fn transition(&mut self, next: TenantStatus) -> Result<(), TenantError> {
        if !self.status.can_transition_to(next) {
            return Err(TenantError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Moves the tenant to `Active`, recording the resources that make it usable.
    pub fn activate(
        &mut self,
        vendor_id: VendorId,
        storefront_id: StorefrontId,
    ) -> Result<(), TenantError> {
        self.transition(TenantStatus::Active)?;
        self.vendor_id = Some(vendor_id);
        self.storefront_id = Some(storefront_id);
        self.failure_reason = None;
        Ok(())
    }

    /// Moves the tenant to a terminal failure status with a reason.
    pub fn fail(
        &mut self,
        status: TenantStatus,
        reason: impl Into<String>,
    ) -> Result<(), TenantError> {
        if !status.is_terminal_failure() {
            return Err(TenantError::InvalidTransition {
                from: self.status,
                to: status,
            });
        }
        self.transition(status)?;
        self.failure_reason = Some(reason.into());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tenant() -> Tenant {
        Tenant::creating(Slug::parse("acme").unwrap(), "Acme", DEFAULT_CURRENCY, DEFAULT_LOCALE)
    }

    #[test]
    fn test_new_tenant_is_creating() {
        let t = tenant();
        assert_eq!(t.status, TenantStatus::Creating);
        assert!(t.owner_id.is_none());
        assert!(!t.has_resources());
        assert_eq!(t.reconcile_attempts, 0);
    }

    #[test]
    fn test_activate_records_resources() {
        let mut t = tenant();
        let vendor = VendorId::new();
        let storefront = StorefrontId::new();
        t.activate(vendor, storefront).unwrap();

        assert_eq!(t.status, TenantStatus::Active);
        assert_eq!(t.vendor_id, Some(vendor));
        assert_eq!(t.storefront_id, Some(storefront));
        assert!(t.has_resources());
    }

    #[test]
    fn test_activate_twice_is_rejected() {
        let mut t = tenant();
        t.activate(VendorId::new(), StorefrontId::new()).unwrap();
        let err = t.activate(VendorId::new(), StorefrontId::new()).unwrap_err();
        assert_eq!(
            err,
            TenantError::InvalidTransition {
                from: TenantStatus::Active,
                to: TenantStatus::Active
            }
        );
    }

    #[test]
    fn test_fail_sets_reason() {
        let mut t = tenant();
        t.fail(TenantStatus::Inactive, "retries exhausted").unwrap();
        assert_eq!(t.status, TenantStatus::Inactive);
        assert_eq!(t.failure_reason.as_deref(), Some("retries exhausted"));
    }

    #[test]
    fn test_fail_requires_failure_status() {
        let mut t = tenant();
        assert!(t.fail(TenantStatus::Active, "nope").is_err());
        assert_eq!(t.status, TenantStatus::Creating);
    }

    #[test]
    fn test_failed_tenant_cannot_activate() {
        let mut t = tenant();
        t.fail(TenantStatus::Failed, "rbac").unwrap();
        assert!(t.activate(VendorId::new(), StorefrontId::new()).is_err());
        assert!(!t.has_resources());
    }

    #[test]
    fn test_age() {
        let t = tenant();
        let later = t.created_at + Duration::minutes(10);
        assert_eq!(t.age(later), Duration::minutes(10));
    }
}
