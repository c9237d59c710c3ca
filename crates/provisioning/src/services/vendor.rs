//! Vendor service trait and in-memory implementation.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::{StorefrontId, TenantId, VendorId};

use crate::error::ProvisioningError;

/// A vendor record owned by the vendor service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vendor {
    pub id: VendorId,
    pub tenant_id: TenantId,
    pub name: String,
    pub email: String,
    pub contact_name: String,
}

/// A storefront record owned by the vendor service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Storefront {
    pub id: StorefrontId,
    pub tenant_id: TenantId,
    pub vendor_id: VendorId,
    pub name: String,
    pub slug: String,
    pub is_default: bool,
}

/// Request to create a vendor for a tenant.
#[derive(Debug, Clone)]
pub struct NewVendor {
    pub tenant_id: TenantId,
    pub name: String,
    pub email: String,
    pub contact_name: String,
}

/// Request to create a storefront for a vendor.
#[derive(Debug, Clone)]
pub struct NewStorefront {
    pub tenant_id: TenantId,
    pub vendor_id: VendorId,
    pub name: String,
    pub slug: String,
    pub is_default: bool,
}

/// Trait for the peer service that owns vendors and storefronts.
#[async_trait]
pub trait VendorService: Send + Sync {
    async fn create_vendor_for_tenant(&self, request: &NewVendor)
    -> Result<Vendor, ProvisioningError>;

    async fn get_vendors_for_tenant(
        &self,
        tenant_id: TenantId,
    ) -> Result<Vec<Vendor>, ProvisioningError>;

    async fn create_storefront(
        &self,
        request: &NewStorefront,
    ) -> Result<Storefront, ProvisioningError>;

    async fn get_storefronts_for_vendor(
        &self,
        tenant_id: TenantId,
        vendor_id: VendorId,
    ) -> Result<Vec<Storefront>, ProvisioningError>;
}

#[derive(Debug, Default)]
struct InMemoryVendorState {
    vendors: Vec<Vendor>,
    storefronts: Vec<Storefront>,
    create_vendor_calls: u32,
    create_storefront_calls: u32,
    /// Remaining transient failures for `create_vendor_for_tenant`.
    vendor_failures_remaining: u32,
    /// Remaining transient failures for `create_storefront`.
    storefront_failures_remaining: u32,
    fail_on_create_vendor: bool,
    fail_on_create_storefront: bool,
    return_foreign_tenant: bool,
}

/// In-memory vendor service for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryVendorService {
    state: Arc<RwLock<InMemoryVendorState>>,
}

impl InMemoryVendorService {
    /// Creates a new in-memory vendor service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `n` vendor creations fail with a transient error.
    pub fn fail_vendor_times(&self, n: u32) {
        self.state.write().unwrap().vendor_failures_remaining = n;
    }

    /// Makes the next `n` storefront creations fail with a transient error.
    pub fn fail_storefront_times(&self, n: u32) {
        self.state.write().unwrap().storefront_failures_remaining = n;
    }

    /// Configures every vendor creation to fail with a transient error.
    pub fn set_fail_on_create_vendor(&self, fail: bool) {
        self.state.write().unwrap().fail_on_create_vendor = fail;
    }

    /// Configures every storefront creation to fail with a transient error.
    pub fn set_fail_on_create_storefront(&self, fail: bool) {
        self.state.write().unwrap().fail_on_create_storefront = fail;
    }

    /// Makes vendor creation answer with a different tenant id.
    pub fn set_return_foreign_tenant(&self, foreign: bool) {
        self.state.write().unwrap().return_foreign_tenant = foreign;
    }

    /// Returns the number of vendors.
    pub fn vendor_count(&self) -> usize {
        self.state.read().unwrap().vendors.len()
    }

    /// Returns the number of storefronts.
    pub fn storefront_count(&self) -> usize {
        self.state.read().unwrap().storefronts.len()
    }

    /// Returns how many times vendor creation was attempted.
    pub fn create_vendor_calls(&self) -> u32 {
        self.state.read().unwrap().create_vendor_calls
    }

    /// Returns how many times storefront creation was attempted.
    pub fn create_storefront_calls(&self) -> u32 {
        self.state.read().unwrap().create_storefront_calls
    }
}

#[async_trait]
impl VendorService for InMemoryVendorService {
    async fn create_vendor_for_tenant(
        &self,
        request: &NewVendor,
    ) -> Result<Vendor, ProvisioningError> {
        let mut state = self.state.write().unwrap();
        state.create_vendor_calls += 1;

        if state.fail_on_create_vendor {
            return Err(ProvisioningError::unavailable("vendor", "503 Service Unavailable"));
        }
        if state.vendor_failures_remaining > 0 {
            state.vendor_failures_remaining -= 1;
            return Err(ProvisioningError::unavailable("vendor", "503 Service Unavailable"));
        }

        let tenant_id = if state.return_foreign_tenant {
            TenantId::new()
        } else {
            request.tenant_id
        };
        let vendor = Vendor {
            id: VendorId::new(),
            tenant_id,
            name: request.name.clone(),
            email: request.email.clone(),
            contact_name: request.contact_name.clone(),
        };
        state.vendors.push(vendor.clone());
        Ok(vendor)
    }

    async fn get_vendors_for_tenant(
        &self,
        tenant_id: TenantId,
    ) -> Result<Vec<Vendor>, ProvisioningError> {
        Ok(self
            .state
            .read()
            .unwrap()
            .vendors
            .iter()
            .filter(|v| v.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    async fn create_storefront(
        &self,
        request: &NewStorefront,
    ) -> Result<Storefront, ProvisioningError> {
        let mut state = self.state.write().unwrap();
        state.create_storefront_calls += 1;

        if state.fail_on_create_storefront {
            return Err(ProvisioningError::unavailable("storefront", "503 Service Unavailable"));
        }
        if state.storefront_failures_remaining > 0 {
            state.storefront_failures_remaining -= 1;
            return Err(ProvisioningError::unavailable("storefront", "503 Service Unavailable"));
        }

        let storefront = Storefront {
            id: StorefrontId::new(),
            tenant_id: request.tenant_id,
            vendor_id: request.vendor_id,
            name: request.name.clone(),
            slug: request.slug.clone(),
            is_default: request.is_default,
        };
        state.storefronts.push(storefront.clone());
        Ok(storefront)
    }

    async fn get_storefronts_for_vendor(
        &self,
        tenant_id: TenantId,
        vendor_id: VendorId,
    ) -> Result<Vec<Storefront>, ProvisioningError> {
        Ok(self
            .state
            .read()
            .unwrap()
            .storefronts
            .iter()
            .filter(|s| s.tenant_id == tenant_id && s.vendor_id == vendor_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_vendor(tenant_id: TenantId) -> NewVendor {
        NewVendor {
            tenant_id,
            name: "Acme".to_string(),
            email: "a@acme.test".to_string(),
            contact_name: "Ada Lovelace".to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_and_list() {
        let service = InMemoryVendorService::new();
        let tenant_id = TenantId::new();

        let vendor = service
            .create_vendor_for_tenant(&new_vendor(tenant_id))
            .await
            .unwrap();
        assert_eq!(vendor.tenant_id, tenant_id);
        assert_eq!(service.get_vendors_for_tenant(tenant_id).await.unwrap().len(), 1);
        assert!(
            service
                .get_vendors_for_tenant(TenantId::new())
                .await
                .unwrap()
                .is_empty()
        );

        let storefront = service
            .create_storefront(&NewStorefront {
                tenant_id,
                vendor_id: vendor.id,
                name: "Acme".to_string(),
                slug: "acme".to_string(),
                is_default: true,
            })
            .await
            .unwrap();
        let listed = service
            .get_storefronts_for_vendor(tenant_id, vendor.id)
            .await
            .unwrap();
        assert_eq!(listed, vec![storefront]);
    }

    #[tokio::test]
    async fn test_transient_failures_run_out() {
        let service = InMemoryVendorService::new();
        service.fail_vendor_times(2);
        let req = new_vendor(TenantId::new());

        assert!(service.create_vendor_for_tenant(&req).await.unwrap_err().is_retryable());
        assert!(service.create_vendor_for_tenant(&req).await.is_err());
        assert!(service.create_vendor_for_tenant(&req).await.is_ok());
        assert_eq!(service.create_vendor_calls(), 3);
        assert_eq!(service.vendor_count(), 1);
    }

    #[tokio::test]
    async fn test_foreign_tenant() {
        let service = InMemoryVendorService::new();
        service.set_return_foreign_tenant(true);
        let req = new_vendor(TenantId::new());

        let vendor = service.create_vendor_for_tenant(&req).await.unwrap();
        assert_ne!(vendor.tenant_id, req.tenant_id);
    }
}
