//! Idempotent creation of the tenant's downstream business resources.

use tokio_util::sync::CancellationToken;

use crate::config::RetryPolicy;
use crate::error::{ProvisioningError, Result};
use crate::retry::with_retry;
use crate::services::{NewStorefront, NewVendor, Storefront, Vendor, VendorService};

/// Ensures a tenant's vendor and storefront exist.
///
/// Both operations check before creating, so the saga and the reconciler can
/// call them repeatedly and concurrently; a second caller reuses what the
/// first one created.
pub struct ResourceProvisioner<V> {
    vendor: V,
    retry: RetryPolicy,
}

impl<V> ResourceProvisioner<V>
where
    V: VendorService,
{
    /// Creates a new resource provisioner.
    pub fn new(vendor: V, retry: RetryPolicy) -> Self {
        Self { vendor, retry }
    }

    /// Returns the underlying vendor service.
    pub fn service(&self) -> &V {
        &self.vendor
    }

    /// Returns the tenant's vendor, creating it if none exists.
    ///
    /// Transient faults are retried with backoff. A vendor reporting another
    /// tenant id fails immediately with [`ProvisioningError::TenantMismatch`].
    #[tracing::instrument(skip(self, request, token), fields(tenant_id = %request.tenant_id))]
    pub async fn ensure_vendor(
        &self,
        request: &NewVendor,
        token: &CancellationToken,
    ) -> Result<Vendor> {
        let vendor = &self.vendor;

        with_retry(&self.retry, token, "ensure_vendor", move || async move {
            if let Some(existing) = vendor
                .get_vendors_for_tenant(request.tenant_id)
                .await?
                .into_iter()
                .next()
            {
                check_tenant(request.tenant_id, existing.tenant_id)?;
                tracing::debug!(vendor_id = %existing.id, "Reusing existing vendor");
                return Ok(existing);
            }

            let created = vendor.create_vendor_for_tenant(request).await?;
            check_tenant(request.tenant_id, created.tenant_id)?;
            tracing::info!(vendor_id = %created.id, "Vendor created");
            Ok(created)
        })
        .await
    }

    /// Returns the vendor's storefront, creating it if none exists.
    ///
    /// When several storefronts exist the default one is preferred.
    #[tracing::instrument(
        skip(self, request, token),
        fields(tenant_id = %request.tenant_id, vendor_id = %request.vendor_id)
    )]
    pub async fn ensure_storefront(
        &self,
        request: &NewStorefront,
        token: &CancellationToken,
    ) -> Result<Storefront> {
        let vendor = &self.vendor;

        with_retry(&self.retry, token, "ensure_storefront", move || async move {
            let mut existing = vendor
                .get_storefronts_for_vendor(request.tenant_id, request.vendor_id)
                .await?;
            existing.sort_by_key(|s| !s.is_default);
            if let Some(storefront) = existing.into_iter().next() {
                check_tenant(request.tenant_id, storefront.tenant_id)?;
                tracing::debug!(storefront_id = %storefront.id, "Reusing existing storefront");
                return Ok(storefront);
            }

            let created = vendor.create_storefront(request).await?;
            check_tenant(request.tenant_id, created.tenant_id)?;
            tracing::info!(storefront_id = %created.id, "Storefront created");
            Ok(created)
        })
        .await
    }
}

fn check_tenant(expected: common::TenantId, actual: common::TenantId) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(ProvisioningError::TenantMismatch { expected, actual })
    }
}
