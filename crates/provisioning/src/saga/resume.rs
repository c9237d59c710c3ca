//! Resume and terminal failure, driven by reconciliation.

use common::TenantId;
use domain::{
    ProvisioningEvent, ProvisioningProgress, ProvisioningStep, SessionStatus, Tenant,
    TenantError, TenantStatus,
};
use serde_json::json;
use tenant_store::{ProvisioningStore, StoreError};
use tokio_util::sync::CancellationToken;

use super::{ProvisioningSaga, owner_user};
use crate::error::{ProvisioningError, Result};
use crate::notifier::TEMPLATE_PROVISIONING_FAILED;
use crate::registrar::OwnerRegistration;
use crate::services::{AuthorizationService, IdentityProvider, VendorService};

impl<S, I, A, V> ProvisioningSaga<S, I, A, V>
where
    S: ProvisioningStore + Clone + 'static,
    I: IdentityProvider,
    A: AuthorizationService,
    V: VendorService,
{
    /// Drives a `creating` tenant to `active`, re-running only the steps its
    /// journal does not record as completed.
    ///
    /// Vendor and storefront are always ensured, since their check-then-create
    /// is idempotent. The owner is linked without a password, so an owner
    /// account that does not exist yet fails the resume. Errors are returned
    /// without changing the tenant's status.
    #[tracing::instrument(skip(self, tenant, token), fields(tenant_id = %tenant.id, slug = %tenant.slug))]
    pub async fn resume(&self, tenant: &Tenant, token: &CancellationToken) -> Result<Tenant> {
        let session = self
            .store
            .session_for_tenant(tenant.id)
            .await?
            .ok_or(ProvisioningError::OrphanTenant(tenant.id))?;

        // The snapshot may be stale
        if let Some(current) = self.store.get_tenant(tenant.id).await? {
            if current.status == TenantStatus::Active {
                tracing::info!("Tenant already active; nothing to resume");
                return Ok(current);
            }
        }

        let journal = self.store.journal(tenant.id).await?;
        let progress = ProvisioningProgress::from_entries(&journal);
        tracing::info!(
            last_completed = ?progress.last_completed_step(),
            pending = ?progress.pending_steps(),
            "Resuming provisioning"
        );

        // Owner identity
        let owner_id = match progress.owner_id().or(tenant.owner_id) {
            Some(owner_id) if progress.is_completed(ProvisioningStep::RegisterIdentity) => owner_id,
            _ => {
                let registered = self
                    .registrar
                    .register_or_link_owner(&OwnerRegistration {
                        email: session.contact.email.clone(),
                        password: None,
                        first_name: session.contact.first_name.clone(),
                        last_name: session.contact.last_name.clone(),
                        tenant_id: tenant.id,
                        tenant_slug: tenant.slug.clone(),
                    })
                    .await;
                let registered = match registered {
                    Ok(registered) => registered,
                    Err(e) => {
                        return Err(self
                            .step_failed(tenant.id, ProvisioningStep::RegisterIdentity, e)
                            .await);
                    }
                };
                self.store
                    .set_tenant_owner(tenant.id, registered.user_id)
                    .await?;
                self.record(
                    tenant.id,
                    ProvisioningEvent::identity_registered(registered.user_id),
                )
                .await?;
                registered.user_id
            }
        };
        let owner = owner_user(owner_id, &session);

        if !progress.is_completed(ProvisioningStep::LinkMembership) {
            let linked = self.link_membership(tenant.id, &owner).await;
            self.best_effort(tenant.id, ProvisioningStep::LinkMembership, linked)
                .await;
        }
        if !progress.is_completed(ProvisioningStep::RecordCredentials) {
            let recorded = self.record_credentials(tenant.id, &owner).await;
            self.best_effort(tenant.id, ProvisioningStep::RecordCredentials, recorded)
                .await;
        }

        if !progress.is_completed(ProvisioningStep::BootstrapAuthorization) {
            if let Err(e) = self.bootstrap_authorization(tenant.id, &owner).await {
                return Err(self
                    .step_failed(tenant.id, ProvisioningStep::BootstrapAuthorization, e)
                    .await);
            }
            self.record(
                tenant.id,
                ProvisioningEvent::step_completed(ProvisioningStep::BootstrapAuthorization),
            )
            .await?;
        }

        let vendor = match self.ensure_vendor(tenant, &session, token).await {
            Ok(vendor) => vendor,
            Err(e) => {
                return Err(self
                    .step_failed(tenant.id, ProvisioningStep::EnsureVendor, e)
                    .await);
            }
        };
        let storefront = match self.ensure_storefront(tenant, &vendor, token).await {
            Ok(storefront) => storefront,
            Err(e) => {
                return Err(self
                    .step_failed(tenant.id, ProvisioningStep::EnsureStorefront, e)
                    .await);
            }
        };

        if !progress.is_completed(ProvisioningStep::ActivateSlug) {
            self.activate_slug(tenant.id, &tenant.slug).await;
        }

        let activation = self
            .activate_tenant(tenant.id, session.id, &vendor, &storefront)
            .await?;
        Ok(self.announce_activation(activation, &session).await)
    }

    /// Moves a `creating` tenant to `inactive`, fails its session and tells
    /// the owner.
    ///
    /// Returns false if the tenant had already left `creating`.
    #[tracing::instrument(skip(self, tenant), fields(tenant_id = %tenant.id))]
    pub async fn terminate(&self, tenant: &Tenant, reason: &str) -> Result<bool> {
        match self
            .store
            .fail_tenant(tenant.id, TenantStatus::Inactive, reason)
            .await
        {
            Ok(_) => {}
            Err(StoreError::Tenant(TenantError::StatusConflict { actual, .. })) => {
                tracing::info!(status = %actual, "Tenant already left creating; not terminating");
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        }
        tracing::warn!(reason, "Tenant terminally failed");

        self.record_quietly(tenant.id, ProvisioningEvent::saga_failed(reason))
            .await;

        match self.store.session_for_tenant(tenant.id).await {
            Ok(Some(session)) => {
                if let Err(e) = self
                    .store
                    .set_session_status(session.id, SessionStatus::Failed)
                    .await
                {
                    tracing::warn!(session_id = %session.id, error = %e, "Failed to mark session as failed");
                }
                self.notifier.dispatch(
                    TEMPLATE_PROVISIONING_FAILED,
                    session.contact.email.clone(),
                    json!({
                        "first_name": session.contact.first_name,
                        "business_name": tenant.name,
                        "slug": tenant.slug.as_str(),
                    }),
                );
            }
            Ok(None) => tracing::warn!("Terminated tenant has no onboarding session"),
            Err(e) => tracing::warn!(error = %e, "Failed to load session of terminated tenant"),
        }

        Ok(true)
    }

    /// Returns the folded journal of a tenant.
    pub async fn progress(&self, tenant_id: TenantId) -> Result<ProvisioningProgress> {
        let journal = self.store.journal(tenant_id).await?;
        Ok(ProvisioningProgress::from_entries(&journal))
    }
}
