//! The tenant provisioning saga.
//!
//! Steps run strictly in order on the caller's task. Identity registration,
//! authorization bootstrap and the vendor/storefront pair are fatal; account
//! bookkeeping, slug activation, event publication and notification are
//! best-effort. Every step outcome is appended to the tenant's provisioning
//! journal so that reconciliation can resume from the last completed step.

mod coordinator;
mod outcome;
mod resume;

use std::sync::Arc;

use common::{SessionId, TenantId, UserId};
use domain::{
    AuthPolicy, Credential, Membership, OnboardingSession, ProvisioningEvent, ProvisioningStep,
    Role, SessionStatus, Slug, Tenant, TenantError, TenantStatus, User,
};
use serde_json::json;
use tenant_store::{ProvisioningStore, StoreError};
use tokio_util::sync::CancellationToken;

pub use outcome::{ProvisionOutcome, ProvisionRequest};

use crate::config::{HostConfig, ProvisioningConfig};
use crate::error::{ProvisioningError, Result};
use crate::notifier::{NotificationDispatcher, TEMPLATE_WELCOME};
use crate::publisher::EventPublisher;
use crate::registrar::IdentityRegistrar;
use crate::resources::ResourceProvisioner;
use crate::services::{
    AuthorizationService, IdentityProvider, NewStorefront, NewVendor, OwnerBootstrap, Storefront,
    Vendor, VendorService,
};
use crate::slug_registry::SlugRegistry;

/// Orchestrates tenant provisioning across the store and the collaborators.
pub struct ProvisioningSaga<S, I, A, V>
where
    S: ProvisioningStore,
    I: IdentityProvider,
    A: AuthorizationService,
    V: VendorService,
{
    store: S,
    slugs: SlugRegistry<S>,
    registrar: IdentityRegistrar<I>,
    authorization: A,
    resources: ResourceProvisioner<V>,
    publisher: Arc<EventPublisher>,
    notifier: NotificationDispatcher,
    hosts: HostConfig,
}

impl<S, I, A, V> ProvisioningSaga<S, I, A, V>
where
    S: ProvisioningStore + Clone + 'static,
    I: IdentityProvider,
    A: AuthorizationService,
    V: VendorService,
{
    /// Creates a new provisioning saga.
    pub fn new(
        store: S,
        identity: I,
        authorization: A,
        vendor: V,
        publisher: Arc<EventPublisher>,
        notifier: NotificationDispatcher,
        config: &ProvisioningConfig,
    ) -> Self {
        Self {
            slugs: SlugRegistry::new(store.clone(), config.slugs.clone()),
            store,
            registrar: IdentityRegistrar::new(identity),
            authorization,
            resources: ResourceProvisioner::new(vendor, config.retry.clone()),
            publisher,
            notifier,
            hosts: config.hosts.clone(),
        }
    }

    /// Returns the store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns the slug registry.
    pub fn slugs(&self) -> &SlugRegistry<S> {
        &self.slugs
    }

    /// Returns the event publisher.
    pub fn publisher(&self) -> &Arc<EventPublisher> {
        &self.publisher
    }

    /// Appends a journal event.
    async fn record(&self, tenant_id: TenantId, event: ProvisioningEvent) -> Result<()> {
        self.store.append_journal(tenant_id, event).await?;
        Ok(())
    }

    /// Appends a journal event, logging instead of failing.
    async fn record_quietly(&self, tenant_id: TenantId, event: ProvisioningEvent) {
        let event_type = event.event_type();
        if let Err(e) = self.store.append_journal(tenant_id, event).await {
            tracing::warn!(tenant_id = %tenant_id, event_type, error = %e, "Failed to append journal entry");
        }
    }

    /// Journals and counts a failed step, handing the error back.
    async fn step_failed(
        &self,
        tenant_id: TenantId,
        step: ProvisioningStep,
        err: ProvisioningError,
    ) -> ProvisioningError {
        metrics::counter!("provisioning_step_failures_total", "step" => step.as_str())
            .increment(1);
        self.record_quietly(tenant_id, ProvisioningEvent::step_failed(step, err.to_string()))
            .await;
        err
    }

    /// Runs a best-effort step: success is journaled, failure is logged,
    /// journaled as non-fatal and swallowed.
    async fn best_effort(
        &self,
        tenant_id: TenantId,
        step: ProvisioningStep,
        result: Result<()>,
    ) -> bool {
        match result {
            Ok(()) => {
                self.record_quietly(tenant_id, ProvisioningEvent::step_completed(step))
                    .await;
                true
            }
            Err(e) => {
                tracing::warn!(tenant_id = %tenant_id, step = %step, error = %e, "Best-effort step failed");
                self.step_failed(tenant_id, step, e).await;
                false
            }
        }
    }

    /// Fails the tenant and its session after a fatal step error.
    ///
    /// Returns the original error for the caller to surface.
    async fn abort(
        &self,
        tenant_id: TenantId,
        session_id: SessionId,
        step: ProvisioningStep,
        status: TenantStatus,
        err: ProvisioningError,
    ) -> ProvisioningError {
        let reason = format!("{step}: {err}");
        tracing::warn!(
            tenant_id = %tenant_id,
            step = %step,
            status = %status,
            error = %err,
            "Provisioning aborted"
        );

        let err = self.step_failed(tenant_id, step, err).await;

        if let Err(e) = self.store.fail_tenant(tenant_id, status, &reason).await {
            tracing::error!(tenant_id = %tenant_id, error = %e, "Failed to mark tenant as failed");
        }
        if let Err(e) = self
            .store
            .set_session_status(session_id, SessionStatus::Failed)
            .await
        {
            tracing::warn!(session_id = %session_id, error = %e, "Failed to mark session as failed");
        }
        self.record_quietly(tenant_id, ProvisioningEvent::saga_failed(reason))
            .await;

        err
    }

    /// Makes the local user row match the provider's account and grants the
    /// owner membership.
    ///
    /// A local user found under the same email but another id is a
    /// divergence from the provider; its rows are re-keyed to the provider id.
    async fn link_membership(&self, tenant_id: TenantId, owner: &User) -> Result<()> {
        match self.store.find_user_by_email(&owner.email).await? {
            Some(local) if local.id != owner.id => {
                tracing::warn!(
                    local_id = %local.id,
                    identity_id = %owner.id,
                    email = %owner.email,
                    "Local user id diverges from identity provider; relinking"
                );
                let moved = self.store.relink_user(local.id, owner).await?;
                tracing::info!(identity_id = %owner.id, moved, "Local user relinked");
            }
            _ => self.store.upsert_user(owner).await?,
        }

        let is_default = self.store.memberships_for_user(owner.id).await?.is_empty();
        let created = self
            .store
            .create_membership(&Membership::new(owner.id, tenant_id, Role::Owner, is_default))
            .await?;
        if !created {
            tracing::debug!(tenant_id = %tenant_id, user_id = %owner.id, "Owner membership already exists");
        }
        Ok(())
    }

    /// Records the owner's credential bookkeeping with the default auth policy.
    async fn record_credentials(&self, tenant_id: TenantId, owner: &User) -> Result<()> {
        self.store
            .upsert_credential(&Credential::new(owner.id, tenant_id, AuthPolicy::default()))
            .await?;
        Ok(())
    }

    async fn bootstrap_authorization(&self, tenant_id: TenantId, owner: &User) -> Result<()> {
        let grant = self
            .authorization
            .bootstrap_owner(&OwnerBootstrap {
                tenant_id,
                user_id: owner.id,
                email: owner.email.clone(),
                first_name: owner.first_name.clone(),
                last_name: owner.last_name.clone(),
            })
            .await?;
        tracing::debug!(tenant_id = %tenant_id, staff_id = %grant.staff_id, "Owner role bootstrapped");
        Ok(())
    }

    async fn ensure_vendor(
        &self,
        tenant: &Tenant,
        session: &OnboardingSession,
        token: &CancellationToken,
    ) -> Result<Vendor> {
        let vendor = self
            .resources
            .ensure_vendor(
                &NewVendor {
                    tenant_id: tenant.id,
                    name: session.business_name.clone(),
                    email: session.contact.email.clone(),
                    contact_name: session.contact.full_name(),
                },
                token,
            )
            .await?;
        self.record(tenant.id, ProvisioningEvent::vendor_ensured(vendor.id))
            .await?;
        Ok(vendor)
    }

    async fn ensure_storefront(
        &self,
        tenant: &Tenant,
        vendor: &Vendor,
        token: &CancellationToken,
    ) -> Result<Storefront> {
        let storefront = self
            .resources
            .ensure_storefront(
                &NewStorefront {
                    tenant_id: tenant.id,
                    vendor_id: vendor.id,
                    name: tenant.name.clone(),
                    slug: tenant.slug.to_string(),
                    is_default: true,
                },
                token,
            )
            .await?;
        self.record(tenant.id, ProvisioningEvent::storefront_ensured(storefront.id))
            .await?;
        Ok(storefront)
    }

    /// Binds the slug reservation to the tenant (best-effort).
    async fn activate_slug(&self, tenant_id: TenantId, slug: &Slug) {
        match self.slugs.activate(slug, tenant_id).await {
            Ok(true) => {
                self.record_quietly(
                    tenant_id,
                    ProvisioningEvent::step_completed(ProvisioningStep::ActivateSlug),
                )
                .await;
            }
            Ok(false) => {
                self.record_quietly(
                    tenant_id,
                    ProvisioningEvent::step_failed(
                        ProvisioningStep::ActivateSlug,
                        "no pending reservation",
                    ),
                )
                .await;
            }
            Err(e) => {
                self.best_effort(tenant_id, ProvisioningStep::ActivateSlug, Err(e))
                    .await;
            }
        }
    }

    /// Flips the tenant to active and records completion.
    ///
    /// A tenant some other caller already activated is returned as
    /// [`Activation::AlreadyActive`] and nothing is journaled.
    async fn activate_tenant(
        &self,
        tenant_id: TenantId,
        session_id: SessionId,
        vendor: &Vendor,
        storefront: &Storefront,
    ) -> Result<Activation> {
        let active = match self
            .store
            .activate_tenant(tenant_id, vendor.id, storefront.id)
            .await
        {
            Ok(active) => active,
            Err(StoreError::Tenant(TenantError::StatusConflict {
                actual: TenantStatus::Active,
                ..
            })) => {
                let current = self
                    .store
                    .get_tenant(tenant_id)
                    .await?
                    .ok_or(ProvisioningError::TenantNotFound(tenant_id))?;
                tracing::info!(tenant_id = %tenant_id, "Tenant already activated by a concurrent run");
                return Ok(Activation::AlreadyActive(current));
            }
            Err(e) => {
                tracing::warn!(tenant_id = %tenant_id, error = %e, "Tenant activation failed; left for reconciliation");
                return Err(self
                    .step_failed(tenant_id, ProvisioningStep::ActivateTenant, e.into())
                    .await);
            }
        };

        self.record_quietly(
            tenant_id,
            ProvisioningEvent::step_completed(ProvisioningStep::ActivateTenant),
        )
        .await;
        self.record_quietly(tenant_id, ProvisioningEvent::saga_completed())
            .await;

        if let Err(e) = self
            .store
            .set_session_status(session_id, SessionStatus::Completed)
            .await
        {
            tracing::warn!(session_id = %session_id, error = %e, "Failed to mark session as completed");
        }

        tracing::info!(tenant_id = %tenant_id, slug = %active.slug, "Tenant active");
        Ok(Activation::Activated(active))
    }

    /// Announces a tenant only when this run performed the activation.
    async fn announce_activation(
        &self,
        activation: Activation,
        session: &OnboardingSession,
    ) -> Tenant {
        match activation {
            Activation::Activated(tenant) => {
                self.announce(&tenant, session).await;
                tenant
            }
            Activation::AlreadyActive(tenant) => tenant,
        }
    }

    /// Publishes `tenant.created` and sends the welcome notification, both in
    /// the background.
    async fn announce(&self, tenant: &Tenant, session: &OnboardingSession) {
        let publisher = Arc::clone(&self.publisher);
        let store = self.store.clone();
        let announced = tenant.clone();
        tokio::spawn(async move {
            let report = publisher.publish_tenant_created(&announced).await;
            let event = if report.delivered() {
                ProvisioningEvent::step_completed(ProvisioningStep::PublishEvent)
            } else {
                ProvisioningEvent::step_failed(
                    ProvisioningStep::PublishEvent,
                    "no delivery path confirmed",
                )
            };
            if let Err(e) = store.append_journal(announced.id, event).await {
                tracing::warn!(tenant_id = %announced.id, error = %e, "Failed to journal event publication");
            }
        });

        self.notifier.dispatch(
            TEMPLATE_WELCOME,
            session.contact.email.clone(),
            json!({
                "first_name": session.contact.first_name,
                "business_name": tenant.name,
                "slug": tenant.slug.as_str(),
                "admin_url": format!("https://{}", self.hosts.admin_host(&tenant.slug)),
                "storefront_url": format!("https://{}", self.hosts.storefront_host(&tenant.slug)),
            }),
        );
        self.record_quietly(
            tenant.id,
            ProvisioningEvent::step_completed(ProvisioningStep::Notify),
        )
        .await;
    }
}

/// Result of the final activation step.
enum Activation {
    /// This run moved the tenant from `creating` to `active`.
    Activated(Tenant),
    /// A concurrent run got there first.
    AlreadyActive(Tenant),
}

/// The local user record mirroring the owner's identity account.
fn owner_user(owner_id: UserId, session: &OnboardingSession) -> User {
    User::new(
        owner_id,
        session.contact.email.clone(),
        session.contact.first_name.clone(),
        session.contact.last_name.clone(),
    )
}
