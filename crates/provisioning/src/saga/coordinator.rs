//! First-run provisioning and re-entrant calls.

use std::time::Instant;

use common::{SessionId, TenantId, UserId};
use domain::{OnboardingSession, ProvisioningEvent, ProvisioningStep, Slug, Tenant, TenantStatus};
use tenant_store::{ProvisioningStore, StoreError};
use tokio_util::sync::CancellationToken;

use super::{ProvisionOutcome, ProvisionRequest, ProvisioningSaga, owner_user};
use crate::error::{ProvisioningError, Result};
use crate::registrar::OwnerRegistration;
use crate::services::{AuthorizationService, IdentityProvider, LoginToken, VendorService};

impl<S, I, A, V> ProvisioningSaga<S, I, A, V>
where
    S: ProvisioningStore + Clone + 'static,
    I: IdentityProvider,
    A: AuthorizationService,
    V: VendorService,
{
    /// Provisions the tenant for an onboarding session.
    ///
    /// Safe to call repeatedly: once the session has a tenant, further calls
    /// only re-link the owner identity and issue a fresh login token.
    pub async fn provision(
        &self,
        session_id: SessionId,
        request: ProvisionRequest,
    ) -> Result<ProvisionOutcome> {
        self.provision_with_cancel(session_id, request, &CancellationToken::new())
            .await
    }

    /// Like [`ProvisioningSaga::provision`], with a token that cuts retry
    /// backoff short.
    ///
    /// Cancellation during the vendor or storefront step leaves the tenant in
    /// `creating` for reconciliation to finish.
    #[tracing::instrument(skip(self, request, token), fields(saga_type = "TenantProvisioning"))]
    pub async fn provision_with_cancel(
        &self,
        session_id: SessionId,
        request: ProvisionRequest,
        token: &CancellationToken,
    ) -> Result<ProvisionOutcome> {
        metrics::counter!("provisioning_sagas_total").increment(1);
        let saga_start = Instant::now();

        let result = self.run(session_id, &request, token).await;

        match &result {
            Ok(outcome) => {
                metrics::counter!("provisioning_sagas_completed").increment(1);
                tracing::info!(
                    tenant_id = %outcome.tenant_id,
                    resumed = outcome.resumed,
                    "Provisioning finished"
                );
            }
            Err(e) => {
                metrics::counter!("provisioning_sagas_failed").increment(1);
                tracing::warn!(error = %e, "Provisioning failed");
            }
        }
        metrics::histogram!("provisioning_saga_duration_seconds")
            .record(saga_start.elapsed().as_secs_f64());

        result
    }

    async fn run(
        &self,
        session_id: SessionId,
        request: &ProvisionRequest,
        token: &CancellationToken,
    ) -> Result<ProvisionOutcome> {
        let session = self
            .store
            .get_session(session_id)
            .await?
            .ok_or(ProvisioningError::SessionNotFound(session_id))?;

        if let Some(tenant_id) = session.tenant_id {
            return self.reenter(&session, tenant_id, request).await;
        }

        // 1. Resolve the slug
        let slug = match session.requested_slug.as_deref() {
            Some(requested) => Slug::parse(requested)?,
            None => Slug::from_business_name(&session.business_name)?,
        };
        let reservation = self
            .slugs
            .reserve(slug.as_str(), session.id, Some(&session.contact.email))
            .await?;
        if !reservation.available {
            // A concurrent call for this session may have taken the slug first
            if let Some(tenant_id) = self
                .store
                .get_session(session.id)
                .await?
                .and_then(|s| s.tenant_id)
            {
                return self.reenter(&session, tenant_id, request).await;
            }
            return Err(ProvisioningError::SlugUnavailable {
                slug: reservation.slug,
                suggestions: reservation.suggestions,
            });
        }

        // 2. Create the tenant row, bound to the session
        let tenant = Tenant::creating(
            slug.clone(),
            session.business_name.clone(),
            session.currency.clone(),
            session.locale.clone(),
        );
        match self.store.create_tenant_for_session(&tenant, session.id).await {
            Ok(()) => {}
            Err(StoreError::SessionAlreadyProvisioned { tenant_id, .. }) => {
                return self.reenter(&session, tenant_id, request).await;
            }
            Err(StoreError::SlugConflict(_)) => {
                return Err(ProvisioningError::SlugUnavailable {
                    slug: slug.to_string(),
                    suggestions: self.slugs.suggest(&slug).await?,
                });
            }
            Err(e) => return Err(e.into()),
        }
        self.record(
            tenant.id,
            ProvisioningEvent::saga_started(tenant.id, session.id, slug.clone()),
        )
        .await?;
        tracing::info!(tenant_id = %tenant.id, slug = %slug, "Tenant row created");

        // 3. Register or link the owner identity
        let registration = OwnerRegistration {
            email: session.contact.email.clone(),
            password: request.password.clone(),
            first_name: session.contact.first_name.clone(),
            last_name: session.contact.last_name.clone(),
            tenant_id: tenant.id,
            tenant_slug: slug.clone(),
        };
        let registered = match self.registrar.register_or_link_owner(&registration).await {
            Ok(registered) => registered,
            Err(e) => {
                return Err(self
                    .abort(
                        tenant.id,
                        session.id,
                        ProvisioningStep::RegisterIdentity,
                        TenantStatus::Failed,
                        e,
                    )
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
        let owner = owner_user(registered.user_id, &session);

        // 4. Membership (best-effort)
        let linked = self.link_membership(tenant.id, &owner).await;
        self.best_effort(tenant.id, ProvisioningStep::LinkMembership, linked)
            .await;

        // 5. Credentials (best-effort)
        let recorded = self.record_credentials(tenant.id, &owner).await;
        self.best_effort(tenant.id, ProvisioningStep::RecordCredentials, recorded)
            .await;

        // 6. Authorization bootstrap
        if let Err(e) = self.bootstrap_authorization(tenant.id, &owner).await {
            return Err(self
                .abort(
                    tenant.id,
                    session.id,
                    ProvisioningStep::BootstrapAuthorization,
                    TenantStatus::Failed,
                    e,
                )
                .await);
        }
        self.record(
            tenant.id,
            ProvisioningEvent::step_completed(ProvisioningStep::BootstrapAuthorization),
        )
        .await?;

        // 7. Vendor, then storefront
        let vendor = match self.ensure_vendor(&tenant, &session, token).await {
            Ok(vendor) => vendor,
            Err(e) => {
                return Err(self
                    .resource_failure(&tenant, &session, ProvisioningStep::EnsureVendor, e)
                    .await);
            }
        };
        let storefront = match self.ensure_storefront(&tenant, &vendor, token).await {
            Ok(storefront) => storefront,
            Err(e) => {
                return Err(self
                    .resource_failure(&tenant, &session, ProvisioningStep::EnsureStorefront, e)
                    .await);
            }
        };

        // 8. Slug reservation (best-effort)
        self.activate_slug(tenant.id, &slug).await;

        // 9. Activate
        let activation = self
            .activate_tenant(tenant.id, session.id, &vendor, &storefront)
            .await?;

        // 10-11. Announce in the background
        let active = self.announce_activation(activation, &session).await;

        let login_token = self.login_token(registered.user_id, active.id).await;

        Ok(ProvisionOutcome {
            tenant_id: active.id,
            slug: active.slug.to_string(),
            status: active.status,
            owner_id: Some(registered.user_id),
            resumed: false,
            login_token,
        })
    }

    /// Repairs identity and login state for a session that already has a tenant.
    ///
    /// Tenant status is never changed here; an unfinished tenant is left to
    /// reconciliation.
    async fn reenter(
        &self,
        session: &OnboardingSession,
        tenant_id: TenantId,
        request: &ProvisionRequest,
    ) -> Result<ProvisionOutcome> {
        let tenant = self
            .store
            .get_tenant(tenant_id)
            .await?
            .ok_or(ProvisioningError::TenantNotFound(tenant_id))?;
        tracing::info!(tenant_id = %tenant.id, status = %tenant.status, "Session already provisioned; re-linking owner");

        let registered = self
            .registrar
            .register_or_link_owner(&OwnerRegistration {
                email: session.contact.email.clone(),
                password: request.password.clone(),
                first_name: session.contact.first_name.clone(),
                last_name: session.contact.last_name.clone(),
                tenant_id: tenant.id,
                tenant_slug: tenant.slug.clone(),
            })
            .await?;

        if tenant.owner_id != Some(registered.user_id) {
            if let Some(previous) = tenant.owner_id {
                tracing::warn!(
                    tenant_id = %tenant.id,
                    previous = %previous,
                    identity_id = %registered.user_id,
                    "Tenant owner diverges from identity provider; correcting"
                );
            }
            self.store
                .set_tenant_owner(tenant.id, registered.user_id)
                .await?;
        }

        let owner = owner_user(registered.user_id, session);
        if let Err(e) = self.link_membership(tenant.id, &owner).await {
            tracing::warn!(tenant_id = %tenant.id, error = %e, "Membership repair failed");
        }

        let login_token = self.login_token(registered.user_id, tenant.id).await;

        Ok(ProvisionOutcome {
            tenant_id: tenant.id,
            slug: tenant.slug.to_string(),
            status: tenant.status,
            owner_id: Some(registered.user_id),
            resumed: true,
            login_token,
        })
    }

    /// Handles a vendor or storefront failure.
    ///
    /// A tenant mismatch fails the tenant; exhausted retries and other errors
    /// make it inactive. Cancellation leaves it `creating`.
    async fn resource_failure(
        &self,
        tenant: &Tenant,
        session: &OnboardingSession,
        step: ProvisioningStep,
        err: ProvisioningError,
    ) -> ProvisioningError {
        let status = match err {
            ProvisioningError::Cancelled => {
                tracing::info!(tenant_id = %tenant.id, step = %step, "Provisioning cancelled; left for reconciliation");
                return self.step_failed(tenant.id, step, err).await;
            }
            ProvisioningError::TenantMismatch { .. } => TenantStatus::Failed,
            _ => TenantStatus::Inactive,
        };
        self.abort(tenant.id, session.id, step, status, err).await
    }

    /// Issues a login token, logging instead of failing.
    async fn login_token(
        &self,
        user_id: UserId,
        tenant_id: TenantId,
    ) -> Option<LoginToken> {
        match self.registrar.issue_login_token(user_id, tenant_id).await {
            Ok(token) => Some(token),
            Err(e) => {
                tracing::warn!(tenant_id = %tenant_id, error = %e, "Login token issuance failed");
                None
            }
        }
    }
}
