//! Slug allocation and arbitration.

use chrono::Utc;
use common::{SessionId, TenantId};
use domain::{Slug, SlugReservation};
use serde::Serialize;
use tenant_store::{ProvisioningStore, StoreError};

use crate::config::SlugPolicy;
use crate::error::Result;

/// Result of a reservation attempt.
///
/// A taken slug is an expected outcome reported through `available`, not an
/// error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReserveOutcome {
    pub slug: String,
    pub available: bool,
    pub suggestions: Vec<String>,
}

impl ReserveOutcome {
    fn reserved(slug: &Slug) -> Self {
        Self {
            slug: slug.to_string(),
            available: true,
            suggestions: Vec::new(),
        }
    }

    fn taken(slug: &Slug, suggestions: Vec<String>) -> Self {
        Self {
            slug: slug.to_string(),
            available: false,
            suggestions,
        }
    }
}

/// Allocates slugs to onboarding sessions and binds them to tenants.
///
/// The store's uniqueness constraints arbitrate races; the checks made here
/// only avoid pointless writes and produce suggestions.
pub struct SlugRegistry<S> {
    store: S,
    policy: SlugPolicy,
}

impl<S> SlugRegistry<S>
where
    S: ProvisioningStore,
{
    /// Creates a new slug registry.
    pub fn new(store: S, policy: SlugPolicy) -> Self {
        Self { store, policy }
    }

    /// Validates `candidate` and reserves it for the session.
    ///
    /// Re-reserving a slug the session already holds renews it. When the slug
    /// is taken nothing is reserved and up to `suggestion_count` free
    /// alternatives are returned.
    #[tracing::instrument(skip(self, claimant))]
    pub async fn reserve(
        &self,
        candidate: &str,
        session_id: SessionId,
        claimant: Option<&str>,
    ) -> Result<ReserveOutcome> {
        let slug = Slug::parse(candidate)?;
        let now = Utc::now();

        if self.is_taken(&slug, Some(session_id)).await? {
            return self.taken(&slug).await;
        }

        let ttl = chrono::Duration::from_std(self.policy.reservation_ttl)
            .unwrap_or_else(|_| chrono::Duration::minutes(30));
        let reservation = SlugReservation::pending(
            slug.clone(),
            session_id,
            claimant.map(str::to_string),
            ttl,
            now,
        );

        match self.store.reserve_slug(reservation, now).await {
            Ok(_) => {
                metrics::counter!("slug_reservations_total", "outcome" => "reserved").increment(1);
                tracing::debug!(slug = %slug, "Slug reserved");
                Ok(ReserveOutcome::reserved(&slug))
            }
            Err(StoreError::SlugConflict(_)) => self.taken(&slug).await,
            Err(e) => Err(e.into()),
        }
    }

    /// Returns up to `suggestion_count` free alternatives for `slug`.
    pub async fn suggest(&self, slug: &Slug) -> Result<Vec<String>> {
        let wanted = self.policy.suggestion_count;
        let mut suggestions = Vec::with_capacity(wanted);

        for candidate in slug.alternatives().take(wanted.saturating_mul(10)) {
            if suggestions.len() >= wanted {
                break;
            }
            if !self.is_taken(&candidate, None).await? {
                suggestions.push(candidate.to_string());
            }
        }

        Ok(suggestions)
    }

    /// Binds the session's pending reservation to the tenant.
    ///
    /// A missing reservation is logged and reported as `false`; the tenant
    /// row's own slug column stays authoritative.
    #[tracing::instrument(skip(self))]
    pub async fn activate(&self, slug: &Slug, tenant_id: TenantId) -> Result<bool> {
        let activated = self.store.activate_reservation(slug, tenant_id).await?;
        if !activated {
            tracing::warn!(
                slug = %slug,
                tenant_id = %tenant_id,
                "No pending reservation to activate; tenant keeps slug via its own row"
            );
        }
        Ok(activated)
    }

    /// Frees every reservation bound to the tenant.
    #[tracing::instrument(skip(self))]
    pub async fn release(&self, tenant_id: TenantId) -> Result<u64> {
        let released = self.store.release_reservations(tenant_id).await?;
        tracing::info!(tenant_id = %tenant_id, released, "Slug reservations released");
        Ok(released)
    }

    /// A slug is taken when a tenant uses it or another session holds a
    /// blocking reservation. `holder` is exempt from the reservation check.
    async fn is_taken(&self, slug: &Slug, holder: Option<SessionId>) -> Result<bool> {
        if self.store.find_tenant_by_slug(slug).await?.is_some() {
            return Ok(true);
        }

        let now = Utc::now();
        Ok(self
            .store
            .find_reservation(slug)
            .await?
            .is_some_and(|r| r.is_blocking(now) && holder.is_none_or(|s| !r.is_held_by(s))))
    }

    async fn taken(&self, slug: &Slug) -> Result<ReserveOutcome> {
        metrics::counter!("slug_reservations_total", "outcome" => "taken").increment(1);
        let suggestions = self.suggest(slug).await?;
        tracing::debug!(slug = %slug, ?suggestions, "Slug unavailable");
        Ok(ReserveOutcome::taken(slug, suggestions))
    }
}
