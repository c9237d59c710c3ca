use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{JournalEntryId, SessionId, StorefrontId, TenantId, UserId, VendorId};
use domain::{
    Credential, JournalEntry, Membership, OnboardingSession, ProvisioningEvent, ReservationStatus,
    SessionStatus, Slug, SlugReservation, Tenant, TenantError, TenantStatus, User,
};
use tokio::sync::RwLock;

use crate::{
    Result, StoreError,
    store::{AccountStore, JournalStore, SessionStore, SlugStore, TenantStore},
};

#[derive(Default)]
struct State {
    tenants: HashMap<TenantId, Tenant>,
    sessions: HashMap<SessionId, OnboardingSession>,
    /// Every reservation ever made, released ones included.
    reservations: Vec<SlugReservation>,
    users: HashMap<UserId, User>,
    memberships: Vec<Membership>,
    credentials: Vec<Credential>,
    journal: HashMap<TenantId, Vec<JournalEntry>>,
}

impl State {
    fn tenant_mut(&mut self, tenant_id: TenantId) -> Result<&mut Tenant> {
        self.tenants
            .get_mut(&tenant_id)
            .ok_or(StoreError::TenantNotFound(tenant_id))
    }

    fn live_reservation_mut(&mut self, slug: &Slug) -> Option<&mut SlugReservation> {
        self.reservations
            .iter_mut()
            .find(|r| &r.slug == slug && r.status != ReservationStatus::Released)
    }
}

/// In-memory provisioning store.
///
/// All state sits behind one lock, so every multi-row operation is atomic
/// and the uniqueness rules match the PostgreSQL schema.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
    fail_on_activate: Arc<AtomicBool>,
    fail_on_membership: Arc<AtomicBool>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `activate_tenant` fail, simulating a crash before activation.
    pub fn set_fail_on_activate(&self, fail: bool) {
        self.fail_on_activate.store(fail, Ordering::SeqCst);
    }

    /// Makes `create_membership` fail.
    pub fn set_fail_on_membership(&self, fail: bool) {
        self.fail_on_membership.store(fail, Ordering::SeqCst);
    }

    /// Overrides a tenant's creation timestamp.
    pub async fn set_tenant_created_at(
        &self,
        tenant_id: TenantId,
        created_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        state.tenant_mut(tenant_id)?.created_at = created_at;
        Ok(())
    }

    /// Returns the number of tenant rows.
    pub async fn tenant_count(&self) -> usize {
        self.state.read().await.tenants.len()
    }

    /// Returns every reservation ever recorded for a slug, released ones included.
    pub async fn reservation_history(&self, slug: &Slug) -> Vec<SlugReservation> {
        self.state
            .read()
            .await
            .reservations
            .iter()
            .filter(|r| &r.slug == slug)
            .cloned()
            .collect()
    }

    /// Clears all state.
    pub async fn clear(&self) {
        *self.state.write().await = State::default();
    }
}

fn unavailable() -> StoreError {
    StoreError::Database(sqlx::Error::PoolTimedOut)
}

fn transition_conflict(tenant: &Tenant, next: TenantStatus) -> StoreError {
    if tenant.status.is_creating() {
        StoreError::Tenant(TenantError::InvalidTransition {
            from: tenant.status,
            to: next,
        })
    } else {
        StoreError::Tenant(TenantError::StatusConflict {
            tenant_id: tenant.id,
            expected: TenantStatus::Creating,
            actual: tenant.status,
        })
    }
}

#[async_trait]
impl TenantStore for InMemoryStore {
    async fn create_tenant_for_session(
        &self,
        tenant: &Tenant,
        session_id: SessionId,
    ) -> Result<()> {
        let mut state = self.state.write().await;

        let session = state
            .sessions
            .get(&session_id)
            .ok_or(StoreError::SessionNotFound(session_id))?;
        if let Some(tenant_id) = session.tenant_id {
            return Err(StoreError::SessionAlreadyProvisioned {
                session_id,
                tenant_id,
            });
        }
        if state.tenants.values().any(|t| t.slug == tenant.slug) {
            return Err(StoreError::SlugConflict(tenant.slug.to_string()));
        }

        state.tenants.insert(tenant.id, tenant.clone());
        if let Some(session) = state.sessions.get_mut(&session_id) {
            session.tenant_id = Some(tenant.id);
            session.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn get_tenant(&self, tenant_id: TenantId) -> Result<Option<Tenant>> {
        Ok(self.state.read().await.tenants.get(&tenant_id).cloned())
    }

    async fn find_tenant_by_slug(&self, slug: &Slug) -> Result<Option<Tenant>> {
        Ok(self
            .state
            .read()
            .await
            .tenants
            .values()
            .find(|t| &t.slug == slug)
            .cloned())
    }

    async fn set_tenant_owner(&self, tenant_id: TenantId, owner_id: UserId) -> Result<()> {
        let mut state = self.state.write().await;
        let tenant = state.tenant_mut(tenant_id)?;
        tenant.owner_id = Some(owner_id);
        tenant.updated_at = Utc::now();
        Ok(())
    }

    async fn activate_tenant(
        &self,
        tenant_id: TenantId,
        vendor_id: VendorId,
        storefront_id: StorefrontId,
    ) -> Result<Tenant> {
        if self.fail_on_activate.load(Ordering::SeqCst) {
            return Err(unavailable());
        }

        let mut state = self.state.write().await;
        let tenant = state.tenant_mut(tenant_id)?;
        if !tenant.status.is_creating() {
            return Err(transition_conflict(tenant, TenantStatus::Active));
        }
        tenant.activate(vendor_id, storefront_id)?;
        Ok(tenant.clone())
    }

    async fn fail_tenant(
        &self,
        tenant_id: TenantId,
        status: TenantStatus,
        reason: &str,
    ) -> Result<Tenant> {
        let mut state = self.state.write().await;
        let tenant = state.tenant_mut(tenant_id)?;
        if !tenant.status.is_creating() {
            return Err(transition_conflict(tenant, status));
        }
        tenant.fail(status, reason)?;
        Ok(tenant.clone())
    }

    async fn increment_reconcile_attempts(&self, tenant_id: TenantId) -> Result<u32> {
        let mut state = self.state.write().await;
        let tenant = state.tenant_mut(tenant_id)?;
        if !tenant.status.is_creating() {
            return Ok(tenant.reconcile_attempts);
        }
        tenant.reconcile_attempts += 1;
        tenant.updated_at = Utc::now();
        Ok(tenant.reconcile_attempts)
    }

    async fn stuck_tenants(&self, cutoff: DateTime<Utc>) -> Result<Vec<Tenant>> {
        let state = self.state.read().await;
        let mut stuck: Vec<Tenant> = state
            .tenants
            .values()
            .filter(|t| t.status.is_creating() && t.created_at < cutoff)
            .cloned()
            .collect();
        stuck.sort_by_key(|t| t.created_at);
        Ok(stuck)
    }
}

#[async_trait]
impl SlugStore for InMemoryStore {
    async fn find_reservation(&self, slug: &Slug) -> Result<Option<SlugReservation>> {
        Ok(self
            .state
            .read()
            .await
            .reservations
            .iter()
            .find(|r| &r.slug == slug && r.status != ReservationStatus::Released)
            .cloned())
    }

    async fn reserve_slug(
        &self,
        reservation: SlugReservation,
        now: DateTime<Utc>,
    ) -> Result<SlugReservation> {
        let mut state = self.state.write().await;

        if let Some(existing) = state.live_reservation_mut(&reservation.slug) {
            if existing.is_held_by(reservation.session_id) {
                if existing.status == ReservationStatus::Pending {
                    existing.expires_at = reservation.expires_at;
                    existing.claimant = reservation.claimant;
                    existing.updated_at = now;
                }
                return Ok(existing.clone());
            }
            if existing.is_blocking(now) {
                return Err(StoreError::SlugConflict(reservation.slug.to_string()));
            }
            tracing::debug!(
                slug = %existing.slug,
                previous_session = %existing.session_id,
                "Replacing expired slug reservation"
            );
            existing.status = ReservationStatus::Released;
            existing.updated_at = now;
        }

        state.reservations.push(reservation.clone());
        Ok(reservation)
    }

    async fn activate_reservation(&self, slug: &Slug, tenant_id: TenantId) -> Result<bool> {
        let mut state = self.state.write().await;
        let Some(existing) = state.live_reservation_mut(slug) else {
            return Ok(false);
        };

        match existing.status {
            ReservationStatus::Pending => {
                existing.status = ReservationStatus::Active;
                existing.tenant_id = Some(tenant_id);
                existing.expires_at = None;
                existing.updated_at = Utc::now();
                Ok(true)
            }
            ReservationStatus::Active => Ok(existing.tenant_id == Some(tenant_id)),
            ReservationStatus::Released => Ok(false),
        }
    }

    async fn release_reservations(&self, tenant_id: TenantId) -> Result<u64> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        let mut released = 0;
        for r in state
            .reservations
            .iter_mut()
            .filter(|r| r.tenant_id == Some(tenant_id) && r.status.can_release())
        {
            r.status = ReservationStatus::Released;
            r.updated_at = now;
            released += 1;
        }
        Ok(released)
    }
}

#[async_trait]
impl SessionStore for InMemoryStore {
    async fn create_session(&self, session: &OnboardingSession) -> Result<()> {
        self.state
            .write()
            .await
            .sessions
            .insert(session.id, session.clone());
        Ok(())
    }

    async fn get_session(&self, session_id: SessionId) -> Result<Option<OnboardingSession>> {
        Ok(self.state.read().await.sessions.get(&session_id).cloned())
    }

    async fn session_for_tenant(&self, tenant_id: TenantId) -> Result<Option<OnboardingSession>> {
        Ok(self
            .state
            .read()
            .await
            .sessions
            .values()
            .find(|s| s.tenant_id == Some(tenant_id))
            .cloned())
    }

    async fn set_session_status(
        &self,
        session_id: SessionId,
        status: SessionStatus,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        let session = state
            .sessions
            .get_mut(&session_id)
            .ok_or(StoreError::SessionNotFound(session_id))?;
        session.status = status;
        session.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl AccountStore for InMemoryStore {
    async fn upsert_user(&self, user: &User) -> Result<()> {
        let mut state = self.state.write().await;
        match state.users.get_mut(&user.id) {
            Some(existing) => {
                existing.email = user.email.clone();
                existing.first_name = user.first_name.clone();
                existing.last_name = user.last_name.clone();
            }
            None => {
                state.users.insert(user.id, user.clone());
            }
        }
        Ok(())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self
            .state
            .read()
            .await
            .users
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn create_membership(&self, membership: &Membership) -> Result<bool> {
        if self.fail_on_membership.load(Ordering::SeqCst) {
            return Err(unavailable());
        }

        let mut state = self.state.write().await;
        let exists = state
            .memberships
            .iter()
            .any(|m| m.user_id == membership.user_id && m.tenant_id == membership.tenant_id);
        if exists {
            return Ok(false);
        }
        state.memberships.push(membership.clone());
        Ok(true)
    }

    async fn memberships_for_user(&self, user_id: UserId) -> Result<Vec<Membership>> {
        Ok(self
            .state
            .read()
            .await
            .memberships
            .iter()
            .filter(|m| m.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn memberships_for_tenant(&self, tenant_id: TenantId) -> Result<Vec<Membership>> {
        Ok(self
            .state
            .read()
            .await
            .memberships
            .iter()
            .filter(|m| m.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    async fn upsert_credential(&self, credential: &Credential) -> Result<()> {
        let mut state = self.state.write().await;
        match state
            .credentials
            .iter_mut()
            .find(|c| c.user_id == credential.user_id && c.tenant_id == credential.tenant_id)
        {
            Some(existing) => existing.auth_policy = credential.auth_policy,
            None => state.credentials.push(credential.clone()),
        }
        Ok(())
    }

    async fn credentials_for_tenant(&self, tenant_id: TenantId) -> Result<Vec<Credential>> {
        Ok(self
            .state
            .read()
            .await
            .credentials
            .iter()
            .filter(|c| c.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    async fn relink_user(&self, old_id: UserId, user: &User) -> Result<u64> {
        let mut state = self.state.write().await;
        let new_id = user.id;

        state.users.remove(&old_id);
        state.users.insert(new_id, user.clone());

        let new_membership_tenants: Vec<TenantId> = state
            .memberships
            .iter()
            .filter(|m| m.user_id == new_id)
            .map(|m| m.tenant_id)
            .collect();
        state
            .memberships
            .retain(|m| !(m.user_id == old_id && new_membership_tenants.contains(&m.tenant_id)));

        let new_credential_tenants: Vec<TenantId> = state
            .credentials
            .iter()
            .filter(|c| c.user_id == new_id)
            .map(|c| c.tenant_id)
            .collect();
        state
            .credentials
            .retain(|c| !(c.user_id == old_id && new_credential_tenants.contains(&c.tenant_id)));

        let mut moved = 0;
        for m in state.memberships.iter_mut().filter(|m| m.user_id == old_id) {
            m.user_id = new_id;
            moved += 1;
        }
        for c in state.credentials.iter_mut().filter(|c| c.user_id == old_id) {
            c.user_id = new_id;
            moved += 1;
        }
        Ok(moved)
    }
}

#[async_trait]
impl JournalStore for InMemoryStore {
    async fn append_journal(
        &self,
        tenant_id: TenantId,
        event: ProvisioningEvent,
    ) -> Result<JournalEntry> {
        let mut state = self.state.write().await;
        if !state.tenants.contains_key(&tenant_id) {
            return Err(StoreError::TenantNotFound(tenant_id));
        }

        let entries = state.journal.entry(tenant_id).or_default();
        let entry = JournalEntry {
            id: JournalEntryId::new(),
            tenant_id,
            sequence: entries.len() as i64 + 1,
            event,
            recorded_at: Utc::now(),
        };
        entries.push(entry.clone());
        Ok(entry)
    }

    async fn journal(&self, tenant_id: TenantId) -> Result<Vec<JournalEntry>> {
        Ok(self
            .state
            .read()
            .await
            .journal
            .get(&tenant_id)
            .cloned()
            .unwrap_or_default())
    }
}
