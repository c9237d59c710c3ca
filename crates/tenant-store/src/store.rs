use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{SessionId, StorefrontId, TenantId, UserId, VendorId};
use domain::{
    Credential, JournalEntry, Membership, OnboardingSession, ProvisioningEvent, SessionStatus,
    Slug, SlugReservation, Tenant, TenantStatus, User,
};

use crate::Result;

/// Storage for tenant rows.
///
/// Status changes are compare-and-set against `creating` and validated
/// against [`domain::TENANT_TRANSITIONS`].
#[async_trait]
pub trait TenantStore: Send + Sync {
    /// Inserts a `creating` tenant and binds it to the session in one atomic step.
    ///
    /// Fails with `SlugConflict` if a tenant already uses the slug and with
    /// `SessionAlreadyProvisioned` if the session already has a tenant.
    async fn create_tenant_for_session(&self, tenant: &Tenant, session_id: SessionId)
    -> Result<()>;

    /// Retrieves a tenant by id.
    async fn get_tenant(&self, tenant_id: TenantId) -> Result<Option<Tenant>>;

    /// Retrieves the tenant that owns a slug.
    async fn find_tenant_by_slug(&self, slug: &Slug) -> Result<Option<Tenant>>;

    /// Records the owner identity id on the tenant.
    async fn set_tenant_owner(&self, tenant_id: TenantId, owner_id: UserId) -> Result<()>;

    /// Moves a `creating` tenant to `active`, recording both resource ids.
    async fn activate_tenant(
        &self,
        tenant_id: TenantId,
        vendor_id: VendorId,
        storefront_id: StorefrontId,
    ) -> Result<Tenant>;

    /// Moves a `creating` tenant to `failed` or `inactive` with a reason.
    async fn fail_tenant(
        &self,
        tenant_id: TenantId,
        status: TenantStatus,
        reason: &str,
    ) -> Result<Tenant>;

    /// Increments the reconciliation attempt counter, returning the new value.
    ///
    /// Tenants outside `creating` are left untouched and report their current count.
    async fn increment_reconcile_attempts(&self, tenant_id: TenantId) -> Result<u32>;

    /// Lists `creating` tenants created before `cutoff`, oldest first.
    async fn stuck_tenants(&self, cutoff: DateTime<Utc>) -> Result<Vec<Tenant>>;
}

/// Storage for slug reservations.
#[async_trait]
pub trait SlugStore: Send + Sync {
    /// Returns the live (non-released) reservation for a slug, if any.
    async fn find_reservation(&self, slug: &Slug) -> Result<Option<SlugReservation>>;

    /// Creates or renews a pending reservation.
    ///
    /// A live reservation held by the same session is renewed in place. An
    /// expired pending reservation held by another session is released and
    /// replaced. Any other live reservation yields `SlugConflict`.
    async fn reserve_slug(
        &self,
        reservation: SlugReservation,
        now: DateTime<Utc>,
    ) -> Result<SlugReservation>;

    /// Binds the pending reservation for `slug` to a tenant and marks it active.
    ///
    /// Returns false if no pending or matching active reservation exists.
    async fn activate_reservation(&self, slug: &Slug, tenant_id: TenantId) -> Result<bool>;

    /// Releases every live reservation bound to the tenant, returning the count.
    async fn release_reservations(&self, tenant_id: TenantId) -> Result<u64>;
}

/// Storage for onboarding sessions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create_session(&self, session: &OnboardingSession) -> Result<()>;

    async fn get_session(&self, session_id: SessionId) -> Result<Option<OnboardingSession>>;

    /// Retrieves the session whose `tenant_id` points at the tenant.
    async fn session_for_tenant(&self, tenant_id: TenantId) -> Result<Option<OnboardingSession>>;

    async fn set_session_status(&self, session_id: SessionId, status: SessionStatus)
    -> Result<()>;
}

/// Storage for local users, memberships and credential bookkeeping.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Inserts the user or refreshes its email and name.
    async fn upsert_user(&self, user: &User) -> Result<()>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Creates a membership. Returns false if one already exists for the pair.
    async fn create_membership(&self, membership: &Membership) -> Result<bool>;

    async fn memberships_for_user(&self, user_id: UserId) -> Result<Vec<Membership>>;

    async fn memberships_for_tenant(&self, tenant_id: TenantId) -> Result<Vec<Membership>>;

    /// Inserts the credential or replaces its auth policy.
    async fn upsert_credential(&self, credential: &Credential) -> Result<()>;

    async fn credentials_for_tenant(&self, tenant_id: TenantId) -> Result<Vec<Credential>>;

    /// Re-keys every membership and credential of `old_id` to `user.id`.
    ///
    /// The old user row is replaced by `user`. Rows that would duplicate an
    /// existing (user, tenant) pair are dropped. Returns the rows re-keyed.
    async fn relink_user(&self, old_id: UserId, user: &User) -> Result<u64>;
}

/// Append-only storage for the provisioning journal.
#[async_trait]
pub trait JournalStore: Send + Sync {
    /// Appends an event with the tenant's next sequence number.
    async fn append_journal(
        &self,
        tenant_id: TenantId,
        event: ProvisioningEvent,
    ) -> Result<JournalEntry>;

    /// Returns the tenant's journal in sequence order.
    async fn journal(&self, tenant_id: TenantId) -> Result<Vec<JournalEntry>>;
}

/// Everything the provisioning saga and reconciler persist.
pub trait ProvisioningStore:
    TenantStore + SlugStore + SessionStore + AccountStore + JournalStore
{
}

// Blanket implementation for every type providing all stores
impl<T> ProvisioningStore for T where
    T: TenantStore + SlugStore + SessionStore + AccountStore + JournalStore + ?Sized
{
}
