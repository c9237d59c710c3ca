use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{JournalEntryId, SessionId, StorefrontId, TenantId, UserId, VendorId};
use domain::{
    AuthPolicy, ContactDetails, Credential, JournalEntry, Membership, OnboardingSession,
    ProvisioningEvent, ReservationStatus, SessionStatus, Slug, SlugReservation, Tenant,
    TenantError, TenantStatus, User,
};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    Result, StoreError,
    store::{AccountStore, JournalStore, SessionStore, SlugStore, TenantStore},
};

const TENANT_COLUMNS: &str = "id, slug, name, status, owner_id, currency, locale, vendor_id, \
     storefront_id, reconcile_attempts, failure_reason, created_at, updated_at";

const SESSION_COLUMNS: &str = "id, business_name, contact_email, contact_first_name, \
     contact_last_name, requested_slug, currency, locale, tenant_id, status, created_at, updated_at";

const RESERVATION_COLUMNS: &str =
    "id, slug, session_id, claimant, tenant_id, status, expires_at, created_at, updated_at";

/// PostgreSQL-backed provisioning store.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_tenant(row: PgRow) -> Result<Tenant> {
        Ok(Tenant {
            id: TenantId::from_uuid(row.try_get::<Uuid, _>("id")?),
            slug: parse_slug(row.try_get("slug")?)?,
            name: row.try_get("name")?,
            status: parse_value(row.try_get("status")?)?,
            owner_id: row
                .try_get::<Option<Uuid>, _>("owner_id")?
                .map(UserId::from_uuid),
            currency: row.try_get("currency")?,
            locale: row.try_get("locale")?,
            vendor_id: row
                .try_get::<Option<Uuid>, _>("vendor_id")?
                .map(VendorId::from_uuid),
            storefront_id: row
                .try_get::<Option<Uuid>, _>("storefront_id")?
                .map(StorefrontId::from_uuid),
            reconcile_attempts: row.try_get::<i32, _>("reconcile_attempts")?.max(0) as u32,
            failure_reason: row.try_get("failure_reason")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_session(row: PgRow) -> Result<OnboardingSession> {
        Ok(OnboardingSession {
            id: SessionId::from_uuid(row.try_get::<Uuid, _>("id")?),
            business_name: row.try_get("business_name")?,
            contact: ContactDetails {
                email: row.try_get("contact_email")?,
                first_name: row.try_get("contact_first_name")?,
                last_name: row.try_get("contact_last_name")?,
            },
            requested_slug: row.try_get("requested_slug")?,
            currency: row.try_get("currency")?,
            locale: row.try_get("locale")?,
            tenant_id: row
                .try_get::<Option<Uuid>, _>("tenant_id")?
                .map(TenantId::from_uuid),
            status: parse_value(row.try_get("status")?)?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_reservation(row: &PgRow) -> Result<SlugReservation> {
        Ok(SlugReservation {
            slug: parse_slug(row.try_get("slug")?)?,
            session_id: SessionId::from_uuid(row.try_get::<Uuid, _>("session_id")?),
            claimant: row.try_get("claimant")?,
            tenant_id: row
                .try_get::<Option<Uuid>, _>("tenant_id")?
                .map(TenantId::from_uuid),
            status: parse_value(row.try_get("status")?)?,
            expires_at: row.try_get("expires_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_user(row: PgRow) -> Result<User> {
        Ok(User {
            id: UserId::from_uuid(row.try_get::<Uuid, _>("id")?),
            email: row.try_get("email")?,
            first_name: row.try_get("first_name")?,
            last_name: row.try_get("last_name")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_membership(row: PgRow) -> Result<Membership> {
        Ok(Membership {
            user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
            tenant_id: TenantId::from_uuid(row.try_get::<Uuid, _>("tenant_id")?),
            role: parse_value(row.try_get("role")?)?,
            is_default: row.try_get("is_default")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_credential(row: PgRow) -> Result<Credential> {
        let policy: serde_json::Value = row.try_get("auth_policy")?;
        let auth_policy: AuthPolicy = serde_json::from_value(policy)?;

        Ok(Credential {
            user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
            tenant_id: TenantId::from_uuid(row.try_get::<Uuid, _>("tenant_id")?),
            auth_policy,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_journal_entry(row: PgRow) -> Result<JournalEntry> {
        let payload: serde_json::Value = row.try_get("payload")?;

        Ok(JournalEntry {
            id: JournalEntryId::from_uuid(row.try_get::<Uuid, _>("id")?),
            tenant_id: TenantId::from_uuid(row.try_get::<Uuid, _>("tenant_id")?),
            sequence: row.try_get("sequence")?,
            event: serde_json::from_value(payload)?,
            recorded_at: row.try_get("recorded_at")?,
        })
    }

    /// Explains why a compare-and-set on a `creating` tenant matched no row.
    async fn status_conflict(&self, tenant_id: TenantId) -> StoreError {
        match self.get_tenant(tenant_id).await {
            Ok(Some(tenant)) => StoreError::Tenant(TenantError::StatusConflict {
                tenant_id,
                expected: TenantStatus::Creating,
                actual: tenant.status,
            }),
            Ok(None) => StoreError::TenantNotFound(tenant_id),
            Err(e) => e,
        }
    }
}

fn parse_value<T: FromStr<Err = String>>(value: String) -> Result<T> {
    value.parse().map_err(StoreError::Decode)
}

fn parse_slug(value: String) -> Result<Slug> {
    Slug::parse(&value).map_err(|e| StoreError::Decode(e.to_string()))
}

fn violates(e: &sqlx::Error, constraint: &str) -> bool {
    matches!(e, sqlx::Error::Database(db_err) if db_err.constraint() == Some(constraint))
}

#[async_trait]
impl TenantStore for PostgresStore {
    async fn create_tenant_for_session(
        &self,
        tenant: &Tenant,
        session_id: SessionId,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let bound: Option<Option<Uuid>> =
            sqlx::query_scalar("SELECT tenant_id FROM onboarding_sessions WHERE id = $1 FOR UPDATE")
                .bind(session_id.as_uuid())
                .fetch_optional(&mut *tx)
                .await?;

        match bound {
            None => return Err(StoreError::SessionNotFound(session_id)),
            Some(Some(existing)) => {
                return Err(StoreError::SessionAlreadyProvisioned {
                    session_id,
                    tenant_id: TenantId::from_uuid(existing),
                });
            }
            Some(None) => {}
        }

        sqlx::query(
            r#"
            INSERT INTO tenants (id, slug, name, status, owner_id, currency, locale,
                                 reconcile_attempts, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(tenant.id.as_uuid())
        .bind(tenant.slug.as_str())
        .bind(&tenant.name)
        .bind(tenant.status.as_str())
        .bind(tenant.owner_id.map(|id| id.as_uuid()))
        .bind(&tenant.currency)
        .bind(&tenant.locale)
        .bind(tenant.reconcile_attempts as i32)
        .bind(tenant.created_at)
        .bind(tenant.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if violates(&e, "tenants_slug_key") {
                return StoreError::SlugConflict(tenant.slug.to_string());
            }
            StoreError::Database(e)
        })?;

        sqlx::query("UPDATE onboarding_sessions SET tenant_id = $1, updated_at = NOW() WHERE id = $2")
            .bind(tenant.id.as_uuid())
            .bind(session_id.as_uuid())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_tenant(&self, tenant_id: TenantId) -> Result<Option<Tenant>> {
        let row = sqlx::query(&format!("SELECT {TENANT_COLUMNS} FROM tenants WHERE id = $1"))
            .bind(tenant_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_tenant).transpose()
    }

    async fn find_tenant_by_slug(&self, slug: &Slug) -> Result<Option<Tenant>> {
        let row = sqlx::query(&format!("SELECT {TENANT_COLUMNS} FROM tenants WHERE slug = $1"))
            .bind(slug.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_tenant).transpose()
    }

    async fn set_tenant_owner(&self, tenant_id: TenantId, owner_id: UserId) -> Result<()> {
        let result =
            sqlx::query("UPDATE tenants SET owner_id = $2, updated_at = NOW() WHERE id = $1")
                .bind(tenant_id.as_uuid())
                .bind(owner_id.as_uuid())
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::TenantNotFound(tenant_id));
        }
        Ok(())
    }

    async fn activate_tenant(
        &self,
        tenant_id: TenantId,
        vendor_id: VendorId,
        storefront_id: StorefrontId,
    ) -> Result<Tenant> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE tenants
            SET status = 'active', vendor_id = $2, storefront_id = $3,
                failure_reason = NULL, updated_at = NOW()
            WHERE id = $1 AND status = 'creating'
            RETURNING {TENANT_COLUMNS}
            "#
        ))
        .bind(tenant_id.as_uuid())
        .bind(vendor_id.as_uuid())
        .bind(storefront_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::row_to_tenant(row),
            None => Err(self.status_conflict(tenant_id).await),
        }
    }

    async fn fail_tenant(
        &self,
        tenant_id: TenantId,
        status: TenantStatus,
        reason: &str,
    ) -> Result<Tenant> {
        if !status.is_terminal_failure() {
            return Err(StoreError::Tenant(TenantError::InvalidTransition {
                from: TenantStatus::Creating,
                to: status,
            }));
        }

        let row = sqlx::query(&format!(
            r#"
            UPDATE tenants
            SET status = $2, failure_reason = $3, updated_at = NOW()
            WHERE id = $1 AND status = 'creating'
            RETURNING {TENANT_COLUMNS}
            "#
        ))
        .bind(tenant_id.as_uuid())
        .bind(status.as_str())
        .bind(reason)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::row_to_tenant(row),
            None => Err(self.status_conflict(tenant_id).await),
        }
    }

    async fn increment_reconcile_attempts(&self, tenant_id: TenantId) -> Result<u32> {
        let attempts: Option<i32> = sqlx::query_scalar(
            r#"
            UPDATE tenants
            SET reconcile_attempts = reconcile_attempts + 1, updated_at = NOW()
            WHERE id = $1 AND status = 'creating'
            RETURNING reconcile_attempts
            "#,
        )
        .bind(tenant_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        if let Some(n) = attempts {
            return Ok(n.max(0) as u32);
        }

        // Settled tenants keep their counter
        let current: Option<i32> =
            sqlx::query_scalar("SELECT reconcile_attempts FROM tenants WHERE id = $1")
                .bind(tenant_id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;
        current
            .map(|n| n.max(0) as u32)
            .ok_or(StoreError::TenantNotFound(tenant_id))
    }

    async fn stuck_tenants(&self, cutoff: DateTime<Utc>) -> Result<Vec<Tenant>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {TENANT_COLUMNS}
            FROM tenants
            WHERE status = 'creating' AND created_at < $1
            ORDER BY created_at ASC
            "#
        ))
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_tenant).collect()
    }
}

#[async_trait]
impl SlugStore for PostgresStore {
    async fn find_reservation(&self, slug: &Slug) -> Result<Option<SlugReservation>> {
        let row = sqlx::query(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM slug_reservations WHERE slug = $1 AND status <> 'released'"
        ))
        .bind(slug.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_reservation).transpose()
    }

    async fn reserve_slug(
        &self,
        reservation: SlugReservation,
        now: DateTime<Utc>,
    ) -> Result<SlugReservation> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!(
            r#"
            SELECT {RESERVATION_COLUMNS}
            FROM slug_reservations
            WHERE slug = $1 AND status <> 'released'
            FOR UPDATE
            "#
        ))
        .bind(reservation.slug.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(row) = row {
            let row_id: i64 = row.try_get("id")?;
            let mut existing = Self::row_to_reservation(&row)?;

            if existing.is_held_by(reservation.session_id) {
                if existing.status == ReservationStatus::Pending {
                    sqlx::query(
                        r#"
                        UPDATE slug_reservations
                        SET expires_at = $2, claimant = $3, updated_at = $4
                        WHERE id = $1
                        "#,
                    )
                    .bind(row_id)
                    .bind(reservation.expires_at)
                    .bind(&reservation.claimant)
                    .bind(now)
                    .execute(&mut *tx)
                    .await?;

                    existing.expires_at = reservation.expires_at;
                    existing.claimant = reservation.claimant;
                    existing.updated_at = now;
                }
                tx.commit().await?;
                return Ok(existing);
            }

            if existing.is_blocking(now) {
                return Err(StoreError::SlugConflict(reservation.slug.to_string()));
            }

            tracing::debug!(
                slug = %existing.slug,
                previous_session = %existing.session_id,
                "Replacing expired slug reservation"
            );
            sqlx::query(
                "UPDATE slug_reservations SET status = 'released', updated_at = $2 WHERE id = $1",
            )
            .bind(row_id)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            r#"
            INSERT INTO slug_reservations
                (slug, session_id, claimant, tenant_id, status, expires_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(reservation.slug.as_str())
        .bind(reservation.session_id.as_uuid())
        .bind(&reservation.claimant)
        .bind(reservation.tenant_id.map(|id| id.as_uuid()))
        .bind(reservation.status.as_str())
        .bind(reservation.expires_at)
        .bind(reservation.created_at)
        .bind(reservation.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            // A concurrent reservation won the race for the partial unique index
            if violates(&e, "slug_reservations_live_slug_key") {
                return StoreError::SlugConflict(reservation.slug.to_string());
            }
            StoreError::Database(e)
        })?;

        tx.commit().await?;
        Ok(reservation)
    }

    async fn activate_reservation(&self, slug: &Slug, tenant_id: TenantId) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE slug_reservations
            SET status = 'active', tenant_id = $2, expires_at = NULL, updated_at = NOW()
            WHERE slug = $1 AND status = 'pending'
            "#,
        )
        .bind(slug.as_str())
        .bind(tenant_id.as_uuid())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }

        let already_active: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM slug_reservations
                WHERE slug = $1 AND status = 'active' AND tenant_id = $2
            )
            "#,
        )
        .bind(slug.as_str())
        .bind(tenant_id.as_uuid())
        .fetch_one(&self.pool)
        .await?;

        Ok(already_active)
    }

    async fn release_reservations(&self, tenant_id: TenantId) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE slug_reservations
            SET status = 'released', updated_at = NOW()
            WHERE tenant_id = $1 AND status <> 'released'
            "#,
        )
        .bind(tenant_id.as_uuid())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl SessionStore for PostgresStore {
    async fn create_session(&self, session: &OnboardingSession) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO onboarding_sessions
                (id, business_name, contact_email, contact_first_name, contact_last_name,
                 requested_slug, currency, locale, tenant_id, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(session.id.as_uuid())
        .bind(&session.business_name)
        .bind(&session.contact.email)
        .bind(&session.contact.first_name)
        .bind(&session.contact.last_name)
        .bind(&session.requested_slug)
        .bind(&session.currency)
        .bind(&session.locale)
        .bind(session.tenant_id.map(|id| id.as_uuid()))
        .bind(session.status.as_str())
        .bind(session.created_at)
        .bind(session.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_session(&self, session_id: SessionId) -> Result<Option<OnboardingSession>> {
        let row = sqlx::query(&format!(
            "SELECT {SESSION_COLUMNS} FROM onboarding_sessions WHERE id = $1"
        ))
        .bind(session_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_session).transpose()
    }

    async fn session_for_tenant(&self, tenant_id: TenantId) -> Result<Option<OnboardingSession>> {
        let row = sqlx::query(&format!(
            "SELECT {SESSION_COLUMNS} FROM onboarding_sessions WHERE tenant_id = $1"
        ))
        .bind(tenant_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_session).transpose()
    }

    async fn set_session_status(
        &self,
        session_id: SessionId,
        status: SessionStatus,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE onboarding_sessions SET status = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(session_id.as_uuid())
        .bind(status.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::SessionNotFound(session_id));
        }
        Ok(())
    }
}

#[async_trait]
impl AccountStore for PostgresStore {
    async fn upsert_user(&self, user: &User) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, email, first_name, last_name, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE SET
                email = EXCLUDED.email,
                first_name = EXCLUDED.first_name,
                last_name = EXCLUDED.last_name
            "#,
        )
        .bind(user.id.as_uuid())
        .bind(&user.email)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query(
            "SELECT id, email, first_name, last_name, created_at FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_user).transpose()
    }

    async fn create_membership(&self, membership: &Membership) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO memberships (user_id, tenant_id, role, is_default, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id, tenant_id) DO NOTHING
            "#,
        )
        .bind(membership.user_id.as_uuid())
        .bind(membership.tenant_id.as_uuid())
        .bind(membership.role.as_str())
        .bind(membership.is_default)
        .bind(membership.created_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn memberships_for_user(&self, user_id: UserId) -> Result<Vec<Membership>> {
        let rows = sqlx::query(
            r#"
            SELECT user_id, tenant_id, role, is_default, created_at
            FROM memberships
            WHERE user_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_membership).collect()
    }

    async fn memberships_for_tenant(&self, tenant_id: TenantId) -> Result<Vec<Membership>> {
        let rows = sqlx::query(
            r#"
            SELECT user_id, tenant_id, role, is_default, created_at
            FROM memberships
            WHERE tenant_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(tenant_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_membership).collect()
    }

    async fn upsert_credential(&self, credential: &Credential) -> Result<()> {
        let policy = serde_json::to_value(credential.auth_policy)?;

        sqlx::query(
            r#"
            INSERT INTO credentials (user_id, tenant_id, auth_policy, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, tenant_id) DO UPDATE SET auth_policy = EXCLUDED.auth_policy
            "#,
        )
        .bind(credential.user_id.as_uuid())
        .bind(credential.tenant_id.as_uuid())
        .bind(policy)
        .bind(credential.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn credentials_for_tenant(&self, tenant_id: TenantId) -> Result<Vec<Credential>> {
        let rows = sqlx::query(
            r#"
            SELECT user_id, tenant_id, auth_policy, created_at
            FROM credentials
            WHERE tenant_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(tenant_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_credential).collect()
    }

    async fn relink_user(&self, old_id: UserId, user: &User) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let old = old_id.as_uuid();
        let new = user.id.as_uuid();

        // The old row holds the email, so it goes before the new row is written
        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(old)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO users (id, email, first_name, last_name, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE SET
                email = EXCLUDED.email,
                first_name = EXCLUDED.first_name,
                last_name = EXCLUDED.last_name
            "#,
        )
        .bind(new)
        .bind(&user.email)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.created_at)
        .execute(&mut *tx)
        .await?;

        for table in ["memberships", "credentials"] {
            sqlx::query(&format!(
                r#"
                DELETE FROM {table} o
                WHERE o.user_id = $1
                  AND EXISTS (SELECT 1 FROM {table} n WHERE n.user_id = $2 AND n.tenant_id = o.tenant_id)
                "#
            ))
            .bind(old)
            .bind(new)
            .execute(&mut *tx)
            .await?;
        }

        let mut moved = 0;
        for table in ["memberships", "credentials"] {
            let result = sqlx::query(&format!(
                "UPDATE {table} SET user_id = $2 WHERE user_id = $1"
            ))
            .bind(old)
            .bind(new)
            .execute(&mut *tx)
            .await?;
            moved += result.rows_affected();
        }

        tx.commit().await?;
        Ok(moved)
    }
}

#[async_trait]
impl JournalStore for PostgresStore {
    async fn append_journal(
        &self,
        tenant_id: TenantId,
        event: ProvisioningEvent,
    ) -> Result<JournalEntry> {
        let mut tx = self.pool.begin().await?;

        // Lock the tenant row so sequence numbers are assigned one writer at a time
        let locked: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM tenants WHERE id = $1 FOR UPDATE")
                .bind(tenant_id.as_uuid())
                .fetch_optional(&mut *tx)
                .await?;
        if locked.is_none() {
            return Err(StoreError::TenantNotFound(tenant_id));
        }

        let last: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(sequence), 0) FROM provisioning_journal WHERE tenant_id = $1",
        )
        .bind(tenant_id.as_uuid())
        .fetch_one(&mut *tx)
        .await?;

        let entry = JournalEntry {
            id: JournalEntryId::new(),
            tenant_id,
            sequence: last + 1,
            event,
            recorded_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO provisioning_journal (id, tenant_id, sequence, event_type, payload, recorded_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(entry.id.as_uuid())
        .bind(tenant_id.as_uuid())
        .bind(entry.sequence)
        .bind(entry.event.event_type())
        .bind(serde_json::to_value(&entry.event)?)
        .bind(entry.recorded_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(entry)
    }

    async fn journal(&self, tenant_id: TenantId) -> Result<Vec<JournalEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, tenant_id, sequence, payload, recorded_at
            FROM provisioning_journal
            WHERE tenant_id = $1
            ORDER BY sequence ASC
            "#,
        )
        .bind(tenant_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_journal_entry).collect()
    }
}
