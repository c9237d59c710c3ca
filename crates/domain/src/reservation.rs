//! Slug reservations: claims on a slug before (and after) the tenant exists.

use chrono::{DateTime, Duration, Utc};
use common::{SessionId, TenantId};
use serde::{Deserialize, Serialize};

use crate::slug::Slug;

/// The status of a slug reservation.
///
/// State transitions:
/// ```text
/// Pending ──► Active ──► Released
///    └───────────────────────▲
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    /// Held by an onboarding session; no tenant yet.
    Pending,
    /// Bound to a created tenant.
    Active,
    /// Freed back to the pool.
    Released,
}

impl ReservationStatus {
    /// Returns true if the reservation can be bound to a tenant.
    pub fn can_activate(&self) -> bool {
        matches!(self, ReservationStatus::Pending)
    }

    /// Returns true if the reservation can be released.
    pub fn can_release(&self) -> bool {
        !matches!(self, ReservationStatus::Released)
    }

    /// Returns the status name as stored and serialized.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Pending => "pending",
            ReservationStatus::Active => "active",
            ReservationStatus::Released => "released",
        }
    }
}

impl std::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ReservationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ReservationStatus::Pending),
            "active" => Ok(ReservationStatus::Active),
            "released" => Ok(ReservationStatus::Released),
            other => Err(format!("unknown reservation status '{other}'")),
        }
    }
}

/// A claim on a slug value.
///
/// At most one non-released reservation exists per slug; the store enforces this.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlugReservation {
    pub slug: Slug,
    pub session_id: SessionId,
    /// Free-form description of who holds the claim (usually the contact email).
    pub claimant: Option<String>,
    pub tenant_id: Option<TenantId>,
    pub status: ReservationStatus,
    /// Pending reservations lapse after this instant.
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SlugReservation {
    /// Creates a pending reservation held by `session_id` for `ttl`.
    pub fn pending(
        slug: Slug,
        session_id: SessionId,
        claimant: Option<String>,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            slug,
            session_id,
            claimant,
            tenant_id: None,
            status: ReservationStatus::Pending,
            expires_at: Some(now + ttl),
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns true if this reservation prevents anyone else from claiming the slug.
    pub fn is_blocking(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            ReservationStatus::Active => true,
            ReservationStatus::Pending => self.expires_at.is_none_or(|at| at > now),
            ReservationStatus::Released => false,
        }
    }

    /// Returns true if `session_id` holds this reservation.
    pub fn is_held_by(&self, session_id: SessionId) -> bool {
        self.session_id == session_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(now: DateTime<Utc>) -> SlugReservation {
        SlugReservation::pending(
            Slug::parse("acme").unwrap(),
            SessionId::new(),
            Some("owner@acme.test".to_string()),
            Duration::minutes(30),
            now,
        )
    }

    #[test]
    fn test_status_transitions() {
        assert!(ReservationStatus::Pending.can_activate());
        assert!(!ReservationStatus::Active.can_activate());
        assert!(!ReservationStatus::Released.can_activate());

        assert!(ReservationStatus::Pending.can_release());
        assert!(ReservationStatus::Active.can_release());
        assert!(!ReservationStatus::Released.can_release());
    }

    #[test]
    fn test_pending_blocks_until_expiry() {
        let now = Utc::now();
        let r = pending(now);
        assert!(r.is_blocking(now));
        assert!(r.is_blocking(now + Duration::minutes(29)));
        assert!(!r.is_blocking(now + Duration::minutes(31)));
    }

    #[test]
    fn test_active_always_blocks() {
        let now = Utc::now();
        let mut r = pending(now);
        r.status = ReservationStatus::Active;
        assert!(r.is_blocking(now + Duration::days(365)));
    }

    #[test]
    fn test_released_never_blocks() {
        let now = Utc::now();
        let mut r = pending(now);
        r.status = ReservationStatus::Released;
        assert!(!r.is_blocking(now));
    }

    #[test]
    fn test_status_parse() {
        assert_eq!(
            "released".parse::<ReservationStatus>().unwrap(),
            ReservationStatus::Released
        );
        assert!("gone".parse::<ReservationStatus>().is_err());
    }
}
