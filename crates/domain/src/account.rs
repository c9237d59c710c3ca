//! Local account bookkeeping: users, memberships and credentials.
//!
//! The local [`User`] id is always the identity provider's id for that person.

use chrono::{DateTime, Utc};
use common::{TenantId, UserId};
use serde::{Deserialize, Serialize};

/// A local user record keyed by the identity provider's id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(
        id: UserId,
        email: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
    ) -> Self {
        Self {
            id,
            email: email.into(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            created_at: Utc::now(),
        }
    }
}

/// A user's role within a tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Owner,
    Admin,
    Staff,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Owner => "owner",
            Role::Admin => "admin",
            Role::Staff => "staff",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owner" => Ok(Role::Owner),
            "admin" => Ok(Role::Admin),
            "staff" => Ok(Role::Staff),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

/// A (user, tenant, role) triple. One per (user, tenant) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub user_id: UserId,
    pub tenant_id: TenantId,
    pub role: Role,
    /// The tenant the user lands in after login. Set on a user's first membership.
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
}

impl Membership {
    pub fn new(user_id: UserId, tenant_id: TenantId, role: Role, is_default: bool) -> Self {
        Self {
            user_id,
            tenant_id,
            role,
            is_default,
            created_at: Utc::now(),
        }
    }
}

/// Per-tenant authentication policy applied to a credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthPolicy {
    pub password_login: bool,
    pub mfa_required: bool,
    pub session_ttl_minutes: u32,
}

impl Default for AuthPolicy {
    fn default() -> Self {
        Self {
            password_login: true,
            mfa_required: false,
            session_ttl_minutes: 720,
        }
    }
}

/// Credential bookkeeping for a user in a tenant.
///
/// The secret itself lives in the identity provider; this row only records
/// that the user authenticates into the tenant and under which policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub user_id: UserId,
    pub tenant_id: TenantId,
    pub auth_policy: AuthPolicy,
    pub created_at: DateTime<Utc>,
}

impl Credential {
    pub fn new(user_id: UserId, tenant_id: TenantId, auth_policy: AuthPolicy) -> Self {
        Self {
            user_id,
            tenant_id,
            auth_policy,
            created_at: Utc::now(),
        }
    }
}
