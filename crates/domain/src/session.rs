//! Onboarding session: the upstream record consumed by the provisioning saga.

use chrono::{DateTime, Utc};
use common::{SessionId, TenantId};
use serde::{Deserialize, Serialize};

use crate::tenant::{DEFAULT_CURRENCY, DEFAULT_LOCALE};

/// The status of an onboarding session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// The form is still being filled or provisioning has not finished.
    #[default]
    InProgress,
    /// The tenant was provisioned and is active.
    Completed,
    /// Provisioning aborted; see the tenant's failure reason.
    Failed,
}

impl SessionStatus {
    /// Returns the status name as stored and serialized.
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::InProgress => "in_progress",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(SessionStatus::InProgress),
            "completed" => Ok(SessionStatus::Completed),
            "failed" => Ok(SessionStatus::Failed),
            other => Err(format!("unknown session status '{other}'")),
        }
    }
}

/// Contact details of the future tenant owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactDetails {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

impl ContactDetails {
    /// Creates contact details, normalizing the email to lower case.
    pub fn new(
        email: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
    ) -> Self {
        Self {
            email: email.into().trim().to_lowercase(),
            first_name: first_name.into(),
            last_name: last_name.into(),
        }
    }

    /// Returns "First Last", skipping empty parts.
    pub fn full_name(&self) -> String {
        [self.first_name.trim(), self.last_name.trim()]
            .iter()
            .filter(|part| !part.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Business and contact data collected by onboarding.
///
/// `tenant_id` is the saga's idempotency key: once set, the tenant exists and
/// a repeated provisioning call only repairs identity and login state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnboardingSession {
    pub id: SessionId,
    pub business_name: String,
    pub contact: ContactDetails,
    pub requested_slug: Option<String>,
    pub currency: String,
    pub locale: String,
    pub tenant_id: Option<TenantId>,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OnboardingSession {
    /// Creates an in-progress session with default billing and locale settings.
    pub fn new(business_name: impl Into<String>, contact: ContactDetails) -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::new(),
            business_name: business_name.into(),
            contact,
            requested_slug: None,
            currency: DEFAULT_CURRENCY.to_string(),
            locale: DEFAULT_LOCALE.to_string(),
            tenant_id: None,
            status: SessionStatus::InProgress,
            created_at: now,
            updated_at: now,
        }
    }

    /// Sets the slug the owner asked for.
    pub fn with_slug(mut self, slug: impl Into<String>) -> Self {
        self.requested_slug = Some(slug.into());
        self
    }

    /// Overrides the billing currency.
    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }

    /// Overrides the locale.
    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = locale.into();
        self
    }

    /// Returns true once a tenant has been created for this session.
    pub fn has_tenant(&self) -> bool {
        self.tenant_id.is_some()
    }
}
