//! Tenant lifecycle state machine.

use serde::{Deserialize, Serialize};

/// The lifecycle status of a tenant.
///
/// State transitions:
/// ```text
/// Creating ──┬──► Active
///            ├──► Failed
///            └──► Inactive
/// ```
///
/// There is no transition out of `Active`, `Failed` or `Inactive` within
/// provisioning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TenantStatus {
    /// Provisioning saga in progress.
    #[default]
    Creating,

    /// Vendor and storefront exist; the tenant is usable.
    Active,

    /// Provisioning gave up after exhausted retries or age (terminal).
    Inactive,

    /// Provisioning aborted on a fatal fault (terminal).
    Failed,
}

/// Every allowed `(from, to)` status transition.
pub const TENANT_TRANSITIONS: &[(TenantStatus, TenantStatus)] = &[
    (TenantStatus::Creating, TenantStatus::Active),
    (TenantStatus::Creating, TenantStatus::Failed),
    (TenantStatus::Creating, TenantStatus::Inactive),
];

impl TenantStatus {
    /// Returns true if the transition table allows moving to `next`.
    pub fn can_transition_to(&self, next: TenantStatus) -> bool {
        TENANT_TRANSITIONS.contains(&(*self, next))
    }

    /// Returns true while the provisioning saga owns the tenant.
    pub fn is_creating(&self) -> bool {
        matches!(self, TenantStatus::Creating)
    }

    /// Returns true if provisioning ended without an active tenant.
    pub fn is_terminal_failure(&self) -> bool {
        matches!(self, TenantStatus::Failed | TenantStatus::Inactive)
    }

    /// Returns the status name as stored and serialized.
    pub fn as_str(&self) -> &'static str {
        match self {
            TenantStatus::Creating => "creating",
            TenantStatus::Active => "active",
            TenantStatus::Inactive => "inactive",
            TenantStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TenantStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TenantStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "creating" => Ok(TenantStatus::Creating),
            "active" => Ok(TenantStatus::Active),
            "inactive" => Ok(TenantStatus::Inactive),
            "failed" => Ok(TenantStatus::Failed),
            other => Err(format!("unknown tenant status '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [TenantStatus; 4] = [
        TenantStatus::Creating,
        TenantStatus::Active,
        TenantStatus::Inactive,
        TenantStatus::Failed,
    ];

    #[test]
    fn test_default_status_is_creating() {
        assert_eq!(TenantStatus::default(), TenantStatus::Creating);
    }

    #[test]
    fn test_creating_transitions() {
        assert!(TenantStatus::Creating.can_transition_to(TenantStatus::Active));
        assert!(TenantStatus::Creating.can_transition_to(TenantStatus::Failed));
        assert!(TenantStatus::Creating.can_transition_to(TenantStatus::Inactive));
        assert!(!TenantStatus::Creating.can_transition_to(TenantStatus::Creating));
    }

    #[test]
    fn test_no_transition_out_of_settled_states() {
        for from in [TenantStatus::Active, TenantStatus::Inactive, TenantStatus::Failed] {
            for to in ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to} must be rejected");
            }
        }
    }

    #[test]
    fn test_terminal_failure() {
        assert!(!TenantStatus::Creating.is_terminal_failure());
        assert!(!TenantStatus::Active.is_terminal_failure());
        assert!(TenantStatus::Inactive.is_terminal_failure());
        assert!(TenantStatus::Failed.is_terminal_failure());
    }

    #[test]
    fn test_display_and_parse() {
        for status in ALL {
            let parsed: TenantStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert!("deleted".parse::<TenantStatus>().is_err());
    }

    #[test]
    fn test_serialization_is_lowercase() {
        let json = serde_json::to_string(&TenantStatus::Inactive).unwrap();
        assert_eq!(json, "\"inactive\"");
    }
}
