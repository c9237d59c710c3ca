//! Ordered provisioning steps.

use serde::{Deserialize, Serialize};

/// A step of the tenant provisioning saga, in execution order.
///
/// The derive order of `Ord` is the execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisioningStep {
    ResolveSlug,
    CreateTenant,
    RegisterIdentity,
    LinkMembership,
    RecordCredentials,
    BootstrapAuthorization,
    EnsureVendor,
    EnsureStorefront,
    ActivateSlug,
    ActivateTenant,
    PublishEvent,
    Notify,
}

impl ProvisioningStep {
    /// All steps in execution order.
    pub const ALL: [ProvisioningStep; 12] = [
        ProvisioningStep::ResolveSlug,
        ProvisioningStep::CreateTenant,
        ProvisioningStep::RegisterIdentity,
        ProvisioningStep::LinkMembership,
        ProvisioningStep::RecordCredentials,
        ProvisioningStep::BootstrapAuthorization,
        ProvisioningStep::EnsureVendor,
        ProvisioningStep::EnsureStorefront,
        ProvisioningStep::ActivateSlug,
        ProvisioningStep::ActivateTenant,
        ProvisioningStep::PublishEvent,
        ProvisioningStep::Notify,
    ];

    /// Returns true if a failure of this step aborts provisioning.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ProvisioningStep::ResolveSlug
                | ProvisioningStep::CreateTenant
                | ProvisioningStep::RegisterIdentity
                | ProvisioningStep::BootstrapAuthorization
                | ProvisioningStep::EnsureVendor
                | ProvisioningStep::EnsureStorefront
                | ProvisioningStep::ActivateTenant
        )
    }

    /// Returns true if the step is retried with backoff before escalating.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProvisioningStep::EnsureVendor | ProvisioningStep::EnsureStorefront
        )
    }

    /// Returns the step name used in logs, metrics and the journal.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProvisioningStep::ResolveSlug => "resolve_slug",
            ProvisioningStep::CreateTenant => "create_tenant",
            ProvisioningStep::RegisterIdentity => "register_identity",
            ProvisioningStep::LinkMembership => "link_membership",
            ProvisioningStep::RecordCredentials => "record_credentials",
            ProvisioningStep::BootstrapAuthorization => "bootstrap_authorization",
            ProvisioningStep::EnsureVendor => "ensure_vendor",
            ProvisioningStep::EnsureStorefront => "ensure_storefront",
            ProvisioningStep::ActivateSlug => "activate_slug",
            ProvisioningStep::ActivateTenant => "activate_tenant",
            ProvisioningStep::PublishEvent => "publish_event",
            ProvisioningStep::Notify => "notify",
        }
    }
}

impl std::fmt::Display for ProvisioningStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
