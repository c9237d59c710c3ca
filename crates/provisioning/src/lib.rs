//! Tenant provisioning.
//!
//! This crate turns a completed onboarding session into a live tenant across
//! the identity provider, the authorization service and the vendor service:
//!
//! 1. Resolve and reserve the slug
//! 2. Create the tenant row in `creating`
//! 3. Register or link the owner identity
//! 4. Record membership and credentials (best-effort)
//! 5. Bootstrap the owner's authorization role
//! 6. Ensure vendor, then storefront (retried with backoff)
//! 7. Activate the slug reservation and the tenant
//! 8. Publish `tenant.created` and send the welcome notification
//!
//! The [`Reconciler`] resumes tenants left in `creating` by a crash or
//! timeout, or fails them for good once they are too old or out of attempts.

pub mod config;
pub mod error;
pub mod notifier;
pub mod publisher;
pub mod reconciler;
pub mod registrar;
pub mod resources;
pub mod retry;
pub mod saga;
pub mod services;
pub mod slug_registry;

pub use config::{HostConfig, ProvisioningConfig, ReconcilerConfig, RetryPolicy, SlugPolicy};
pub use error::{ProvisioningError, Result};
pub use notifier::{NotificationDispatcher, TEMPLATE_PROVISIONING_FAILED, TEMPLATE_WELCOME};
pub use publisher::{
    BusHealth, DeliveryReport, EventPublisher, PathOutcome, TOPIC_TENANT_CREATED,
    TOPIC_TENANT_DELETED, TenantLifecycleEvent,
};
pub use reconciler::{ReconcileReport, Reconciler};
pub use registrar::{IdentityRegistrar, OWNER_REALM_ROLE, OwnerRegistration, RegistrationOutcome};
pub use resources::ResourceProvisioner;
pub use retry::with_retry;
pub use saga::{ProvisionOutcome, ProvisionRequest, ProvisioningSaga};
pub use slug_registry::{ReserveOutcome, SlugRegistry};
