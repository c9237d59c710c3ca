//! Domain layer for tenant provisioning.
//!
//! This crate provides the core provisioning types including:
//! - Slug value object with validation and suffix-based alternatives
//! - Tenant record with an explicit status transition table
//! - Slug reservations and onboarding sessions
//! - Local account bookkeeping (users, memberships, credentials)
//! - The provisioning journal and the progress fold used to resume sagas

pub mod account;
pub mod error;
pub mod journal;
pub mod reservation;
pub mod session;
pub mod slug;
pub mod tenant;

pub use account::{AuthPolicy, Credential, Membership, Role, User};
pub use error::DomainError;
pub use journal::{JournalEntry, ProvisioningEvent, ProvisioningProgress, ProvisioningStep, SagaState};
pub use reservation::{ReservationStatus, SlugReservation};
pub use session::{ContactDetails, OnboardingSession, SessionStatus};
pub use slug::{MAX_SLUG_LEN, MIN_SLUG_LEN, Slug, SlugError};
pub use tenant::{
    DEFAULT_CURRENCY, DEFAULT_LOCALE, TENANT_TRANSITIONS, Tenant, TenantError, TenantStatus,
};
