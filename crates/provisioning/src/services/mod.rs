//! Collaborator services the saga calls out to.
//!
//! Each collaborator is a trait with an in-memory implementation for tests
//! and local runs.

mod authorization;
mod event_bus;
mod hosts;
mod identity;
mod notification;
mod vendor;

pub use authorization::{
    AuthorizationService, InMemoryAuthorizationService, OwnerBootstrap, OwnerGrant,
};
pub use event_bus::{
    BusConnector, EventBus, InMemoryBusConnector, InMemoryEventBus, PublishedMessage,
};
pub use hosts::{HostProvisioner, HostRequest, HttpHostProvisioner, InMemoryHostProvisioner};
pub use identity::{
    Attributes, IdentityProvider, IdentityUser, InMemoryIdentityProvider, LoginToken, NewIdentity,
};
pub use notification::{InMemoryNotificationService, NotificationService, SentNotification};
pub use vendor::{
    InMemoryVendorService, NewStorefront, NewVendor, Storefront, Vendor, VendorService,
};
