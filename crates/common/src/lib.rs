//! Shared identifier types for the tenant provisioning workspace.

mod ids;

pub use ids::{JournalEntryId, SessionId, StorefrontId, TenantId, UserId, VendorId};
