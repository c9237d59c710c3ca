//! Persistence for tenant provisioning.
//!
//! Two implementations share the traits in [`store`]:
//! - [`InMemoryStore`] for tests and single-process deployments
//! - [`PostgresStore`] backed by `sqlx`
//!
//! Both enforce slug uniqueness and compare-and-set tenant status changes
//! at the storage layer.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use store::{
    AccountStore, JournalStore, ProvisioningStore, SessionStore, SlugStore, TenantStore,
};
