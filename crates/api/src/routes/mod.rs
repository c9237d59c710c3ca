//! HTTP route handlers.

pub mod admin;
pub mod health;
pub mod metrics;
pub mod onboarding;
pub mod slugs;
pub mod tenants;
