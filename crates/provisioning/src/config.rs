//! Tunables for provisioning, retries and reconciliation.

use std::time::Duration;

use domain::Slug;

/// Bounded exponential backoff for retryable collaborator calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_backoff: Duration,
    /// Factor applied to the delay after each failed attempt.
    pub multiplier: u32,
    /// Upper bound on any single delay.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            multiplier: 2,
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Returns the delay to wait after `attempt` (1-based) failed.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let mut delay = self.initial_backoff;
        for _ in 1..attempt {
            delay = delay.saturating_mul(self.multiplier).min(self.max_backoff);
        }
        delay.min(self.max_backoff)
    }
}

/// Schedule and limits for the reconciliation loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilerConfig {
    /// Time between passes.
    pub interval: Duration,
    /// Minimum age of a `creating` tenant before it counts as stuck.
    pub stuck_threshold: Duration,
    /// Stuck tenants older than this are failed without another attempt.
    pub max_stuck_age: Duration,
    /// Failed resume attempts after which a tenant is failed for good.
    pub max_attempts: u32,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            stuck_threshold: Duration::from_secs(5 * 60),
            max_stuck_age: Duration::from_secs(24 * 60 * 60),
            max_attempts: 3,
        }
    }
}

/// Domains used to derive a tenant's routing hosts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostConfig {
    pub admin_domain: String,
    pub storefront_domain: String,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            admin_domain: "admin.example.com".to_string(),
            storefront_domain: "example.com".to_string(),
        }
    }
}

impl HostConfig {
    /// `{slug}.{admin_domain}`
    pub fn admin_host(&self, slug: &Slug) -> String {
        format!("{}.{}", slug, self.admin_domain)
    }

    /// `{slug}.{storefront_domain}`
    pub fn storefront_host(&self, slug: &Slug) -> String {
        format!("{}.{}", slug, self.storefront_domain)
    }
}

/// Slug reservation behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlugPolicy {
    /// Alternatives returned when a slug is taken.
    pub suggestion_count: usize,
    /// How long a pending reservation holds the slug.
    pub reservation_ttl: Duration,
}

impl Default for SlugPolicy {
    fn default() -> Self {
        Self {
            suggestion_count: 3,
            reservation_ttl: Duration::from_secs(30 * 60),
        }
    }
}

/// All provisioning tunables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvisioningConfig {
    pub retry: RetryPolicy,
    pub reconciler: ReconcilerConfig,
    pub hosts: HostConfig,
    pub slugs: SlugPolicy,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 6,
            ..Default::default()
        };
        assert_eq!(policy.backoff_for(1), Duration::from_millis(500));
        assert_eq!(policy.backoff_for(2), Duration::from_secs(1));
        assert_eq!(policy.backoff_for(3), Duration::from_secs(2));
        assert_eq!(policy.backoff_for(4), Duration::from_secs(4));
        assert_eq!(policy.backoff_for(5), Duration::from_secs(5));
        assert_eq!(policy.backoff_for(9), Duration::from_secs(5));
    }

    #[test]
    fn test_hosts() {
        let hosts = HostConfig::default();
        let slug = Slug::parse("acme").unwrap();
        assert_eq!(hosts.admin_host(&slug), "acme.admin.example.com");
        assert_eq!(hosts.storefront_host(&slug), "acme.example.com");
    }

    #[test]
    fn test_defaults() {
        let config = ProvisioningConfig::default();
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.reconciler.stuck_threshold, Duration::from_secs(300));
        assert_eq!(config.reconciler.max_attempts, 3);
        assert_eq!(config.slugs.suggestion_count, 3);
    }
}
