//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use provisioning::{HostConfig, ProvisioningConfig, ReconcilerConfig};
use reqwest::Url;
use thiserror::Error;

/// Configuration errors detected at start-up.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable held a value that could not be used.
    #[error("Invalid value for {var}: {message}")]
    Invalid { var: &'static str, message: String },

    /// The HTTP client for the host-provisioning fallback could not be built.
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`, `PORT`: bind address (default `0.0.0.0:3000`)
/// - `RUST_LOG`: tracing filter directive (default `info`)
/// - `DATABASE_URL`: PostgreSQL connection string; unset selects the in-memory store
/// - `HOSTS_FALLBACK_URL`: host-provisioning endpoint; unset disables the fallback
/// - `HOSTS_FALLBACK_TIMEOUT_SECS`: fallback request timeout (default 10)
/// - `ADMIN_DOMAIN`, `STOREFRONT_DOMAIN`: domains tenant hosts derive from
/// - `RECONCILE_INTERVAL_SECS`, `RECONCILE_STUCK_THRESHOLD_SECS`,
///   `RECONCILE_MAX_STUCK_AGE_SECS`, `RECONCILE_MAX_ATTEMPTS`
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: Option<String>,
    pub hosts_fallback_url: Option<Url>,
    pub hosts_fallback_timeout: Duration,
    pub provisioning: ProvisioningConfig,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads configuration from an arbitrary variable source.
    ///
    /// Unparsable numbers fall back to their defaults; an unparsable
    /// fallback URL is an error, since silently disabling it would hide
    /// the misconfiguration.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let reconciler_defaults = ReconcilerConfig::default();
        let host_defaults = HostConfig::default();

        let secs = |name: &str, default: Duration| {
            parsed::<u64>(&lookup, name)
                .map(Duration::from_secs)
                .unwrap_or(default)
        };

        let hosts_fallback_url = match non_empty(&lookup, "HOSTS_FALLBACK_URL") {
            Some(raw) => Some(Url::parse(&raw).map_err(|e| ConfigError::Invalid {
                var: "HOSTS_FALLBACK_URL",
                message: e.to_string(),
            })?),
            None => None,
        };

        let provisioning = ProvisioningConfig {
            reconciler: ReconcilerConfig {
                interval: secs("RECONCILE_INTERVAL_SECS", reconciler_defaults.interval),
                stuck_threshold: secs(
                    "RECONCILE_STUCK_THRESHOLD_SECS",
                    reconciler_defaults.stuck_threshold,
                ),
                max_stuck_age: secs(
                    "RECONCILE_MAX_STUCK_AGE_SECS",
                    reconciler_defaults.max_stuck_age,
                ),
                max_attempts: parsed(&lookup, "RECONCILE_MAX_ATTEMPTS")
                    .unwrap_or(reconciler_defaults.max_attempts),
            },
            hosts: HostConfig {
                admin_domain: non_empty(&lookup, "ADMIN_DOMAIN")
                    .unwrap_or(host_defaults.admin_domain),
                storefront_domain: non_empty(&lookup, "STOREFRONT_DOMAIN")
                    .unwrap_or(host_defaults.storefront_domain),
            },
            ..Default::default()
        };

        Ok(Self {
            host: non_empty(&lookup, "HOST").unwrap_or(defaults.host),
            port: parsed(&lookup, "PORT").unwrap_or(defaults.port),
            log_level: non_empty(&lookup, "RUST_LOG").unwrap_or(defaults.log_level),
            database_url: non_empty(&lookup, "DATABASE_URL"),
            hosts_fallback_url,
            hosts_fallback_timeout: secs(
                "HOSTS_FALLBACK_TIMEOUT_SECS",
                defaults.hosts_fallback_timeout,
            ),
            provisioning,
        })
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            database_url: None,
            hosts_fallback_url: None,
            hosts_fallback_timeout: Duration::from_secs(10),
            provisioning: ProvisioningConfig::default(),
        }
    }
}

fn non_empty(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name).filter(|v| !v.trim().is_empty())
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T> {
    non_empty(lookup, name).and_then(|v| v.trim().parse().ok())
}
